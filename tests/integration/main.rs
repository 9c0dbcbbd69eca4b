//! Token ring integration test harness.
//!
//! Every test runs real nodes over UDP on 127.0.0.1:
//!
//!   cargo test --test integration
//!
//! Tests that use the 5000-range ports hold `RING_LOCK`; the rest use
//! port ranges of their own. Each test stops the nodes it starts.

use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tokio::sync::broadcast;

use tokenring_core::config::RingConfig;
use tokenring_core::NodeId;
use tokenring_node::NodeEvent;

mod framing;
mod moves;
mod ring;

// ── Harness ───────────────────────────────────────────────────────────────────

/// Upper bound on any single wait.
pub const TIMEOUT: Duration = Duration::from_secs(10);

static RING_LOCK: Mutex<()> = Mutex::new(());

/// Serialise tests that share a port range.
pub fn ring_lock() -> MutexGuard<'static, ()> {
    // A failed test must not wedge the others.
    RING_LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

pub fn localhost(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Config for `count` nodes on 127.0.0.1 starting at `initial_port`.
pub fn ring_config(initial_port: u16, count: u16) -> RingConfig {
    let mut config = RingConfig::default();
    config.ring.host = "127.0.0.1".to_string();
    config.ring.initial_port = initial_port;
    config.ring.node_count = count;
    config.ring.settle_ms = 20;
    config
}

/// Poll `f` until it holds or TIMEOUT passes.
pub async fn wait_until(what: &str, mut f: impl FnMut() -> bool) -> Result<()> {
    let deadline = Instant::now() + TIMEOUT;
    while !f() {
        if Instant::now() >= deadline {
            bail!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    Ok(())
}

/// One observed token catch.
#[derive(Debug)]
pub struct Catch {
    pub node: NodeId,
    pub at: Instant,
    pub round_trip: Option<Duration>,
}

/// Next token catch from a node's event feed.
pub async fn next_catch(events: &mut broadcast::Receiver<NodeEvent>) -> Result<Catch> {
    loop {
        let event = tokio::time::timeout(TIMEOUT, events.recv())
            .await
            .context("timed out waiting for token")?
            .context("event feed failed")?;
        match event {
            NodeEvent::TokenCaught {
                node,
                at,
                round_trip,
                ..
            } => {
                return Ok(Catch {
                    node,
                    at,
                    round_trip,
                })
            }
            NodeEvent::Stopped { node, error } => {
                bail!("node {node} stopped while waiting for token: {error:?}")
            }
        }
    }
}
