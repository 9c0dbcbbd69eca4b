//! tokenringd — runs a token ring of N nodes in one process.
//!
//! Usage: `tokenringd [initial_port] [node_count]`. Arguments override the
//! loaded configuration.

use std::time::Duration;

use anyhow::{Context, Result};

use tokenring_core::config::RingConfig;
use tokenring_node::{NodeEvent, Ring};

mod report;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    // Load config
    if let Err(e) = RingConfig::write_default_if_missing() {
        tracing::warn!(error = %e, "failed to write default config");
    }
    let mut config = RingConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "failed to load config, using defaults");
        RingConfig::default()
    });

    let mut args = std::env::args().skip(1);
    if let Some(port) = args.next() {
        config.ring.initial_port = port
            .parse()
            .with_context(|| format!("invalid initial port {port:?}"))?;
    }
    if let Some(count) = args.next() {
        config.ring.node_count = count
            .parse()
            .with_context(|| format!("invalid node count {count:?}"))?;
    }
    config.validate()?;

    let last_port = config.ring.initial_port + (config.ring.node_count - 1);
    tracing::info!(
        host = %config.ring.host,
        first_port = config.ring.initial_port,
        last_port,
        "tokenringd starting"
    );

    let mut ring = Ring::launch(&config).await?;
    let handles = ring.handles();

    // ── Node failure watch ───────────────────────────────────────────────────
    let (failed_tx, mut failed_rx) = tokio::sync::mpsc::unbounded_channel();
    for handle in &handles {
        let mut events = handle.subscribe();
        let failed_tx = failed_tx.clone();
        tokio::spawn(async move {
            use tokio::sync::broadcast::error::RecvError;
            loop {
                match events.recv().await {
                    Ok(NodeEvent::Stopped { node, error }) => {
                        let _ = failed_tx.send((node, error));
                        return;
                    }
                    Ok(_) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return,
                }
            }
        });
    }

    // ── Reporter ─────────────────────────────────────────────────────────────
    let reporter = {
        let handles = handles.clone();
        let period = Duration::from_millis(config.node.report_interval_ms.max(1));
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                report::log(&handles);
            }
        })
    };

    // ── Wait for exit ────────────────────────────────────────────────────────
    tokio::select! {
        r = tokio::signal::ctrl_c() => {
            r.context("failed to listen for ctrl-c")?;
            tracing::info!("shutdown signal received");
        }
        Some((node, error)) = failed_rx.recv() => {
            // The ring cannot make progress without every node.
            tracing::error!(%node, error = error.as_deref().unwrap_or("none"), "node stopped, ring halted");
        }
    }

    reporter.abort();
    ring.stop().await?;
    tracing::info!("tokenringd stopped");
    Ok(())
}
