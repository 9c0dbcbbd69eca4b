//! Ring bootstrap — wires N nodes into a cycle and seeds the token.
//!
//! Node i binds `initial_port + i` and sends to node i+1; the last node
//! wraps to the first. Every node is bound before any is started so no
//! frame is sent to a port that is not yet listening.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use anyhow::{bail, Context, Result};

use tokenring_core::config::RingConfig;
use tokenring_core::Frame;

use crate::node::{NodeHandle, NodeSettings, RingNode};
use crate::transport;

/// `(bind, successor)` for each node, in ring order.
pub fn ring_topology(host: IpAddr, initial_port: u16, count: u16) -> Result<Vec<(SocketAddr, SocketAddr)>> {
    if count == 0 {
        bail!("a ring needs at least one node");
    }
    let ports: Vec<u16> = (0..count)
        .map(|i| initial_port.checked_add(i))
        .collect::<Option<_>>()
        .with_context(|| format!("{count} nodes from port {initial_port} overflow the port range"))?;

    Ok(ports
        .iter()
        .zip(ports.iter().cycle().skip(1))
        .map(|(&this, &next)| (SocketAddr::new(host, this), SocketAddr::new(host, next)))
        .collect())
}

/// Send one token to `target`. Called exactly once per ring.
pub async fn inject_token(target: SocketAddr) -> Result<()> {
    transport::send_once(target, &Frame::token())
        .await
        .with_context(|| format!("failed to inject token at {target}"))?;
    tracing::info!(%target, "token injected");
    Ok(())
}

/// A set of nodes wired as a cycle.
pub struct Ring {
    host: IpAddr,
    nodes: Vec<RingNode>,
}

impl Ring {
    /// Bind every node of the configured topology. Nothing is started.
    pub async fn bind(config: &RingConfig) -> Result<Self> {
        config.validate()?;
        let host: IpAddr = config
            .ring
            .host
            .parse()
            .with_context(|| format!("invalid ring host {:?}", config.ring.host))?;

        let mut nodes = Vec::with_capacity(usize::from(config.ring.node_count));
        for (bind, successor) in ring_topology(host, config.ring.initial_port, config.ring.node_count)? {
            let settings = NodeSettings {
                recv_buffer: config.node.recv_buffer,
                ..NodeSettings::default()
            };
            nodes.push(RingNode::bind_with(bind, successor, settings).await?);
        }
        tracing::info!(
            nodes = nodes.len(),
            first = config.ring.initial_port,
            "ring bound"
        );
        Ok(Self { host, nodes })
    }

    /// Start every node's loop.
    pub fn start(&mut self) -> Result<()> {
        for node in &mut self.nodes {
            node.start()?;
        }
        Ok(())
    }

    /// Bind, start, let the nodes settle, then seed the token at the first node.
    pub async fn launch(config: &RingConfig) -> Result<Self> {
        let mut ring = Self::bind(config).await?;
        ring.start()?;
        tokio::time::sleep(Duration::from_millis(config.ring.settle_ms)).await;
        ring.inject_token().await?;
        Ok(ring)
    }

    /// Seed the token at the first node.
    pub async fn inject_token(&self) -> Result<()> {
        let first = self.nodes.first().context("ring has no nodes")?;
        inject_token(SocketAddr::new(self.host, first.id().port())).await
    }

    pub fn handles(&self) -> Vec<NodeHandle> {
        self.nodes.iter().map(RingNode::handle).collect()
    }

    /// Stop every node. Returns the first fatal error any node reported.
    pub async fn stop(&mut self) -> Result<()> {
        let mut first_err = None;
        for node in &mut self.nodes {
            if let Err(e) = node.stop().await {
                tracing::warn!(node = %node.id(), error = %e, "node stopped with error");
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
