//! Periodic status report — what a display would show for each node.
//!
//! Token recency is relative: the node that caught the token longest ago
//! is the stalest. A node that has never caught it is flagged.

use std::collections::BTreeMap;
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tokenring_core::{NodeId, Signature, Vector};
use tokenring_node::{NodeHandle, NodeStatus};

#[derive(Debug, Serialize)]
pub struct NodeReport {
    pub id: NodeId,
    pub running: bool,
    /// Milliseconds since this node last caught the token.
    pub since_token_ms: Option<u64>,
    /// 0.0 = freshest in the ring, 1.0 = stalest. None if never caught.
    pub staleness: Option<f64>,
    pub token_catches: u64,
    pub world: BTreeMap<Signature, Vector>,
}

/// Build reports from statuses and world snapshots taken at `now`.
pub fn build(now: SystemTime, nodes: Vec<(NodeStatus, BTreeMap<Signature, Vector>)>) -> Vec<NodeReport> {
    let age = |s: &NodeStatus| {
        s.last_token_time
            .map(|t| now.duration_since(t).unwrap_or(Duration::ZERO))
    };
    let max_age = nodes
        .iter()
        .filter_map(|(s, _)| age(s))
        .max()
        .unwrap_or(Duration::ZERO);

    nodes
        .into_iter()
        .map(|(status, world)| {
            let a = age(&status);
            NodeReport {
                id: status.id,
                running: status.running,
                since_token_ms: a.map(|d| d.as_millis() as u64),
                staleness: a.map(|d| {
                    if max_age.is_zero() {
                        0.0
                    } else {
                        d.as_secs_f64() / max_age.as_secs_f64()
                    }
                }),
                token_catches: status.token_catches,
                world,
            }
        })
        .collect()
}

/// Log one report line per node.
pub fn log(handles: &[NodeHandle]) {
    let nodes = handles
        .iter()
        .map(|h| (h.status(), h.snapshot_world()))
        .collect();

    for report in build(SystemTime::now(), nodes) {
        let world = serde_json::to_string(&report.world).unwrap_or_default();
        match report.since_token_ms {
            Some(ms) => tracing::info!(
                node = %report.id,
                running = report.running,
                since_token_ms = ms,
                staleness = report.staleness.unwrap_or(0.0),
                catches = report.token_catches,
                %world,
                "node report"
            ),
            None => tracing::warn!(
                node = %report.id,
                running = report.running,
                %world,
                "node has never caught the token"
            ),
        }
    }
}
