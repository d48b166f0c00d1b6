//! Node health monitoring
//!
//! Periodically probes every registered node. A node that answers its model
//! listing is reported `Online` with the models it serves; a node that does not
//! is marked `Offline` without refreshing its heartbeat, so it ages out of the
//! pool after the offline grace window.

use crate::node_client::NodeClient;
use crate::registry::{ComputeNode, NodeRegistry, NodeStatus};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Health monitor for registered nodes
pub struct HealthMonitor {
    registry: Arc<NodeRegistry>,
    client: NodeClient,
    interval: Duration,
}

/// Result of one probe round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HealthSummary {
    pub healthy: usize,
    pub unreachable: usize,
}

impl HealthMonitor {
    pub fn new(registry: Arc<NodeRegistry>, client: NodeClient, interval: Duration) -> Self {
        Self {
            registry,
            client,
            interval,
        }
    }

    /// Start background health check task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.interval);

            loop {
                interval.tick().await;
                let summary = self.check_all().await;
                debug!(
                    "Health round: {} healthy, {} unreachable",
                    summary.healthy, summary.unreachable
                );
            }
        })
    }

    /// Probe every registered node concurrently
    pub async fn check_all(&self) -> HealthSummary {
        let handles: Vec<_> = self
            .registry
            .snapshot()
            .into_iter()
            .map(|node| {
                let client = self.client.clone();
                tokio::spawn(async move {
                    let report = client.probe(&node).await;
                    (node, report)
                })
            })
            .collect();

        let mut summary = HealthSummary::default();
        for handle in handles {
            let Ok((node, report)) = handle.await else {
                continue;
            };

            match report {
                Ok(report) => {
                    self.registry.update_status(
                        &node.id,
                        NodeStatus::Online,
                        Some(report.models),
                        None,
                        Some(report.latency_ms),
                    );
                    summary.healthy += 1;
                }
                Err(e) => {
                    self.mark_unreachable(&node);
                    warn!("Health check failed for {}: {}", node.id, e);
                    summary.unreachable += 1;
                }
            }
        }

        summary
    }

    fn mark_unreachable(&self, node: &ComputeNode) {
        // Unreachable never overrides Error
        let current = self
            .registry
            .get(&node.id)
            .map(|n| n.status)
            .unwrap_or(node.status);
        if current != NodeStatus::Error {
            self.registry.mark_status(&node.id, NodeStatus::Offline);
        }
    }
}
