//! Node execution client
//!
//! Performs inference calls against a node's backend and feeds the outcome back
//! into the registry: a success marks the node `Online` with its latency, a
//! timeout or connection failure marks it `Busy` and is retried, anything else
//! marks it `Error`.

use crate::registry::{ComputeNode, NodeRegistry, NodeStatus};
use async_trait::async_trait;
use sharegrid_common::config::NodeClientConfig;
use sharegrid_common::error::{Result, ShareGridError};
use sharegrid_common::METRICS;
use sharegrid_proto::{ChatMessage, ChatRequest, ChatResponse, TagsResponse};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Runs one inference call on one node
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Execute `messages` against `model` on `node`, returning the generated text
    async fn execute(
        &self,
        node: &ComputeNode,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String>;
}

/// Result of a successful health probe
#[derive(Debug, Clone)]
pub struct ProbeReport {
    pub models: Vec<String>,
    pub latency_ms: f64,
}

/// HTTP client for node backends
///
/// A single pooled `reqwest::Client` is shared by every call, so connections
/// to a node are kept alive across tasks.
#[derive(Clone)]
pub struct NodeClient {
    http: reqwest::Client,
    registry: Arc<NodeRegistry>,
    config: NodeClientConfig,
}

impl NodeClient {
    /// Create a client reporting into `registry`
    pub fn new(registry: Arc<NodeRegistry>, config: NodeClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| ShareGridError::config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            registry,
            config,
        })
    }

    /// Probe a node's installed-model listing
    pub async fn probe(&self, node: &ComputeNode) -> Result<ProbeReport> {
        let url = endpoint_url(&node.endpoint, "api/tags");
        let started = Instant::now();

        let mut request = self.http.get(&url).timeout(self.config.probe_timeout());
        if let Some(credential) = &node.credential {
            request = request.bearer_auth(credential);
        }

        let response = request.send().await.map_err(|e| classify(&node.id, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShareGridError::node_protocol(&node.id, Some(status.as_u16()), body));
        }

        let tags: TagsResponse = response.json().await.map_err(|e| classify(&node.id, e))?;
        Ok(ProbeReport {
            models: tags.model_names(),
            latency_ms: started.elapsed().as_secs_f64() * 1000.0,
        })
    }

    /// One chat call, no retries and no registry feedback
    async fn call_once(
        &self,
        node: &ComputeNode,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String> {
        let url = endpoint_url(&node.endpoint, "api/chat");
        let body = ChatRequest::new(model, messages.to_vec());

        let mut request = self.http.post(&url).json(&body);
        if let Some(credential) = &node.credential {
            request = request.bearer_auth(credential);
        }

        let response = request.send().await.map_err(|e| classify(&node.id, e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ShareGridError::node_protocol(&node.id, Some(status.as_u16()), body));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| classify(&node.id, e))?;
        Ok(parsed.into_text())
    }
}

#[async_trait]
impl NodeExecutor for NodeClient {
    async fn execute(
        &self,
        node: &ComputeNode,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<String> {
        let mut attempt = 0;

        loop {
            METRICS.nodes.calls_total.inc();
            let started = Instant::now();

            match self.call_once(node, model, messages).await {
                Ok(text) => {
                    let elapsed = started.elapsed();
                    let latency_ms = elapsed.as_secs_f64() * 1000.0;
                    METRICS.nodes.response_time.observe(elapsed.as_secs_f64());
                    self.registry
                        .update_status(&node.id, NodeStatus::Online, None, None, Some(latency_ms));

                    debug!(
                        "Node {} answered in {:.0} ms ({} chars, attempt {})",
                        node.id,
                        latency_ms,
                        text.len(),
                        attempt
                    );
                    return Ok(text);
                }
                Err(e) if e.is_transient() => {
                    METRICS.nodes.failures_total.with_label_values(&[e.kind()]).inc();
                    self.registry.mark_status(&node.id, NodeStatus::Busy);

                    if attempt >= self.config.max_retries {
                        warn!(
                            "Node {} failed after {} attempts: {}",
                            node.id,
                            attempt + 1,
                            e
                        );
                        return Err(e);
                    }

                    attempt += 1;
                    METRICS.nodes.retries_total.inc();
                    warn!(
                        "Node {} transient failure, retry {}/{} in {:?}: {}",
                        node.id,
                        attempt,
                        self.config.max_retries,
                        self.config.retry_backoff(),
                        e
                    );
                    tokio::time::sleep(self.config.retry_backoff()).await;
                }
                Err(e) => {
                    METRICS.nodes.failures_total.with_label_values(&[e.kind()]).inc();
                    self.registry.mark_status(&node.id, NodeStatus::Error);
                    warn!("Node {} marked as error: {}", node.id, e);
                    return Err(e);
                }
            }
        }
    }
}

fn endpoint_url(endpoint: &str, path: &str) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), path)
}

/// Map a transport error onto the node error kinds
fn classify(node_id: &str, err: reqwest::Error) -> ShareGridError {
    if err.is_timeout() {
        ShareGridError::node_timeout(node_id, err.to_string())
    } else if err.is_connect() {
        ShareGridError::node_connection(node_id, err.to_string())
    } else {
        ShareGridError::node_protocol(node_id, err.status().map(|s| s.as_u16()), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_joins_cleanly() {
        assert_eq!(
            endpoint_url("http://10.0.0.5:11434", "api/chat"),
            "http://10.0.0.5:11434/api/chat"
        );
        assert_eq!(
            endpoint_url("http://10.0.0.5:11434/", "api/tags"),
            "http://10.0.0.5:11434/api/tags"
        );
    }
}
