//! Node registry
//!
//! Holds every known compute node with its capabilities and health. The registry
//! is pure state: it never performs I/O and never decides which node serves a
//! task, it only answers which nodes are currently eligible.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sharegrid_common::config::EligibilityConfig;
use sharegrid_common::METRICS;
use std::collections::{BTreeSet, HashMap};
use tracing::{debug, info};

/// Health state of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Healthy and serving
    Online,

    /// Deprioritized after a transient failure, still schedulable
    Busy,

    /// Presumed down, schedulable during a short grace window
    Offline,

    /// Hard failure, excluded until a successful call or re-registration
    Error,

    /// Any status string this coordinator does not understand
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NodeStatus::Online => "online",
            NodeStatus::Busy => "busy",
            NodeStatus::Offline => "offline",
            NodeStatus::Error => "error",
            NodeStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Hardware a node claims to contribute
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeCapabilities {
    pub gpu_count: u32,
    pub gpu_memory_mb: u64,
    pub cpu_cores: u32,
}

/// Registration request for a node
#[derive(Debug, Clone)]
pub struct NodeRegistration {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub endpoint: String,
    pub credential: Option<String>,
    pub capabilities: NodeCapabilities,
}

impl NodeRegistration {
    pub fn new(
        id: impl Into<String>,
        owner: impl Into<String>,
        name: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            owner: owner.into(),
            name: name.into(),
            endpoint: endpoint.into(),
            credential: None,
            capabilities: NodeCapabilities::default(),
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_capabilities(mut self, capabilities: NodeCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// Identity, capability and health record of one contributor machine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputeNode {
    pub id: String,
    pub owner: String,
    pub display_name: String,
    pub endpoint: String,
    #[serde(skip_serializing, default)]
    pub credential: Option<String>,

    /// Coordinator's own machine, exempt from aging and load rules
    pub trusted: bool,

    #[serde(flatten)]
    pub capabilities: NodeCapabilities,
    pub available_models: BTreeSet<String>,

    pub status: NodeStatus,
    pub current_load: f64,
    pub last_seen: DateTime<Utc>,
    pub last_response_time_ms: f64,
    pub total_requests: u64,
    pub successful_requests: u64,
}

impl ComputeNode {
    fn from_registration(registration: NodeRegistration, trusted: bool, now: DateTime<Utc>) -> Self {
        Self {
            id: registration.id,
            owner: registration.owner,
            display_name: registration.name,
            endpoint: registration.endpoint,
            credential: registration.credential,
            trusted,
            capabilities: registration.capabilities,
            available_models: BTreeSet::new(),
            status: NodeStatus::Online,
            current_load: 0.0,
            last_seen: now,
            last_response_time_ms: 0.0,
            total_requests: 0,
            successful_requests: 0,
        }
    }

    /// Whether the node may be selected at `now`
    pub fn is_eligible(&self, now: DateTime<Utc>, config: &EligibilityConfig) -> bool {
        if self.trusted {
            return self.status == NodeStatus::Online;
        }

        let age = now - self.last_seen;
        // A window too large for a time delta never expires
        let within = |secs: u64| {
            i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .map_or(true, |window| age < window)
        };

        match self.status {
            NodeStatus::Online => {
                within(config.online_max_age_secs) && self.current_load < config.max_load
            }
            NodeStatus::Busy => within(config.busy_grace_secs),
            NodeStatus::Offline => within(config.offline_grace_secs),
            NodeStatus::Error | NodeStatus::Unknown => false,
        }
    }

    /// Whether the node declares support for `model`
    pub fn serves_model(&self, model: &str) -> bool {
        self.available_models.contains(model)
    }
}

#[derive(Default)]
struct RegistryState {
    nodes: HashMap<String, ComputeNode>,

    /// Node ids in first-registration order
    order: Vec<String>,
}

impl RegistryState {
    fn publish_gauges(&self) {
        let online = self
            .nodes
            .values()
            .filter(|n| n.status == NodeStatus::Online)
            .count();
        METRICS.nodes.registered.set(self.nodes.len() as i64);
        METRICS.nodes.online.set(online as i64);
    }
}

/// Registry of compute nodes
///
/// Updates from overlapping tasks are serialized by a single lock; the last
/// writer wins on health fields.
pub struct NodeRegistry {
    state: RwLock<RegistryState>,
    local_owner: String,
    eligibility: EligibilityConfig,
}

impl NodeRegistry {
    /// Create a new registry
    pub fn new(local_owner: impl Into<String>, eligibility: EligibilityConfig) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            local_owner: local_owner.into(),
            eligibility,
        }
    }

    /// Register a node, or refresh it in place if the id is already known
    pub fn register(&self, registration: NodeRegistration) -> ComputeNode {
        let now = Utc::now();
        let trusted = registration.owner == self.local_owner;
        let mut guard = self.state.write();
        let state = &mut *guard;

        let node = match state.nodes.get_mut(&registration.id) {
            Some(existing) => {
                let previous = existing.status;
                existing.owner = registration.owner;
                existing.display_name = registration.name;
                existing.endpoint = registration.endpoint;
                existing.credential = registration.credential;
                existing.capabilities = registration.capabilities;
                existing.trusted = trusted;
                existing.last_seen = now;
                existing.status = NodeStatus::Online;

                info!(
                    "Node re-registered: {} ({}) at {}, status {} -> online",
                    existing.id, existing.display_name, existing.endpoint, previous
                );
                existing.clone()
            }
            None => {
                let node = ComputeNode::from_registration(registration, trusted, now);
                info!(
                    "Node registered: {} ({}) at {}{}",
                    node.id,
                    node.display_name,
                    node.endpoint,
                    if trusted { " [trusted]" } else { "" }
                );
                state.order.push(node.id.clone());
                state.nodes.insert(node.id.clone(), node.clone());
                node
            }
        };

        state.publish_gauges();
        node
    }

    /// Report a node's status, refreshing `last_seen`
    ///
    /// Unknown ids are ignored.
    pub fn update_status(
        &self,
        id: &str,
        status: NodeStatus,
        models: Option<Vec<String>>,
        load: Option<f64>,
        latency_ms: Option<f64>,
    ) {
        let mut state = self.state.write();
        let Some(node) = state.nodes.get_mut(id) else {
            debug!("Ignoring status update for unknown node {}", id);
            return;
        };

        node.status = status;
        node.last_seen = Utc::now();
        if let Some(models) = models {
            node.available_models = models.into_iter().collect();
        }
        if let Some(load) = load {
            node.current_load = load.clamp(0.0, 1.0);
        }
        if let Some(latency_ms) = latency_ms {
            node.last_response_time_ms = latency_ms;
        }

        debug!("Node {} status updated to {}", id, status);
        state.publish_gauges();
    }

    /// Change only the status, leaving `last_seen` untouched
    pub fn mark_status(&self, id: &str, status: NodeStatus) {
        let mut state = self.state.write();
        if let Some(node) = state.nodes.get_mut(id) {
            if node.status != status {
                debug!("Node {} marked {} (was {})", id, status, node.status);
            }
            node.status = status;
            state.publish_gauges();
        }
    }

    /// Count one resolved call against a node
    pub fn record_outcome(&self, id: &str, success: bool) {
        let mut state = self.state.write();
        if let Some(node) = state.nodes.get_mut(id) {
            node.total_requests += 1;
            if success {
                node.successful_requests += 1;
            }
        }
    }

    /// Nodes eligible right now
    pub fn list_eligible(
        &self,
        model_filter: Option<&str>,
        min_gpu_memory_mb: u64,
        ignore_model_filter: bool,
    ) -> Vec<ComputeNode> {
        self.list_eligible_at(Utc::now(), model_filter, min_gpu_memory_mb, ignore_model_filter)
    }

    /// Nodes eligible at `now`, in registration order
    pub fn list_eligible_at(
        &self,
        now: DateTime<Utc>,
        model_filter: Option<&str>,
        min_gpu_memory_mb: u64,
        ignore_model_filter: bool,
    ) -> Vec<ComputeNode> {
        let state = self.state.read();

        state
            .order
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .filter(|node| node.is_eligible(now, &self.eligibility))
            .filter(|node| {
                min_gpu_memory_mb == 0 || node.capabilities.gpu_memory_mb >= min_gpu_memory_mb
            })
            .filter(|node| match model_filter {
                Some(model) if !ignore_model_filter => node.serves_model(model),
                _ => true,
            })
            .cloned()
            .collect()
    }

    /// Get a node by id
    pub fn get(&self, id: &str) -> Option<ComputeNode> {
        self.state.read().nodes.get(id).cloned()
    }

    /// All nodes in registration order
    pub fn snapshot(&self) -> Vec<ComputeNode> {
        let state = self.state.read();
        state
            .order
            .iter()
            .filter_map(|id| state.nodes.get(id))
            .cloned()
            .collect()
    }

    /// Number of registered nodes
    pub fn len(&self) -> usize {
        self.state.read().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Test-only: move a node's heartbeat into the past
    #[cfg(test)]
    pub(crate) fn set_last_seen(&self, id: &str, last_seen: DateTime<Utc>) {
        if let Some(node) = self.state.write().nodes.get_mut(id) {
            node.last_seen = last_seen;
        }
    }
}
