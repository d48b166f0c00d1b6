//! Compute network facade
//!
//! The surface the surrounding application talks to: node registration and
//! status, eligibility queries, task distribution, statistics and retention.

use crate::dispatcher::{DistributionResult, Dispatcher};
use crate::node_client::{NodeClient, NodeExecutor};
use crate::registry::{ComputeNode, NodeCapabilities, NodeRegistration, NodeRegistry, NodeStatus};
use crate::task_store::{Task, TaskStatus, TaskStore};
use serde::Serialize;
use sharegrid_common::config::{CoordinatorConfig, DispatchMode, SeedNodeConfig};
use sharegrid_common::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Aggregate view of the pool
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NetworkStats {
    pub total_nodes: usize,
    pub online_nodes: usize,
    pub total_gpu: u64,
    pub total_gpu_memory_mb: u64,
    pub total_gpu_memory_gb: f64,
    pub total_cpu_cores: u64,
    pub active_tasks: usize,
    pub completed_tasks: usize,
    pub failed_tasks: usize,
}

/// Coordinator for a pool of contributed compute nodes
pub struct ComputeNetwork {
    registry: Arc<NodeRegistry>,
    tasks: Arc<TaskStore>,
    dispatcher: Dispatcher,
    config: CoordinatorConfig,
}

impl ComputeNetwork {
    /// Create a network that reaches nodes over HTTP
    pub fn new(config: CoordinatorConfig) -> Result<Self> {
        let registry = Arc::new(NodeRegistry::new(
            config.local_owner.clone(),
            config.eligibility.clone(),
        ));
        let client = NodeClient::new(Arc::clone(&registry), config.client.clone())?;
        Ok(Self::from_parts(config, registry, Arc::new(client)))
    }

    /// Create a network from an existing registry and executor
    pub fn from_parts(
        config: CoordinatorConfig,
        registry: Arc<NodeRegistry>,
        executor: Arc<dyn NodeExecutor>,
    ) -> Self {
        let tasks = Arc::new(TaskStore::new());
        let dispatcher = Dispatcher::new(Arc::clone(&registry), Arc::clone(&tasks), executor, &config);

        Self {
            registry,
            tasks,
            dispatcher,
            config,
        }
    }

    /// Register the nodes listed in configuration
    pub fn register_seed_nodes(&self) -> usize {
        for seed in &self.config.seed_nodes {
            self.register_node(seed_registration(seed));
        }
        self.config.seed_nodes.len()
    }

    /// Register a node or refresh an existing one
    pub fn register_node(&self, registration: NodeRegistration) -> ComputeNode {
        self.registry.register(registration)
    }

    /// Report a node's status
    pub fn update_node_status(
        &self,
        id: &str,
        status: NodeStatus,
        models: Option<Vec<String>>,
        load: Option<f64>,
        latency_ms: Option<f64>,
    ) {
        self.registry.update_status(id, status, models, load, latency_ms);
    }

    /// Nodes currently eligible for work
    pub fn list_eligible_nodes(
        &self,
        model_filter: Option<&str>,
        min_gpu_memory_mb: u64,
        ignore_model_filter: bool,
    ) -> Vec<ComputeNode> {
        self.registry
            .list_eligible(model_filter, min_gpu_memory_mb, ignore_model_filter)
    }

    /// Run a chat task; `None` uses the configured default mode
    pub async fn distribute(
        &self,
        requester: &str,
        model: &str,
        messages: Vec<sharegrid_proto::ChatMessage>,
        mode: Option<DispatchMode>,
    ) -> Result<DistributionResult> {
        let mode = mode.unwrap_or(self.config.dispatch.default_mode);
        self.dispatcher.distribute(requester, model, messages, mode).await
    }

    /// Aggregate statistics over nodes and tasks
    pub fn network_stats(&self) -> NetworkStats {
        let nodes = self.registry.snapshot();
        let online: Vec<&ComputeNode> = nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Online)
            .collect();

        let total_gpu_memory_mb: u64 = online.iter().map(|n| n.capabilities.gpu_memory_mb).sum();

        NetworkStats {
            total_nodes: nodes.len(),
            online_nodes: online.len(),
            total_gpu: online.iter().map(|n| u64::from(n.capabilities.gpu_count)).sum(),
            total_gpu_memory_mb,
            total_gpu_memory_gb: total_gpu_memory_mb as f64 / 1024.0,
            total_cpu_cores: online.iter().map(|n| u64::from(n.capabilities.cpu_cores)).sum(),
            active_tasks: self.tasks.count_by_status(TaskStatus::Processing),
            completed_tasks: self.tasks.count_by_status(TaskStatus::Completed),
            failed_tasks: self.tasks.count_by_status(TaskStatus::Failed),
        }
    }

    /// Remove finished tasks older than `max_age_hours`
    ///
    /// An age too large to represent keeps every task.
    pub fn evict_old_tasks(&self, max_age_hours: u64) -> usize {
        let max_age = i64::try_from(max_age_hours)
            .ok()
            .and_then(chrono::Duration::try_hours);

        match max_age {
            Some(max_age) => self.tasks.evict_older_than(max_age),
            None => 0,
        }
    }

    /// Look up a task
    pub fn task(&self, id: &str) -> Option<Task> {
        self.tasks.get(id)
    }

    pub fn registry(&self) -> &Arc<NodeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Start background task eviction
    pub fn start_task_cleanup(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        let interval = self.config.tasks.cleanup_interval().max(Duration::from_secs(1));
        let max_age_hours = self.config.tasks.max_age_hours;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let removed = self.evict_old_tasks(max_age_hours);
                if removed > 0 {
                    info!("Task cleanup removed {} task(s)", removed);
                }
            }
        })
    }
}

fn seed_registration(seed: &SeedNodeConfig) -> NodeRegistration {
    let mut registration = NodeRegistration::new(
        seed.id.clone(),
        seed.owner.clone(),
        seed.name.clone(),
        seed.endpoint.clone(),
    )
    .with_capabilities(NodeCapabilities {
        gpu_count: seed.gpu_count,
        gpu_memory_mb: seed.gpu_memory_mb,
        cpu_cores: seed.cpu_cores,
    });
    if let Some(credential) = &seed.credential {
        registration = registration.with_credential(credential.clone());
    }
    registration
}
