//! Task dispatch
//!
//! Picks the nodes that take part in a task, runs the calls concurrently and
//! folds per-node outcomes into a single answer. Node failures never escape
//! a distribution on their own: the caller sees either an answer, `NoCapacity`
//! or `AllNodesFailed`.

use crate::aggregator::ResponseAggregator;
use crate::node_client::NodeExecutor;
use crate::registry::{ComputeNode, NodeRegistry};
use crate::task_store::{NodeOutcome, TaskId, TaskStatus, TaskStore};
use sharegrid_common::config::{CoordinatorConfig, DispatchMode};
use sharegrid_common::error::{NodeFailure, Result, ShareGridError};
use sharegrid_common::METRICS;
use sharegrid_proto::ChatMessage;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Outcome of a successful distribution
#[derive(Debug, Clone)]
pub struct DistributionResult {
    pub task_id: TaskId,
    pub text: String,
    pub status: TaskStatus,
    pub nodes_used: usize,
    pub nodes_succeeded: usize,
}

/// Dispatcher for inference tasks
pub struct Dispatcher {
    registry: Arc<NodeRegistry>,
    tasks: Arc<TaskStore>,
    executor: Arc<dyn NodeExecutor>,
    aggregator: ResponseAggregator,

    /// Caps node calls in flight across all tasks
    limiter: Arc<Semaphore>,

    /// Round-robin position for `LoadBalanced`
    next_node: AtomicUsize,

    ignore_model_filter: bool,
}

impl Dispatcher {
    /// Create a new dispatcher
    pub fn new(
        registry: Arc<NodeRegistry>,
        tasks: Arc<TaskStore>,
        executor: Arc<dyn NodeExecutor>,
        config: &CoordinatorConfig,
    ) -> Self {
        Self {
            registry,
            tasks,
            executor,
            aggregator: ResponseAggregator::new(config.dispatch.merge_min_new_words),
            limiter: Arc::new(Semaphore::new(config.max_concurrent_requests.max(1))),
            next_node: AtomicUsize::new(0),
            ignore_model_filter: config.dispatch.ignore_model_filter,
        }
    }

    /// Choose the participating nodes from a non-empty eligible list
    pub fn select(&self, eligible: Vec<ComputeNode>, mode: DispatchMode) -> Vec<ComputeNode> {
        if eligible.is_empty() {
            return eligible;
        }

        match mode {
            DispatchMode::Broadcast => eligible,
            DispatchMode::LoadBalanced => {
                let position = self.next_node.fetch_add(1, Ordering::Relaxed) % eligible.len();
                eligible.into_iter().skip(position).take(1).collect()
            }
            DispatchMode::BestSingle => eligible.into_iter().take(1).collect(),
        }
    }

    /// Run a chat task on the pool
    pub async fn distribute(
        &self,
        requester: &str,
        model: &str,
        messages: Vec<ChatMessage>,
        mode: DispatchMode,
    ) -> Result<DistributionResult> {
        let task_id = self.tasks.create(requester, model, messages.clone());
        METRICS.tasks.distributed_total.inc();

        let eligible = self
            .registry
            .list_eligible(Some(model), 0, self.ignore_model_filter);
        METRICS.nodes.eligible.set(eligible.len() as i64);

        if eligible.is_empty() {
            self.tasks.finalize(&task_id);
            METRICS.tasks.no_capacity_total.inc();
            warn!("Task {} rejected: no eligible compute nodes for {}", task_id, model);
            return Err(ShareGridError::no_capacity(format!(
                "no eligible compute nodes for model {}",
                model
            )));
        }

        let selected = self.select(eligible, mode);
        let node_ids: Vec<String> = selected.iter().map(|n| n.id.clone()).collect();
        self.tasks.assign(&task_id, &node_ids);
        METRICS.tasks.fanout.observe(selected.len() as f64);

        info!(
            "Distributing task {} to {} node(s) in {} mode",
            task_id,
            selected.len(),
            mode
        );

        let messages = Arc::new(messages);
        let handles: Vec<(String, JoinHandle<Result<String>>)> = selected
            .into_iter()
            .map(|node| (node.id.clone(), self.spawn_call(node, model, &messages)))
            .collect();

        // Every call resolves independently; a failure never cancels its siblings
        let mut successes = Vec::new();
        let mut failures = Vec::new();
        for (node_id, handle) in handles {
            let result = handle
                .await
                .unwrap_or_else(|e| Err(ShareGridError::internal(format!("node task aborted: {}", e))));

            match result {
                Ok(text) => {
                    self.registry.record_outcome(&node_id, true);
                    self.tasks
                        .record_result(&task_id, &node_id, NodeOutcome::Success(text.clone()));
                    successes.push(text);
                }
                Err(e) => {
                    debug!("Task {}: node {} failed: {}", task_id, node_id, e);
                    self.registry.record_outcome(&node_id, false);
                    self.tasks
                        .record_result(&task_id, &node_id, NodeOutcome::Failure(e.to_string()));
                    failures.push(NodeFailure::new(node_id, e.to_string()));
                }
            }
        }

        let nodes_used = node_ids.len();
        let nodes_succeeded = successes.len();
        let status = self.tasks.finalize(&task_id).unwrap_or(TaskStatus::Failed);

        if successes.is_empty() {
            METRICS.tasks.failed_total.inc();
            error!("Task {} failed on all {} node(s)", task_id, nodes_used);
            return Err(ShareGridError::all_nodes_failed(task_id, failures));
        }

        let text = if nodes_used == 1 {
            // Single participant: its answer is returned untouched
            successes.swap_remove(0)
        } else {
            self.combine(successes)
        };

        METRICS.tasks.completed_total.inc();
        info!(
            "Task {} completed: {}/{} successful",
            task_id, nodes_succeeded, nodes_used
        );

        Ok(DistributionResult {
            task_id,
            text,
            status,
            nodes_used,
            nodes_succeeded,
        })
    }

    fn spawn_call(
        &self,
        node: ComputeNode,
        model: &str,
        messages: &Arc<Vec<ChatMessage>>,
    ) -> JoinHandle<Result<String>> {
        let executor = Arc::clone(&self.executor);
        let limiter = Arc::clone(&self.limiter);
        let messages = Arc::clone(messages);
        let model = model.to_string();

        tokio::spawn(async move {
            let _permit = limiter.acquire_owned().await.ok();
            executor.execute(&node, &model, &messages).await
        })
    }

    /// Merge several answers, skipping the merge when they collapse to one
    fn combine(&self, successes: Vec<String>) -> String {
        let mut unique: Vec<String> = Vec::with_capacity(successes.len());
        for text in successes {
            if !unique.contains(&text) {
                unique.push(text);
            }
        }

        if unique.len() == 1 {
            return unique.swap_remove(0);
        }
        self.aggregator.merge(&unique)
    }
}
