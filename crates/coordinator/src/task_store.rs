//! Task store
//!
//! Records the lifecycle of every distributed task and evicts finished tasks
//! once they are old enough.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use sharegrid_common::METRICS;
use sharegrid_proto::ChatMessage;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Task identifier
pub type TaskId = String;

/// Lifecycle state of a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// Result of one node's part in a task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "lowercase")]
pub enum NodeOutcome {
    Success(String),
    Failure(String),
}

impl NodeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Success(_))
    }
}

/// One end-to-end inference request and its distribution outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub requester: String,
    pub requested_model: String,
    pub messages: Vec<ChatMessage>,
    pub assigned_node_ids: Vec<String>,
    pub per_node_result: HashMap<String, NodeOutcome>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Task {
    fn new(requester: String, requested_model: String, messages: Vec<ChatMessage>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            requester,
            requested_model,
            messages,
            assigned_node_ids: Vec::new(),
            per_node_result: HashMap::new(),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Number of assigned nodes that succeeded
    pub fn successes(&self) -> usize {
        self.per_node_result
            .values()
            .filter(|o| o.is_success())
            .count()
    }

    fn is_finished(&self) -> bool {
        matches!(self.status, TaskStatus::Completed | TaskStatus::Failed)
    }
}

/// In-memory map of tasks
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<TaskId, Task>>,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a task and move it straight to `Processing`
    pub fn create(
        &self,
        requester: impl Into<String>,
        model: impl Into<String>,
        messages: Vec<ChatMessage>,
    ) -> TaskId {
        let mut task = Task::new(requester.into(), model.into(), messages);
        task.status = TaskStatus::Processing;
        let id = task.id.clone();

        debug!("Task {} created for model {}", id, task.requested_model);
        self.tasks.write().insert(id.clone(), task);
        METRICS.tasks.active.inc();
        id
    }

    /// Record which nodes take part in a task
    pub fn assign(&self, task_id: &str, node_ids: &[String]) {
        if let Some(task) = self.tasks.write().get_mut(task_id) {
            task.assigned_node_ids.extend(node_ids.iter().cloned());
        }
    }

    /// Record one node's result
    pub fn record_result(&self, task_id: &str, node_id: &str, outcome: NodeOutcome) {
        if let Some(task) = self.tasks.write().get_mut(task_id) {
            task.per_node_result.insert(node_id.to_string(), outcome);
        }
    }

    /// Close a task, deriving its status from the recorded results
    ///
    /// `Completed` iff at least one node succeeded; a task with no assigned
    /// nodes is `Failed`. Finalizing twice keeps the first outcome.
    pub fn finalize(&self, task_id: &str) -> Option<TaskStatus> {
        let mut tasks = self.tasks.write();
        let task = tasks.get_mut(task_id)?;
        if task.is_finished() {
            return Some(task.status);
        }

        task.status = if task.successes() > 0 {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        task.completed_at = Some(Utc::now());
        METRICS.tasks.active.dec();

        debug!(
            "Task {} finalized as {:?}: {}/{} nodes succeeded",
            task_id,
            task.status,
            task.successes(),
            task.assigned_node_ids.len()
        );
        Some(task.status)
    }

    /// Get a copy of a task
    pub fn get(&self, task_id: &str) -> Option<Task> {
        self.tasks.read().get(task_id).cloned()
    }

    /// Number of tasks in a given status
    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.tasks
            .read()
            .values()
            .filter(|t| t.status == status)
            .count()
    }

    pub fn len(&self) -> usize {
        self.tasks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove finished tasks completed more than `max_age` ago
    pub fn evict_older_than(&self, max_age: Duration) -> usize {
        self.evict_older_than_at(Utc::now(), max_age)
    }

    /// Remove finished tasks completed before `now - max_age`
    ///
    /// Tasks that are still processing are kept regardless of age.
    pub fn evict_older_than_at(&self, now: DateTime<Utc>, max_age: Duration) -> usize {
        // Nothing can have completed before the earliest representable time
        let Some(cutoff) = now.checked_sub_signed(max_age) else {
            return 0;
        };
        let mut tasks = self.tasks.write();
        let before = tasks.len();

        tasks.retain(|_, task| {
            if task.status == TaskStatus::Processing {
                return true;
            }
            match task.completed_at {
                Some(completed_at) => completed_at >= cutoff,
                None => true,
            }
        });

        let removed = before - tasks.len();
        if removed > 0 {
            METRICS.tasks.evicted_total.inc_by(removed as u64);
        }
        info!("Cleaned up {} old tasks, {} remaining", removed, tasks.len());
        removed
    }

    /// Test-only: move a task's completion time
    #[cfg(test)]
    pub(crate) fn set_completed_at(&self, task_id: &str, completed_at: DateTime<Utc>) {
        if let Some(task) = self.tasks.write().get_mut(task_id) {
            task.completed_at = Some(completed_at);
        }
    }
}
