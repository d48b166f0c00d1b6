//! Common error types for ShareGrid
//!
//! This module defines all error types used across the ShareGrid coordinator.
//! Node-level errors are folded into task outcomes by the dispatcher; only
//! `NoCapacity` and `AllNodesFailed` are ever returned from a distribution.

use std::fmt;
use thiserror::Error;

/// Failure of a single node within a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFailure {
    pub node_id: String,
    pub error: String,
}

impl NodeFailure {
    pub fn new(node_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            node_id: node_id.into(),
            error: error.into(),
        }
    }
}

impl fmt::Display for NodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.node_id, self.error)
    }
}

/// Per-node failures joined for display
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeFailures(pub Vec<NodeFailure>);

impl fmt::Display for NodeFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (status {})", s)).unwrap_or_default()
}

/// Main error type for ShareGrid
#[derive(Error, Debug)]
pub enum ShareGridError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// No node is eligible for the request
    #[error("No capacity: {0}")]
    NoCapacity(String),

    /// A node call exceeded its connect or total timeout
    #[error("Node {node_id} timed out: {message}")]
    NodeTimeout { node_id: String, message: String },

    /// A node could not be reached
    #[error("Node {node_id} connection error: {message}")]
    NodeConnection { node_id: String, message: String },

    /// A node answered, but not with a usable response
    #[error("Node {node_id} protocol error{}: {message}", status_suffix(.status))]
    NodeProtocol {
        node_id: String,
        status: Option<u16>,
        message: String,
    },

    /// Every node assigned to a task failed
    #[error("All nodes failed for task {task_id}: {failures}")]
    AllNodesFailed {
        task_id: String,
        failures: NodeFailures,
    },

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_yaml::Error> for ShareGridError {
    fn from(err: serde_yaml::Error) -> Self {
        ShareGridError::Config(err.to_string())
    }
}

impl From<config::ConfigError> for ShareGridError {
    fn from(err: config::ConfigError) -> Self {
        ShareGridError::Config(err.to_string())
    }
}

impl ShareGridError {
    /// Whether the failure is presumed recoverable (timeout or connection)
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ShareGridError::NodeTimeout { .. } | ShareGridError::NodeConnection { .. }
        )
    }

    /// Short label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ShareGridError::Config(_) => "config",
            ShareGridError::Serialization(_) => "serialization",
            ShareGridError::Io(_) => "io",
            ShareGridError::NoCapacity(_) => "no_capacity",
            ShareGridError::NodeTimeout { .. } => "timeout",
            ShareGridError::NodeConnection { .. } => "connection",
            ShareGridError::NodeProtocol { .. } => "protocol",
            ShareGridError::AllNodesFailed { .. } => "all_nodes_failed",
            ShareGridError::Internal(_) => "internal",
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        ShareGridError::Config(msg.into())
    }

    /// Create a no-capacity error
    pub fn no_capacity(msg: impl Into<String>) -> Self {
        ShareGridError::NoCapacity(msg.into())
    }

    /// Create a node timeout error
    pub fn node_timeout(node_id: impl Into<String>, msg: impl Into<String>) -> Self {
        ShareGridError::NodeTimeout {
            node_id: node_id.into(),
            message: msg.into(),
        }
    }

    /// Create a node connection error
    pub fn node_connection(node_id: impl Into<String>, msg: impl Into<String>) -> Self {
        ShareGridError::NodeConnection {
            node_id: node_id.into(),
            message: msg.into(),
        }
    }

    /// Create a node protocol error
    pub fn node_protocol(
        node_id: impl Into<String>,
        status: Option<u16>,
        msg: impl Into<String>,
    ) -> Self {
        ShareGridError::NodeProtocol {
            node_id: node_id.into(),
            status,
            message: msg.into(),
        }
    }

    /// Create an all-nodes-failed error
    pub fn all_nodes_failed(task_id: impl Into<String>, failures: Vec<NodeFailure>) -> Self {
        ShareGridError::AllNodesFailed {
            task_id: task_id.into(),
            failures: NodeFailures(failures),
        }
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        ShareGridError::Internal(msg.into())
    }
}

/// Result type alias for ShareGrid operations
pub type Result<T> = std::result::Result<T, ShareGridError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ShareGridError::node_timeout("n1", "deadline").is_transient());
        assert!(ShareGridError::node_connection("n1", "refused").is_transient());
        assert!(!ShareGridError::node_protocol("n1", Some(500), "boom").is_transient());
        assert!(!ShareGridError::no_capacity("llama3").is_transient());
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ShareGridError::node_protocol("n1", Some(503), "overloaded");
        assert_eq!(err.to_string(), "Node n1 protocol error (status 503): overloaded");

        let err = ShareGridError::node_protocol("n1", None, "bad json");
        assert_eq!(err.to_string(), "Node n1 protocol error: bad json");
    }

    #[test]
    fn test_all_nodes_failed_lists_every_node() {
        let err = ShareGridError::all_nodes_failed(
            "task-1",
            vec![
                NodeFailure::new("a", "timed out"),
                NodeFailure::new("b", "status 500"),
            ],
        );

        assert_eq!(
            err.to_string(),
            "All nodes failed for task task-1: a: timed out; b: status 500"
        );
        assert_eq!(err.kind(), "all_nodes_failed");
    }
}
