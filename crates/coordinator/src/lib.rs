//! ShareGrid Coordinator
//!
//! Pools inference backends contributed by independent machines: tracks node
//! health, routes chat tasks to one or many nodes, tolerates partial failure and
//! merges the answers.

pub mod aggregator;
pub mod dispatcher;
pub mod health;
pub mod network;
pub mod node_client;
pub mod registry;
pub mod task_store;

pub use aggregator::ResponseAggregator;
pub use dispatcher::{Dispatcher, DistributionResult};
pub use health::{HealthMonitor, HealthSummary};
pub use network::{ComputeNetwork, NetworkStats};
pub use node_client::{NodeClient, NodeExecutor, ProbeReport};
pub use registry::{ComputeNode, NodeCapabilities, NodeRegistration, NodeRegistry, NodeStatus};
pub use task_store::{NodeOutcome, Task, TaskId, TaskStatus, TaskStore};
