//! Metrics collection for ShareGrid
//!
//! This module provides Prometheus metrics for the coordinator.

use lazy_static::lazy_static;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry};
use std::sync::Arc;

/// Metrics registry for ShareGrid
#[derive(Debug, Clone)]
pub struct MetricsRegistry {
    pub registry: Arc<Registry>,
    pub tasks: TaskMetrics,
    pub nodes: NodeMetrics,
}

/// Task-level metrics
#[derive(Debug, Clone)]
pub struct TaskMetrics {
    /// Tasks handed to the dispatcher
    pub distributed_total: IntCounter,

    /// Tasks that produced an answer
    pub completed_total: IntCounter,

    /// Tasks where every assigned node failed
    pub failed_total: IntCounter,

    /// Tasks rejected because no node was eligible
    pub no_capacity_total: IntCounter,

    /// Nodes participating per task
    pub fanout: Histogram,

    /// Tasks removed by retention
    pub evicted_total: IntCounter,

    /// Tasks currently processing
    pub active: IntGauge,
}

/// Node-level metrics
#[derive(Debug, Clone)]
pub struct NodeMetrics {
    /// Calls issued to node backends, retries included
    pub calls_total: IntCounter,

    /// Failed calls by kind (timeout, connection, protocol)
    pub failures_total: IntCounterVec,

    /// Retries after transient failures
    pub retries_total: IntCounter,

    /// Node response time
    pub response_time: Histogram,

    /// Registered nodes
    pub registered: IntGauge,

    /// Nodes in `Online` status
    pub online: IntGauge,

    /// Nodes found eligible at the last dispatch
    pub eligible: IntGauge,
}

lazy_static! {
    /// Global metrics registry instance
    pub static ref METRICS: MetricsRegistry = MetricsRegistry::new();
}

impl MetricsRegistry {
    /// Create a new metrics registry
    pub fn new() -> Self {
        let registry = Arc::new(Registry::new());

        let distributed_total = IntCounter::new(
            "sharegrid_tasks_distributed_total",
            "Total number of tasks handed to the dispatcher",
        )
        .expect("valid metric");

        let completed_total = IntCounter::new(
            "sharegrid_tasks_completed_total",
            "Total number of tasks completed by at least one node",
        )
        .expect("valid metric");

        let failed_total = IntCounter::new(
            "sharegrid_tasks_failed_total",
            "Total number of tasks where every node failed",
        )
        .expect("valid metric");

        let no_capacity_total = IntCounter::new(
            "sharegrid_tasks_no_capacity_total",
            "Total tasks rejected because no node was eligible",
        )
        .expect("valid metric");

        let fanout = Histogram::with_opts(
            HistogramOpts::new("sharegrid_task_fanout", "Nodes participating per task")
                .buckets(vec![1.0, 2.0, 4.0, 8.0, 16.0, 32.0, 64.0]),
        )
        .expect("valid metric");

        let evicted_total = IntCounter::new(
            "sharegrid_tasks_evicted_total",
            "Total number of tasks removed by retention",
        )
        .expect("valid metric");

        let active = IntGauge::new(
            "sharegrid_tasks_active",
            "Current number of processing tasks",
        )
        .expect("valid metric");

        let calls_total = IntCounter::new(
            "sharegrid_node_calls_total",
            "Total number of calls issued to node backends",
        )
        .expect("valid metric");

        let failures_total = IntCounterVec::new(
            Opts::new(
                "sharegrid_node_failures_total",
                "Total number of failed node calls",
            ),
            &["kind"],
        )
        .expect("valid metric");

        let retries_total = IntCounter::new(
            "sharegrid_node_retries_total",
            "Total number of retries after transient failures",
        )
        .expect("valid metric");

        let response_time = Histogram::with_opts(
            HistogramOpts::new(
                "sharegrid_node_response_time_seconds",
                "Node backend response time in seconds",
            )
            .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0]),
        )
        .expect("valid metric");

        let registered = IntGauge::new(
            "sharegrid_nodes_registered",
            "Current number of registered nodes",
        )
        .expect("valid metric");

        let online = IntGauge::new("sharegrid_nodes_online", "Current number of online nodes")
            .expect("valid metric");

        let eligible = IntGauge::new(
            "sharegrid_nodes_eligible",
            "Nodes found eligible at the last dispatch",
        )
        .expect("valid metric");

        // Register all metrics
        registry.register(Box::new(distributed_total.clone())).expect("unique metric");
        registry.register(Box::new(completed_total.clone())).expect("unique metric");
        registry.register(Box::new(failed_total.clone())).expect("unique metric");
        registry.register(Box::new(no_capacity_total.clone())).expect("unique metric");
        registry.register(Box::new(fanout.clone())).expect("unique metric");
        registry.register(Box::new(evicted_total.clone())).expect("unique metric");
        registry.register(Box::new(active.clone())).expect("unique metric");

        registry.register(Box::new(calls_total.clone())).expect("unique metric");
        registry.register(Box::new(failures_total.clone())).expect("unique metric");
        registry.register(Box::new(retries_total.clone())).expect("unique metric");
        registry.register(Box::new(response_time.clone())).expect("unique metric");
        registry.register(Box::new(registered.clone())).expect("unique metric");
        registry.register(Box::new(online.clone())).expect("unique metric");
        registry.register(Box::new(eligible.clone())).expect("unique metric");

        let tasks = TaskMetrics {
            distributed_total,
            completed_total,
            failed_total,
            no_capacity_total,
            fanout,
            evicted_total,
            active,
        };

        let nodes = NodeMetrics {
            calls_total,
            failures_total,
            retries_total,
            response_time,
            registered,
            online,
            eligible,
        };

        MetricsRegistry {
            registry,
            tasks,
            nodes,
        }
    }

    /// Gather all metrics as text
    pub fn gather(&self) -> String {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        if encoder.encode(&metric_families, &mut buffer).is_err() {
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}
