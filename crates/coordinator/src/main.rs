//! ShareGrid Coordinator - Main Entry Point
//!
//! Registers the configured nodes, keeps their health up to date, evicts old
//! tasks and reports pool statistics until shut down.

use sharegrid_common::{ShareGridConfig, METRICS};
use sharegrid_coordinator::{ComputeNetwork, HealthMonitor, NodeClient, NodeRegistry};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config_path = std::env::var("SHAREGRID_CONFIG")
        .unwrap_or_else(|_| "configs/coordinator.yaml".to_string());
    let config = ShareGridConfig::load(config_path.as_str())?;
    let observability = config.observability();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "sharegrid_coordinator={level},sharegrid_common={level}",
                    level = observability.log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting ShareGrid Coordinator");
    info!(
        "Coordinator configuration loaded from {}: {} seed node(s), default mode {}, max {} concurrent calls",
        config_path,
        config.coordinator.seed_nodes.len(),
        config.coordinator.dispatch.default_mode,
        config.coordinator.max_concurrent_requests
    );

    let coordinator_config = config.coordinator.clone();
    let registry = Arc::new(NodeRegistry::new(
        coordinator_config.local_owner.clone(),
        coordinator_config.eligibility.clone(),
    ));
    let client = NodeClient::new(Arc::clone(&registry), coordinator_config.client.clone())?;

    let network = Arc::new(ComputeNetwork::from_parts(
        coordinator_config,
        Arc::clone(&registry),
        Arc::new(client.clone()),
    ));
    let registered = network.register_seed_nodes();
    info!("Registered {} seed node(s)", registered);

    // Start background tasks
    let monitor = Arc::new(HealthMonitor::new(
        Arc::clone(&registry),
        client,
        config.health_check_interval(),
    ));
    let health_handle = monitor.start();
    let cleanup_handle = Arc::clone(&network).start_task_cleanup();
    let stats_handle = start_stats_log(
        Arc::clone(&network),
        observability.stats_log_interval_secs,
        observability.enable_metrics,
    );

    info!("ShareGrid Coordinator running");

    // Wait for shutdown signal
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = health_handle => {
            result?;
        }
        result = cleanup_handle => {
            result?;
        }
    }

    stats_handle.abort();
    info!("ShareGrid Coordinator shutdown complete");
    Ok(())
}

/// Periodically log pool statistics
fn start_stats_log(
    network: Arc<ComputeNetwork>,
    interval_secs: u64,
    enable_metrics: bool,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if interval_secs == 0 {
            return;
        }

        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            let stats = network.network_stats();
            info!(
                "Pool: {}/{} nodes online, {} GPU(s), {:.1} GB GPU memory, {} CPU cores; tasks: {} active, {} completed, {} failed",
                stats.online_nodes,
                stats.total_nodes,
                stats.total_gpu,
                stats.total_gpu_memory_gb,
                stats.total_cpu_cores,
                stats.active_tasks,
                stats.completed_tasks,
                stats.failed_tasks
            );

            if enable_metrics {
                debug!("Metrics snapshot:\n{}", METRICS.gather());
            }
        }
    })
}
