//! Configuration structures for ShareGrid
//!
//! This module defines all configuration types used by the coordinator.
//! Configurations are loaded from YAML files and can be overridden by environment
//! variables (`SHAREGRID__COORDINATOR__MAX_CONCURRENT_REQUESTS=64`).

use crate::error::{Result, ShareGridError};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for ShareGrid
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShareGridConfig {
    /// Coordinator configuration
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    /// Observability configuration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observability: Option<ObservabilityConfig>,
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Owner value reserved for the coordinator's own machine
    #[serde(default = "default_local_owner")]
    pub local_owner: String,

    /// Nodes registered at start-up
    #[serde(default)]
    pub seed_nodes: Vec<SeedNodeConfig>,

    /// Maximum node calls in flight across all tasks
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Health probe interval in seconds
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_secs: u64,

    /// Dispatch policy
    #[serde(default)]
    pub dispatch: DispatchConfig,

    /// Node eligibility windows
    #[serde(default)]
    pub eligibility: EligibilityConfig,

    /// Node HTTP client settings
    #[serde(default)]
    pub client: NodeClientConfig,

    /// Task retention
    #[serde(default)]
    pub tasks: TaskRetentionConfig,
}

/// A node registered from configuration rather than by the node itself
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedNodeConfig {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub endpoint: String,
    #[serde(default)]
    pub credential: Option<String>,
    #[serde(default)]
    pub gpu_count: u32,
    #[serde(default)]
    pub gpu_memory_mb: u64,
    #[serde(default)]
    pub cpu_cores: u32,
}

/// Dispatch mode
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Every eligible node answers the same task
    Broadcast,

    /// One node per task, chosen round-robin
    LoadBalanced,

    /// Only the first eligible node
    BestSingle,
}

impl Default for DispatchMode {
    fn default() -> Self {
        DispatchMode::Broadcast
    }
}

impl std::fmt::Display for DispatchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DispatchMode::Broadcast => f.write_str("broadcast"),
            DispatchMode::LoadBalanced => f.write_str("load_balanced"),
            DispatchMode::BestSingle => f.write_str("best_single"),
        }
    }
}

/// Dispatch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Mode used when the caller does not pick one
    #[serde(default)]
    pub default_mode: DispatchMode,

    /// Treat every eligible node as able to serve any model
    #[serde(default = "default_ignore_model_filter")]
    pub ignore_model_filter: bool,

    /// Unique words an alternate answer must add to be kept when merging
    #[serde(default = "default_merge_min_new_words")]
    pub merge_min_new_words: usize,
}

/// Eligibility windows for non-trusted nodes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EligibilityConfig {
    /// Maximum heartbeat age of an `Online` node, in seconds
    #[serde(default = "default_online_max_age")]
    pub online_max_age_secs: u64,

    /// Grace window for `Busy` nodes, in seconds
    #[serde(default = "default_busy_grace")]
    pub busy_grace_secs: u64,

    /// Grace window for `Offline` nodes, in seconds
    #[serde(default = "default_offline_grace")]
    pub offline_grace_secs: u64,

    /// Self-reported load at or above which an `Online` node is skipped
    #[serde(default = "default_max_load")]
    pub max_load: f64,
}

/// HTTP client configuration for node backends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeClientConfig {
    /// Connection establishment timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Total call timeout in milliseconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,

    /// Retries after a transient failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed wait between retries in milliseconds
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Idle keep-alive connections kept per node
    #[serde(default = "default_pool_max_idle")]
    pub pool_max_idle_per_host: usize,

    /// Timeout of a health probe in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
}

/// Task retention configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRetentionConfig {
    /// Age after completion at which a task is evicted, in hours
    #[serde(default = "default_task_max_age")]
    pub max_age_hours: u64,

    /// Eviction interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable Prometheus metrics
    #[serde(default = "default_metrics")]
    pub enable_metrics: bool,

    /// Interval of the network stats log line, in seconds (0 = disabled)
    #[serde(default = "default_stats_log_interval")]
    pub stats_log_interval_secs: u64,
}

/// Default value functions
fn default_local_owner() -> String {
    "local".to_string()
}

fn default_max_concurrent_requests() -> usize {
    32
}

fn default_health_check_interval() -> u64 {
    30
}

fn default_ignore_model_filter() -> bool {
    true
}

fn default_merge_min_new_words() -> usize {
    10
}

fn default_online_max_age() -> u64 {
    600
}

fn default_busy_grace() -> u64 {
    900
}

fn default_offline_grace() -> u64 {
    900
}

fn default_max_load() -> f64 {
    0.9
}

fn default_connect_timeout() -> u64 {
    30_000
}

fn default_request_timeout() -> u64 {
    300_000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_backoff() -> u64 {
    2_000
}

fn default_pool_max_idle() -> usize {
    8
}

fn default_probe_timeout() -> u64 {
    5_000
}

fn default_task_max_age() -> u64 {
    24
}

fn default_cleanup_interval() -> u64 {
    3_600
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics() -> bool {
    true
}

fn default_stats_log_interval() -> u64 {
    60
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            local_owner: default_local_owner(),
            seed_nodes: Vec::new(),
            max_concurrent_requests: default_max_concurrent_requests(),
            health_check_interval_secs: default_health_check_interval(),
            dispatch: DispatchConfig::default(),
            eligibility: EligibilityConfig::default(),
            client: NodeClientConfig::default(),
            tasks: TaskRetentionConfig::default(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_mode: DispatchMode::default(),
            ignore_model_filter: default_ignore_model_filter(),
            merge_min_new_words: default_merge_min_new_words(),
        }
    }
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            online_max_age_secs: default_online_max_age(),
            busy_grace_secs: default_busy_grace(),
            offline_grace_secs: default_offline_grace(),
            max_load: default_max_load(),
        }
    }
}

impl Default for NodeClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            request_timeout_ms: default_request_timeout(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff(),
            pool_max_idle_per_host: default_pool_max_idle(),
            probe_timeout_ms: default_probe_timeout(),
        }
    }
}

impl Default for TaskRetentionConfig {
    fn default() -> Self {
        Self {
            max_age_hours: default_task_max_age(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            enable_metrics: default_metrics(),
            stats_log_interval_secs: default_stats_log_interval(),
        }
    }
}

impl NodeClientConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl TaskRetentionConfig {
    /// Task eviction interval as Duration
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs)
    }
}

impl ShareGridConfig {
    /// Load configuration from a YAML file
    pub fn from_file<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path).map_err(|e| {
            ShareGridError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let config: ShareGridConfig = serde_yaml::from_str(&content).map_err(|e| {
            ShareGridError::Config(format!(
                "Failed to parse config file {}: {}",
                path.display(),
                e
            ))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an optional YAML file layered with `SHAREGRID__*` variables
    pub fn load<P: Into<PathBuf>>(path: P) -> Result<Self> {
        let path = path.into();
        let config: ShareGridConfig = config::Config::builder()
            .add_source(
                config::File::from(path.as_path())
                    .format(config::FileFormat::Yaml)
                    .required(false),
            )
            .add_source(
                config::Environment::with_prefix("SHAREGRID")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        let coordinator = &self.coordinator;

        if coordinator.local_owner.is_empty() {
            return Err(ShareGridError::config("local_owner must not be empty"));
        }

        if coordinator.max_concurrent_requests == 0 {
            return Err(ShareGridError::config(
                "max_concurrent_requests must be at least 1",
            ));
        }

        if coordinator.health_check_interval_secs == 0 {
            return Err(ShareGridError::config(
                "health_check_interval_secs must be at least 1",
            ));
        }

        if coordinator.tasks.cleanup_interval_secs == 0 {
            return Err(ShareGridError::config(
                "cleanup_interval_secs must be at least 1",
            ));
        }

        let load = coordinator.eligibility.max_load;
        if !(0.0..=1.0).contains(&load) {
            return Err(ShareGridError::config(format!(
                "max_load must be within 0.0..=1.0, got {}",
                load
            )));
        }

        let client = &coordinator.client;
        if client.connect_timeout_ms == 0 || client.request_timeout_ms == 0 {
            return Err(ShareGridError::config("client timeouts must be non-zero"));
        }

        if client.connect_timeout_ms > client.request_timeout_ms {
            return Err(ShareGridError::config(
                "connect_timeout_ms must not exceed request_timeout_ms",
            ));
        }

        for node in &coordinator.seed_nodes {
            if node.id.is_empty() {
                return Err(ShareGridError::config("seed node id must not be empty"));
            }
            if !node.endpoint.starts_with("http://") && !node.endpoint.starts_with("https://") {
                return Err(ShareGridError::config(format!(
                    "seed node {} has invalid endpoint {}",
                    node.id, node.endpoint
                )));
            }
        }

        Ok(())
    }

    /// Observability settings, falling back to defaults
    pub fn observability(&self) -> ObservabilityConfig {
        self.observability.clone().unwrap_or_default()
    }

    /// Health probe interval as Duration
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.coordinator.health_check_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_cleanup_interval_duration() {
        let tasks = TaskRetentionConfig {
            max_age_hours: 1,
            cleanup_interval_secs: 90,
        };
        assert_eq!(tasks.cleanup_interval(), Duration::from_secs(90));
        assert_eq!(
            TaskRetentionConfig::default().cleanup_interval(),
            Duration::from_secs(3_600)
        );
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: ShareGridConfig = serde_yaml::from_str("coordinator: {}").unwrap();

        assert!(config.validate().is_ok());
        assert_eq!(config.coordinator.local_owner, "local");
        assert_eq!(config.coordinator.dispatch.default_mode, DispatchMode::Broadcast);
        assert!(config.coordinator.dispatch.ignore_model_filter);
        assert_eq!(config.coordinator.eligibility.online_max_age_secs, 600);
        assert_eq!(config.coordinator.eligibility.busy_grace_secs, 900);
        assert_eq!(config.coordinator.client.max_retries, 2);
        assert_eq!(
            config.coordinator.client.request_timeout(),
            Duration::from_secs(300)
        );
        assert_eq!(config.coordinator.tasks.max_age_hours, 24);
    }

    #[test]
    fn test_config_from_file() {
        let yaml = r#"
coordinator:
  local_owner: "system"
  max_concurrent_requests: 16
  dispatch:
    default_mode: load_balanced
  client:
    max_retries: 1
    retry_backoff_ms: 50
  seed_nodes:
    - id: "desk-1"
      owner: "alice"
      name: "Desk"
      endpoint: "http://10.0.0.5:11434"
      gpu_count: 1
      gpu_memory_mb: 8192
      cpu_cores: 12
observability:
  log_level: debug
"#;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();

        let config = ShareGridConfig::from_file(file.path()).unwrap();

        assert_eq!(config.coordinator.local_owner, "system");
        assert_eq!(config.coordinator.max_concurrent_requests, 16);
        assert_eq!(
            config.coordinator.dispatch.default_mode,
            DispatchMode::LoadBalanced
        );
        assert_eq!(config.coordinator.client.max_retries, 1);
        assert_eq!(config.coordinator.seed_nodes.len(), 1);
        assert_eq!(config.coordinator.seed_nodes[0].gpu_memory_mb, 8192);
        assert!(config.coordinator.seed_nodes[0].credential.is_none());
        assert_eq!(config.observability().log_level, "debug");
    }

    #[test]
    fn test_config_validation_rejects_bad_load() {
        let mut config = ShareGridConfig::default();
        config.coordinator.eligibility.max_load = 1.5;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_bad_endpoint() {
        let mut config = ShareGridConfig::default();
        config.coordinator.seed_nodes.push(SeedNodeConfig {
            id: "n1".to_string(),
            owner: "bob".to_string(),
            name: "n1".to_string(),
            endpoint: "10.0.0.5:11434".to_string(),
            credential: None,
            gpu_count: 0,
            gpu_memory_mb: 0,
            cpu_cores: 4,
        });

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_rejects_zero_concurrency() {
        let mut config = ShareGridConfig::default();
        config.coordinator.max_concurrent_requests = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = ShareGridConfig::from_file("/nonexistent/sharegrid.yaml");
        assert!(matches!(result, Err(ShareGridError::Config(_))));
    }
}
