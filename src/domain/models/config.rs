use serde::{Deserialize, Serialize};

use super::analysis::ConfidenceThresholds;

/// Main configuration structure for the analysis controller
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Reconciliation scheduler configuration
    #[serde(default)]
    pub controller: ControllerConfig,

    /// Investigation service configuration
    #[serde(default)]
    pub investigation: InvestigationConfig,

    /// Confidence routing configuration
    #[serde(default)]
    pub analysis: AnalysisConfig,

    /// Approval policy configuration
    #[serde(default)]
    pub policy: PolicyConfig,

    /// Audit trail configuration
    #[serde(default)]
    pub audit: AuditConfig,

    /// Database configuration
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Reconciliation scheduler configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Upper bound for a single reconcile call
    #[serde(default = "default_reconcile_timeout_secs")]
    pub reconcile_timeout_secs: u64,

    /// Interval between full resyncs of non-terminal analyses
    #[serde(default = "default_resync_interval_secs")]
    pub resync_interval_secs: u64,

    /// Time allowed for in-flight work and audit flush on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Backoff applied when a reconcile returns an error
    #[serde(default = "default_requeue")]
    pub requeue: RetryConfig,
}

const fn default_workers() -> usize {
    4
}

const fn default_reconcile_timeout_secs() -> u64 {
    60
}

const fn default_resync_interval_secs() -> u64 {
    30
}

const fn default_shutdown_timeout_secs() -> u64 {
    15
}

const fn default_requeue() -> RetryConfig {
    RetryConfig {
        max_retries: 10,
        initial_backoff_ms: 500,
        max_backoff_ms: 60_000,
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            reconcile_timeout_secs: default_reconcile_timeout_secs(),
            resync_interval_secs: default_resync_interval_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            requeue: default_requeue(),
        }
    }
}

/// Investigation service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct InvestigationConfig {
    /// Base URL of the investigation API
    #[serde(default = "default_investigation_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_investigation_timeout_secs")]
    pub timeout_secs: u64,

    /// Delay between polls of an open session
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Maximum session regenerations before the analysis fails
    #[serde(default = "default_max_session_regenerations")]
    pub max_session_regenerations: u32,

    /// In-call retry policy for transient errors
    #[serde(default)]
    pub retry: RetryConfig,
}

fn default_investigation_url() -> String {
    "http://localhost:8080".to_string()
}

const fn default_investigation_timeout_secs() -> u64 {
    30
}

const fn default_poll_interval_ms() -> u64 {
    2_000
}

const fn default_max_session_regenerations() -> u32 {
    5
}

impl Default for InvestigationConfig {
    fn default() -> Self {
        Self {
            base_url: default_investigation_url(),
            timeout_secs: default_investigation_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            max_session_regenerations: default_max_session_regenerations(),
            retry: RetryConfig::default(),
        }
    }
}

/// Confidence routing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AnalysisConfig {
    /// Selected workflows below this confidence fail the analysis
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Display classification boundaries (low / medium / high)
    #[serde(default)]
    pub confidence_levels: ConfidenceThresholds,
}

const fn default_min_confidence() -> f64 {
    0.7
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_confidence: default_min_confidence(),
            confidence_levels: ConfidenceThresholds::default(),
        }
    }
}

/// Approval policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PolicyConfig {
    /// Path to the YAML approval policy
    #[serde(default = "default_policy_path")]
    pub path: String,

    /// How often the policy file is checked for changes (0 disables)
    #[serde(default = "default_reload_interval_secs")]
    pub reload_interval_secs: u64,

    /// Production auto-approval floor; the policy file may override it
    #[serde(default = "default_production_auto_approve_confidence")]
    pub production_auto_approve_confidence: f64,
}

fn default_policy_path() -> String {
    ".aianalysis/approval-policy.yaml".to_string()
}

const fn default_reload_interval_secs() -> u64 {
    10
}

const fn default_production_auto_approve_confidence() -> f64 {
    0.8
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            path: default_policy_path(),
            reload_interval_secs: default_reload_interval_secs(),
            production_auto_approve_confidence: default_production_auto_approve_confidence(),
        }
    }
}

/// Audit trail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AuditConfig {
    /// Data storage service URL; the local database is used when unset
    #[serde(default)]
    pub data_storage_url: Option<String>,

    /// Capacity of the in-memory event buffer
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Maximum events per store write
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Background flush interval in milliseconds
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,

    /// Timeout for a single store write in seconds
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
}

const fn default_buffer_size() -> usize {
    10_000
}

const fn default_batch_size() -> usize {
    100
}

const fn default_flush_interval_ms() -> u64 {
    1_000
}

const fn default_write_timeout_secs() -> u64 {
    10
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            data_storage_url: None,
            buffer_size: default_buffer_size(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            write_timeout_secs: default_write_timeout_secs(),
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct DatabaseConfig {
    /// Path to `SQLite` database file
    #[serde(default = "default_database_path")]
    pub path: String,

    /// Maximum number of database connections in pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_database_path() -> String {
    ".aianalysis/aianalysis.db".to_string()
}

const fn default_max_connections() -> u32 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
            max_connections: default_max_connections(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files (stdout only when unset)
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation for file output: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    500
}

const fn default_max_backoff_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}
