//! Settings file management

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::translate::TranslatorSettings;
use crate::deploy::fsm::RetryPolicy;
use crate::deploy::queue::QueueOptions;
use crate::drift::comparator::DriftSettings;
use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::http::moderation::Timeouts;
use crate::logs::LogLevel;

/// Engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit JSON logs on stdout
    #[serde(default)]
    pub log_json: bool,

    /// Also write rolling log files under the data directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Admin HTTP server
    #[serde(default)]
    pub server: ServerSettings,

    #[serde(default)]
    pub deployer: DeployerSettings,

    #[serde(default)]
    pub health: HealthSettings,

    #[serde(default)]
    pub queue: QueueSettings,

    #[serde(default)]
    pub translator: TranslatorSettings,

    #[serde(default)]
    pub drift: DriftSettings,

    /// Enable the admin HTTP server
    #[serde(default = "default_true")]
    pub enable_admin_server: bool,

    /// Enable the periodic queue sweep
    #[serde(default = "default_true")]
    pub enable_queue_sweeper: bool,

    /// Enable scheduled drift checks (also requires `drift.enabled`)
    #[serde(default = "default_true")]
    pub enable_drift_monitor: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            server: ServerSettings::default(),
            deployer: DeployerSettings::default(),
            health: HealthSettings::default(),
            queue: QueueSettings::default(),
            translator: TranslatorSettings::default(),
            drift: DriftSettings::default(),
            enable_admin_server: true,
            enable_queue_sweeper: true,
            enable_drift_monitor: true,
        }
    }
}

impl Settings {
    /// Load settings, falling back to defaults when the file does not exist
    pub async fn load(file: &File) -> Result<Self, EngineError> {
        if !file.exists().await {
            return Ok(Self::default());
        }
        file.read_json().await
    }

    /// Per-request timeouts for remote calls
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            request_ms: self.deployer.request_timeout_secs.saturating_mul(1000),
            health_ms: self.health.timeout_ms,
            capability_ms: self.health.capability_timeout_ms,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let d = &self.deployer;
        RetryPolicy {
            max_attempts: d.max_attempts.max(1),
            base_delay: Duration::from_millis(d.base_delay_ms),
            max_delay: Duration::from_millis(d.max_delay_ms),
            deadline: (d.deadline_secs > 0).then(|| Duration::from_secs(d.deadline_secs)),
        }
    }

    pub fn queue_options(&self) -> QueueOptions {
        let q = &self.queue;
        QueueOptions {
            batch_size: q.batch_size.max(1),
            initial_delay: Duration::from_secs(q.initial_delay_secs),
            offline_retry: Duration::from_secs(q.offline_retry_secs),
            failure_retry: Duration::from_secs(q.failure_retry_secs),
            default_max_retries: q.default_max_retries.max(1),
            claim_lease: Duration::from_secs(q.claim_lease_secs.max(1)),
        }
    }
}

/// Admin server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8090
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Resilient deployer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployerSettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Bound on a whole deployment; 0 disables it
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,

    /// Config writes, restart and drift reads; held to 3..=5 seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    1_000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_deadline_secs() -> u64 {
    120
}

fn default_request_timeout_secs() -> u64 {
    5
}

impl Default for DeployerSettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            deadline_secs: default_deadline_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Health probe settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthSettings {
    #[serde(default = "default_health_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_capability_timeout_ms")]
    pub capability_timeout_ms: u64,
}

fn default_health_timeout_ms() -> u64 {
    5_000
}

fn default_capability_timeout_ms() -> u64 {
    3_000
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            timeout_ms: default_health_timeout_ms(),
            capability_timeout_ms: default_capability_timeout_ms(),
        }
    }
}

/// Deployment queue settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    #[serde(default = "default_initial_delay_secs")]
    pub initial_delay_secs: u64,

    #[serde(default = "default_offline_retry_secs")]
    pub offline_retry_secs: u64,

    #[serde(default = "default_failure_retry_secs")]
    pub failure_retry_secs: u64,

    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,

    /// How long a sweep holds a claimed entry
    #[serde(default = "default_claim_lease_secs")]
    pub claim_lease_secs: u64,
}

fn default_batch_size() -> usize {
    10
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_initial_delay_secs() -> u64 {
    300
}

fn default_offline_retry_secs() -> u64 {
    600
}

fn default_failure_retry_secs() -> u64 {
    900
}

fn default_max_retries() -> u32 {
    5
}

fn default_claim_lease_secs() -> u64 {
    600
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            sweep_interval_secs: default_sweep_interval_secs(),
            initial_delay_secs: default_initial_delay_secs(),
            offline_retry_secs: default_offline_retry_secs(),
            failure_retry_secs: default_failure_retry_secs(),
            default_max_retries: default_max_retries(),
            claim_lease_secs: default_claim_lease_secs(),
        }
    }
}
