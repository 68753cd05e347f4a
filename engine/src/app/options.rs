//! Application configuration options

use std::time::Duration;

use crate::config::translate::TranslatorSettings;
use crate::deploy::deployer::DeployerOptions;
use crate::drift::comparator::DriftSettings;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::{ServerSettings, Settings};
use crate::workers::{drift_monitor, sweeper};

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub layout: StorageLayout,

    /// Enable the admin HTTP server
    pub enable_admin_server: bool,

    /// Enable the queue sweeper
    pub enable_queue_sweeper: bool,

    /// Enable the drift monitor
    pub enable_drift_monitor: bool,

    /// Admin server configuration
    pub server: ServerSettings,

    /// Retry policy, timeouts and queue timing
    pub deployer: DeployerOptions,

    pub translator: TranslatorSettings,

    pub drift: DriftSettings,

    /// Queue sweeper options
    pub sweeper: sweeper::Options,

    /// Drift monitor options
    pub drift_monitor: drift_monitor::Options,
}

impl AppOptions {
    /// Build options from a settings file and data directory
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            layout,
            enable_admin_server: settings.enable_admin_server,
            enable_queue_sweeper: settings.enable_queue_sweeper,
            enable_drift_monitor: settings.enable_drift_monitor && settings.drift.enabled,
            server: settings.server.clone(),
            deployer: DeployerOptions {
                policy: settings.retry_policy(),
                timeouts: settings.timeouts(),
                queue: settings.queue_options(),
            },
            translator: settings.translator.clone(),
            drift: settings.drift.clone(),
            sweeper: sweeper::Options {
                interval: Duration::from_secs(settings.queue.sweep_interval_secs.max(1)),
                ..Default::default()
            },
            drift_monitor: drift_monitor::Options {
                interval: Duration::from_secs(settings.drift.interval_secs.max(1)),
                ..Default::default()
            },
        }
    }
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default(), StorageLayout::default())
    }
}

/// Lifecycle options for the engine
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}
