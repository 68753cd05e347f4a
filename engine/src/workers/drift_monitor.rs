//! Scheduled drift checks

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::models::drift::Severity;
use crate::sync::reconciler::Reconciler;

/// Drift monitor options
#[derive(Debug, Clone)]
pub struct Options {
    /// Interval between full checks
    pub interval: Duration,

    /// Initial delay before the first check
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(900),
            initial_delay: Duration::from_secs(30),
        }
    }
}

/// Run the drift monitor until the shutdown signal resolves
pub async fn run<S, F>(
    options: &Options,
    reconciler: &Reconciler,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Drift monitor starting...");

    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Drift monitor shutting down...");
            return;
        }
        _ = sleep_fn(options.initial_delay) => {}
    }

    loop {
        debug!("Checking all sites for drift...");
        match reconciler.check_all().await {
            Ok(entries) => {
                for entry in entries.iter().filter(|e| e.severity >= Severity::High) {
                    warn!(
                        "Site {} on server {}: {} drift, {} difference(s)",
                        entry.site_id,
                        entry.server_id,
                        entry.severity.as_str(),
                        entry.differences.len()
                    );
                }
            }
            Err(e) => error!("Drift check failed: {}", e),
        }

        let state = reconciler.state().await;
        debug!(
            "Drift totals: {} site check(s), {} drifted, error streak {}",
            state.sites_checked, state.drifted, state.err_streak
        );

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Drift monitor shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}
