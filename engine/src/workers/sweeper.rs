//! Queue sweeper worker

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info};

use crate::deploy::queue::DeploymentQueue;

/// Sweeper worker options
#[derive(Debug, Clone)]
pub struct Options {
    /// Sweep interval
    pub interval: Duration,

    /// Initial delay before the first sweep
    pub initial_delay: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            initial_delay: Duration::from_secs(5),
        }
    }
}

/// Run the queue sweeper until the shutdown signal resolves
pub async fn run<S, F>(
    options: &Options,
    queue: &DeploymentQueue,
    sleep_fn: S,
    mut shutdown_signal: Pin<Box<dyn Future<Output = ()> + Send>>,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Queue sweeper starting...");

    tokio::select! {
        _ = &mut shutdown_signal => {
            info!("Queue sweeper shutting down...");
            return;
        }
        _ = sleep_fn(options.initial_delay) => {}
    }

    loop {
        debug!("Sweeping deployment queue...");
        if let Err(e) = queue.sweep(Utc::now()).await {
            error!("Queue sweep failed: {}", e);
        }

        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Queue sweeper shutting down...");
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }
    }
}
