//! Deployment queue sweep

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::deploy::deployer::{chrono_duration, DeployTarget, ResilientDeployer};
use crate::errors::EngineError;
use crate::models::queue::{QueueEntry, QueueStatus};
use crate::models::site::SiteDeploymentStatus;

/// Queue timing and bounds
#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// Entries examined per sweep
    pub batch_size: usize,
    /// Delay before a freshly queued entry is first swept
    pub initial_delay: Duration,
    /// Reschedule delay when the target is still offline
    pub offline_retry: Duration,
    /// Reschedule delay after a failed deployment
    pub failure_retry: Duration,
    pub default_max_retries: u32,
    /// How long a claim holds an entry before another sweep may take it
    pub claim_lease: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            initial_delay: Duration::from_secs(300),
            offline_retry: Duration::from_secs(600),
            failure_retry: Duration::from_secs(900),
            default_max_retries: 5,
            claim_lease: Duration::from_secs(600),
        }
    }
}

/// Counts from one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    pub examined: usize,
    pub claimed: usize,
    pub completed: usize,
    pub rescheduled: usize,
    pub failed: usize,
    /// Entries skipped or released after a local storage error
    #[serde(default)]
    pub errored: usize,
}

/// Processes due queue entries through the deployer's single-attempt path
pub struct DeploymentQueue {
    deployer: Arc<ResilientDeployer>,
}

impl DeploymentQueue {
    pub fn new(deployer: Arc<ResilientDeployer>) -> Self {
        Self { deployer }
    }

    fn options(&self) -> &QueueOptions {
        &self.deployer.options().queue
    }

    /// Sweep entries due at `now`.
    ///
    /// An entry is only acted on after this sweep wins its claim, so
    /// concurrent sweeps never process the same entry twice. A storage error
    /// on one entry releases its claim and the sweep moves on; a claim that
    /// is never released lapses after the configured lease.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Result<SweepReport, EngineError> {
        let store = self.deployer.store();
        let due = store.due_queue_entries(now, self.options().batch_size).await?;
        let mut report = SweepReport {
            examined: due.len(),
            ..Default::default()
        };

        if due.is_empty() {
            debug!("Queue sweep: nothing due");
            return Ok(report);
        }

        let lease_until = now + chrono_duration(self.options().claim_lease);
        for entry in due {
            match store.claim_queue_entry(entry.id, now, lease_until).await {
                Ok(true) => {}
                Ok(false) => {
                    debug!("Queue entry {} claimed elsewhere", entry.id);
                    continue;
                }
                Err(e) => {
                    error!("Failed to claim queue entry {}: {}", entry.id, e);
                    report.errored += 1;
                    continue;
                }
            }
            report.claimed += 1;
            if entry.status == QueueStatus::Processing {
                warn!("Queue entry {} reclaimed after its claim lapsed", entry.id);
            }

            let entry_id = entry.id;
            match self.process(entry, now).await {
                Ok(QueueStatus::Completed) => report.completed += 1,
                Ok(QueueStatus::Failed) => report.failed += 1,
                Ok(_) => report.rescheduled += 1,
                Err(e) => {
                    error!("Queue entry {} could not be recorded: {}", entry_id, e);
                    report.errored += 1;
                    self.release(entry_id, &e).await;
                }
            }
        }

        info!(
            "Queue sweep: {} due, {} claimed, {} completed, {} rescheduled, {} failed, {} errored",
            report.examined, report.claimed, report.completed, report.rescheduled, report.failed, report.errored
        );
        Ok(report)
    }

    /// Process one claimed entry; returns its new status
    async fn process(&self, mut entry: QueueEntry, now: DateTime<Utc>) -> Result<QueueStatus, EngineError> {
        let target = match self.load_target(&entry).await {
            Ok(target) => target,
            Err(e @ EngineError::NotFound(_)) => {
                warn!("Queue entry {} cannot be deployed: {}", entry.id, e);
                entry.status = QueueStatus::Failed;
                entry.last_error = Some(e.to_string());
                return self.save(entry).await;
            }
            Err(e) => return Err(e),
        };

        let health = self.deployer.probe(&target.server).await;
        if health.is_offline() {
            let reason = health.error.unwrap_or_else(|| "server offline".to_string());
            self.reschedule_or_fail(&mut entry, reason, self.options().offline_retry, now);
            return self.save(entry).await;
        }

        let detectors = match ResilientDeployer::detectors_for(&target.server, entry.deployment_type) {
            Ok(detectors) => detectors,
            Err(e) => {
                entry.status = QueueStatus::Failed;
                entry.last_error = Some(e.to_string());
                return self.save(entry).await;
            }
        };

        let attempt = entry.retry_count + 1;
        let report = self
            .deployer
            .deploy_once(&target, entry.deployment_type, &detectors, false, attempt)
            .await;

        if report.success {
            self.deployer.apply_success(&target, entry.deployment_type, None).await;
            entry.status = QueueStatus::Completed;
            entry.completed_at = Some(Utc::now());
            entry.last_error = None;
            info!("Queue entry {} deployed site {}", entry.id, entry.site_id);
        } else {
            let reason = report.error().unwrap_or("deployment failed").to_string();
            self.reschedule_or_fail(&mut entry, reason, self.options().failure_retry, now);
            if entry.status == QueueStatus::Failed {
                if let Err(e) = self
                    .deployer
                    .store()
                    .set_site_status(entry.site_id, SiteDeploymentStatus::Failed)
                    .await
                {
                    error!("Failed to mark site {} failed: {}", entry.site_id, e);
                }
            }
        }

        self.save(entry).await
    }

    /// Persist the entry's new state and drop the claim
    async fn save(&self, mut entry: QueueEntry) -> Result<QueueStatus, EngineError> {
        entry.claim_expires_at = None;
        self.deployer.store().update_queue_entry(&entry).await?;
        Ok(entry.status)
    }

    /// Hand a claimed entry back to `pending` after a local error
    async fn release(&self, entry_id: u64, cause: &EngineError) {
        let store = self.deployer.store();
        let released = match store.get_queue_entry(entry_id).await {
            Ok(Some(mut entry)) if entry.status == QueueStatus::Processing => {
                entry.status = QueueStatus::Pending;
                entry.claim_expires_at = None;
                entry.last_error = Some(cause.to_string());
                store.update_queue_entry(&entry).await
            }
            Ok(_) => Ok(()),
            Err(e) => Err(e),
        };

        match released {
            Ok(()) => debug!("Queue entry {} released", entry_id),
            Err(e) => error!(
                "Failed to release queue entry {}; it stays claimed until its lease lapses: {}",
                entry_id, e
            ),
        }
    }

    /// Site and server from the store, config from the queued snapshot
    async fn load_target(&self, entry: &QueueEntry) -> Result<DeployTarget, EngineError> {
        let store = self.deployer.store();
        let site = store
            .get_site(entry.site_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("site {}", entry.site_id)))?;
        let server = store
            .get_server(entry.server_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("server {}", entry.server_id)))?;

        Ok(DeployTarget {
            site,
            server,
            config: entry.config_snapshot.clone(),
        })
    }

    fn reschedule_or_fail(&self, entry: &mut QueueEntry, reason: String, delay: Duration, now: DateTime<Utc>) {
        if entry.is_last_try() {
            warn!("Queue entry {} exhausted its retries: {}", entry.id, reason);
            entry.retry_count = entry.max_retries;
            entry.status = QueueStatus::Failed;
        } else {
            entry.retry_count += 1;
            entry.status = QueueStatus::Pending;
            entry.next_retry_at = now + chrono_duration(delay);
            debug!(
                "Queue entry {} rescheduled for {} (retry {}/{})",
                entry.id, entry.next_retry_at, entry.retry_count, entry.max_retries
            );
        }
        entry.last_error = Some(reason);
    }
}
