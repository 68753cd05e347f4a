//! Deployment queue models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::deployment::DeploymentType;
use crate::models::site::EffectiveConfig;

/// Queue entry status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// A deployment waiting for its target to come back
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: u64,
    pub site_id: u64,
    pub server_id: u64,
    pub deployment_type: DeploymentType,
    pub config_snapshot: EffectiveConfig,
    #[serde(default)]
    pub priority: i32,
    pub retry_count: u32,
    pub max_retries: u32,
    pub next_retry_at: DateTime<Utc>,
    pub status: QueueStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_error: Option<String>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    /// When a sweeper's hold on a `processing` entry lapses
    #[serde(default)]
    pub claim_expires_at: Option<DateTime<Utc>>,
}

impl QueueEntry {
    /// Whether a sweep at `now` may pick this entry: pending and scheduled,
    /// or processing under a claim that has lapsed
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        let claimable = match self.status {
            QueueStatus::Pending => self.next_retry_at <= now,
            QueueStatus::Processing => self.claim_expires_at.is_some_and(|at| at <= now),
            QueueStatus::Completed | QueueStatus::Failed => false,
        };
        claimable && self.retry_count < self.max_retries
    }

    /// Whether one more failed try exhausts the entry
    pub fn is_last_try(&self) -> bool {
        self.retry_count + 1 >= self.max_retries
    }
}
