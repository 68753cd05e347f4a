//! Configuration history models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::deployment::DeploymentType;
use crate::models::site::EffectiveConfig;

/// Status of an applied configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryStatus {
    Success,
    Failed,
}

/// Snapshot of a configuration that was applied to a server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: u64,
    pub site_id: u64,
    pub server_id: u64,
    pub deployment_type: DeploymentType,
    pub status: HistoryStatus,
    pub config: EffectiveConfig,
    /// sha256 of the serialized config, used to skip identical snapshots
    pub config_digest: String,
    pub config_version: u64,
    pub created_at: DateTime<Utc>,
    /// Set when this entry was superseded by a rollback
    #[serde(default)]
    pub rolled_back_at: Option<DateTime<Utc>>,
    /// History entry this one restored, when written by a rollback
    #[serde(default)]
    pub restored_from: Option<u64>,
}
