//! Admin API models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Deploy request body for `POST /sites/{id}/deploy`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployRequestBody {
    /// `full`, `nudenet` or `blip`
    #[serde(default)]
    pub deployment_type: Option<String>,

    /// Deploy even if the health probe reports the server offline
    #[serde(default)]
    pub force_retry: bool,

    /// Ask the server to restart after applying
    #[serde(default)]
    pub restart: bool,

    /// Return immediately and run the deployment in the background
    #[serde(default)]
    pub background: bool,

    /// Queue priority if the deployment ends up queued
    #[serde(default)]
    pub priority: Option<i32>,
}

/// Rollback request body for `POST /sites/{id}/rollback`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RollbackRequestBody {
    #[serde(default)]
    pub history_id: Option<u64>,
}

/// Accepted response for background deployments
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AcceptedResponse {
    pub accepted: bool,
    pub run_id: String,
}

/// Queue sweep summary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepResponse {
    pub examined: usize,
    pub claimed: usize,
    pub completed: usize,
    pub rescheduled: usize,
    pub failed: usize,
    #[serde(default)]
    pub errored: usize,
    pub swept_at: Option<DateTime<Utc>>,
}

/// Override version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverridesUpdatedResponse {
    pub site_id: u64,
    pub config_version: u64,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
}
