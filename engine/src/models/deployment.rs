//! Deployment attempt models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::deploy::fsm::AttemptState;
use crate::models::site::{Detector, EffectiveConfig};

/// What a deployment pushes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    #[default]
    Full,
    Nudenet,
    Blip,
}

impl DeploymentType {
    /// Detector families covered by this deployment type
    pub fn detectors(&self) -> &'static [Detector] {
        match self {
            DeploymentType::Full => &[Detector::Nudenet, Detector::Blip],
            DeploymentType::Nudenet => &[Detector::Nudenet],
            DeploymentType::Blip => &[Detector::Blip],
        }
    }
}

impl std::str::FromStr for DeploymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(DeploymentType::Full),
            "nudenet" | "nudenet_only" => Ok(DeploymentType::Nudenet),
            "blip" | "blip_only" => Ok(DeploymentType::Blip),
            _ => Err(format!("Unknown deployment type: {}", s)),
        }
    }
}

/// Outcome of one sub-deployment (one endpoint call)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// `nudenet`, `blip` or `restart`
    pub step: String,
    pub ok: bool,
    pub status: u16,
    pub response: serde_json::Value,
    #[serde(default)]
    pub note: Option<String>,
}

/// One row per deployment attempt; append-only once terminal
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub id: u64,
    pub site_id: u64,
    pub server_id: u64,
    pub deployment_type: DeploymentType,
    pub status: AttemptState,
    pub attempt: u32,
    pub config_snapshot: EffectiveConfig,
    #[serde(default)]
    pub steps: Vec<StepResult>,
    /// Set when the keyword endpoint answered 422 (write not implemented)
    #[serde(default)]
    pub blip_write_unsupported: bool,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub error_message: Option<String>,
}

impl DeploymentRecord {
    pub fn new(
        site_id: u64,
        server_id: u64,
        deployment_type: DeploymentType,
        attempt: u32,
        config_snapshot: EffectiveConfig,
    ) -> Self {
        Self {
            id: 0,
            site_id,
            server_id,
            deployment_type,
            status: AttemptState::Pending,
            attempt,
            config_snapshot,
            steps: Vec::new(),
            blip_write_unsupported: false,
            started_at: Utc::now(),
            finished_at: None,
            duration_ms: None,
            error_message: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
