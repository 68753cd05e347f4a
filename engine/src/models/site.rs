//! Site configuration models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Detector family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Detector {
    /// Numeric image-threshold detector
    Nudenet,

    /// Keyword/description detector
    Blip,
}

impl Detector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Detector::Nudenet => "nudenet",
            Detector::Blip => "blip",
        }
    }
}

impl std::str::FromStr for Detector {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "nudenet" => Ok(Detector::Nudenet),
            "blip" => Ok(Detector::Blip),
            _ => Err(format!("Unknown detector: {}", s)),
        }
    }
}

impl std::fmt::Display for Detector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deployment status of a site
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteDeploymentStatus {
    #[default]
    Pending,
    InProgress,
    Deployed,
    Failed,
}

/// Per-tenant site configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteConfiguration {
    pub id: u64,

    pub name: String,

    /// Moderation server this site deploys to
    pub server_id: u64,

    /// Industry template providing the baseline
    #[serde(default)]
    pub template_id: Option<u64>,

    /// Numeric detector overrides (object, or JSON text as stored upstream)
    #[serde(default)]
    pub nudenet_overrides: serde_json::Value,

    /// Keyword detector overrides
    #[serde(default)]
    pub blip_overrides: serde_json::Value,

    #[serde(default)]
    pub webhook_url: Option<String>,

    #[serde(default)]
    pub deployment_status: SiteDeploymentStatus,

    /// Incremented on every override change and every successful deployment
    #[serde(default)]
    pub config_version: u64,

    #[serde(default)]
    pub last_deployed_at: Option<DateTime<Utc>>,
}

impl SiteConfiguration {
    pub fn new(id: u64, name: impl Into<String>, server_id: u64) -> Self {
        Self {
            id,
            name: name.into(),
            server_id,
            template_id: None,
            nudenet_overrides: serde_json::Value::Null,
            blip_overrides: serde_json::Value::Null,
            webhook_url: None,
            deployment_status: SiteDeploymentStatus::Pending,
            config_version: 1,
            last_deployed_at: None,
        }
    }

    pub fn overrides(&self, detector: Detector) -> &serde_json::Value {
        match detector {
            Detector::Nudenet => &self.nudenet_overrides,
            Detector::Blip => &self.blip_overrides,
        }
    }
}

/// Baseline configuration shared by many sites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndustryTemplate {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub nudenet_config: serde_json::Value,
    #[serde(default)]
    pub blip_config: serde_json::Value,
}

impl IndustryTemplate {
    pub fn config(&self, detector: Detector) -> &serde_json::Value {
        match detector {
            Detector::Nudenet => &self.nudenet_config,
            Detector::Blip => &self.blip_config,
        }
    }
}

/// Template merged with site overrides, one block per detector family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EffectiveConfig {
    #[serde(default)]
    pub nudenet: serde_json::Value,
    #[serde(default)]
    pub blip: serde_json::Value,
}

impl EffectiveConfig {
    pub fn block(&self, detector: Detector) -> &serde_json::Value {
        match detector {
            Detector::Nudenet => &self.nudenet,
            Detector::Blip => &self.blip,
        }
    }
}
