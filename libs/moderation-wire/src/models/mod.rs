//! Server-side configuration schemas

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Numeric detector configuration as accepted by `POST /config/nudenet`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NudenetServerConfig {
    /// Score (0-100) above which public gallery content is flagged
    pub public_gallery_threshold: f64,

    /// Score (0-100) above which privately shared content is flagged
    pub private_share_threshold: f64,

    /// Score (0-100) used when no context applies
    pub default_threshold: f64,

    /// Averaged per-region score (0-100)
    pub body_part_threshold: f64,

    /// Detection components toggled on the server
    #[serde(default)]
    pub nudenet_components: BTreeMap<String, bool>,

    /// Unified fields the server may understand but we do not translate
    #[serde(flatten)]
    pub passthrough: serde_json::Map<String, serde_json::Value>,
}

/// Keyword/description detector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlipServerConfig {
    /// Safety keywords matched against generated descriptions
    pub child_keywords: Vec<String>,

    /// Risk score (0-100) above which content is escalated
    pub risk_threshold: f64,

    /// Minimum estimated age considered adult
    pub age_threshold: u32,

    /// Description components toggled on the server
    #[serde(default)]
    pub blip_components: BTreeMap<String, bool>,

    #[serde(flatten)]
    pub passthrough: serde_json::Map<String, serde_json::Value>,
}

/// Envelope for `POST /config/blip`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlipWriteBody {
    pub config: BlipServerConfig,
}

/// Body returned by `GET /health`
///
/// Servers return arbitrary bodies; only `status` is inspected.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthBody {
    #[serde(default)]
    pub status: Option<String>,

    #[serde(default)]
    pub version: Option<String>,
}

impl HealthBody {
    /// Whether the body self-reports a healthy server (missing status counts as healthy)
    pub fn reports_healthy(&self) -> bool {
        match self.status.as_deref() {
            None => true,
            Some(s) => matches!(s.to_ascii_lowercase().as_str(), "healthy" | "ok" | "up"),
        }
    }
}

/// Remote configuration endpoint paths
pub mod paths {
    pub const HEALTH: &str = "/health";
    pub const NUDENET_CONFIG: &str = "/config/nudenet";
    pub const BLIP_CONFIG: &str = "/config/blip";
    pub const RESTART: &str = "/restart";
}
