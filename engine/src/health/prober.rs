//! Health prober for moderation servers

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use moderation_wire::HealthBody;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::http::client::{RemoteResponse, Transport};
use crate::http::moderation::{ModerationClient, Timeouts};
use crate::models::server::{ModerationServer, ServerStatus};
use crate::models::site::Detector;

/// Overall probe classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// `/health` answered 2xx
    Healthy,

    /// `/health` answered 2xx but the body reports a degraded server
    Unhealthy,

    /// Unreachable or non-2xx
    Offline,
}

impl From<HealthStatus> for ServerStatus {
    fn from(status: HealthStatus) -> Self {
        match status {
            HealthStatus::Healthy => ServerStatus::Healthy,
            HealthStatus::Unhealthy => ServerStatus::Unhealthy,
            HealthStatus::Offline => ServerStatus::Offline,
        }
    }
}

/// Latency bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTier {
    Excellent,
    Good,
    Fair,
    Slow,
    VerySlow,
}

impl PerformanceTier {
    pub fn from_latency(latency: Duration) -> Self {
        match latency.as_millis() {
            0..200 => PerformanceTier::Excellent,
            200..500 => PerformanceTier::Good,
            500..1000 => PerformanceTier::Fair,
            1000..=2000 => PerformanceTier::Slow,
            _ => PerformanceTier::VerySlow,
        }
    }
}

/// Availability of one detector's config-read endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityStatus {
    pub available: bool,
    pub status_code: u16,
    pub latency_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
}

impl CapabilityStatus {
    fn from_response(response: &RemoteResponse) -> Self {
        Self {
            available: response.ok,
            status_code: response.status,
            latency_ms: response.elapsed.as_millis() as u64,
            error: (!response.ok).then(|| response.describe()),
        }
    }
}

/// Result of probing one server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResult {
    pub server_id: u64,
    pub status: HealthStatus,
    pub latency_ms: u64,
    pub performance: PerformanceTier,
    #[serde(default)]
    pub nudenet: Option<CapabilityStatus>,
    #[serde(default)]
    pub blip: Option<CapabilityStatus>,
    #[serde(default)]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthResult {
    pub fn is_offline(&self) -> bool {
        self.status == HealthStatus::Offline
    }

    /// Whether the capability probe for `detector` succeeded
    pub fn supports(&self, detector: Detector) -> bool {
        let capability = match detector {
            Detector::Nudenet => &self.nudenet,
            Detector::Blip => &self.blip,
        };
        capability.as_ref().map(|c| c.available).unwrap_or(false)
    }
}

/// Probes `/health` and both config-read endpoints
pub struct HealthProber {
    transport: Arc<dyn Transport>,
    timeouts: Timeouts,
}

impl HealthProber {
    pub fn new(transport: Arc<dyn Transport>, timeouts: Timeouts) -> Self {
        Self { transport, timeouts }
    }

    /// Probe a server. Never fails; problems are reported in the result.
    pub async fn probe(&self, server: &ModerationServer) -> HealthResult {
        let client = ModerationClient::new(self.transport.as_ref(), server, &self.timeouts);
        let base = client.health().await;
        let latency = base.elapsed;
        let checked_at = Utc::now();

        if !base.ok {
            warn!("Server {} ({}) is offline: {}", server.id, server.base_url(), base.describe());
            return HealthResult {
                server_id: server.id,
                status: HealthStatus::Offline,
                latency_ms: latency.as_millis() as u64,
                performance: PerformanceTier::from_latency(latency),
                nudenet: None,
                blip: None,
                error: Some(base.describe()),
                checked_at,
            };
        }

        let body: HealthBody = serde_json::from_value(base.body.clone()).unwrap_or_default();
        let status = if body.reports_healthy() {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unhealthy
        };

        let capability_timeout = self.timeouts.capability();
        let (nudenet, blip) = futures::join!(
            client.read_config_with_timeout(Detector::Nudenet, capability_timeout),
            client.read_config_with_timeout(Detector::Blip, capability_timeout),
        );

        let result = HealthResult {
            server_id: server.id,
            status,
            latency_ms: latency.as_millis() as u64,
            performance: PerformanceTier::from_latency(latency),
            nudenet: Some(CapabilityStatus::from_response(&nudenet)),
            blip: Some(CapabilityStatus::from_response(&blip)),
            error: body
                .status
                .filter(|_| status == HealthStatus::Unhealthy)
                .map(|s| format!("server reports status '{}'", s)),
            checked_at,
        };

        if result.status == HealthStatus::Healthy {
            debug!(
                "Server {} healthy in {}ms (nudenet={}, blip={})",
                server.id,
                result.latency_ms,
                result.supports(Detector::Nudenet),
                result.supports(Detector::Blip)
            );
        } else {
            info!("Server {} reachable but unhealthy: {:?}", server.id, result.error);
        }
        result
    }
}
