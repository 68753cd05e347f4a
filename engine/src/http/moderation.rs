//! Moderation server endpoint calls

use std::time::Duration;

use moderation_wire::{paths, BlipServerConfig, BlipWriteBody, NudenetServerConfig};
use serde::{Deserialize, Serialize};

use crate::http::client::{RemoteRequest, RemoteResponse, Transport};
use crate::models::server::ModerationServer;
use crate::models::site::Detector;

/// Shortest per-request timeout a remote call may use
pub const MIN_TIMEOUT_MS: u64 = 3_000;

/// Longest per-request timeout a remote call may use
pub const MAX_TIMEOUT_MS: u64 = 5_000;

/// Per-request timeouts for remote calls, each held to
/// `MIN_TIMEOUT_MS..=MAX_TIMEOUT_MS` when used
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Timeouts {
    /// Config writes and restart
    #[serde(default = "default_request_ms")]
    pub request_ms: u64,

    /// `/health` probe
    #[serde(default = "default_health_ms")]
    pub health_ms: u64,

    /// Config-read capability probes
    #[serde(default = "default_capability_ms")]
    pub capability_ms: u64,
}

fn default_request_ms() -> u64 {
    5_000
}

fn default_health_ms() -> u64 {
    5_000
}

fn default_capability_ms() -> u64 {
    3_000
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_ms: default_request_ms(),
            health_ms: default_health_ms(),
            capability_ms: default_capability_ms(),
        }
    }
}

impl Timeouts {
    pub fn request(&self) -> Duration {
        clamp_timeout(self.request_ms)
    }

    pub fn health(&self) -> Duration {
        clamp_timeout(self.health_ms)
    }

    pub fn capability(&self) -> Duration {
        clamp_timeout(self.capability_ms)
    }
}

/// Typed view of one server's endpoints over a transport
pub struct ModerationClient<'a> {
    transport: &'a dyn Transport,
    server: &'a ModerationServer,
    timeouts: &'a Timeouts,
}

impl<'a> ModerationClient<'a> {
    pub fn new(transport: &'a dyn Transport, server: &'a ModerationServer, timeouts: &'a Timeouts) -> Self {
        Self {
            transport,
            server,
            timeouts,
        }
    }

    pub fn server(&self) -> &ModerationServer {
        self.server
    }

    fn bearer(&self) -> Option<&str> {
        self.server.api_key.as_ref().map(|k| k.expose())
    }

    fn config_path(detector: Detector) -> &'static str {
        match detector {
            Detector::Nudenet => paths::NUDENET_CONFIG,
            Detector::Blip => paths::BLIP_CONFIG,
        }
    }

    /// `GET /health`
    pub async fn health(&self) -> RemoteResponse {
        let request = RemoteRequest::get(self.server.endpoint(paths::HEALTH), self.timeouts.health())
            .with_bearer(self.bearer());
        self.transport.send(request).await
    }

    /// `GET /config/{detector}` with the given timeout
    pub async fn read_config_with_timeout(&self, detector: Detector, timeout: Duration) -> RemoteResponse {
        let request = RemoteRequest::get(self.server.endpoint(Self::config_path(detector)), timeout)
            .with_bearer(self.bearer());
        self.transport.send(request).await
    }

    /// `GET /config/{detector}`
    pub async fn read_config(&self, detector: Detector) -> RemoteResponse {
        self.read_config_with_timeout(detector, self.timeouts.request()).await
    }

    /// `POST /config/nudenet` with the flat server schema
    pub async fn write_nudenet(&self, config: &NudenetServerConfig) -> RemoteResponse {
        let request = RemoteRequest::post(
            self.server.endpoint(paths::NUDENET_CONFIG),
            config,
            self.timeouts.request(),
        )
        .with_bearer(self.bearer());
        self.transport.send(request).await
    }

    /// `POST /config/blip` with the `{ config: ... }` envelope
    pub async fn write_blip(&self, config: &BlipServerConfig) -> RemoteResponse {
        let body = BlipWriteBody {
            config: config.clone(),
        };
        let request = RemoteRequest::post(self.server.endpoint(paths::BLIP_CONFIG), &body, self.timeouts.request())
            .with_bearer(self.bearer());
        self.transport.send(request).await
    }

    /// `POST /restart`
    pub async fn restart(&self) -> RemoteResponse {
        let request = RemoteRequest::post(
            self.server.endpoint(paths::RESTART),
            &serde_json::json!({}),
            self.timeouts.request(),
        )
        .with_bearer(self.bearer());
        self.transport.send(request).await
    }
}

fn clamp_timeout(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS))
}
