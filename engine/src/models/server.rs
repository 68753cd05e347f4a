//! Moderation server models

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::EngineError;

/// Bearer credential for a moderation server
pub struct ApiKey(SecretString);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(SecretString::from(key.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for ApiKey {
    fn clone(&self) -> Self {
        Self::new(self.expose())
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey([REDACTED])")
    }
}

impl Serialize for ApiKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.expose())
    }
}

impl<'de> Deserialize<'de> for ApiKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(ApiKey::new(s))
    }
}

/// Last known server status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerStatus {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
    Offline,
}

/// A remote moderation server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationServer {
    pub id: u64,

    pub name: String,

    #[serde(default = "default_protocol")]
    pub protocol: String,

    pub host: String,

    pub port: u16,

    #[serde(default)]
    pub api_key: Option<ApiKey>,

    #[serde(default = "default_true")]
    pub supports_nudenet: bool,

    #[serde(default = "default_true")]
    pub supports_blip: bool,

    #[serde(default)]
    pub status: ServerStatus,

    #[serde(default)]
    pub last_health_check: Option<DateTime<Utc>>,
}

fn default_protocol() -> String {
    "http".to_string()
}

fn default_true() -> bool {
    true
}

impl ModerationServer {
    pub fn new(id: u64, name: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            id,
            name: name.into(),
            protocol: default_protocol(),
            host: host.into(),
            port,
            api_key: None,
            supports_nudenet: true,
            supports_blip: true,
            status: ServerStatus::Unknown,
            last_health_check: None,
        }
    }

    /// Build a server record from a base URL such as `http://10.0.0.5:5000`
    pub fn from_url(id: u64, name: impl Into<String>, base_url: &str) -> Result<Self, EngineError> {
        let parsed = url::Url::parse(base_url)
            .map_err(|e| EngineError::ValidationError(format!("Invalid server URL {}: {}", base_url, e)))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| EngineError::ValidationError(format!("Server URL has no host: {}", base_url)))?;
        let port = parsed
            .port_or_known_default()
            .ok_or_else(|| EngineError::ValidationError(format!("Server URL has no port: {}", base_url)))?;

        let mut server = Self::new(id, name, host, port);
        server.protocol = parsed.scheme().to_string();
        Ok(server)
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(ApiKey::new(key));
        self
    }

    /// Base URL without trailing slash
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.protocol, self.host, self.port)
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }
}
