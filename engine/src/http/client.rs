//! Remote transport for moderation server endpoints

use std::time::{Duration, Instant};

use async_trait::async_trait;
use http::Method;
use reqwest::{header, Client};
use serde::Serialize;
use tracing::{debug, warn};

use crate::errors::EngineError;

/// Status reported for network-level failures
pub const TRANSPORT_FAILURE_STATUS: u16 = 500;

/// A single outgoing request
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub method: Method,
    pub url: String,
    pub bearer: Option<String>,
    pub body: Option<serde_json::Value>,
    pub timeout: Duration,
}

impl RemoteRequest {
    pub fn get(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            method: Method::GET,
            url: url.into(),
            bearer: None,
            body: None,
            timeout,
        }
    }

    pub fn post<B: Serialize>(url: impl Into<String>, body: &B, timeout: Duration) -> Self {
        Self {
            method: Method::POST,
            url: url.into(),
            bearer: None,
            // Wire models are plain structs; serialization cannot fail
            body: serde_json::to_value(body).ok(),
            timeout,
        }
    }

    pub fn with_bearer(mut self, token: Option<&str>) -> Self {
        self.bearer = token.map(str::to_string);
        self
    }
}

/// Normalized response; transport failures never escape as errors
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteResponse {
    pub ok: bool,
    pub status: u16,
    pub body: serde_json::Value,
    pub elapsed: Duration,
    /// Set when the request never produced an HTTP response
    pub transport_error: Option<String>,
}

impl RemoteResponse {
    pub fn from_status(status: u16, body: serde_json::Value, elapsed: Duration) -> Self {
        Self {
            ok: (200..300).contains(&status),
            status,
            body,
            elapsed,
            transport_error: None,
        }
    }

    pub fn failure(reason: impl Into<String>, elapsed: Duration) -> Self {
        let reason = reason.into();
        Self {
            ok: false,
            status: TRANSPORT_FAILURE_STATUS,
            body: serde_json::Value::String(reason.clone()),
            elapsed,
            transport_error: Some(reason),
        }
    }

    /// Whether the target could not be reached at all
    pub fn is_unreachable(&self) -> bool {
        self.transport_error.is_some() || matches!(self.status, 502 | 503 | 504)
    }

    /// Short description for logs and error messages
    pub fn describe(&self) -> String {
        if let Some(err) = &self.transport_error {
            return format!("unreachable: {}", err);
        }
        match &self.body {
            serde_json::Value::String(s) => format!("HTTP {}: {}", self.status, s),
            other => format!("HTTP {}: {}", self.status, other),
        }
    }
}

/// Transport seam; implementations must not retry
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RemoteRequest) -> RemoteResponse;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    /// Create a new transport
    pub fn new() -> Result<Self, EngineError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .user_agent(concat!("modsync/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: RemoteRequest) -> RemoteResponse {
        debug!("{} {}", request.method, request.url);
        let started = Instant::now();

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .timeout(request.timeout);

        if let Some(token) = &request.bearer {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                warn!("{} {} failed: {}", request.method, request.url, e);
                let reason = if e.is_timeout() {
                    format!("timed out after {:?}", request.timeout)
                } else if e.is_connect() {
                    format!("connection failed: {}", e)
                } else {
                    e.to_string()
                };
                return RemoteResponse::failure(reason, started.elapsed());
            }
        };

        let status = response.status().as_u16();
        let text = match response.text().await {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to read body from {}: {}", request.url, e);
                return RemoteResponse::failure(format!("body read failed: {}", e), started.elapsed());
            }
        };

        let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));
        let result = RemoteResponse::from_status(status, body, started.elapsed());
        if !result.ok {
            warn!("{} {} returned {}", request.method, request.url, status);
        }
        result
    }
}
