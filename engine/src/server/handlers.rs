//! HTTP request handlers

use std::sync::Arc;

use admin_api::{
    AcceptedResponse, DeployRequestBody, ErrorResponse, OverridesUpdatedResponse, RollbackRequestBody,
    SweepResponse,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info};

use crate::deploy::deployer::{load_target, DeployRequest, ResilientDeployer};
use crate::errors::EngineError;
use crate::models::deployment::DeploymentType;
use crate::models::site::{Detector, EffectiveConfig};
use crate::server::state::ServerState;
use crate::utils::version_info;

/// Engine error rendered as an HTTP response
#[derive(Debug)]
pub struct ApiError(pub EngineError);

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            EngineError::ValidationError(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound(_) => StatusCode::NOT_FOUND,
            EngineError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
            EngineError::Cancelled { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }
        let body = ErrorResponse {
            error: self.0.code().to_string(),
            message: self.0.to_string(),
            details: None,
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub uptime_secs: i64,
}

/// Health check handler
pub async fn health_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "modsync".to_string(),
        version: version_info().version,
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// Version handler
pub async fn version_handler() -> impl IntoResponse {
    Json(version_info())
}

/// Effective configuration response
#[derive(Debug, Serialize)]
pub struct EffectiveConfigResponse {
    pub site_id: u64,
    pub server_id: u64,
    pub config_version: u64,
    pub effective: EffectiveConfig,
    /// What would be sent to each endpoint
    pub translated: EffectiveConfig,
}

pub async fn effective_config_handler(
    State(state): State<Arc<ServerState>>,
    Path(site_id): Path<u64>,
) -> ApiResult<Json<EffectiveConfigResponse>> {
    let target = load_target(state.store.as_ref(), site_id).await?;
    let translated = EffectiveConfig {
        nudenet: state
            .translator
            .to_server_value(Detector::Nudenet, target.config.block(Detector::Nudenet)),
        blip: state
            .translator
            .to_server_value(Detector::Blip, target.config.block(Detector::Blip)),
    };

    Ok(Json(EffectiveConfigResponse {
        site_id,
        server_id: target.server.id,
        config_version: target.site.config_version,
        effective: target.config,
        translated,
    }))
}

pub async fn update_overrides_handler(
    State(state): State<Arc<ServerState>>,
    Path((site_id, detector)): Path<(u64, String)>,
    Json(overrides): Json<Value>,
) -> ApiResult<Json<OverridesUpdatedResponse>> {
    let detector: Detector = detector.parse().map_err(EngineError::ValidationError)?;
    if !matches!(overrides, Value::Object(_) | Value::String(_) | Value::Null) {
        return Err(EngineError::ValidationError("overrides must be a JSON object".to_string()).into());
    }

    let site = state.store.update_site_overrides(site_id, detector, overrides).await?;
    info!("Site {} {} overrides updated (version {})", site_id, detector, site.config_version);

    Ok(Json(OverridesUpdatedResponse {
        site_id,
        config_version: site.config_version,
    }))
}

pub async fn deploy_handler(
    State(state): State<Arc<ServerState>>,
    Path(site_id): Path<u64>,
    body: Option<Json<DeployRequestBody>>,
) -> ApiResult<Response> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let deployment_type = match body.deployment_type.as_deref() {
        Some(raw) => raw.parse::<DeploymentType>().map_err(EngineError::ValidationError)?,
        None => DeploymentType::Full,
    };

    let request = DeployRequest::new(site_id)
        .with_type(deployment_type)
        .force_retry(body.force_retry)
        .restart(body.restart)
        .priority(body.priority.unwrap_or(0));

    if body.background {
        // Reject bad input now rather than inside the background task
        let target = state.deployer.load_target(site_id).await?;
        ResilientDeployer::detectors_for(&target.server, deployment_type)?;

        let run_id = request.run_id.clone();
        let handle = state.deployer.spawn_deploy(request);
        let log_run_id = run_id.clone();
        tokio::spawn(async move {
            match handle.await {
                Ok(Ok(outcome)) => info!(
                    "Background deployment {} finished: success={} queued={}",
                    log_run_id, outcome.success, outcome.queued
                ),
                Ok(Err(e)) => error!("Background deployment {} failed: {}", log_run_id, e),
                Err(e) => error!("Background deployment {} panicked: {}", log_run_id, e),
            }
        });

        return Ok((StatusCode::ACCEPTED, Json(AcceptedResponse { accepted: true, run_id })).into_response());
    }

    let outcome = state.deployer.deploy(request).await?;
    let status = if outcome.success {
        StatusCode::OK
    } else if outcome.queued {
        StatusCode::ACCEPTED
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(outcome)).into_response())
}

pub async fn drift_check_handler(
    State(state): State<Arc<ServerState>>,
    Path(site_id): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    let entry = state.reconciler.check_site(site_id).await?;
    Ok(Json(entry))
}

pub async fn drift_log_handler(
    State(state): State<Arc<ServerState>>,
    Path(site_id): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    ensure_site(&state, site_id).await?;
    Ok(Json(state.store.list_drift_logs(site_id).await?))
}

pub async fn rollback_handler(
    State(state): State<Arc<ServerState>>,
    Path(site_id): Path<u64>,
    body: Option<Json<RollbackRequestBody>>,
) -> ApiResult<Response> {
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let result = state.rollback.rollback(site_id, body.history_id).await?;
    let status = if result.success {
        StatusCode::OK
    } else {
        StatusCode::BAD_GATEWAY
    };
    Ok((status, Json(result)).into_response())
}

pub async fn history_handler(
    State(state): State<Arc<ServerState>>,
    Path(site_id): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    ensure_site(&state, site_id).await?;
    Ok(Json(state.store.list_history(site_id).await?))
}

pub async fn probe_handler(
    State(state): State<Arc<ServerState>>,
    Path(server_id): Path<u64>,
) -> ApiResult<impl IntoResponse> {
    let server = state
        .store
        .get_server(server_id)
        .await?
        .ok_or_else(|| EngineError::NotFound(format!("server {}", server_id)))?;
    Ok(Json(state.deployer.probe(&server).await))
}

pub async fn sweep_handler(State(state): State<Arc<ServerState>>) -> ApiResult<Json<SweepResponse>> {
    let now = Utc::now();
    let report = state.queue.sweep(now).await?;
    Ok(Json(SweepResponse {
        examined: report.examined,
        claimed: report.claimed,
        completed: report.completed,
        rescheduled: report.rescheduled,
        failed: report.failed,
        errored: report.errored,
        swept_at: Some(now),
    }))
}

pub async fn queue_handler(State(state): State<Arc<ServerState>>) -> ApiResult<impl IntoResponse> {
    Ok(Json(state.store.list_queue().await?))
}

async fn ensure_site(state: &ServerState, site_id: u64) -> Result<(), EngineError> {
    match state.store.get_site(site_id).await? {
        Some(_) => Ok(()),
        None => Err(EngineError::NotFound(format!("site {}", site_id))),
    }
}
