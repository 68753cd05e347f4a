//! HTTP server setup

use std::future::Future;
use std::sync::Arc;

use axum::{
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::errors::EngineError;
use crate::server::handlers::{
    deploy_handler, drift_check_handler, drift_log_handler, effective_config_handler, health_handler,
    history_handler, probe_handler, queue_handler, rollback_handler, sweep_handler,
    update_overrides_handler, version_handler,
};
use crate::server::state::ServerState;
use crate::storage::settings::ServerSettings;

/// Admin API routes
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        // Health and version
        .route("/health", get(health_handler))
        .route("/version", get(version_handler))
        // Sites
        .route("/sites/{id}/effective-config", get(effective_config_handler))
        .route("/sites/{id}/overrides/{detector}", put(update_overrides_handler))
        .route("/sites/{id}/deploy", post(deploy_handler))
        .route("/sites/{id}/drift", post(drift_check_handler).get(drift_log_handler))
        .route("/sites/{id}/rollback", post(rollback_handler))
        .route("/sites/{id}/history", get(history_handler))
        // Servers
        .route("/servers/{id}/probe", post(probe_handler))
        // Queue
        .route("/queue", get(queue_handler))
        .route("/queue/sweep", post(sweep_handler))
        // State and middleware
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server
pub async fn serve(
    options: &ServerSettings,
    state: Arc<ServerState>,
    shutdown_signal: impl Future<Output = ()> + Send + 'static,
) -> Result<JoinHandle<Result<(), EngineError>>, EngineError> {
    let app = router(state);

    let addr = format!("{}:{}", options.host, options.port);
    info!("Starting admin HTTP server on {}", addr);

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| EngineError::ServerError(e.to_string()))?;

    let handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
            .map_err(|e| EngineError::ServerError(e.to_string()))
    });

    Ok(handle)
}
