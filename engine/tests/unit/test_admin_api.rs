//! Admin HTTP API tests

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use modsync::server::serve::router;

use crate::common::{fast_policy, Fixture, ScriptedTransport, SITE_ID};

fn app(fixture: &Fixture) -> Router {
    router(Arc::new(fixture.app.server_state()))
}

async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(body) => {
            request = request.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&body).unwrap())
        }
        None => Body::empty(),
    };

    let response = app.oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health_endpoint() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;

    let (status, body) = send(app(&fixture), "GET", "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "modsync");
}

#[tokio::test]
async fn test_effective_config_reflects_override_update() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;

    let (status, body) = send(
        app(&fixture),
        "PUT",
        "/sites/1/overrides/nudenet",
        Some(json!({ "detection_threshold": 0.8 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["config_version"], 2);

    let (status, body) = send(app(&fixture), "GET", "/sites/1/effective-config", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["effective"]["nudenet"]["detection_threshold"], json!(0.8));
    assert_eq!(body["translated"]["nudenet"]["default_threshold"], json!(80.0));
    assert_eq!(body["translated"]["blip"]["child_keywords"][1], "children");

    // Updating overrides does not deploy anything
    assert_eq!(fixture.transport.writes(), 0);
}

#[tokio::test]
async fn test_unknown_site_and_detector() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;

    let (status, body) = send(app(&fixture), "GET", "/sites/99/effective-config", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");

    let (status, body) = send(app(&fixture), "PUT", "/sites/1/overrides/yolo", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "validation_error");

    let (status, _) = send(app(&fixture), "PUT", "/sites/1/overrides/blip", Some(json!([1, 2]))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_deploy_endpoint_statuses() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;

    let (status, body) = send(app(&fixture), "POST", "/sites/1/deploy", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["attempts"], 1);

    let (status, body) = send(app(&fixture), "POST", "/sites/1/deploy", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["site_id"], SITE_ID);

    let (status, _) = send(
        app(&fixture),
        "POST",
        "/sites/1/deploy",
        Some(json!({ "deployment_type": "everything" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(app(&fixture), "GET", "/sites/1/history", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn test_deploy_to_offline_server_is_accepted_and_queued() {
    let fixture = Fixture::new(ScriptedTransport::offline(), fast_policy()).await;

    let (status, body) = send(app(&fixture), "POST", "/sites/1/deploy", Some(json!({}))).await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["queued"], true);

    let (status, body) = send(app(&fixture), "GET", "/queue", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);

    let (status, body) = send(app(&fixture), "POST", "/queue/sweep", None).await;
    assert_eq!(status, StatusCode::OK);
    // Not due until the initial delay has passed
    assert_eq!(body["examined"], 0);
}

#[tokio::test]
async fn test_background_deploy_returns_run_id() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;

    let (status, body) = send(
        app(&fixture),
        "POST",
        "/sites/1/deploy",
        Some(json!({ "background": true })),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["accepted"], true);
    assert!(body["run_id"].as_str().is_some_and(|id| !id.is_empty()));

    let (status, _) = send(
        app(&fixture),
        "POST",
        "/sites/42/deploy",
        Some(json!({ "background": true })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rollback_without_history_is_not_found() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;

    let (status, body) = send(app(&fixture), "POST", "/sites/1/rollback", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
    assert!(fixture.transport.calls().is_empty());
}

#[tokio::test]
async fn test_drift_check_and_log() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;

    // The scripted server reports empty configs, so everything drifts
    let (status, body) = send(app(&fixture), "POST", "/sites/1/drift", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["nudenet_match"], false);
    assert_eq!(body["severity"], "critical");

    let (status, body) = send(app(&fixture), "GET", "/sites/1/drift", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_probe_endpoint() {
    let fixture = Fixture::new(ScriptedTransport::offline(), fast_policy()).await;

    let (status, body) = send(app(&fixture), "POST", "/servers/1/probe", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "offline");

    let (status, _) = send(app(&fixture), "POST", "/servers/5/probe", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
