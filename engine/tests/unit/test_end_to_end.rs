//! End-to-end: deploy over HTTP to a mock moderation server, then check drift

use std::sync::Arc;

use serde_json::{json, Value};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use modsync::app::state::AppState;
use modsync::deploy::deployer::DeployRequest;
use modsync::http::client::HttpTransport;
use modsync::models::drift::{ResponseShape, Severity};
use modsync::models::history::HistoryStatus;
use modsync::models::server::ModerationServer;
use modsync::models::site::Detector;
use modsync::storage::memory::MemoryStore;
use modsync::storage::store::Store;

use crate::common::{fast_policy, options, seed, SERVER_ID, SITE_ID};

struct Harness {
    mock: MockServer,
    store: Arc<MemoryStore>,
    app: AppState,
}

async fn harness() -> Harness {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "healthy", "version": "2.1" })))
        .mount(&mock)
        .await;
    Mock::given(method("POST"))
        .and(path("/config/nudenet"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true })))
        .mount(&mock)
        .await;

    let store = Arc::new(MemoryStore::new());
    let server = ModerationServer::from_url(SERVER_ID, "edge", &mock.uri()).unwrap();
    seed(store.as_ref(), server).await;
    store
        .update_site_overrides(SITE_ID, Detector::Nudenet, json!({ "detection_threshold": 0.8 }))
        .await
        .unwrap();

    let transport = Arc::new(HttpTransport::new().unwrap());
    let app = AppState::with_components(&options(fast_policy()), store.clone(), transport);
    Harness { mock, store, app }
}

impl Harness {
    async fn mount_blip_write(&self, status: u16) {
        Mock::given(method("POST"))
            .and(path("/config/blip"))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "detail": "ok" })))
            .mount(&self.mock)
            .await;
    }

    /// Serve `body` as the live config for `detector`
    async fn mount_live(&self, detector: Detector, body: Value) {
        Mock::given(method("GET"))
            .and(path(format!("/config/{}", detector)))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&self.mock)
            .await;
    }

    /// What the engine would push for `detector`
    async fn translated(&self, detector: Detector) -> Value {
        let target = self.app.deployer.load_target(SITE_ID).await.unwrap();
        self.app.translator.to_server_value(detector, target.config.block(detector))
    }

    async fn posted(&self, url_path: &str) -> Vec<Value> {
        self.mock
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter(|r| r.method.as_str() == "POST" && r.url.path() == url_path)
            .filter_map(|r| serde_json::from_slice(&r.body).ok())
            .collect()
    }
}

#[tokio::test]
async fn test_deploy_then_drift_check_matches() {
    let h = harness().await;
    h.mount_blip_write(200).await;
    let nudenet = h.translated(Detector::Nudenet).await;
    let blip = h.translated(Detector::Blip).await;
    // Newer servers wrap the config, older ones return it flat
    h.mount_live(Detector::Nudenet, json!({ "configuration": nudenet })).await;
    h.mount_live(Detector::Blip, blip).await;

    let outcome = h.app.deployer.deploy(DeployRequest::new(SITE_ID)).await.unwrap();
    assert!(outcome.success, "{:?}", outcome.error);
    assert_eq!(outcome.attempts, 1);

    let writes = h.posted("/config/nudenet").await;
    assert_eq!(writes.len(), 1);
    assert_eq!(writes[0]["default_threshold"], json!(80.0));
    assert_eq!(writes[0]["public_gallery_threshold"], json!(75.0));
    let blip_writes = h.posted("/config/blip").await;
    assert!(blip_writes[0]["config"]["child_keywords"]
        .as_array()
        .unwrap()
        .contains(&json!("children")));

    let history = h.store.list_history(SITE_ID).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, HistoryStatus::Success);
    assert_eq!(history[0].config.nudenet["detection_threshold"], json!(0.8));

    let entry = h.app.reconciler.check_site(SITE_ID).await.unwrap();
    assert!(entry.overall_match(), "{:?}", entry.differences);
    assert_eq!(entry.severity, Severity::None);
    assert_eq!(entry.nudenet.response_shape, ResponseShape::Wrapped);
    assert_eq!(entry.blip.response_shape, ResponseShape::Flat);
    assert_eq!(h.store.list_drift_logs(SITE_ID).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_threshold_drift_is_reported() {
    let h = harness().await;
    h.mount_blip_write(200).await;
    let mut nudenet = h.translated(Detector::Nudenet).await;
    nudenet["public_gallery_threshold"] = json!(40.0);
    nudenet["private_share_threshold"] = json!(60.0);
    nudenet["default_threshold"] = json!(50.0);
    h.mount_live(Detector::Nudenet, nudenet).await;
    h.mount_live(Detector::Blip, h.translated(Detector::Blip).await).await;

    let entry = h.app.reconciler.check_site(SITE_ID).await.unwrap();

    assert!(!entry.nudenet_match);
    assert!(entry.blip_match);
    // Three drifted thresholds, none on a child-safety field
    assert_eq!(entry.severity, Severity::Medium);
    let mut paths: Vec<&str> = entry.differences.iter().map(|d| d.path.as_str()).collect();
    paths.sort();
    assert_eq!(
        paths,
        vec![
            "nudenet.default_threshold",
            "nudenet.private_share_threshold",
            "nudenet.public_gallery_threshold"
        ]
    );
}

#[tokio::test]
async fn test_missing_safety_keywords_are_critical() {
    let h = harness().await;
    h.mount_blip_write(200).await;
    h.app.deployer.deploy(DeployRequest::new(SITE_ID)).await.unwrap();

    let mut blip = h.translated(Detector::Blip).await;
    blip["child_keywords"] = json!([]);
    h.mount_live(Detector::Nudenet, h.translated(Detector::Nudenet).await).await;
    h.mount_live(Detector::Blip, blip).await;

    let entry = h.app.reconciler.check_site(SITE_ID).await.unwrap();

    assert!(!entry.blip_match);
    assert!(!entry.known_limitation);
    assert_eq!(entry.severity, Severity::Critical);
}

#[tokio::test]
async fn test_known_write_limitation_caps_severity() {
    let h = harness().await;
    h.mount_blip_write(422).await;
    let outcome = h.app.deployer.deploy(DeployRequest::new(SITE_ID)).await.unwrap();
    assert!(outcome.success);

    let mut blip = h.translated(Detector::Blip).await;
    blip["child_keywords"] = json!(["weapon"]);
    h.mount_live(Detector::Nudenet, h.translated(Detector::Nudenet).await).await;
    h.mount_live(Detector::Blip, blip).await;

    let entry = h.app.reconciler.check_site(SITE_ID).await.unwrap();

    assert!(entry.known_limitation);
    assert_eq!(entry.severity, Severity::Medium);
}

#[tokio::test]
async fn test_unreachable_server_is_queued() {
    let store = Arc::new(MemoryStore::new());
    // Nothing listens on the discard port
    let server = ModerationServer::from_url(SERVER_ID, "gone", "http://127.0.0.1:9").unwrap();
    seed(store.as_ref(), server).await;
    let transport = Arc::new(HttpTransport::new().unwrap());
    let app = AppState::with_components(&options(fast_policy()), store.clone(), transport);

    let outcome = app.deployer.deploy(DeployRequest::new(SITE_ID)).await.unwrap();

    assert!(outcome.queued);
    assert_eq!(outcome.attempts, 0);
    assert_eq!(store.list_queue().await.unwrap().len(), 1);
}
