//! Rollback manager tests

use http::Method;
use serde_json::json;

use modsync::deploy::deployer::DeployRequest;
use modsync::errors::EngineError;
use modsync::models::site::Detector;
use modsync::storage::store::Store;

use crate::common::{fast_policy, status, Fixture, ScriptedTransport, SITE_ID};

/// Deploy the template (0.5), then an override (0.8); returns both history ids
async fn deploy_twice(fixture: &Fixture) -> (u64, u64) {
    let first = fixture.app.deployer.deploy(DeployRequest::new(SITE_ID)).await.unwrap();
    fixture
        .store
        .update_site_overrides(SITE_ID, Detector::Nudenet, json!({ "detection_threshold": 0.8 }))
        .await
        .unwrap();
    let second = fixture.app.deployer.deploy(DeployRequest::new(SITE_ID)).await.unwrap();
    (first.history_id.unwrap(), second.history_id.unwrap())
}

#[tokio::test]
async fn test_rollback_without_history_makes_no_remote_call() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;

    let err = fixture.app.rollback.rollback(SITE_ID, None).await.unwrap_err();

    assert!(matches!(err, EngineError::NotFound(_)));
    assert!(fixture.transport.calls().is_empty());
}

#[tokio::test]
async fn test_rollback_with_only_current_entry_is_not_found() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;
    fixture.app.deployer.deploy(DeployRequest::new(SITE_ID)).await.unwrap();
    let sent = fixture.transport.calls().len();

    let err = fixture.app.rollback.rollback(SITE_ID, None).await.unwrap_err();

    assert!(matches!(err, EngineError::NotFound(_)));
    assert_eq!(fixture.transport.calls().len(), sent);
}

#[tokio::test]
async fn test_rollback_restores_previous_config() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;
    let (first, second) = deploy_twice(&fixture).await;
    assert_eq!(
        fixture.transport.last_body(Method::POST, "/config/nudenet").unwrap()["default_threshold"],
        json!(80.0)
    );

    let result = fixture.app.rollback.rollback(SITE_ID, None).await.unwrap();

    assert!(result.success);
    assert_eq!(result.restored_from, first);
    assert_eq!(result.rolled_back, Some(second));
    assert_eq!(
        fixture.transport.last_body(Method::POST, "/config/nudenet").unwrap()["default_threshold"],
        json!(50.0)
    );

    let restored = fixture
        .store
        .get_history(result.history_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    let original = fixture.store.get_history(first).await.unwrap().unwrap();
    assert_eq!(restored.restored_from, Some(first));
    assert_eq!(restored.config_digest, original.config_digest);

    let superseded = fixture.store.get_history(second).await.unwrap().unwrap();
    assert!(superseded.rolled_back_at.is_some());
}

#[tokio::test]
async fn test_rollback_to_explicit_entry() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;
    let (first, _) = deploy_twice(&fixture).await;

    let result = fixture.app.rollback.rollback(SITE_ID, Some(first)).await.unwrap();
    assert!(result.success);
    assert_eq!(result.restored_from, first);
}

#[tokio::test]
async fn test_rollback_to_entry_of_another_site_is_not_found() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;
    let (first, _) = deploy_twice(&fixture).await;

    let err = fixture.app.rollback.rollback(7, Some(first)).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn test_failed_rollback_keeps_current_entry() {
    let transport = ScriptedTransport::healthy();
    let fixture = Fixture::new(transport.clone(), fast_policy()).await;
    let (_, second) = deploy_twice(&fixture).await;
    transport.set(Method::POST, "/config/nudenet", status(500));

    let result = fixture.app.rollback.rollback(SITE_ID, None).await.unwrap();

    assert!(!result.success);
    assert!(result.error.is_some());
    assert!(result.history_id.is_none());
    let current = fixture.store.get_history(second).await.unwrap().unwrap();
    assert!(current.rolled_back_at.is_none());
    // A rollback is a single attempt
    assert_eq!(fixture.store.list_deployments(SITE_ID).await.unwrap().len(), 3);
}
