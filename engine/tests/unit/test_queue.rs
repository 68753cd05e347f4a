//! Deployment queue sweep tests

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use http::Method;

use modsync::app::state::AppState;
use modsync::deploy::deployer::DeployRequest;
use modsync::models::deployment::DeploymentType;
use modsync::models::history::HistoryStatus;
use modsync::models::queue::QueueStatus;
use modsync::models::site::SiteDeploymentStatus;
use modsync::models::server::ModerationServer;
use modsync::storage::memory::MemoryStore;
use modsync::storage::store::Store;

use crate::common::{
    fast_policy, ok, options, seed, status, FailingQueueStore, Fixture, ScriptedTransport, SERVER_ID, SITE_ID,
};

fn later() -> chrono::DateTime<Utc> {
    Utc::now() + ChronoDuration::hours(2)
}

async fn enqueue(fixture: &Fixture, priority: i32) -> u64 {
    let target = fixture.app.deployer.load_target(SITE_ID).await.unwrap();
    fixture
        .app
        .deployer
        .enqueue(&target, DeploymentType::Full, priority, "server offline")
        .await
        .unwrap()
}

#[tokio::test]
async fn test_queued_entry_is_not_due_immediately() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;
    enqueue(&fixture, 0).await;

    let report = fixture.app.queue.sweep(Utc::now()).await.unwrap();

    assert_eq!(report.examined, 0);
    assert_eq!(fixture.transport.writes(), 0);
}

#[tokio::test]
async fn test_sweep_deploys_once_server_returns() {
    let transport = ScriptedTransport::offline();
    let fixture = Fixture::new(transport.clone(), fast_policy()).await;

    let outcome = fixture.app.deployer.deploy(DeployRequest::new(SITE_ID)).await.unwrap();
    assert!(outcome.queued);

    transport.set(Method::GET, "/health", ok(serde_json::json!({ "status": "ok" })));
    let report = fixture.app.queue.sweep(later()).await.unwrap();

    assert_eq!(report.examined, 1);
    assert_eq!(report.claimed, 1);
    assert_eq!(report.completed, 1);

    let entry = fixture
        .store
        .get_queue_entry(outcome.queue_entry_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(entry.status, QueueStatus::Completed);
    assert!(entry.completed_at.is_some());

    let history = fixture.store.list_history(SITE_ID).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].status, HistoryStatus::Success);

    let site = fixture.store.get_site(SITE_ID).await.unwrap().unwrap();
    assert_eq!(site.deployment_status, SiteDeploymentStatus::Deployed);

    // Completed entries are never picked up again
    let again = fixture.app.queue.sweep(later()).await.unwrap();
    assert_eq!(again.examined, 0);
}

#[tokio::test]
async fn test_concurrent_sweeps_process_each_entry_once() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;
    for _ in 0..3 {
        enqueue(&fixture, 0).await;
    }

    let now = later();
    let (first, second) = tokio::join!(fixture.app.queue.sweep(now), fixture.app.queue.sweep(now));
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.claimed + second.claimed, 3);
    assert_eq!(first.completed + second.completed, 3);
    assert_eq!(fixture.transport.count(Method::POST, "/config/nudenet"), 3);
    assert!(fixture
        .store
        .list_queue()
        .await
        .unwrap()
        .iter()
        .all(|e| e.status == QueueStatus::Completed));
}

#[tokio::test]
async fn test_sweep_order_follows_priority() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;
    let low = enqueue(&fixture, 0).await;
    let high = enqueue(&fixture, 10).await;

    let due = fixture.store.due_queue_entries(later(), 10).await.unwrap();
    let ids: Vec<u64> = due.iter().map(|e| e.id).collect();
    assert_eq!(ids, vec![high, low]);
}

#[tokio::test]
async fn test_offline_target_is_rescheduled_then_failed() {
    let transport = ScriptedTransport::offline();
    let mut options = crate::common::options(fast_policy());
    options.deployer.queue.default_max_retries = 2;
    let fixture = Fixture::with_options(transport, options).await;
    let id = enqueue(&fixture, 0).await;

    let now = later();
    let report = fixture.app.queue.sweep(now).await.unwrap();
    assert_eq!(report.rescheduled, 1);

    let entry = fixture.store.get_queue_entry(id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Pending);
    assert_eq!(entry.retry_count, 1);
    // Scheduled from the sweep's clock, not the wall clock
    assert_eq!(entry.next_retry_at, now + ChronoDuration::minutes(10));
    assert!(entry.last_error.is_some());
    assert!(entry.claim_expires_at.is_none());

    let report = fixture.app.queue.sweep(entry.next_retry_at).await.unwrap();
    assert_eq!(report.failed, 1);

    let entry = fixture.store.get_queue_entry(id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Failed);
    assert_eq!(entry.retry_count, entry.max_retries);
    assert_eq!(fixture.transport.writes(), 0);
}

#[tokio::test]
async fn test_failed_last_attempt_marks_site_failed() {
    let transport = ScriptedTransport::healthy();
    transport.set(Method::POST, "/config/nudenet", status(500));
    let mut options = crate::common::options(fast_policy());
    options.deployer.queue.default_max_retries = 1;
    let fixture = Fixture::with_options(transport, options).await;
    let id = enqueue(&fixture, 0).await;

    let report = fixture.app.queue.sweep(later()).await.unwrap();

    assert_eq!(report.failed, 1);
    let entry = fixture.store.get_queue_entry(id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Failed);
    let site = fixture.store.get_site(SITE_ID).await.unwrap().unwrap();
    assert_eq!(site.deployment_status, SiteDeploymentStatus::Failed);
    assert!(fixture.store.list_history(SITE_ID).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_queue_deploys_the_snapshot_not_current_overrides() {
    let transport = ScriptedTransport::healthy();
    let fixture = Fixture::new(transport.clone(), fast_policy()).await;
    enqueue(&fixture, 0).await;

    fixture
        .store
        .update_site_overrides(
            SITE_ID,
            "nudenet".parse().unwrap(),
            serde_json::json!({ "detection_threshold": 0.9 }),
        )
        .await
        .unwrap();

    fixture.app.queue.sweep(later()).await.unwrap();

    let body = transport.last_body(Method::POST, "/config/nudenet").unwrap();
    assert_eq!(body["default_threshold"], serde_json::json!(50.0));
}

#[tokio::test]
async fn test_storage_error_releases_claim_and_sweep_continues() {
    let inner = Arc::new(MemoryStore::new());
    seed(inner.as_ref(), ModerationServer::new(SERVER_ID, "edge", "10.0.0.7", 5000)).await;
    let store = FailingQueueStore::new(inner.clone());
    let transport = ScriptedTransport::healthy();
    let app = AppState::with_components(&options(fast_policy()), store.clone(), transport.clone());

    let target = app.deployer.load_target(SITE_ID).await.unwrap();
    let first = app
        .deployer
        .enqueue(&target, DeploymentType::Full, 10, "server offline")
        .await
        .unwrap();
    let second = app
        .deployer
        .enqueue(&target, DeploymentType::Full, 0, "server offline")
        .await
        .unwrap();

    // Recording the first entry's result fails
    store.fail_queue_updates(1);
    let now = later();
    let report = app.queue.sweep(now).await.unwrap();

    assert_eq!(report.claimed, 2);
    assert_eq!(report.completed, 1);
    assert_eq!(report.errored, 1);

    let released = inner.get_queue_entry(first).await.unwrap().unwrap();
    assert_eq!(released.status, QueueStatus::Pending);
    assert!(released.claim_expires_at.is_none());
    assert!(released.last_error.as_deref().is_some_and(|e| e.contains("disk full")));
    let done = inner.get_queue_entry(second).await.unwrap().unwrap();
    assert_eq!(done.status, QueueStatus::Completed);

    // The released entry is picked up by the next sweep
    let report = app.queue.sweep(now).await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(
        inner.get_queue_entry(first).await.unwrap().unwrap().status,
        QueueStatus::Completed
    );
    assert_eq!(transport.count(Method::POST, "/config/nudenet"), 3);
}

#[tokio::test]
async fn test_lapsed_claim_is_swept_again() {
    let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;
    let id = enqueue(&fixture, 0).await;

    // A sweeper claims the entry and never finishes
    let now = later();
    let lease_until = now + ChronoDuration::minutes(10);
    assert!(fixture.store.claim_queue_entry(id, now, lease_until).await.unwrap());

    let report = fixture.app.queue.sweep(now + ChronoDuration::minutes(5)).await.unwrap();
    assert_eq!(report.examined, 0);
    assert_eq!(fixture.transport.writes(), 0);

    let report = fixture.app.queue.sweep(lease_until).await.unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.completed, 1);

    let entry = fixture.store.get_queue_entry(id).await.unwrap().unwrap();
    assert_eq!(entry.status, QueueStatus::Completed);
    assert!(entry.claim_expires_at.is_none());
}
