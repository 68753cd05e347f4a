//! Worker loop tests

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future;
use http::Method;

use modsync::deploy::deployer::DeployRequest;
use modsync::models::queue::QueueStatus;
use modsync::storage::store::Store;
use modsync::workers::{drift_monitor, sweeper};

use crate::common::{fast_policy, options, Fixture, ScriptedTransport, SITE_ID};

#[test]
fn test_sweeper_processes_queue_until_shutdown() {
    tokio_test::block_on(async {
        let transport = ScriptedTransport::offline();
        let mut options = options(fast_policy());
        options.deployer.queue.initial_delay = Duration::ZERO;
        let fixture = Fixture::with_options(transport.clone(), options).await;

        let outcome = fixture.app.deployer.deploy(DeployRequest::new(SITE_ID)).await.unwrap();
        assert!(outcome.queued);
        transport.set(Method::GET, "/health", crate::common::ok(serde_json::json!({ "status": "ok" })));

        let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
        let shutdown = Box::pin(async move {
            let _ = stop_rx.wait_for(|stop| *stop).await;
        });

        // Every sleep returns at once; shutdown fires from the second one on
        let sleeps = Arc::new(AtomicUsize::new(0));
        let counter = sleeps.clone();
        let sleep_fn = move |_: Duration| {
            if counter.fetch_add(1, Ordering::SeqCst) >= 1 {
                stop_tx.send_replace(true);
            }
            future::ready(())
        };

        sweeper::run(&sweeper::Options::default(), &fixture.app.queue, sleep_fn, shutdown).await;

        assert!(sleeps.load(Ordering::SeqCst) >= 2);
        let entry = fixture
            .store
            .get_queue_entry(outcome.queue_entry_id.unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(entry.status, QueueStatus::Completed);
        assert_eq!(transport.count(Method::POST, "/config/nudenet"), 1);
    });
}

#[test]
fn test_drift_monitor_stops_before_first_check() {
    tokio_test::block_on(async {
        let fixture = Fixture::new(ScriptedTransport::healthy(), fast_policy()).await;

        drift_monitor::run(
            &drift_monitor::Options::default(),
            &fixture.app.reconciler,
            |_| future::pending::<()>(),
            Box::pin(future::ready(())),
        )
        .await;

        assert!(fixture.transport.calls().is_empty());
        assert!(fixture.store.list_drift_logs(SITE_ID).await.unwrap().is_empty());
    });
}
