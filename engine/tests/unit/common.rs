//! Shared fixtures: a scripted transport and a seeded in-memory store

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use http::Method;
use serde_json::{json, Value};

use modsync::app::options::AppOptions;
use modsync::app::state::AppState;
use modsync::deploy::fsm::RetryPolicy;
use modsync::errors::EngineError;
use modsync::http::client::{RemoteRequest, RemoteResponse, Transport};
use modsync::models::deployment::DeploymentRecord;
use modsync::models::drift::DriftLogEntry;
use modsync::models::history::HistoryEntry;
use modsync::models::queue::QueueEntry;
use modsync::models::server::{ModerationServer, ServerStatus};
use modsync::models::site::{Detector, IndustryTemplate, SiteConfiguration, SiteDeploymentStatus};
use modsync::storage::memory::MemoryStore;
use modsync::storage::store::Store;

pub const SITE_ID: u64 = 1;
pub const SERVER_ID: u64 = 1;

/// A request the transport saw
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
}

type Route = (Method, String);

/// Transport answering from per-route scripts, then per-route defaults
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<Route, VecDeque<RemoteResponse>>>,
    defaults: Mutex<HashMap<Route, RemoteResponse>>,
    delays: Mutex<HashMap<Route, Duration>>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    /// Healthy server answering every endpoint with 200
    pub fn healthy() -> Arc<Self> {
        let transport = Arc::new(Self::default());
        transport.set(Method::GET, "/health", ok(json!({ "status": "healthy" })));
        transport.set(Method::GET, "/config/nudenet", ok(json!({})));
        transport.set(Method::GET, "/config/blip", ok(json!({})));
        transport.set(Method::POST, "/config/nudenet", ok(json!({ "success": true })));
        transport.set(Method::POST, "/config/blip", ok(json!({ "success": true })));
        transport.set(Method::POST, "/restart", ok(json!({ "success": true })));
        transport
    }

    /// Server whose health check cannot be reached
    pub fn offline() -> Arc<Self> {
        let transport = Self::healthy();
        transport.set(Method::GET, "/health", unreachable());
        transport
    }

    /// Answer every later request on the route with `response`
    pub fn set(&self, method: Method, path: &str, response: RemoteResponse) {
        self.defaults
            .lock()
            .unwrap()
            .insert((method, path.to_string()), response);
    }

    /// Answer the next requests on the route with `responses`, in order
    pub fn script(&self, method: Method, path: &str, responses: Vec<RemoteResponse>) {
        self.scripts
            .lock()
            .unwrap()
            .entry((method, path.to_string()))
            .or_default()
            .extend(responses);
    }

    /// Hold every later response on the route for `delay`
    pub fn slow(&self, method: Method, path: &str, delay: Duration) {
        self.delays
            .lock()
            .unwrap()
            .insert((method, path.to_string()), delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.method == method && c.path == path)
            .count()
    }

    /// Number of config writes and restarts sent
    pub fn writes(&self) -> usize {
        self.calls().iter().filter(|c| c.method == Method::POST).count()
    }

    pub fn last_body(&self, method: Method, path: &str) -> Option<Value> {
        self.calls()
            .into_iter()
            .rev()
            .find(|c| c.method == method && c.path == path)
            .and_then(|c| c.body)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(&self, request: RemoteRequest) -> RemoteResponse {
        let path = url::Url::parse(&request.url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| request.url.clone());
        let route = (request.method.clone(), path.clone());

        self.calls.lock().unwrap().push(Call {
            method: request.method.clone(),
            path,
            body: request.body.clone(),
        });

        let delay = self.delays.lock().unwrap().get(&route).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(response) = self.scripts.lock().unwrap().get_mut(&route).and_then(VecDeque::pop_front) {
            return response;
        }
        self.defaults
            .lock()
            .unwrap()
            .get(&route)
            .cloned()
            .unwrap_or_else(|| status(404))
    }
}

pub fn ok(body: Value) -> RemoteResponse {
    RemoteResponse::from_status(200, body, Duration::from_millis(5))
}

pub fn status(code: u16) -> RemoteResponse {
    RemoteResponse::from_status(code, json!({ "error": format!("status {}", code) }), Duration::from_millis(5))
}

pub fn unreachable() -> RemoteResponse {
    RemoteResponse::failure("connection refused", Duration::from_millis(5))
}

/// Fast retry policy for tests
pub fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(200),
        deadline: Some(Duration::from_secs(10)),
    }
}

pub fn options(policy: RetryPolicy) -> AppOptions {
    let mut options = AppOptions::default();
    options.deployer.policy = policy;
    options
}

/// Server 1 with template 1 (threshold 0.5) and site 1 using it
pub async fn seed(store: &dyn Store, server: ModerationServer) {
    store.upsert_server(server).await.unwrap();
    store
        .upsert_template(IndustryTemplate {
            id: 1,
            name: "social".to_string(),
            nudenet_config: json!({ "detection_threshold": 0.5 }),
            blip_config: json!({ "child_keywords": ["child", "minor"], "risk_multiplier": 1 }),
        })
        .await
        .unwrap();

    let mut site = SiteConfiguration::new(SITE_ID, "gallery", SERVER_ID);
    site.template_id = Some(1);
    store.upsert_site(site).await.unwrap();
}

pub struct Fixture {
    pub store: Arc<MemoryStore>,
    pub transport: Arc<ScriptedTransport>,
    pub app: AppState,
}

impl Fixture {
    pub async fn new(transport: Arc<ScriptedTransport>, policy: RetryPolicy) -> Self {
        Self::with_options(transport, options(policy)).await
    }

    pub async fn with_options(transport: Arc<ScriptedTransport>, options: AppOptions) -> Self {
        let store = Arc::new(MemoryStore::new());
        seed(store.as_ref(), ModerationServer::new(SERVER_ID, "edge", "10.0.0.7", 5000)).await;
        let app = AppState::with_components(&options, store.clone(), transport.clone());
        Self { store, transport, app }
    }
}

/// Store whose next `n` queue updates fail, otherwise a `MemoryStore`
pub struct FailingQueueStore {
    inner: Arc<MemoryStore>,
    failures: AtomicUsize,
}

impl FailingQueueStore {
    pub fn new(inner: Arc<MemoryStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            failures: AtomicUsize::new(0),
        })
    }

    pub fn fail_queue_updates(&self, n: usize) {
        self.failures.store(n, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for FailingQueueStore {
    async fn upsert_site(&self, site: SiteConfiguration) -> Result<(), EngineError> {
        self.inner.upsert_site(site).await
    }
    async fn get_site(&self, site_id: u64) -> Result<Option<SiteConfiguration>, EngineError> {
        self.inner.get_site(site_id).await
    }
    async fn list_sites(&self) -> Result<Vec<SiteConfiguration>, EngineError> {
        self.inner.list_sites().await
    }
    async fn update_site_overrides(
        &self,
        site_id: u64,
        detector: Detector,
        overrides: Value,
    ) -> Result<SiteConfiguration, EngineError> {
        self.inner.update_site_overrides(site_id, detector, overrides).await
    }
    async fn set_site_status(&self, site_id: u64, status: SiteDeploymentStatus) -> Result<(), EngineError> {
        self.inner.set_site_status(site_id, status).await
    }
    async fn record_site_deployed(&self, site_id: u64, at: DateTime<Utc>) -> Result<u64, EngineError> {
        self.inner.record_site_deployed(site_id, at).await
    }
    async fn upsert_template(&self, template: IndustryTemplate) -> Result<(), EngineError> {
        self.inner.upsert_template(template).await
    }
    async fn get_template(&self, template_id: u64) -> Result<Option<IndustryTemplate>, EngineError> {
        self.inner.get_template(template_id).await
    }
    async fn upsert_server(&self, server: ModerationServer) -> Result<(), EngineError> {
        self.inner.upsert_server(server).await
    }
    async fn get_server(&self, server_id: u64) -> Result<Option<ModerationServer>, EngineError> {
        self.inner.get_server(server_id).await
    }
    async fn list_servers(&self) -> Result<Vec<ModerationServer>, EngineError> {
        self.inner.list_servers().await
    }
    async fn update_server_status(
        &self,
        server_id: u64,
        status: ServerStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        self.inner.update_server_status(server_id, status, checked_at).await
    }
    async fn insert_deployment(&self, record: DeploymentRecord) -> Result<u64, EngineError> {
        self.inner.insert_deployment(record).await
    }
    async fn update_deployment(&self, record: &DeploymentRecord) -> Result<(), EngineError> {
        self.inner.update_deployment(record).await
    }
    async fn last_deployment_for_site(&self, site_id: u64) -> Result<Option<DeploymentRecord>, EngineError> {
        self.inner.last_deployment_for_site(site_id).await
    }
    async fn list_deployments(&self, site_id: u64) -> Result<Vec<DeploymentRecord>, EngineError> {
        self.inner.list_deployments(site_id).await
    }
    async fn insert_history(&self, entry: HistoryEntry) -> Result<u64, EngineError> {
        self.inner.insert_history(entry).await
    }
    async fn get_history(&self, history_id: u64) -> Result<Option<HistoryEntry>, EngineError> {
        self.inner.get_history(history_id).await
    }
    async fn list_history(&self, site_id: u64) -> Result<Vec<HistoryEntry>, EngineError> {
        self.inner.list_history(site_id).await
    }
    async fn mark_rolled_back(&self, history_id: u64, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.inner.mark_rolled_back(history_id, at).await
    }
    async fn enqueue(&self, entry: QueueEntry) -> Result<u64, EngineError> {
        self.inner.enqueue(entry).await
    }
    async fn get_queue_entry(&self, entry_id: u64) -> Result<Option<QueueEntry>, EngineError> {
        self.inner.get_queue_entry(entry_id).await
    }
    async fn due_queue_entries(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<QueueEntry>, EngineError> {
        self.inner.due_queue_entries(now, limit).await
    }
    async fn claim_queue_entry(
        &self,
        entry_id: u64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        self.inner.claim_queue_entry(entry_id, now, lease_until).await
    }
    async fn update_queue_entry(&self, entry: &QueueEntry) -> Result<(), EngineError> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EngineError::StorageError("disk full".to_string()));
        }
        self.inner.update_queue_entry(entry).await
    }
    async fn list_queue(&self) -> Result<Vec<QueueEntry>, EngineError> {
        self.inner.list_queue().await
    }
    async fn insert_drift_log(&self, entry: DriftLogEntry) -> Result<u64, EngineError> {
        self.inner.insert_drift_log(entry).await
    }
    async fn list_drift_logs(&self, site_id: u64) -> Result<Vec<DriftLogEntry>, EngineError> {
        self.inner.list_drift_logs(site_id).await
    }
}
