//! In-memory store with an optional JSON snapshot

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::errors::EngineError;
use crate::filesys::file::File;
use crate::models::deployment::DeploymentRecord;
use crate::models::drift::DriftLogEntry;
use crate::models::history::HistoryEntry;
use crate::models::queue::{QueueEntry, QueueStatus};
use crate::models::server::{ModerationServer, ServerStatus};
use crate::models::site::{Detector, IndustryTemplate, SiteConfiguration, SiteDeploymentStatus};
use crate::storage::store::Store;

/// Per-table id sequences
#[derive(Debug, Default, Serialize, Deserialize)]
struct Sequences {
    deployment: u64,
    history: u64,
    queue: u64,
    drift: u64,
}

fn next(seq: &mut u64) -> u64 {
    *seq += 1;
    *seq
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    #[serde(default)]
    sites: BTreeMap<u64, SiteConfiguration>,
    #[serde(default)]
    templates: BTreeMap<u64, IndustryTemplate>,
    #[serde(default)]
    servers: BTreeMap<u64, ModerationServer>,
    #[serde(default)]
    deployments: BTreeMap<u64, DeploymentRecord>,
    #[serde(default)]
    history: BTreeMap<u64, HistoryEntry>,
    #[serde(default)]
    queue: BTreeMap<u64, QueueEntry>,
    #[serde(default)]
    drift_logs: BTreeMap<u64, DriftLogEntry>,
    #[serde(default)]
    sequences: Sequences,
}

impl State {
    fn site_mut(&mut self, site_id: u64) -> Result<&mut SiteConfiguration, EngineError> {
        self.sites
            .get_mut(&site_id)
            .ok_or_else(|| EngineError::NotFound(format!("site {}", site_id)))
    }
}

/// Mutex-guarded store; every mutation is written through to the snapshot file
pub struct MemoryStore {
    state: Mutex<State>,
    snapshot: Option<File>,
}

impl MemoryStore {
    /// Volatile store
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            snapshot: None,
        }
    }

    /// Store backed by a JSON snapshot, loaded if it exists
    pub async fn open(snapshot: File) -> Result<Self, EngineError> {
        let state = if snapshot.exists().await {
            let state: State = snapshot
                .read_json()
                .await
                .map_err(|e| EngineError::StorageError(format!("Failed to load store snapshot: {}", e)))?;
            info!(
                "Loaded store snapshot: {} sites, {} servers, {} queued",
                state.sites.len(),
                state.servers.len(),
                state.queue.len()
            );
            state
        } else {
            State::default()
        };

        Ok(Self {
            state: Mutex::new(state),
            snapshot: Some(snapshot),
        })
    }

    async fn persist(&self, state: &State) -> Result<(), EngineError> {
        if let Some(file) = &self.snapshot {
            file.write_json(state)
                .await
                .map_err(|e| EngineError::StorageError(format!("Failed to write snapshot: {}", e)))?;
            debug!("Store snapshot written to {}", file.path().display());
        }
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn upsert_site(&self, site: SiteConfiguration) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        state.sites.insert(site.id, site);
        self.persist(&state).await
    }

    async fn get_site(&self, site_id: u64) -> Result<Option<SiteConfiguration>, EngineError> {
        Ok(self.state.lock().await.sites.get(&site_id).cloned())
    }

    async fn list_sites(&self) -> Result<Vec<SiteConfiguration>, EngineError> {
        Ok(self.state.lock().await.sites.values().cloned().collect())
    }

    async fn update_site_overrides(
        &self,
        site_id: u64,
        detector: Detector,
        overrides: Value,
    ) -> Result<SiteConfiguration, EngineError> {
        let mut state = self.state.lock().await;
        let site = state.site_mut(site_id)?;
        match detector {
            Detector::Nudenet => site.nudenet_overrides = overrides,
            Detector::Blip => site.blip_overrides = overrides,
        }
        site.config_version += 1;
        let updated = site.clone();
        self.persist(&state).await?;
        Ok(updated)
    }

    async fn set_site_status(&self, site_id: u64, status: SiteDeploymentStatus) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        state.site_mut(site_id)?.deployment_status = status;
        self.persist(&state).await
    }

    async fn record_site_deployed(&self, site_id: u64, at: DateTime<Utc>) -> Result<u64, EngineError> {
        let mut state = self.state.lock().await;
        let site = state.site_mut(site_id)?;
        site.deployment_status = SiteDeploymentStatus::Deployed;
        site.config_version += 1;
        site.last_deployed_at = Some(at);
        let version = site.config_version;
        self.persist(&state).await?;
        Ok(version)
    }

    async fn upsert_template(&self, template: IndustryTemplate) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        state.templates.insert(template.id, template);
        self.persist(&state).await
    }

    async fn get_template(&self, template_id: u64) -> Result<Option<IndustryTemplate>, EngineError> {
        Ok(self.state.lock().await.templates.get(&template_id).cloned())
    }

    async fn upsert_server(&self, server: ModerationServer) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        state.servers.insert(server.id, server);
        self.persist(&state).await
    }

    async fn get_server(&self, server_id: u64) -> Result<Option<ModerationServer>, EngineError> {
        Ok(self.state.lock().await.servers.get(&server_id).cloned())
    }

    async fn list_servers(&self) -> Result<Vec<ModerationServer>, EngineError> {
        Ok(self.state.lock().await.servers.values().cloned().collect())
    }

    async fn update_server_status(
        &self,
        server_id: u64,
        status: ServerStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        let server = state
            .servers
            .get_mut(&server_id)
            .ok_or_else(|| EngineError::NotFound(format!("server {}", server_id)))?;
        server.status = status;
        server.last_health_check = Some(checked_at);
        self.persist(&state).await
    }

    async fn insert_deployment(&self, mut record: DeploymentRecord) -> Result<u64, EngineError> {
        let mut state = self.state.lock().await;
        let id = next(&mut state.sequences.deployment);
        record.id = id;
        state.deployments.insert(id, record);
        self.persist(&state).await?;
        Ok(id)
    }

    async fn update_deployment(&self, record: &DeploymentRecord) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        match state.deployments.get_mut(&record.id) {
            Some(existing) if existing.is_terminal() => {
                return Err(EngineError::StorageError(format!(
                    "deployment {} is already terminal",
                    record.id
                )))
            }
            Some(existing) => *existing = record.clone(),
            None => return Err(EngineError::NotFound(format!("deployment {}", record.id))),
        }
        self.persist(&state).await
    }

    async fn last_deployment_for_site(&self, site_id: u64) -> Result<Option<DeploymentRecord>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .deployments
            .values()
            .rev()
            .find(|d| d.site_id == site_id)
            .cloned())
    }

    async fn list_deployments(&self, site_id: u64) -> Result<Vec<DeploymentRecord>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .deployments
            .values()
            .rev()
            .filter(|d| d.site_id == site_id)
            .cloned()
            .collect())
    }

    async fn insert_history(&self, mut entry: HistoryEntry) -> Result<u64, EngineError> {
        let mut state = self.state.lock().await;
        let id = next(&mut state.sequences.history);
        entry.id = id;
        state.history.insert(id, entry);
        self.persist(&state).await?;
        Ok(id)
    }

    async fn get_history(&self, history_id: u64) -> Result<Option<HistoryEntry>, EngineError> {
        Ok(self.state.lock().await.history.get(&history_id).cloned())
    }

    async fn list_history(&self, site_id: u64) -> Result<Vec<HistoryEntry>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .history
            .values()
            .rev()
            .filter(|h| h.site_id == site_id)
            .cloned()
            .collect())
    }

    async fn mark_rolled_back(&self, history_id: u64, at: DateTime<Utc>) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        let entry = state
            .history
            .get_mut(&history_id)
            .ok_or_else(|| EngineError::NotFound(format!("history entry {}", history_id)))?;
        entry.rolled_back_at = Some(at);
        self.persist(&state).await
    }

    async fn enqueue(&self, mut entry: QueueEntry) -> Result<u64, EngineError> {
        let mut state = self.state.lock().await;
        let id = next(&mut state.sequences.queue);
        entry.id = id;
        state.queue.insert(id, entry);
        self.persist(&state).await?;
        Ok(id)
    }

    async fn get_queue_entry(&self, entry_id: u64) -> Result<Option<QueueEntry>, EngineError> {
        Ok(self.state.lock().await.queue.get(&entry_id).cloned())
    }

    async fn due_queue_entries(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<QueueEntry>, EngineError> {
        let state = self.state.lock().await;
        let mut due: Vec<QueueEntry> = state.queue.values().filter(|e| e.is_due(now)).cloned().collect();
        due.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        due.truncate(limit);
        Ok(due)
    }

    async fn claim_queue_entry(
        &self,
        entry_id: u64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let mut state = self.state.lock().await;
        let claimed = match state.queue.get_mut(&entry_id) {
            Some(entry) if entry.is_due(now) => {
                entry.status = QueueStatus::Processing;
                entry.claim_expires_at = Some(lease_until);
                true
            }
            _ => false,
        };
        if claimed {
            self.persist(&state).await?;
        }
        Ok(claimed)
    }

    async fn update_queue_entry(&self, entry: &QueueEntry) -> Result<(), EngineError> {
        let mut state = self.state.lock().await;
        if !state.queue.contains_key(&entry.id) {
            return Err(EngineError::NotFound(format!("queue entry {}", entry.id)));
        }
        state.queue.insert(entry.id, entry.clone());
        self.persist(&state).await
    }

    async fn list_queue(&self) -> Result<Vec<QueueEntry>, EngineError> {
        Ok(self.state.lock().await.queue.values().cloned().collect())
    }

    async fn insert_drift_log(&self, mut entry: DriftLogEntry) -> Result<u64, EngineError> {
        let mut state = self.state.lock().await;
        let id = next(&mut state.sequences.drift);
        entry.id = id;
        state.drift_logs.insert(id, entry);
        self.persist(&state).await?;
        Ok(id)
    }

    async fn list_drift_logs(&self, site_id: u64) -> Result<Vec<DriftLogEntry>, EngineError> {
        let state = self.state.lock().await;
        Ok(state
            .drift_logs
            .values()
            .rev()
            .filter(|d| d.site_id == site_id)
            .cloned()
            .collect())
    }
}
