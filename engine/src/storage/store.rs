//! Persistence seam for sites, servers, deployments, history, queue and drift logs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::errors::EngineError;
use crate::models::deployment::DeploymentRecord;
use crate::models::drift::DriftLogEntry;
use crate::models::history::HistoryEntry;
use crate::models::queue::QueueEntry;
use crate::models::server::{ModerationServer, ServerStatus};
use crate::models::site::{Detector, IndustryTemplate, SiteConfiguration, SiteDeploymentStatus};

/// Storage operations used by the engine.
///
/// Inserts assign ids; the id carried by the argument is ignored.
#[async_trait]
pub trait Store: Send + Sync {
    // sites
    async fn upsert_site(&self, site: SiteConfiguration) -> Result<(), EngineError>;
    async fn get_site(&self, site_id: u64) -> Result<Option<SiteConfiguration>, EngineError>;
    async fn list_sites(&self) -> Result<Vec<SiteConfiguration>, EngineError>;

    /// Replace one detector's overrides and bump the config version
    async fn update_site_overrides(
        &self,
        site_id: u64,
        detector: Detector,
        overrides: Value,
    ) -> Result<SiteConfiguration, EngineError>;

    async fn set_site_status(&self, site_id: u64, status: SiteDeploymentStatus) -> Result<(), EngineError>;

    /// Mark deployed, bump the config version; returns the new version
    async fn record_site_deployed(&self, site_id: u64, at: DateTime<Utc>) -> Result<u64, EngineError>;

    // templates
    async fn upsert_template(&self, template: IndustryTemplate) -> Result<(), EngineError>;
    async fn get_template(&self, template_id: u64) -> Result<Option<IndustryTemplate>, EngineError>;

    // servers
    async fn upsert_server(&self, server: ModerationServer) -> Result<(), EngineError>;
    async fn get_server(&self, server_id: u64) -> Result<Option<ModerationServer>, EngineError>;
    async fn list_servers(&self) -> Result<Vec<ModerationServer>, EngineError>;
    async fn update_server_status(
        &self,
        server_id: u64,
        status: ServerStatus,
        checked_at: DateTime<Utc>,
    ) -> Result<(), EngineError>;

    // deployment attempts
    async fn insert_deployment(&self, record: DeploymentRecord) -> Result<u64, EngineError>;
    async fn update_deployment(&self, record: &DeploymentRecord) -> Result<(), EngineError>;
    async fn last_deployment_for_site(&self, site_id: u64) -> Result<Option<DeploymentRecord>, EngineError>;
    async fn list_deployments(&self, site_id: u64) -> Result<Vec<DeploymentRecord>, EngineError>;

    // history
    async fn insert_history(&self, entry: HistoryEntry) -> Result<u64, EngineError>;
    async fn get_history(&self, history_id: u64) -> Result<Option<HistoryEntry>, EngineError>;
    /// Newest first
    async fn list_history(&self, site_id: u64) -> Result<Vec<HistoryEntry>, EngineError>;
    async fn mark_rolled_back(&self, history_id: u64, at: DateTime<Utc>) -> Result<(), EngineError>;

    // queue
    async fn enqueue(&self, entry: QueueEntry) -> Result<u64, EngineError>;
    async fn get_queue_entry(&self, entry_id: u64) -> Result<Option<QueueEntry>, EngineError>;
    /// Entries due at `now` (see `QueueEntry::is_due`), highest priority then oldest first
    async fn due_queue_entries(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<QueueEntry>, EngineError>;
    /// Move a due entry to `processing`, held until `lease_until`; false when
    /// another sweeper holds it
    async fn claim_queue_entry(
        &self,
        entry_id: u64,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, EngineError>;
    async fn update_queue_entry(&self, entry: &QueueEntry) -> Result<(), EngineError>;
    async fn list_queue(&self) -> Result<Vec<QueueEntry>, EngineError>;

    // drift log
    async fn insert_drift_log(&self, entry: DriftLogEntry) -> Result<u64, EngineError>;
    /// Newest first
    async fn list_drift_logs(&self, site_id: u64) -> Result<Vec<DriftLogEntry>, EngineError>;
}
