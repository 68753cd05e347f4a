//! Drift reconciliation between intended and live server configuration

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use crate::deploy::deployer::load_target;
use crate::drift::comparator::Comparator;
use crate::drift::severity::classify;
use crate::errors::EngineError;
use crate::http::client::{RemoteResponse, Transport};
use crate::http::moderation::{ModerationClient, Timeouts};
use crate::models::drift::{DriftLogEntry, DriftResult, Severity};
use crate::models::site::Detector;
use crate::storage::store::Store;

/// Reconciler run bookkeeping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileState {
    pub last_run_at: DateTime<Utc>,
    pub last_completed_at: DateTime<Utc>,
    pub sites_checked: u64,
    pub drifted: u64,
    pub err_streak: u32,
}

impl Default for ReconcileState {
    fn default() -> Self {
        Self {
            last_run_at: DateTime::<Utc>::MIN_UTC,
            last_completed_at: DateTime::<Utc>::MIN_UTC,
            sites_checked: 0,
            drifted: 0,
            err_streak: 0,
        }
    }
}

/// Reads live configs, compares them and records drift log entries
pub struct Reconciler {
    store: Arc<dyn Store>,
    transport: Arc<dyn Transport>,
    comparator: Comparator,
    timeouts: Timeouts,
    state: RwLock<ReconcileState>,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Store>,
        transport: Arc<dyn Transport>,
        comparator: Comparator,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            store,
            transport,
            comparator,
            timeouts,
            state: RwLock::new(ReconcileState::default()),
        }
    }

    pub async fn state(&self) -> ReconcileState {
        self.state.read().await.clone()
    }

    /// Compare one site's effective config against its server
    pub async fn check_site(&self, site_id: u64) -> Result<DriftLogEntry, EngineError> {
        let target = load_target(self.store.as_ref(), site_id).await?;
        let client = ModerationClient::new(self.transport.as_ref(), &target.server, &self.timeouts);

        let (nudenet_live, blip_live) = futures::join!(
            client.read_config(Detector::Nudenet),
            client.read_config(Detector::Blip),
        );

        let nudenet = self.compare(
            Detector::Nudenet,
            target.server.supports_nudenet,
            target.config.block(Detector::Nudenet),
            &nudenet_live,
        );
        let blip = self.compare(
            Detector::Blip,
            target.server.supports_blip,
            target.config.block(Detector::Blip),
            &blip_live,
        );

        let known_limitation = match self.store.last_deployment_for_site(site_id).await {
            Ok(record) => record.map(|r| r.blip_write_unsupported).unwrap_or(false),
            Err(e) => {
                error!("Failed to load last deployment for site {}: {}", site_id, e);
                false
            }
        };
        let severity = classify(&[&nudenet, &blip], known_limitation);

        let mut entry = DriftLogEntry {
            id: 0,
            site_id,
            server_id: target.server.id,
            config_version: target.site.config_version,
            nudenet_match: nudenet.overall_match,
            blip_match: blip.overall_match,
            differences: nudenet
                .differences
                .iter()
                .chain(blip.differences.iter())
                .cloned()
                .collect(),
            nudenet,
            blip,
            severity,
            known_limitation,
            checked_at: Utc::now(),
        };

        match self.store.insert_drift_log(entry.clone()).await {
            Ok(id) => entry.id = id,
            Err(e) => error!("Failed to record drift log for site {}: {}", site_id, e),
        }

        if entry.severity >= Severity::High {
            warn!(
                "Site {} drift is {} ({} differences)",
                site_id,
                entry.severity.as_str(),
                entry.differences.len()
            );
        } else if entry.overall_match() {
            debug!("Site {} matches its server", site_id);
        } else {
            info!(
                "Site {} drift is {} ({} differences)",
                site_id,
                entry.severity.as_str(),
                entry.differences.len()
            );
        }

        Ok(entry)
    }

    /// Check every site; per-site failures are logged and skipped
    pub async fn check_all(&self) -> Result<Vec<DriftLogEntry>, EngineError> {
        {
            let mut state = self.state.write().await;
            state.last_run_at = Utc::now();
        }

        let sites = match self.store.list_sites().await {
            Ok(sites) => sites,
            Err(e) => {
                self.state.write().await.err_streak += 1;
                return Err(e);
            }
        };

        let mut entries = Vec::with_capacity(sites.len());
        let mut failures = 0u32;
        for site in sites {
            match self.check_site(site.id).await {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    failures += 1;
                    error!("Drift check for site {} failed: {}", site.id, e);
                }
            }
        }

        let drifted = entries.iter().filter(|e| !e.overall_match()).count() as u64;
        {
            let mut state = self.state.write().await;
            state.last_completed_at = Utc::now();
            state.sites_checked += entries.len() as u64;
            state.drifted += drifted;
            state.err_streak = if failures == 0 { 0 } else { state.err_streak + 1 };
        }

        info!("Drift check: {} sites checked, {} drifted", entries.len(), drifted);
        Ok(entries)
    }

    fn compare(
        &self,
        detector: Detector,
        supported: bool,
        expected: &serde_json::Value,
        live: &RemoteResponse,
    ) -> DriftResult {
        if !supported {
            return self.comparator.skipped(detector);
        }
        if !live.ok {
            return self.comparator.unreadable(detector, &live.describe());
        }
        self.comparator.compare(detector, expected, &live.body)
    }
}
