//! Rollback to the last known-good configuration

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::deploy::deployer::{DeployTarget, ResilientDeployer};
use crate::errors::EngineError;
use crate::models::history::{HistoryEntry, HistoryStatus};

/// Result of a rollback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResult {
    pub site_id: u64,
    pub success: bool,
    /// History entry that was redeployed
    pub restored_from: u64,
    /// Entry superseded by the rollback, if any
    #[serde(default)]
    pub rolled_back: Option<u64>,
    /// New history entry for the restored state
    #[serde(default)]
    pub history_id: Option<u64>,
    #[serde(default)]
    pub deployment_id: Option<u64>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub notes: Vec<String>,
}

/// Redeploys history snapshots through a single attempt
pub struct RollbackManager {
    deployer: Arc<ResilientDeployer>,
}

impl RollbackManager {
    pub fn new(deployer: Arc<ResilientDeployer>) -> Self {
        Self { deployer }
    }

    /// Pick the entry to restore.
    ///
    /// Without an explicit target this is the newest successful entry older
    /// than the current one whose config differs from it; with no such entry
    /// there is nothing safe to restore and `NotFound` is returned.
    pub async fn select_target(
        &self,
        site_id: u64,
        target_history_id: Option<u64>,
    ) -> Result<(HistoryEntry, Option<HistoryEntry>), EngineError> {
        let history = self.deployer.store().list_history(site_id).await?;
        let current = history.iter().find(|h| h.rolled_back_at.is_none()).cloned();

        let target = match target_history_id {
            Some(id) => {
                let entry = self
                    .deployer
                    .store()
                    .get_history(id)
                    .await?
                    .filter(|h| h.site_id == site_id)
                    .ok_or_else(|| EngineError::NotFound(format!("history entry {} for site {}", id, site_id)))?;
                if entry.status != HistoryStatus::Success {
                    return Err(EngineError::ValidationError(format!(
                        "history entry {} was not a successful deployment",
                        id
                    )));
                }
                entry
            }
            None => {
                let current_id = current.as_ref().map(|c| c.id);
                let current_digest = current.as_ref().map(|c| c.config_digest.as_str());
                history
                    .iter()
                    .filter(|h| h.status == HistoryStatus::Success && h.rolled_back_at.is_none())
                    .filter(|h| Some(h.id) != current_id && current_id.is_none_or(|c| h.id < c))
                    .find(|h| Some(h.config_digest.as_str()) != current_digest)
                    .cloned()
                    .ok_or_else(|| {
                        EngineError::NotFound(format!("no earlier successful configuration for site {}", site_id))
                    })?
            }
        };

        let current = current.filter(|c| c.id != target.id);
        Ok((target, current))
    }

    /// Roll a site back. Performs no remote call when no target exists.
    pub async fn rollback(&self, site_id: u64, target_history_id: Option<u64>) -> Result<RollbackResult, EngineError> {
        let (target_entry, current) = self.select_target(site_id, target_history_id).await?;

        let store = self.deployer.store();
        let site = store
            .get_site(site_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("site {}", site_id)))?;
        let server = store.get_server(site.server_id).await?.ok_or_else(|| {
            EngineError::ValidationError(format!("site {} references unknown server {}", site_id, site.server_id))
        })?;
        let detectors = ResilientDeployer::detectors_for(&server, target_entry.deployment_type)?;

        info!(
            "Rolling back site {} to history entry {} (version {})",
            site_id, target_entry.id, target_entry.config_version
        );

        let target = DeployTarget {
            site,
            server,
            config: target_entry.config.clone(),
        };
        let report = self
            .deployer
            .deploy_once(&target, target_entry.deployment_type, &detectors, false, 1)
            .await;

        let mut result = RollbackResult {
            site_id,
            success: report.success,
            restored_from: target_entry.id,
            rolled_back: None,
            history_id: None,
            deployment_id: Some(report.record.id),
            error: report.error().map(str::to_string),
            notes: report.notes.clone(),
        };

        if !report.success {
            warn!("Rollback of site {} failed: {:?}", site_id, result.error);
            return Ok(result);
        }

        if let Some(current) = current {
            match store.mark_rolled_back(current.id, Utc::now()).await {
                Ok(()) => result.rolled_back = Some(current.id),
                Err(e) => error!("Failed to mark history entry {} rolled back: {}", current.id, e),
            }
        }

        let applied = self
            .deployer
            .apply_success(&target, target_entry.deployment_type, Some(target_entry.id))
            .await;
        result.history_id = applied.history_id;

        info!("Site {} restored from history entry {}", site_id, target_entry.id);
        Ok(result)
    }
}
