//! Server state

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::translate::Translator;
use crate::deploy::deployer::ResilientDeployer;
use crate::deploy::queue::DeploymentQueue;
use crate::deploy::rollback::RollbackManager;
use crate::storage::store::Store;
use crate::sync::reconciler::Reconciler;

/// Server state shared across handlers
pub struct ServerState {
    pub store: Arc<dyn Store>,
    pub translator: Translator,
    pub deployer: Arc<ResilientDeployer>,
    pub queue: Arc<DeploymentQueue>,
    pub rollback: Arc<RollbackManager>,
    pub reconciler: Arc<Reconciler>,
    pub started_at: DateTime<Utc>,
}

impl ServerState {
    pub fn new(
        store: Arc<dyn Store>,
        translator: Translator,
        deployer: Arc<ResilientDeployer>,
        queue: Arc<DeploymentQueue>,
        rollback: Arc<RollbackManager>,
        reconciler: Arc<Reconciler>,
    ) -> Self {
        Self {
            store,
            translator,
            deployer,
            queue,
            rollback,
            reconciler,
            started_at: Utc::now(),
        }
    }
}
