//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::config::translate::Translator;
use crate::deploy::deployer::ResilientDeployer;
use crate::deploy::queue::DeploymentQueue;
use crate::deploy::rollback::RollbackManager;
use crate::drift::comparator::Comparator;
use crate::errors::EngineError;
use crate::health::prober::HealthProber;
use crate::http::client::{HttpTransport, Transport};
use crate::server::state::ServerState;
use crate::storage::memory::MemoryStore;
use crate::storage::store::Store;
use crate::sync::reconciler::Reconciler;

/// Main application state: every component, explicitly wired
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub transport: Arc<dyn Transport>,
    pub translator: Translator,
    pub prober: Arc<HealthProber>,
    pub deployer: Arc<ResilientDeployer>,
    pub queue: Arc<DeploymentQueue>,
    pub rollback: Arc<RollbackManager>,
    pub reconciler: Arc<Reconciler>,
}

impl AppState {
    /// Initialize application state from the data directory
    pub async fn init(options: &AppOptions) -> Result<Self, EngineError> {
        info!("Initializing application state...");

        options.layout.setup().await?;
        let store: Arc<dyn Store> = Arc::new(MemoryStore::open(options.layout.store_file()).await?);
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new()?);

        Ok(Self::with_components(options, store, transport))
    }

    /// Wire components around a given store and transport
    pub fn with_components(options: &AppOptions, store: Arc<dyn Store>, transport: Arc<dyn Transport>) -> Self {
        let translator = Translator::new(options.translator.clone());
        let prober = Arc::new(HealthProber::new(transport.clone(), options.deployer.timeouts.clone()));

        let deployer = Arc::new(ResilientDeployer::new(
            transport.clone(),
            prober.clone(),
            store.clone(),
            translator.clone(),
            options.deployer.clone(),
        ));
        let queue = Arc::new(DeploymentQueue::new(deployer.clone()));
        let rollback = Arc::new(RollbackManager::new(deployer.clone()));
        let reconciler = Arc::new(Reconciler::new(
            store.clone(),
            transport.clone(),
            Comparator::new(translator.clone(), &options.drift),
            options.deployer.timeouts.clone(),
        ));

        Self {
            store,
            transport,
            translator,
            prober,
            deployer,
            queue,
            rollback,
            reconciler,
        }
    }

    /// State for the admin HTTP server
    pub fn server_state(&self) -> ServerState {
        ServerState::new(
            self.store.clone(),
            self.translator.clone(),
            self.deployer.clone(),
            self.queue.clone(),
            self.rollback.clone(),
            self.reconciler.clone(),
        )
    }

    /// Shutdown application state
    pub async fn shutdown(&self) -> Result<(), EngineError> {
        info!("Shutting down application state...");
        Ok(())
    }
}
