//! Data directory layout

use std::path::PathBuf;

use crate::errors::EngineError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

const SETTINGS_FILE: &str = "settings.json";
const STORE_FILE: &str = "store.json";
const LOGS_DIR: &str = "logs";

/// Where settings, the store snapshot and log files live
#[derive(Debug, Clone)]
pub struct StorageLayout {
    root: Dir,
}

impl StorageLayout {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: Dir::new(base_dir),
        }
    }

    pub fn root(&self) -> &Dir {
        &self.root
    }

    /// `settings.json`; optional, defaults apply when absent
    pub fn settings_file(&self) -> File {
        self.root.file(SETTINGS_FILE)
    }

    /// Snapshot of sites, servers, history, queue and drift log
    pub fn store_file(&self) -> File {
        self.root.file(STORE_FILE)
    }

    pub fn logs_dir(&self) -> Dir {
        self.root.subdir(LOGS_DIR)
    }

    /// Create the root and log directories
    pub async fn setup(&self) -> Result<(), EngineError> {
        self.root.ensure().await?;
        self.logs_dir().ensure().await
    }
}

impl Default for StorageLayout {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        let base_dir = PathBuf::from("/etc/modsync");

        #[cfg(not(target_os = "linux"))]
        let base_dir = std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".modsync");

        Self::new(base_dir)
    }
}
