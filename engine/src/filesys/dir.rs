//! Directory handles

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::debug;

use crate::errors::EngineError;
use crate::filesys::file::File;

/// A directory under the engine's data root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dir {
    path: PathBuf,
}

impl Dir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn exists(&self) -> bool {
        fs::metadata(&self.path).await.map(|m| m.is_dir()).unwrap_or(false)
    }

    /// Create the directory and its parents unless it already exists.
    ///
    /// Fails with a storage error when the path exists but is not a directory.
    pub async fn ensure(&self) -> Result<(), EngineError> {
        if self.exists().await {
            return Ok(());
        }
        if fs::metadata(&self.path).await.is_ok() {
            return Err(EngineError::StorageError(format!(
                "{} exists and is not a directory",
                self.path.display()
            )));
        }
        fs::create_dir_all(&self.path).await?;
        debug!("Created directory {}", self.path.display());
        Ok(())
    }

    pub fn subdir(&self, name: &str) -> Dir {
        Dir::new(self.path.join(name))
    }

    pub fn file(&self, name: &str) -> File {
        File::new(self.path.join(name))
    }
}
