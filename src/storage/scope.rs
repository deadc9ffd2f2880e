//! Private per-attempt storage scope

use std::path::{Path, PathBuf};

use crate::Result;

/// A private, non-shared scratch directory owned by one experiment instance.
///
/// Each attempt gets a fresh scope and the scope is released (removed) when
/// the instance closes, so no state leaks between attempts.
#[derive(Debug)]
pub struct StorageScope {
    root: PathBuf,
}

impl StorageScope {
    /// Create the scope directory (and any missing parents).
    ///
    /// # Errors
    ///
    /// Returns an IO error if the directory cannot be created.
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Root directory of the scope.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Remove the scope directory and everything under it.
    ///
    /// # Errors
    ///
    /// Returns an IO error if removal fails; an already-missing directory is
    /// not an error.
    pub async fn release(self) -> Result<()> {
        match tokio::fs::remove_dir_all(&self.root).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
