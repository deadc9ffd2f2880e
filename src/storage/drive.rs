//! Path→blob store over an append-only log

use std::path::PathBuf;

use dashmap::DashMap;

use crate::storage::AppendLog;
use crate::Result;

/// Blob store addressed by path, for the drive experiments.
///
/// Blobs live in an append-only log; the path index is in memory only, so a
/// drive is scoped to one experiment attempt (which is all the harness
/// needs — drives live inside a private storage scope).
#[derive(Debug)]
pub struct BlobDrive {
    log: AppendLog,
    index: DashMap<String, u64>,
}

impl BlobDrive {
    /// Create a handle for the drive rooted at `dir`.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            log: AppendLog::new(dir.into().join("blobs")),
            index: DashMap::new(),
        }
    }

    /// Open the backing log. Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the backing log.
    pub async fn ready(&self) -> Result<()> {
        self.log.ready().await
    }

    /// Store `blob` under `path`, overwriting any previous blob.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the backing log.
    pub async fn put(&self, path: &str, blob: &[u8]) -> Result<()> {
        let at = self.log.append(blob).await?;
        self.index.insert(path.to_string(), at);
        Ok(())
    }

    /// Read the blob stored under `path`.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the backing log.
    pub async fn get(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let Some(at) = self.index.get(path).map(|entry| *entry.value()) else {
            return Ok(None);
        };
        self.log.get(at).await
    }

    /// Number of stored blobs.
    #[must_use]
    pub fn blob_count(&self) -> usize {
        self.index.len()
    }

    /// Close the backing log. Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates the final flush error, if any.
    pub async fn close(&self) -> Result<()> {
        self.log.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_and_get_blob() {
        let dir = tempfile::tempdir().expect("tempdir");
        let drive = BlobDrive::new(dir.path());
        drive.ready().await.expect("ready");

        drive.put("/blob0.txt", b"hello").await.expect("put");
        assert_eq!(
            drive.get("/blob0.txt").await.expect("get"),
            Some(b"hello".to_vec())
        );
        assert_eq!(drive.get("/missing").await.expect("get"), None);
        assert_eq!(drive.blob_count(), 1);
    }

    #[tokio::test]
    async fn test_overwrite_returns_latest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let drive = BlobDrive::new(dir.path());
        drive.ready().await.expect("ready");

        drive.put("/b", b"one").await.expect("put");
        drive.put("/b", b"two").await.expect("put");
        assert_eq!(drive.get("/b").await.expect("get"), Some(b"two".to_vec()));
        assert_eq!(drive.blob_count(), 1);
    }
}
