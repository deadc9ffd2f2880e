//! Bee-write experiment: write entries into a fresh key-value log

use std::path::Path;

use async_trait::async_trait;

use crate::cancel::CancelFlag;
use crate::experiment::{EntryParams, Workload};
use crate::storage::KvLog;
use crate::{Error, Result};

/// Writes `nr_entries` entries of `entry_byte_size` bytes into a fresh
/// key-value log.
pub struct BeeWriteWorkload {
    params: EntryParams,
    node: String,
    kv: KvLog,
}

impl BeeWriteWorkload {
    /// Build the workload rooted at `dir`.
    #[must_use]
    pub fn new(dir: &Path, params: EntryParams) -> Self {
        Self {
            params,
            node: "a".repeat(usize::try_from(params.entry_byte_size).unwrap_or(usize::MAX)),
            kv: KvLog::new(dir.join("bee")),
        }
    }
}

#[async_trait]
impl Workload for BeeWriteWorkload {
    async fn open(&mut self) -> Result<()> {
        self.kv.ready().await
    }

    async fn setup(&mut self, _cancel: &CancelFlag) -> Result<()> {
        Ok(())
    }

    async fn run_measured(&mut self, cancel: &CancelFlag) -> Result<()> {
        for i in 0..self.params.nr_entries {
            self.kv
                .put(&format!("key{i}"), serde_json::Value::from(self.node.clone()))
                .await?;
            if cancel.is_cancelled() {
                return Ok(());
            }
        }
        if self.kv.version().await <= 1 {
            return Err(Error::Sanity("no entry was written".into()));
        }
        Ok(())
    }

    async fn teardown(&mut self) -> Result<()> {
        self.kv.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_bee_write_fills_kv_log() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut workload = BeeWriteWorkload::new(
            dir.path(),
            EntryParams {
                nr_entries: 3,
                entry_byte_size: 12,
            },
        );

        let cancel = CancelFlag::new();
        workload.open().await.expect("open");
        workload.run_measured(&cancel).await.expect("run");
        assert_eq!(workload.kv.version().await, 4);
        workload.teardown().await.expect("teardown");
    }

    #[tokio::test]
    async fn test_bee_write_zero_entries_is_a_bug() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut workload = BeeWriteWorkload::new(
            dir.path(),
            EntryParams {
                nr_entries: 0,
                entry_byte_size: 12,
            },
        );

        let cancel = CancelFlag::new();
        workload.open().await.expect("open");
        assert!(workload.run_measured(&cancel).await.is_err());
    }
}
