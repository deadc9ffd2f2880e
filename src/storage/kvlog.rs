//! Ordered key→value store over an append-only log
//!
//! Every put appends one JSON frame `{key, value}` to the backing log; the
//! key index maps each key to its last frame, so a single-key overwrite is
//! one atomic append and last write wins. `ready()` rebuilds the index by
//! replaying the log, which is what makes the results log survive restarts.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::storage::AppendLog;
use crate::Result;

#[derive(Debug, Serialize, Deserialize)]
struct EntryFrame {
    key: String,
    value: serde_json::Value,
}

/// Durable ordered key→value store.
#[derive(Debug)]
pub struct KvLog {
    log: AppendLog,
    index: Mutex<BTreeMap<String, u64>>,
}

impl KvLog {
    /// Create a handle for the store backed by the log file at `path`.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            log: AppendLog::new(path),
            index: Mutex::new(BTreeMap::new()),
        }
    }

    /// Open the backing log and rebuild the key index by replay.
    ///
    /// Frames that fail to decode are logged and skipped; they only cost
    /// the replay the entry they would have indexed.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the backing log.
    pub async fn ready(&self) -> Result<()> {
        self.log.ready().await?;
        let mut index = self.index.lock().await;
        index.clear();
        let len = self.log.len().await;
        for i in 0..len {
            let Some(bytes) = self.log.get(i).await? else {
                continue;
            };
            match serde_json::from_slice::<EntryFrame>(&bytes) {
                Ok(frame) => {
                    index.insert(frame.key, i);
                }
                Err(e) => warn!(frame = i, "skipping undecodable kv frame during replay: {e}"),
            }
        }
        Ok(())
    }

    /// Write `value` under `key`, overwriting any previous value.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the backing log.
    pub async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let mut index = self.index.lock().await;
        let frame = serde_json::to_vec(&EntryFrame {
            key: key.to_string(),
            value,
        })?;
        let at = self.log.append(&frame).await?;
        index.insert(key.to_string(), at);
        Ok(())
    }

    /// Read the last value written under `key`.
    ///
    /// # Errors
    ///
    /// Propagates storage errors, or a JSON error if the stored frame does
    /// not decode.
    pub async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let at = { self.index.lock().await.get(key).copied() };
        let Some(at) = at else { return Ok(None) };
        let Some(bytes) = self.log.get(at).await? else {
            return Ok(None);
        };
        let frame: EntryFrame = serde_json::from_slice(&bytes)?;
        Ok(Some(frame.value))
    }

    /// Store version: 1 for an empty store, incremented by every put
    /// (including overwrites).
    pub async fn version(&self) -> u64 {
        self.log.len().await + 1
    }

    /// Snapshot of all entries in key order.
    ///
    /// Entries whose stored frame no longer decodes are logged and skipped
    /// rather than failing the whole read.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the backing log.
    pub async fn entries(&self) -> Result<Vec<(String, serde_json::Value)>> {
        let snapshot: Vec<(String, u64)> = {
            let index = self.index.lock().await;
            index.iter().map(|(k, &v)| (k.clone(), v)).collect()
        };
        let mut out = Vec::with_capacity(snapshot.len());
        for (key, at) in snapshot {
            let Some(bytes) = self.log.get(at).await? else {
                continue;
            };
            match serde_json::from_slice::<EntryFrame>(&bytes) {
                Ok(frame) => out.push((key, frame.value)),
                Err(e) => warn!(%key, "skipping undecodable kv entry: {e}"),
            }
        }
        Ok(out)
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
    use serde_json::json;

    #[tokio::test]
    async fn test_put_get_last_write_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = KvLog::new(dir.path().join("kv"));
        kv.ready().await.expect("ready");

        kv.put("a", json!({"n": 1})).await.expect("put");
        kv.put("a", json!({"n": 2})).await.expect("put");

        assert_eq!(kv.get("a").await.expect("get"), Some(json!({"n": 2})));
        assert_eq!(kv.get("missing").await.expect("get"), None);
    }

    #[tokio::test]
    async fn test_version_counts_every_put() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = KvLog::new(dir.path().join("kv"));
        kv.ready().await.expect("ready");

        assert_eq!(kv.version().await, 1);
        kv.put("a", json!(1)).await.expect("put");
        kv.put("a", json!(2)).await.expect("put");
        assert_eq!(kv.version().await, 3);
    }

    #[tokio::test]
    async fn test_replay_restores_index() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("kv");

        let kv = KvLog::new(&path);
        kv.ready().await.expect("ready");
        kv.put("x", json!("old")).await.expect("put");
        kv.put("y", json!("kept")).await.expect("put");
        kv.put("x", json!("new")).await.expect("put");
        kv.close().await.expect("close");

        let reopened = KvLog::new(&path);
        reopened.ready().await.expect("ready");
        assert_eq!(reopened.get("x").await.expect("get"), Some(json!("new")));
        assert_eq!(reopened.get("y").await.expect("get"), Some(json!("kept")));
    }

    #[tokio::test]
    async fn test_entries_ordered_by_key() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kv = KvLog::new(dir.path().join("kv"));
        kv.ready().await.expect("ready");

        kv.put("b", json!(2)).await.expect("put");
        kv.put("a", json!(1)).await.expect("put");
        kv.put("c", json!(3)).await.expect("put");

        let keys: Vec<String> = kv
            .entries()
            .await
            .expect("entries")
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
