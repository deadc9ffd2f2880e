//! Durable results log
//!
//! One [`ResultRecord`] per distinct `(experiment name, param signature)`,
//! overwritten on every completed or timed-out attempt — last write wins, no
//! history. Records are held in a [`KvLog`] under sub-namespaced keys
//! (`"{name}/{signature}"`), so they survive process restarts by replay.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::KvLog;
use crate::Result;

/// Sentinel duration for attempts that never produced a measurement.
pub const RUN_TIME_SENTINEL: f64 = -1.0;

/// Persisted outcome of one experiment attempt.
///
/// Serialized with camelCase field names (`runTimeSeconds`), the wire shape
/// scrape consumers already know.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultRecord {
    success: bool,
    run_time_seconds: f64,
    params: serde_json::Map<String, serde_json::Value>,
    timestamp: DateTime<Utc>,
}

impl ResultRecord {
    /// Record a completed attempt with its measured duration in seconds.
    #[must_use]
    pub fn success(
        run_time_seconds: f64,
        params: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            success: true,
            run_time_seconds,
            params,
            timestamp: Utc::now(),
        }
    }

    /// Record a failed or timed-out attempt (sentinel duration).
    #[must_use]
    pub fn failed(params: serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            success: false,
            run_time_seconds: RUN_TIME_SENTINEL,
            params,
            timestamp: Utc::now(),
        }
    }

    /// Whether the attempt completed its measured phase.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.success
    }

    /// Measured duration in seconds, or [`RUN_TIME_SENTINEL`].
    #[must_use]
    pub const fn run_time_seconds(&self) -> f64 {
        self.run_time_seconds
    }

    /// The parametrisation this attempt ran with.
    #[must_use]
    pub const fn params(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.params
    }

    /// When the record was written.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Durable store of result records, opened once per process.
#[derive(Debug)]
pub struct ResultsLog {
    kv: KvLog,
}

impl ResultsLog {
    /// Open (or create) the results log at `path`, replaying any existing
    /// records.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the backing log.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let kv = KvLog::new(path);
        kv.ready().await?;
        Ok(Self { kv })
    }

    fn key(name: &str, signature: &str) -> String {
        format!("{name}/{signature}")
    }

    /// Overwrite the record for `(name, signature)`.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the backing log.
    pub async fn put(&self, name: &str, signature: &str, record: &ResultRecord) -> Result<()> {
        self.kv
            .put(&Self::key(name, signature), serde_json::to_value(record)?)
            .await
    }

    /// Read the record for `(name, signature)`.
    ///
    /// # Errors
    ///
    /// Propagates storage errors, or a JSON error if the stored record does
    /// not decode as a [`ResultRecord`].
    pub async fn get(&self, name: &str, signature: &str) -> Result<Option<ResultRecord>> {
        let Some(value) = self.kv.get(&Self::key(name, signature)).await? else {
            return Ok(None);
        };
        Ok(Some(serde_json::from_value(value)?))
    }

    /// Stream every stored entry as `(name, signature, raw value)` in key
    /// order. Decoding the value is left to the caller so one malformed
    /// record cannot abort a scrape.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the backing log.
    pub async fn read_all(&self) -> Result<Vec<(String, String, serde_json::Value)>> {
        let mut out = Vec::new();
        for (key, value) in self.kv.entries().await? {
            let Some((name, signature)) = key.split_once('/') else {
                warn!(%key, "skipping results entry with malformed key");
                continue;
            };
            out.push((name.to_string(), signature.to_string(), value));
        }
        Ok(out)
    }

    /// Close the backing log. Idempotent.
    ///
    /// # Errors
    ///
    /// Propagates the final flush error, if any.
    pub async fn close(&self) -> Result<()> {
        self.kv.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block_params() -> serde_json::Map<String, serde_json::Value> {
        let mut params = serde_json::Map::new();
        params.insert("nrBlocks".into(), json!(10));
        params.insert("blockByteSize".into(), json!(100));
        params
    }

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = ResultsLog::open(dir.path().join("results"))
            .await
            .expect("open");

        let record = ResultRecord::success(12.345, block_params());
        log.put("write", "nrBlocks=10_blockByteSize=100", &record)
            .await
            .expect("put");

        let loaded = log
            .get("write", "nrBlocks=10_blockByteSize=100")
            .await
            .expect("get")
            .expect("record");
        assert!(loaded.is_success());
        assert!((loaded.run_time_seconds() - 12.345).abs() < f64::EPSILON);
        assert_eq!(loaded.params(), &block_params());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_only_latest() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = ResultsLog::open(dir.path().join("results"))
            .await
            .expect("open");

        log.put("write", "sig", &ResultRecord::failed(block_params()))
            .await
            .expect("put");
        log.put("write", "sig", &ResultRecord::success(3.0, block_params()))
            .await
            .expect("put");

        let loaded = log.get("write", "sig").await.expect("get").expect("record");
        assert!(loaded.is_success());
        assert_eq!(log.read_all().await.expect("read_all").len(), 1);
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results");

        {
            let log = ResultsLog::open(&path).await.expect("open");
            log.put("read", "sig", &ResultRecord::success(1.5, block_params()))
                .await
                .expect("put");
            log.close().await.expect("close");
        }

        let reopened = ResultsLog::open(&path).await.expect("reopen");
        let loaded = reopened
            .get("read", "sig")
            .await
            .expect("get")
            .expect("record");
        assert!((loaded.run_time_seconds() - 1.5).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_distinct_signatures_do_not_collide() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log = ResultsLog::open(dir.path().join("results"))
            .await
            .expect("open");

        log.put("write", "nrBlocks=10_blockByteSize=10", &ResultRecord::failed(block_params()))
            .await
            .expect("put");
        log.put(
            "write",
            "nrBlocks=10_blockByteSize=100",
            &ResultRecord::success(2.0, block_params()),
        )
        .await
        .expect("put");

        let all = log.read_all().await.expect("read_all");
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|(name, _, _)| name == "write"));
    }

    #[test]
    fn test_record_serializes_camel_case() {
        let record = ResultRecord::success(2.5, block_params());
        let value = serde_json::to_value(&record).expect("to_value");
        assert!(value.get("runTimeSeconds").is_some());
        assert!(value.get("params").is_some());
        assert!(value.get("timestamp").is_some());
    }
}
