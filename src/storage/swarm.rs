//! In-process swarm for the download experiments
//!
//! Models the networking collaborator with the same surface the real thing
//! would have: peers join a topic as server or client, a client join hands
//! back a remote log, and downloads copy blocks one await at a time — the
//! replication suspension point the measured loops poll cancellation on.
//! Everything lives in one process; a `Testnet` is the shared topic
//! registry two swarms rendezvous through.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::cancel::CancelFlag;
use crate::storage::AppendLog;
use crate::{Error, Result};

/// Shared topic registry connecting the swarms of one experiment attempt.
#[derive(Debug, Clone, Default)]
pub struct Testnet {
    topics: Arc<DashMap<String, Arc<AppendLog>>>,
    next_id: Arc<AtomicU64>,
}

impl Testnet {
    /// Create an empty testnet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a swarm attached to this testnet.
    #[must_use]
    pub fn swarm(&self) -> Swarm {
        Swarm {
            topics: Arc::clone(&self.topics),
            served: DashMap::new(),
            destroyed: AtomicBool::new(false),
        }
    }

    /// Derive a topic key that is unique within this testnet.
    #[must_use]
    pub fn unique_key(&self, name: &str) -> String {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        format!("{name}-{id:08x}")
    }
}

/// One peer's handle on the testnet.
#[derive(Debug)]
pub struct Swarm {
    topics: Arc<DashMap<String, Arc<AppendLog>>>,
    served: DashMap<String, ()>,
    destroyed: AtomicBool,
}

impl Swarm {
    /// Announce `log` under `topic` so clients can find it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resource`] if the swarm was destroyed.
    pub fn join_server(&self, topic: &str, log: &Arc<AppendLog>) -> Result<()> {
        self.check_alive()?;
        self.topics.insert(topic.to_string(), Arc::clone(log));
        self.served.insert(topic.to_string(), ());
        Ok(())
    }

    /// Look up the log announced under `topic`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resource`] if the swarm was destroyed or nothing is
    /// announced under `topic`.
    pub fn join_client(&self, topic: &str) -> Result<RemoteLog> {
        self.check_alive()?;
        self.topics
            .get(topic)
            .map(|entry| RemoteLog {
                source: Arc::clone(entry.value()),
            })
            .ok_or_else(|| Error::Resource(format!("no peer serving topic {topic}")))
    }

    /// Leave the testnet, withdrawing every announced topic. Idempotent.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::SeqCst) {
            return;
        }
        for entry in &self.served {
            self.topics.remove(entry.key());
        }
        self.served.clear();
    }

    fn check_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(Error::Resource("swarm already destroyed".into()));
        }
        Ok(())
    }
}

/// Block range requested from a remote peer.
#[derive(Debug, Clone, Copy)]
pub struct DownloadRange {
    /// First block index (inclusive)
    pub start: u64,
    /// Last block index (exclusive)
    pub end: u64,
    /// Request blocks strictly in order. Blocks are fetched in index order
    /// either way; the flag is part of the engine surface.
    pub linear: bool,
}

/// A remote peer's log, reachable through the swarm.
#[derive(Debug)]
pub struct RemoteLog {
    source: Arc<AppendLog>,
}

impl RemoteLog {
    /// Copy `range` from the remote log into `into`, one block per await.
    ///
    /// Polls `cancel` before each block and returns early (with the count
    /// copied so far) once cancellation is observed — soft cancellation,
    /// bounded by one block's latency.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sanity`] if the remote log is missing a block in
    /// the range, or propagates storage errors.
    pub async fn download(
        &self,
        into: &AppendLog,
        range: DownloadRange,
        cancel: &CancelFlag,
    ) -> Result<u64> {
        tracing::debug!(
            start = range.start,
            end = range.end,
            linear = range.linear,
            "starting download"
        );
        let mut copied = 0u64;
        for index in range.start..range.end {
            if cancel.is_cancelled() {
                return Ok(copied);
            }
            let Some(block) = self.source.get(index).await? else {
                return Err(Error::Sanity(format!(
                    "remote log is missing block {index}"
                )));
            };
            into.append(&block).await?;
            copied += 1;
        }
        Ok(copied)
    }

    /// Stream blocks `[start, end)` from the remote log in order.
    #[must_use]
    pub fn read_stream(&self, start: u64, end: u64) -> RemoteReadStream {
        RemoteReadStream {
            source: Arc::clone(&self.source),
            next: start,
            end,
        }
    }
}

/// Cursor yielding blocks of a [`RemoteLog`] in index order.
#[derive(Debug)]
pub struct RemoteReadStream {
    source: Arc<AppendLog>,
    next: u64,
    end: u64,
}

impl RemoteReadStream {
    /// Yield the next block, or `None` once the range is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates read errors from the remote log.
    pub async fn next(&mut self) -> Result<Option<Vec<u8>>> {
        if self.next >= self.end {
            return Ok(None);
        }
        match self.source.get(self.next).await? {
            Some(block) => {
                self.next += 1;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded_log(dir: &std::path::Path, blocks: u64) -> Arc<AppendLog> {
        let log = Arc::new(AppendLog::new(dir.join("source")));
        log.ready().await.expect("ready");
        for i in 0..blocks {
            log.append(format!("block-{i}").as_bytes())
                .await
                .expect("append");
        }
        log
    }

    #[tokio::test]
    async fn test_download_copies_full_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let testnet = Testnet::new();
        let server = testnet.swarm();
        let client = testnet.swarm();

        let source = seeded_log(dir.path(), 5).await;
        server.join_server("core", &source).expect("announce");

        let remote = client.join_client("core").expect("lookup");
        let local = AppendLog::new(dir.path().join("local"));
        local.ready().await.expect("ready");

        let copied = remote
            .download(
                &local,
                DownloadRange {
                    start: 0,
                    end: 5,
                    linear: false,
                },
                &CancelFlag::new(),
            )
            .await
            .expect("download");

        assert_eq!(copied, 5);
        assert_eq!(local.len().await, 5);
        assert_eq!(local.contiguous_len().await, 5);
        assert_eq!(local.get(3).await.expect("get"), Some(b"block-3".to_vec()));
    }

    #[tokio::test]
    async fn test_download_observes_cancellation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let testnet = Testnet::new();
        let server = testnet.swarm();

        let source = seeded_log(dir.path(), 10).await;
        server.join_server("core", &source).expect("announce");

        let remote = testnet.swarm().join_client("core").expect("lookup");
        let local = AppendLog::new(dir.path().join("local"));
        local.ready().await.expect("ready");

        let cancel = CancelFlag::new();
        cancel.cancel();
        let copied = remote
            .download(
                &local,
                DownloadRange {
                    start: 0,
                    end: 10,
                    linear: true,
                },
                &cancel,
            )
            .await
            .expect("download");
        assert_eq!(copied, 0);
    }

    #[tokio::test]
    async fn test_destroyed_swarm_rejects_joins() {
        let testnet = Testnet::new();
        let swarm = testnet.swarm();
        swarm.destroy();
        swarm.destroy();
        assert!(swarm.join_client("anything").is_err());
    }

    #[tokio::test]
    async fn test_destroy_withdraws_topics() {
        let dir = tempfile::tempdir().expect("tempdir");
        let testnet = Testnet::new();
        let server = testnet.swarm();
        let source = seeded_log(dir.path(), 1).await;
        server.join_server("core", &source).expect("announce");

        server.destroy();
        assert!(testnet.swarm().join_client("core").is_err());
    }
}
