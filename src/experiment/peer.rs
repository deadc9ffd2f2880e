//! Peer helper shared by the download experiments
//!
//! A peer owns a swarm handle and a directory of logs. The creator side
//! fills a log and announces it; the downloader/streamer side joins the
//! topic and pulls the blocks. Shared here so both download kinds use the
//! same plumbing.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::cancel::CancelFlag;
use crate::storage::{AppendLog, DownloadRange, Swarm, Testnet};
use crate::{Error, Result};

/// One peer of an in-process download topology.
pub struct Peer {
    swarm: Swarm,
    testnet: Testnet,
    dir: PathBuf,
    logs: Mutex<Vec<Arc<AppendLog>>>,
}

impl Peer {
    /// Open a peer rooted at `dir`, attached to `testnet`.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the peer directory cannot be created.
    pub async fn open(testnet: &Testnet, dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self {
            swarm: testnet.swarm(),
            testnet: testnet.clone(),
            dir,
            logs: Mutex::new(Vec::new()),
        })
    }

    /// Fill a fresh log with `nr_blocks` copies of `block` and announce it,
    /// returning its topic key.
    ///
    /// Polls `cancel` per append; when cancellation is observed the partial
    /// log is left unannounced and the key is still returned (the attempt
    /// is closing anyway).
    ///
    /// # Errors
    ///
    /// Propagates storage and swarm errors.
    pub async fn create_log(
        &self,
        name: &str,
        nr_blocks: u64,
        block: &[u8],
        cancel: &CancelFlag,
    ) -> Result<String> {
        let key = self.testnet.unique_key(name);
        let log = Arc::new(AppendLog::new(self.dir.join(name)));
        log.ready().await?;
        self.logs.lock().await.push(Arc::clone(&log));

        for _ in 0..nr_blocks {
            if cancel.is_cancelled() {
                return Ok(key);
            }
            log.append(block).await?;
        }

        self.swarm.join_server(&key, &log)?;
        Ok(key)
    }

    /// Download `len` blocks of the log announced under `key` into a local
    /// log, verifying the copy is complete and contiguous.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sanity`] if the local log is non-empty before the
    /// download or incomplete after it, and propagates swarm/storage
    /// errors.
    pub async fn download_log(
        &self,
        key: &str,
        len: u64,
        linear: bool,
        cancel: &CancelFlag,
    ) -> Result<()> {
        let remote = self.swarm.join_client(key)?;
        let local = Arc::new(AppendLog::new(self.dir.join(format!("download-{key}"))));
        local.ready().await?;
        self.logs.lock().await.push(Arc::clone(&local));

        if local.contiguous_len().await != 0 {
            return Err(Error::Sanity(
                "local log contiguous length not 0 before downloading".into(),
            ));
        }

        remote
            .download(
                &local,
                DownloadRange {
                    start: 0,
                    end: len,
                    linear,
                },
                cancel,
            )
            .await?;
        if cancel.is_cancelled() {
            return Ok(());
        }

        if local.len().await != len || local.contiguous_len().await != len {
            return Err(Error::Sanity("did not download all blocks".into()));
        }
        Ok(())
    }

    /// Stream `len` blocks of the log announced under `key`, counting them
    /// without storing anything locally.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Sanity`] if the stream ends early, and propagates
    /// swarm/storage errors.
    pub async fn stream_log(&self, key: &str, len: u64, cancel: &CancelFlag) -> Result<()> {
        let remote = self.swarm.join_client(key)?;
        let mut stream = remote.read_stream(0, len);

        let mut streamed = 0u64;
        while let Some(_block) = stream.next().await? {
            if cancel.is_cancelled() {
                return Ok(());
            }
            streamed += 1;
        }

        if streamed != len {
            return Err(Error::Sanity(format!(
                "streamed {streamed} of {len} blocks"
            )));
        }
        Ok(())
    }

    /// Leave the swarm and close every log this peer opened.
    ///
    /// # Errors
    ///
    /// Propagates the first close error after attempting all logs.
    pub async fn close(&self) -> Result<()> {
        self.swarm.destroy();
        let logs = self.logs.lock().await;
        let mut first_err = None;
        for log in logs.iter() {
            if let Err(e) = log.close().await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
