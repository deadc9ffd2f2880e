//! Download experiment: pull a log from a peer over the swarm

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::cancel::CancelFlag;
use crate::experiment::{BlockParams, Peer, Workload};
use crate::storage::Testnet;
use crate::{Error, Result};

/// Spins up a two-peer testnet during setup (creator fills and announces a
/// log, downloader joins), then measures a range-bounded download of the
/// whole log.
pub struct DownloadWorkload {
    dir: PathBuf,
    params: BlockParams,
    testnet: Option<Testnet>,
    creator: Option<Peer>,
    downloader: Option<Peer>,
    key: Option<String>,
}

impl DownloadWorkload {
    /// Build the workload rooted at `dir`.
    #[must_use]
    pub fn new(dir: &Path, params: BlockParams) -> Self {
        Self {
            dir: dir.to_path_buf(),
            params,
            testnet: None,
            creator: None,
            downloader: None,
            key: None,
        }
    }
}

#[async_trait]
impl Workload for DownloadWorkload {
    async fn open(&mut self) -> Result<()> {
        self.testnet = Some(Testnet::new());
        Ok(())
    }

    async fn setup(&mut self, cancel: &CancelFlag) -> Result<()> {
        let testnet = self
            .testnet
            .as_ref()
            .ok_or_else(|| Error::Resource("testnet is not open".into()))?
            .clone();

        let creator = Peer::open(&testnet, self.dir.join("creator")).await?;
        let block = vec![b'a'; usize::try_from(self.params.block_byte_size).unwrap_or(usize::MAX)];
        let key = creator
            .create_log("core", self.params.nr_blocks, &block, cancel)
            .await?;
        self.creator = Some(creator);
        self.key = Some(key);
        if cancel.is_cancelled() {
            return Ok(());
        }

        self.downloader = Some(Peer::open(&testnet, self.dir.join("downloader")).await?);
        Ok(())
    }

    async fn run_measured(&mut self, cancel: &CancelFlag) -> Result<()> {
        let downloader = self
            .downloader
            .as_ref()
            .ok_or_else(|| Error::Resource("downloader peer missing".into()))?;
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| Error::Resource("source log key missing".into()))?;
        downloader
            .download_log(key, self.params.nr_blocks, false, cancel)
            .await
    }

    async fn teardown(&mut self) -> Result<()> {
        let mut first_err = None;
        if let Some(creator) = &self.creator {
            if let Err(e) = creator.close().await {
                first_err.get_or_insert(e);
            }
        }
        if let Some(downloader) = &self.downloader {
            if let Err(e) = downloader.close().await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_download_end_to_end() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut workload = DownloadWorkload::new(
            dir.path(),
            BlockParams {
                nr_blocks: 6,
                block_byte_size: 24,
            },
        );

        let cancel = CancelFlag::new();
        workload.open().await.expect("open");
        workload.setup(&cancel).await.expect("setup");
        workload.run_measured(&cancel).await.expect("run");
        workload.teardown().await.expect("teardown");
    }

    #[tokio::test]
    async fn test_download_cancelled_setup_skips_downloader() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut workload = DownloadWorkload::new(
            dir.path(),
            BlockParams {
                nr_blocks: 100,
                block_byte_size: 8,
            },
        );

        let cancel = CancelFlag::new();
        cancel.cancel();
        workload.open().await.expect("open");
        workload.setup(&cancel).await.expect("setup");
        assert!(workload.downloader.is_none());
        workload.teardown().await.expect("teardown");
    }
}
