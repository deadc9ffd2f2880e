//! Read-stream download experiment: stream a log from a peer block by block

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::cancel::CancelFlag;
use crate::experiment::{BlockParams, Peer, Workload};
use crate::storage::Testnet;
use crate::{Error, Result};

/// Same topology as the download experiment, but the measured phase drains
/// a read stream instead of materializing a local copy.
pub struct StreamDownloadWorkload {
    dir: PathBuf,
    params: BlockParams,
    testnet: Option<Testnet>,
    creator: Option<Peer>,
    streamer: Option<Peer>,
    key: Option<String>,
}

impl StreamDownloadWorkload {
    /// Build the workload rooted at `dir`.
    #[must_use]
    pub fn new(dir: &Path, params: BlockParams) -> Self {
        Self {
            dir: dir.to_path_buf(),
            params,
            testnet: None,
            creator: None,
            streamer: None,
            key: None,
        }
    }
}

#[async_trait]
impl Workload for StreamDownloadWorkload {
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

        self.streamer = Some(Peer::open(&testnet, self.dir.join("streamer")).await?);
        Ok(())
    }

    async fn run_measured(&mut self, cancel: &CancelFlag) -> Result<()> {
        let streamer = self
            .streamer
            .as_ref()
            .ok_or_else(|| Error::Resource("streamer peer missing".into()))?;
        let key = self
            .key
            .as_ref()
            .ok_or_else(|| Error::Resource("source log key missing".into()))?;
        streamer.stream_log(key, self.params.nr_blocks, cancel).await
    }

    async fn teardown(&mut self) -> Result<()> {
        let mut first_err = None;
        if let Some(creator) = &self.creator {
            if let Err(e) = creator.close().await {
                first_err.get_or_insert(e);
            }
        }
        if let Some(streamer) = &self.streamer {
            if let Err(e) = streamer.close().await {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
