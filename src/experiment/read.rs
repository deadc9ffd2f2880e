//! Read experiment: read back every block of a pre-filled log

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::cancel::CancelFlag;
use crate::experiment::{BlockParams, Workload};
use crate::storage::AppendLog;
use crate::{Error, Result};

/// Pre-fills a log during setup (untimed), then reads every block back in
/// index order during the measured phase.
pub struct ReadWorkload {
    dir: PathBuf,
    params: BlockParams,
    block: Vec<u8>,
    log: Option<AppendLog>,
}

impl ReadWorkload {
    /// Build the workload rooted at `dir`.
    #[must_use]
    pub fn new(dir: &Path, params: BlockParams) -> Self {
        Self {
            dir: dir.to_path_buf(),
            params,
            block: vec![b'a'; usize::try_from(params.block_byte_size).unwrap_or(usize::MAX)],
            log: None,
        }
    }

    fn log(&self) -> Result<&AppendLog> {
        self.log
            .as_ref()
            .ok_or_else(|| Error::Resource("read log is not open".into()))
    }
}

#[async_trait]
impl Workload for ReadWorkload {
    async fn open(&mut self) -> Result<()> {
        let log = AppendLog::new(self.dir.join("core"));
        log.ready().await?;
        self.log = Some(log);
        Ok(())
    }

    async fn setup(&mut self, cancel: &CancelFlag) -> Result<()> {
        let log = self.log()?;
        for _ in 0..self.params.nr_blocks {
            if cancel.is_cancelled() {
                return Ok(());
            }
            log.append(&self.block).await?;
        }
        Ok(())
    }

    async fn run_measured(&mut self, cancel: &CancelFlag) -> Result<()> {
        let log = self.log()?;
        for i in 0..self.params.nr_blocks {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if log.get(i).await?.is_none() {
                return Err(Error::Sanity(format!("block {i} missing during read")));
            }
        }
        Ok(())
    }

    async fn teardown(&mut self) -> Result<()> {
        if let Some(log) = &self.log {
            log.close().await?;
        }
        Ok(())
    }
}
