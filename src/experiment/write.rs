//! Write experiment: append blocks to a fresh log

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::cancel::CancelFlag;
use crate::experiment::{BlockParams, Workload};
use crate::storage::AppendLog;
use crate::{Error, Result};

/// Appends `nr_blocks` blocks of `block_byte_size` bytes to a fresh log,
/// one flushed append per unit of work.
pub struct WriteWorkload {
    dir: PathBuf,
    params: BlockParams,
    block: Vec<u8>,
    log: Option<AppendLog>,
}

impl WriteWorkload {
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
            .ok_or_else(|| Error::Resource("write log is not open".into()))
    }
}

#[async_trait]
impl Workload for WriteWorkload {
    async fn open(&mut self) -> Result<()> {
        let log = AppendLog::new(self.dir.join("core"));
        log.ready().await?;
        self.log = Some(log);
        Ok(())
    }

    async fn setup(&mut self, _cancel: &CancelFlag) -> Result<()> {
        Ok(())
    }

    async fn run_measured(&mut self, cancel: &CancelFlag) -> Result<()> {
        let log = self.log()?;
        for _ in 0..self.params.nr_blocks {
            if cancel.is_cancelled() {
                return Ok(());
            }
            log.append(&self.block).await?;
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
