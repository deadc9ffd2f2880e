//! Drive-get experiment: read back every blob of a pre-filled drive

use std::path::Path;

use async_trait::async_trait;

use crate::cancel::CancelFlag;
use crate::experiment::{BlockParams, Workload};
use crate::storage::BlobDrive;
use crate::{Error, Result};

/// Pre-fills a drive with `nr_blocks` blobs during setup, then measures
/// reading each one back by path.
pub struct DriveGetWorkload {
    params: BlockParams,
    blob: Vec<u8>,
    drive: BlobDrive,
}

impl DriveGetWorkload {
    /// Build the workload rooted at `dir`.
    #[must_use]
    pub fn new(dir: &Path, params: BlockParams) -> Self {
        Self {
            params,
            blob: vec![b'a'; usize::try_from(params.block_byte_size).unwrap_or(usize::MAX)],
            drive: BlobDrive::new(dir),
        }
    }
}

#[async_trait]
impl Workload for DriveGetWorkload {
    async fn open(&mut self) -> Result<()> {
        self.drive.ready().await
    }

    async fn setup(&mut self, cancel: &CancelFlag) -> Result<()> {
        for i in 0..self.params.nr_blocks {
            if cancel.is_cancelled() {
                return Ok(());
            }
            self.drive.put(&format!("/blob{i}.txt"), &self.blob).await?;
        }
        Ok(())
    }

    async fn run_measured(&mut self, cancel: &CancelFlag) -> Result<()> {
        for i in 0..self.params.nr_blocks {
            if cancel.is_cancelled() {
                return Ok(());
            }
            if self.drive.get(&format!("/blob{i}.txt")).await?.is_none() {
                return Err(Error::Sanity(format!("blob {i} missing during get")));
            }
        }
        Ok(())
    }

    async fn teardown(&mut self) -> Result<()> {
        self.drive.close().await
    }
}
