//! Drive-write experiment: write files into a fresh drive

use std::path::Path;

use async_trait::async_trait;

use crate::cancel::CancelFlag;
use crate::experiment::{FileParams, Workload};
use crate::storage::BlobDrive;
use crate::{Error, Result};

/// Writes `nr_files` files of `file_byte_size` bytes into a fresh drive.
pub struct DriveWriteWorkload {
    params: FileParams,
    file: Vec<u8>,
    drive: BlobDrive,
}

impl DriveWriteWorkload {
    /// Build the workload rooted at `dir`.
    #[must_use]
    pub fn new(dir: &Path, params: FileParams) -> Self {
        Self {
            params,
            file: vec![b'a'; usize::try_from(params.file_byte_size).unwrap_or(usize::MAX)],
            drive: BlobDrive::new(dir),
        }
    }
}

#[async_trait]
impl Workload for DriveWriteWorkload {
    async fn open(&mut self) -> Result<()> {
        self.drive.ready().await
    }

    async fn setup(&mut self, _cancel: &CancelFlag) -> Result<()> {
        Ok(())
    }

    async fn run_measured(&mut self, cancel: &CancelFlag) -> Result<()> {
        let mut wrote_any = false;
        for i in 0..self.params.nr_files {
            wrote_any = true;
            self.drive.put(&format!("/blob{i}.txt"), &self.file).await?;
            if cancel.is_cancelled() {
                return Ok(());
            }
        }
        if !wrote_any {
            return Err(Error::Sanity("no file was written".into()));
        }
        Ok(())
    }

    async fn teardown(&mut self) -> Result<()> {
        self.drive.close().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_drive_write_fills_drive() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut workload = DriveWriteWorkload::new(
            dir.path(),
            FileParams {
                nr_files: 4,
                file_byte_size: 16,
            },
        );

        let cancel = CancelFlag::new();
        workload.open().await.expect("open");
        workload.run_measured(&cancel).await.expect("run");
        assert_eq!(workload.drive.blob_count(), 4);
        workload.teardown().await.expect("teardown");
    }

    #[tokio::test]
    async fn test_drive_write_zero_files_is_a_bug() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut workload = DriveWriteWorkload::new(
            dir.path(),
            FileParams {
                nr_files: 0,
                file_byte_size: 16,
            },
        );

        let cancel = CancelFlag::new();
        workload.open().await.expect("open");
        assert!(workload.run_measured(&cancel).await.is_err());
    }
}
