//! Append-only block log
//!
//! One file per log. Blocks are stored as length-prefixed frames
//! (4-byte little-endian length + payload) with an in-memory offset index
//! rebuilt on `ready()`. Blocks are always appended in order, so the
//! contiguous length equals the length.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::{Error, Result};

/// Disk-backed append-only block log.
///
/// All operations go through an async mutex: a single logical writer, with
/// reads serialized behind it. Every `append` flushes, so one append is one
/// unit of real disk work — exactly what the write experiments measure.
#[derive(Debug)]
pub struct AppendLog {
    path: PathBuf,
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    file: Option<File>,
    /// (payload offset, payload length) per block index
    offsets: Vec<(u64, u32)>,
    end_offset: u64,
    closed: bool,
}

impl AppendLog {
    /// Create a handle for the log at `path`. No I/O happens until
    /// [`ready`](Self::ready) is called.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the backing file and replay existing frames. Idempotent.
    ///
    /// A truncated tail frame (partial write before a crash) is discarded.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resource`] if the log was already closed, or an IO
    /// error if the file cannot be opened or replayed.
    pub async fn ready(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if inner.file.is_some() {
            return Ok(());
        }
        if inner.closed {
            return Err(Error::Resource(format!(
                "append log {} already closed",
                self.path.display()
            )));
        }

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.path)
            .await?;

        let end = file.metadata().await?.len();
        let mut offsets = Vec::new();
        let mut pos = 0u64;
        let mut len_buf = [0u8; 4];
        while pos + 4 <= end {
            file.seek(SeekFrom::Start(pos)).await?;
            file.read_exact(&mut len_buf).await?;
            let len = u32::from_le_bytes(len_buf);
            if pos + 4 + u64::from(len) > end {
                break;
            }
            offsets.push((pos + 4, len));
            pos += 4 + u64::from(len);
        }

        inner.offsets = offsets;
        inner.end_offset = pos;
        inner.file = Some(file);
        Ok(())
    }

    /// Append one block, returning its index.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resource`] if the log is not open, or an IO error
    /// if the write fails.
    pub async fn append(&self, block: &[u8]) -> Result<u64> {
        let len = u32::try_from(block.len())
            .map_err(|_| Error::Resource("block larger than 4GiB".into()))?;

        let mut inner = self.inner.lock().await;
        let end = inner.end_offset;
        let file = inner
            .file
            .as_mut()
            .ok_or_else(|| Error::Resource("append log is not open".into()))?;

        file.seek(SeekFrom::Start(end)).await?;
        file.write_all(&len.to_le_bytes()).await?;
        file.write_all(block).await?;
        file.flush().await?;

        let index = inner.offsets.len() as u64;
        inner.offsets.push((end + 4, len));
        inner.end_offset = end + 4 + u64::from(len);
        Ok(index)
    }

    /// Read the block at `index`, or `None` past the end.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resource`] if the log is not open, or an IO error
    /// if the read fails.
    pub async fn get(&self, index: u64) -> Result<Option<Vec<u8>>> {
        let mut inner = self.inner.lock().await;
        let Some(&(offset, len)) = inner.offsets.get(usize::try_from(index).unwrap_or(usize::MAX))
        else {
            return Ok(None);
        };
        let file = inner
            .file
            .as_mut()
            .ok_or_else(|| Error::Resource("append log is not open".into()))?;

        file.seek(SeekFrom::Start(offset)).await?;
        let mut buf = vec![0u8; len as usize];
        file.read_exact(&mut buf).await?;
        Ok(Some(buf))
    }

    /// Number of blocks in the log.
    pub async fn len(&self) -> u64 {
        self.inner.lock().await.offsets.len() as u64
    }

    /// Whether the log holds no blocks.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Length of the contiguous block prefix. Blocks are only ever appended
    /// in order, so this equals [`len`](Self::len).
    pub async fn contiguous_len(&self) -> u64 {
        self.len().await
    }

    /// Flush and release the backing file. Idempotent; a closed log rejects
    /// further appends and reads.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the final flush fails.
    pub async fn close(&self) -> Result<()> {
        let mut inner = self.inner.lock().await;
        if let Some(mut file) = inner.file.take() {
            file.flush().await?;
            file.sync_all().await?;
        }
        inner.closed = true;
        Ok(())
    }

    /// Block-at-a-time cursor over `[start, end)`.
    #[must_use]
    pub const fn read_stream(&self, start: u64, end: u64) -> ReadStream<'_> {
        ReadStream {
            log: self,
            next: start,
            end,
        }
    }
}

/// Cursor yielding blocks of an [`AppendLog`] in index order.
#[derive(Debug)]
pub struct ReadStream<'a> {
    log: &'a AppendLog,
    next: u64,
    end: u64,
}

impl ReadStream<'_> {
    /// Yield the next block, or `None` once the range is exhausted.
    ///
    /// # Errors
    ///
    /// Propagates read errors from the underlying log.
    pub async fn next(&mut self) -> Result<Option<Vec<u8>>> {
        if self.next >= self.end {
            return Ok(None);
        }
        match self.log.get(self.next).await? {
            Some(block) => {
                self.next += 1;
                Ok(Some(block))
            }
            None => Ok(None),
        }
    }
}
