//! Embedded append-only storage engine
//!
//! The harness benchmarks a block store through a small primitive surface:
//! ready/append/get/close plus range-bounded download and read-stream
//! primitives over an in-process swarm. Everything in here is scoped to a
//! private per-attempt directory, so a future concurrent attempt would not
//! contend on storage (not permitted by the scheduler, but kept as an
//! invariant).
//!
//! Layering:
//!
//! ```text
//! AppendLog            append-only block log on disk (length-prefixed frames)
//!   ├── KvLog          ordered key→value log, index rebuilt by replay
//!   ├── BlobDrive      path→blob store with a concurrent path index
//!   └── swarm          in-process testnet: serve/download/stream a log
//! ```

mod drive;
mod kvlog;
mod log;
mod scope;
mod swarm;

pub use drive::BlobDrive;
pub use kvlog::KvLog;
pub use log::{AppendLog, ReadStream};
pub use scope::StorageScope;
pub use swarm::{DownloadRange, RemoteLog, RemoteReadStream, Swarm, Testnet};
