//! Experiment lifecycle, descriptors and workload kinds
//!
//! State machine of one experiment instance:
//!
//! ```text
//! Created → Opening → Open → Setup → Running → Closing → Closed
//! ```
//!
//! - An instance is created per attempt and never reused.
//! - `run_experiment()` may be called exactly once. It opens the instance,
//!   runs the setup phase (excluded from timing, cancel-polled), records the
//!   start timestamp, runs the measured phase (cancel-polled once per unit
//!   of work), records the end timestamp, then triggers `close()` in the
//!   background and returns the elapsed duration.
//! - `close()` may be called at any time, including concurrently with an
//!   in-flight `run_experiment()` (a timeout watcher does exactly that). It
//!   sets the cancellation flag, waits for the running phase to observe it
//!   and exit, runs teardown exactly once and releases the storage scope.
//! - Cancellation is soft: it is polled, never preemptive, so its latency
//!   is bounded by one unit of benchmarked work. See [`crate::cancel`].

mod bee_write;
mod download;
mod drive_get;
mod drive_write;
mod params;
mod peer;
mod read;
mod stream_download;
mod write;

pub use bee_write::BeeWriteWorkload;
pub use download::DownloadWorkload;
pub use drive_get::DriveGetWorkload;
pub use drive_write::DriveWriteWorkload;
pub use params::{metric_label, BlockParams, EntryParams, ExperimentParams, FileParams};
pub use peer::Peer;
pub use read::ReadWorkload;
pub use stream_download::StreamDownloadWorkload;
pub use write::WriteWorkload;

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::warn;

use crate::cancel::CancelFlag;
use crate::config::ExperimentDefinitions;
use crate::storage::StorageScope;
use crate::{Error, Result};

/// The benchmark kinds the harness rotates through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentKind {
    /// Append blocks to a fresh log
    Write,
    /// Read back every block of a pre-filled log
    Read,
    /// Download a log from a peer over the swarm
    Download,
    /// Stream a log from a peer block by block
    DownloadReadStream,
    /// Read back every blob of a pre-filled drive
    DriveGet,
    /// Write files into a fresh drive
    DriveWrite,
    /// Write entries into a fresh key-value log
    BeeWrite,
}

impl ExperimentKind {
    /// Metric-facing name; also the results-log sub-namespace.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Write => "write",
            Self::Read => "read",
            Self::Download => "download",
            Self::DownloadReadStream => "download_read_stream",
            Self::DriveGet => "drive_get",
            Self::DriveWrite => "drive_write",
            Self::BeeWrite => "bee_write",
        }
    }

    /// Human-readable name used in log lines.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Write => "Write experiment",
            Self::Read => "Read experiment",
            Self::Download => "Download experiment",
            Self::DownloadReadStream => "Read-stream download experiment",
            Self::DriveGet => "Drive Get experiment",
            Self::DriveWrite => "Drive Write experiment",
            Self::BeeWrite => "Bee Write experiment",
        }
    }

    /// What the gauge measures, for the metric HELP line.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::Write => "append blocks to a fresh log on disk",
            Self::Read => "read back every block of a pre-filled log",
            Self::Download => "download a log from a peer",
            Self::DownloadReadStream => "stream a log from a peer block by block",
            Self::DriveGet => "read back every blob of a pre-filled drive",
            Self::DriveWrite => "write files into a fresh drive",
            Self::BeeWrite => "write entries into a fresh key-value log",
        }
    }
}

/// Immutable description of one registered experiment: kind plus one
/// parametrisation. Built once at startup, lives for the process lifetime.
#[derive(Debug, Clone)]
pub struct ExperimentDescriptor {
    kind: ExperimentKind,
    params: ExperimentParams,
}

impl ExperimentDescriptor {
    /// Pair a kind with a parametrisation, rejecting schema mismatches.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `params` is not the schema `kind`
    /// declares.
    pub fn new(kind: ExperimentKind, params: ExperimentParams) -> Result<Self> {
        let schema_ok = matches!(
            (kind, &params),
            (
                ExperimentKind::Write
                    | ExperimentKind::Read
                    | ExperimentKind::Download
                    | ExperimentKind::DownloadReadStream
                    | ExperimentKind::DriveGet,
                ExperimentParams::Blocks(_)
            ) | (ExperimentKind::DriveWrite, ExperimentParams::Files(_))
                | (ExperimentKind::BeeWrite, ExperimentParams::Entries(_))
        );
        if !schema_ok {
            return Err(Error::Config(format!(
                "parameter schema does not match experiment kind {}",
                kind.name()
            )));
        }
        Ok(Self { kind, params })
    }

    /// The experiment kind.
    #[must_use]
    pub const fn kind(&self) -> ExperimentKind {
        self.kind
    }

    /// Metric-facing experiment name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// The parametrisation.
    #[must_use]
    pub const fn params(&self) -> &ExperimentParams {
        &self.params
    }

    /// Build the workload for one attempt, rooted at `dir` (the attempt's
    /// private storage scope).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the descriptor holds a mismatched
    /// schema (prevented by [`new`](Self::new), kept as a guard).
    pub fn build_workload(&self, dir: &Path) -> Result<Box<dyn Workload>> {
        let mismatch = || {
            Error::Config(format!(
                "parameter schema does not match experiment kind {}",
                self.kind.name()
            ))
        };
        Ok(match (self.kind, self.params) {
            (ExperimentKind::Write, ExperimentParams::Blocks(p)) => {
                Box::new(WriteWorkload::new(dir, p))
            }
            (ExperimentKind::Read, ExperimentParams::Blocks(p)) => {
                Box::new(ReadWorkload::new(dir, p))
            }
            (ExperimentKind::Download, ExperimentParams::Blocks(p)) => {
                Box::new(DownloadWorkload::new(dir, p))
            }
            (ExperimentKind::DownloadReadStream, ExperimentParams::Blocks(p)) => {
                Box::new(StreamDownloadWorkload::new(dir, p))
            }
            (ExperimentKind::DriveGet, ExperimentParams::Blocks(p)) => {
                Box::new(DriveGetWorkload::new(dir, p))
            }
            (ExperimentKind::DriveWrite, ExperimentParams::Files(p)) => {
                Box::new(DriveWriteWorkload::new(dir, p))
            }
            (ExperimentKind::BeeWrite, ExperimentParams::Entries(p)) => {
                Box::new(BeeWriteWorkload::new(dir, p))
            }
            _ => return Err(mismatch()),
        })
    }
}

/// Immutable ordered list of experiment descriptors, built once at startup.
/// The scheduler rotates through it round-robin.
#[derive(Debug)]
pub struct ExperimentRegistry {
    descriptors: Vec<ExperimentDescriptor>,
}

impl ExperimentRegistry {
    /// Build the registry from parsed experiment definitions, in fixed
    /// section order (write, read, download, downloadReadStream, driveGet,
    /// driveWrite, beeWrite).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if no experiments are defined.
    pub fn from_definitions(defs: &ExperimentDefinitions) -> Result<Self> {
        let mut descriptors = Vec::new();
        for &p in &defs.write {
            descriptors.push(ExperimentDescriptor::new(
                ExperimentKind::Write,
                ExperimentParams::Blocks(p),
            )?);
        }
        for &p in &defs.read {
            descriptors.push(ExperimentDescriptor::new(
                ExperimentKind::Read,
                ExperimentParams::Blocks(p),
            )?);
        }
        for &p in &defs.download {
            descriptors.push(ExperimentDescriptor::new(
                ExperimentKind::Download,
                ExperimentParams::Blocks(p),
            )?);
        }
        for &p in &defs.download_read_stream {
            descriptors.push(ExperimentDescriptor::new(
                ExperimentKind::DownloadReadStream,
                ExperimentParams::Blocks(p),
            )?);
        }
        for &p in &defs.drive_get {
            descriptors.push(ExperimentDescriptor::new(
                ExperimentKind::DriveGet,
                ExperimentParams::Blocks(p),
            )?);
        }
        for &p in &defs.drive_write {
            descriptors.push(ExperimentDescriptor::new(
                ExperimentKind::DriveWrite,
                ExperimentParams::Files(p),
            )?);
        }
        for &p in &defs.bee_write {
            descriptors.push(ExperimentDescriptor::new(
                ExperimentKind::BeeWrite,
                ExperimentParams::Entries(p),
            )?);
        }
        Self::from_descriptors(descriptors)
    }

    /// Build the registry from an explicit descriptor list.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the list is empty.
    pub fn from_descriptors(descriptors: Vec<ExperimentDescriptor>) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(Error::Config("no experiments configured".into()));
        }
        Ok(Self { descriptors })
    }

    /// Number of registered descriptors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Whether the registry is empty (never true after construction).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// The descriptors, in registration order.
    #[must_use]
    pub fn descriptors(&self) -> &[ExperimentDescriptor] {
        &self.descriptors
    }
}

/// Capability interface one benchmark kind implements.
///
/// The generic [`Experiment`] driver sequences the lifecycle around these
/// three hooks; the hooks themselves must poll the cancellation flag once
/// per unit of work so the instance stays promptly cancellable.
#[async_trait]
pub trait Workload: Send {
    /// Acquire the workload's storage resources. Called once, before setup.
    async fn open(&mut self) -> Result<()>;

    /// Prepare the experiment. Excluded from timing. Must poll `cancel`
    /// and return early once it is set.
    async fn setup(&mut self, cancel: &CancelFlag) -> Result<()>;

    /// The measured phase. Must poll `cancel` once per unit of work and
    /// return early (without error) once it is set.
    async fn run_measured(&mut self, cancel: &CancelFlag) -> Result<()>;

    /// Release the workload's resources. Called exactly once, on success
    /// and failure alike.
    async fn teardown(&mut self) -> Result<()>;
}

/// Lifecycle states of an experiment instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentState {
    /// Instance constructed, nothing acquired yet
    Created,
    /// Acquiring storage resources
    Opening,
    /// Resources acquired
    Open,
    /// Setup phase (untimed)
    Setup,
    /// Measured phase
    Running,
    /// Cancellation requested or teardown in progress
    Closing,
    /// Teardown finished, scope released
    Closed,
}

const STATE_CREATED: u8 = 0;
const STATE_OPENING: u8 = 1;
const STATE_OPEN: u8 = 2;
const STATE_SETUP: u8 = 3;
const STATE_RUNNING: u8 = 4;
const STATE_CLOSING: u8 = 5;
const STATE_CLOSED: u8 = 6;

/// One attempt of one experiment: the generic lifecycle driver.
///
/// Cloning is cheap and shares the instance; that is how a timeout watcher
/// holds a handle to `close()` while `run_experiment()` is in flight. The
/// driver serializes the run and close paths through an async mutex, which
/// is what gives `close()` its "wait for the loop to observe cancellation"
/// behavior for free.
#[derive(Clone)]
pub struct Experiment {
    shared: Arc<ExperimentShared>,
}

struct ExperimentShared {
    name: &'static str,
    cancel: CancelFlag,
    state: AtomicU8,
    ran: AtomicBool,
    inner: Mutex<ExperimentInner>,
}

struct ExperimentInner {
    workload: Box<dyn Workload>,
    scope: Option<StorageScope>,
    opened: bool,
    torn_down: bool,
}

impl Experiment {
    /// Create an instance driving `workload` inside `scope`.
    #[must_use]
    pub fn new(name: &'static str, workload: Box<dyn Workload>, scope: StorageScope) -> Self {
        Self {
            shared: Arc::new(ExperimentShared {
                name,
                cancel: CancelFlag::new(),
                state: AtomicU8::new(STATE_CREATED),
                ran: AtomicBool::new(false),
                inner: Mutex::new(ExperimentInner {
                    workload,
                    scope: Some(scope),
                    opened: false,
                    torn_down: false,
                }),
            }),
        }
    }

    /// Human-readable experiment name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.shared.name
    }

    /// This instance's cancellation flag.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.shared.cancel.clone()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ExperimentState {
        match self.shared.state.load(Ordering::SeqCst) {
            STATE_CREATED => ExperimentState::Created,
            STATE_OPENING => ExperimentState::Opening,
            STATE_OPEN => ExperimentState::Open,
            STATE_SETUP => ExperimentState::Setup,
            STATE_RUNNING => ExperimentState::Running,
            STATE_CLOSING => ExperimentState::Closing,
            _ => ExperimentState::Closed,
        }
    }

    fn set_state(&self, state: u8) {
        self.shared.state.store(state, Ordering::SeqCst);
    }

    /// Acquire the workload's resources. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Resource`] if the storage engine fails to
    /// initialize.
    pub async fn open(&self) -> Result<()> {
        let mut inner = self.shared.inner.lock().await;
        self.open_locked(&mut inner).await
    }

    async fn open_locked(&self, inner: &mut ExperimentInner) -> Result<()> {
        if inner.opened {
            return Ok(());
        }
        self.set_state(STATE_OPENING);
        inner.workload.open().await.map_err(|e| match e {
            resource @ Error::Resource(_) => resource,
            other => Error::Resource(other.to_string()),
        })?;
        inner.opened = true;
        self.set_state(STATE_OPEN);
        Ok(())
    }

    /// Run the experiment once, returning the measured duration.
    ///
    /// Returns `Ok(None)` when cancellation was observed before the
    /// measured phase started. On return (success or failure) `close()`
    /// has been triggered in the background.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AlreadyRan`] on a second call, [`Error::Resource`]
    /// if opening fails, and propagates setup and measured-phase errors.
    pub async fn run_experiment(&self) -> Result<Option<Duration>> {
        if self.shared.ran.swap(true, Ordering::SeqCst) {
            return Err(Error::AlreadyRan);
        }

        let result = self.run_phases().await;

        // Teardown is triggered regardless of the outcome, without waiting
        // for it here.
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.close().await {
                warn!(experiment = this.shared.name, "error while closing: {e}");
            }
        });

        result
    }

    async fn run_phases(&self) -> Result<Option<Duration>> {
        let mut inner = self.shared.inner.lock().await;

        self.open_locked(&mut inner).await?;

        self.set_state(STATE_SETUP);
        inner.workload.setup(&self.shared.cancel).await?;
        if self.shared.cancel.is_cancelled() {
            return Ok(None);
        }

        self.set_state(STATE_RUNNING);
        let started = Instant::now();
        let outcome = inner.workload.run_measured(&self.shared.cancel).await;
        let elapsed = started.elapsed();
        outcome?;
        Ok(Some(elapsed))
    }

    /// Cancel and clean up the instance.
    ///
    /// Idempotent, and safe to call while `run_experiment()` is in flight:
    /// the cancellation flag is set first, then this call waits for the
    /// running phase to observe it and exit before tearing down exactly
    /// once and releasing the storage scope.
    ///
    /// # Errors
    ///
    /// Propagates the teardown error of the first close; later calls
    /// return `Ok`.
    pub async fn close(&self) -> Result<()> {
        self.shared.cancel.cancel();
        if self.state() != ExperimentState::Closed {
            self.set_state(STATE_CLOSING);
        }

        let mut inner = self.shared.inner.lock().await;
        if inner.torn_down {
            self.set_state(STATE_CLOSED);
            return Ok(());
        }
        inner.torn_down = true;

        let teardown = inner.workload.teardown().await;
        let scope = inner.scope.take();
        drop(inner);

        if let Some(scope) = scope {
            if let Err(e) = scope.release().await {
                warn!(
                    experiment = self.shared.name,
                    "error while releasing storage scope: {e}"
                );
            }
        }
        self.set_state(STATE_CLOSED);
        teardown
    }
}
