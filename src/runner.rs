//! Continuous benchmark scheduler
//!
//! The runner ticks on a fixed interval and rotates round-robin through the
//! registered experiments. At most one attempt runs at a time: a tick that
//! fires while an attempt is still in flight is skipped with a warning and
//! does not advance the rotation. Every attempt is raced against a
//! wall-clock timeout and against runner shutdown; whatever the outcome
//! (except shutdown), one result record is persisted under the attempt's
//! `(name, signature)` key.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::experiment::{Experiment, ExperimentDescriptor, ExperimentRegistry};
use crate::results::{ResultRecord, ResultsLog};
use crate::storage::StorageScope;
use crate::{Error, Result};

/// Scheduling knobs for one runner.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Tick interval between attempt starts
    pub interval: Duration,
    /// Wall-clock budget of one attempt
    pub timeout: Duration,
    /// Directory the per-attempt storage scopes live under. Removed when
    /// the runner closes.
    pub scratch_root: PathBuf,
}

struct RunnerShared {
    registry: Arc<ExperimentRegistry>,
    results: Arc<ResultsLog>,
    timeout: Duration,
    scratch_root: PathBuf,
    running: AtomicBool,
    attempts_started: AtomicU64,
    ticks_skipped: AtomicU64,
    attempt_task: Mutex<Option<JoinHandle<()>>>,
}

/// The scheduler. Owns the tick loop task; dropped handles keep running
/// until [`close`](Runner::close).
pub struct Runner {
    shared: Arc<RunnerShared>,
    shutdown_tx: watch::Sender<bool>,
    loop_task: Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl Runner {
    /// Start the tick loop. The first attempt starts immediately; later
    /// ones one interval apart.
    ///
    /// # Errors
    ///
    /// Returns an error if the scratch root cannot be created.
    pub async fn spawn(
        registry: Arc<ExperimentRegistry>,
        results: Arc<ResultsLog>,
        config: RunnerConfig,
    ) -> Result<Self> {
        tokio::fs::create_dir_all(&config.scratch_root).await?;

        let shared = Arc::new(RunnerShared {
            registry,
            results,
            timeout: config.timeout,
            scratch_root: config.scratch_root,
            running: AtomicBool::new(false),
            attempts_started: AtomicU64::new(0),
            ticks_skipped: AtomicU64::new(0),
            attempt_task: Mutex::new(None),
        });

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let loop_task = tokio::spawn(tick_loop(shared.clone(), config.interval, shutdown_rx));

        Ok(Self {
            shared,
            shutdown_tx,
            loop_task: Mutex::new(Some(loop_task)),
            closed: AtomicBool::new(false),
        })
    }

    /// Number of attempts the loop has started so far.
    #[must_use]
    pub fn attempts_started(&self) -> u64 {
        self.shared.attempts_started.load(Ordering::SeqCst)
    }

    /// Number of ticks skipped because an attempt was still in flight.
    #[must_use]
    pub fn ticks_skipped(&self) -> u64 {
        self.shared.ticks_skipped.load(Ordering::SeqCst)
    }

    /// Stop the loop, cancel the in-flight attempt (if any; its teardown
    /// finishes in the background), then remove the scratch root.
    /// Idempotent.
    ///
    /// # Errors
    ///
    /// Currently infallible; kept fallible for call-site uniformity with
    /// the other `close()` paths.
    pub async fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self.loop_task.lock().await.take() {
            let _ = task.await;
        }
        if let Some(task) = self.shared.attempt_task.lock().await.take() {
            let _ = task.await;
        }

        if let Err(e) = tokio::fs::remove_dir_all(&self.shared.scratch_root).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                info!("could not remove scratch root: {e}");
            }
        }
        Ok(())
    }
}

async fn tick_loop(
    shared: Arc<RunnerShared>,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    // The first tick fires immediately, so the first attempt starts right
    // after spawn rather than one interval in.
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut rotation = 0usize;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if shared.running.swap(true, Ordering::SeqCst) {
                    warn!("Previous experiment still running. Needs a bigger interval?");
                    shared.ticks_skipped.fetch_add(1, Ordering::SeqCst);
                    continue;
                }

                let descriptor =
                    shared.registry.descriptors()[rotation % shared.registry.len()].clone();
                rotation += 1;
                shared.attempts_started.fetch_add(1, Ordering::SeqCst);

                let task = tokio::spawn(run_attempt(
                    shared.clone(),
                    descriptor,
                    shutdown_rx.clone(),
                ));
                *shared.attempt_task.lock().await = Some(task);
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

async fn run_attempt(
    shared: Arc<RunnerShared>,
    descriptor: ExperimentDescriptor,
    shutdown_rx: watch::Receiver<bool>,
) {
    // Every outcome except shutdown leaves a record, including errors that
    // hit before the experiment instance exists (scratch dir, workload
    // construction); otherwise an experiment with a broken environment
    // would keep its stale gauge value forever.
    let record = match try_attempt(&shared, &descriptor, shutdown_rx).await {
        Ok(record) => record,
        Err(Error::Shutdown) => None,
        Err(e) => {
            warn!(
                experiment = descriptor.name(),
                "experiment attempt failed outside the measured phase: {e}"
            );
            Some(ResultRecord::failed(descriptor.params().to_json()))
        }
    };

    if let Some(record) = record {
        if let Err(e) = shared
            .results
            .put(descriptor.name(), &descriptor.params().signature(), &record)
            .await
        {
            warn!(
                experiment = descriptor.name(),
                "could not persist result record: {e}"
            );
        }
    }
    shared.running.store(false, Ordering::SeqCst);
}

async fn try_attempt(
    shared: &RunnerShared,
    descriptor: &ExperimentDescriptor,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Result<Option<ResultRecord>> {
    // The receiver clone in the tick loop marks an already-sent shutdown as
    // seen, so `changed()` below would miss it. Checking the current value
    // first closes that window.
    if *shutdown_rx.borrow() {
        return Err(Error::Shutdown);
    }

    let name = descriptor.name();
    let display_name = descriptor.kind().display_name();
    let signature = descriptor.params().signature();
    let info = descriptor.params().info();

    // Leftovers from an earlier attempt of the same parametrisation (a
    // timed-out close that never finished) must not leak into this one.
    let scratch = shared.scratch_root.join(format!("{name}-{signature}"));
    match tokio::fs::remove_dir_all(&scratch).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }

    let scope = StorageScope::create(scratch).await?;
    let workload = descriptor.build_workload(scope.path())?;
    let experiment = Experiment::new(display_name, workload, scope);

    info!("Running {display_name} with params {info}");

    let run = {
        let experiment = experiment.clone();
        tokio::spawn(async move { experiment.run_experiment().await })
    };

    let record = tokio::select! {
        joined = run => match joined {
            Ok(Ok(Some(elapsed))) => {
                info!("Finished {display_name} with params: {info}");
                Some(ResultRecord::success(
                    elapsed.as_secs_f64(),
                    descriptor.params().to_json(),
                ))
            }
            Ok(Ok(None)) => {
                warn!("{display_name} was cancelled before its measured phase");
                Some(ResultRecord::failed(descriptor.params().to_json()))
            }
            Ok(Err(e)) => {
                warn!("{display_name} failed: {e}");
                Some(ResultRecord::failed(descriptor.params().to_json()))
            }
            Err(e) => {
                warn!("{display_name} task panicked: {e}");
                Some(ResultRecord::failed(descriptor.params().to_json()))
            }
        },
        _ = shutdown_rx.changed() => {
            // Shutdown cancels the attempt without waiting for teardown
            // and never overwrites the last persisted record.
            let experiment = experiment.clone();
            tokio::spawn(async move {
                if let Err(e) = experiment.close().await {
                    warn!("error while closing during shutdown: {e}");
                }
            });
            return Err(Error::Shutdown);
        }
        () = tokio::time::sleep(shared.timeout) => {
            warn!("{}", Error::Timeout { seconds: shared.timeout.as_secs() });
            let experiment = experiment.clone();
            tokio::spawn(async move {
                if let Err(e) = experiment.close().await {
                    warn!("error while closing timed-out experiment: {e}");
                }
            });
            Some(ResultRecord::failed(descriptor.params().to_json()))
        }
    };

    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{BlockParams, ExperimentKind, ExperimentParams};

    fn tiny_registry() -> Arc<ExperimentRegistry> {
        let descriptor = ExperimentDescriptor::new(
            ExperimentKind::Write,
            ExperimentParams::Blocks(BlockParams {
                nr_blocks: 2,
                block_byte_size: 8,
            }),
        )
        .expect("descriptor");
        Arc::new(ExperimentRegistry::from_descriptors(vec![descriptor]).expect("registry"))
    }

    #[tokio::test]
    async fn test_runner_persists_a_record() {
        let dir = tempfile::tempdir().expect("tempdir");
        let results = Arc::new(
            ResultsLog::open(dir.path().join("results"))
                .await
                .expect("results"),
        );

        let runner = Runner::spawn(
            tiny_registry(),
            results.clone(),
            RunnerConfig {
                interval: Duration::from_millis(20),
                timeout: Duration::from_secs(60),
                scratch_root: dir.path().join("scratch"),
            },
        )
        .await
        .expect("spawn");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        loop {
            if !results.read_all().await.expect("read_all").is_empty() {
                break;
            }
            assert!(tokio::time::Instant::now() < deadline, "no record appeared");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        runner.close().await.expect("close");

        let record = results
            .get("write", "nrBlocks=2_blockByteSize=8")
            .await
            .expect("get")
            .expect("record");
        assert!(record.is_success());
        assert!(record.run_time_seconds() >= 0.0);
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_removes_scratch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let results = Arc::new(
            ResultsLog::open(dir.path().join("results"))
                .await
                .expect("results"),
        );
        let scratch = dir.path().join("scratch");

        let runner = Runner::spawn(
            tiny_registry(),
            results,
            RunnerConfig {
                interval: Duration::from_secs(3600),
                timeout: Duration::from_secs(60),
                scratch_root: scratch.clone(),
            },
        )
        .await
        .expect("spawn");

        assert!(scratch.is_dir());
        runner.close().await.expect("close");
        runner.close().await.expect("second close");
        assert!(!scratch.exists());
    }
}
