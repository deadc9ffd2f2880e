//! # Hypercore-Scale: Continuous Storage Benchmarking Harness
//!
//! A long-running service that continuously benchmarks a set of storage
//! experiments (append, read, peer download, drive and key-value writes) and
//! exposes the latest timings as Prometheus gauges.
//!
//! The harness rotates round-robin through the experiments defined in a JSON
//! config file, runs at most one attempt at a time, persists each outcome in
//! a durable results log and serves `GET /metrics` from it, so scrape values
//! survive process restarts.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use hypercorescale::config::ExperimentDefinitions;
//! use hypercorescale::experiment::ExperimentRegistry;
//! use hypercorescale::results::ResultsLog;
//! use hypercorescale::runner::{Runner, RunnerConfig};
//!
//! # async fn run() -> hypercorescale::Result<()> {
//! let defs = ExperimentDefinitions::load("example-config.json".as_ref())?;
//! let registry = Arc::new(ExperimentRegistry::from_definitions(&defs)?);
//! let results = Arc::new(ResultsLog::open("storage/results").await?);
//!
//! let runner = Runner::spawn(
//!     registry,
//!     results,
//!     RunnerConfig {
//!         interval: Duration::from_secs(60),
//!         timeout: Duration::from_secs(3600),
//!         scratch_root: "storage/scratch".into(),
//!     },
//! )
//! .await?;
//! runner.close().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod cancel;
pub mod config;
pub mod error;
pub mod experiment;
pub mod metrics;
pub mod results;
pub mod runner;
pub mod storage;

pub use error::{Error, Result};
