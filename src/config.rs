//! Process configuration
//!
//! Config comes from `HYPERCORE_SCALE_*` environment variables plus a JSON
//! experiment-definitions file with one section per experiment kind. The
//! harness does not do CLI parsing; the environment is the whole surface.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::experiment::{BlockParams, EntryParams, FileParams};
use crate::{Error, Result};

/// Runtime configuration, resolved from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host the metrics server binds to
    pub metrics_host: String,
    /// Port the metrics server binds to (0 = ephemeral)
    pub metrics_port: u16,
    /// Scheduler tick interval
    pub test_interval: Duration,
    /// Per-attempt wall-clock timeout
    pub test_timeout: Duration,
    /// Root directory for the results log and scratch storage
    pub storage_path: PathBuf,
    /// Path of the experiment-definitions file
    pub experiments_file: PathBuf,
}

impl Config {
    /// Resolve the configuration from the environment, with the defaults
    /// the deployment expects (ephemeral metrics port, one-minute interval,
    /// one-hour timeout).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a set variable fails to parse.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            metrics_host: env_or("HYPERCORE_SCALE_METRICS_HOST", "127.0.0.1"),
            metrics_port: env_parsed("HYPERCORE_SCALE_METRICS_PORT", 0)?,
            test_interval: Duration::from_millis(env_parsed(
                "HYPERCORE_SCALE_TEST_INTERVAL_MS",
                60_000,
            )?),
            test_timeout: Duration::from_millis(env_parsed(
                "HYPERCORE_SCALE_TEST_TIMEOUT_MS",
                3_600_000,
            )?),
            storage_path: PathBuf::from(env_or(
                "HYPERCORE_SCALE_STORAGE_PATH",
                "hypercore-scale-tests-storage",
            )),
            experiments_file: PathBuf::from(env_or(
                "HYPERCORE_SCALE_EXPERIMENTS_FILE_LOC",
                "example-config.json",
            )),
        })
    }

    /// Where the durable results log lives.
    #[must_use]
    pub fn results_path(&self) -> PathBuf {
        self.storage_path.join("results")
    }

    /// Root of the per-attempt scratch directories. Removed when the
    /// scheduler closes.
    #[must_use]
    pub fn scratch_path(&self) -> PathBuf {
        self.storage_path.join("scratch")
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("invalid value for {key}: {raw}"))),
        Err(_) => Ok(default),
    }
}

/// Parsed experiment-definitions file: one section per experiment kind,
/// each an array of that kind's parameter sets. Section order in this
/// struct is the registry's rotation order.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct ExperimentDefinitions {
    /// Write experiment parametrisations
    pub write: Vec<BlockParams>,
    /// Read experiment parametrisations
    pub read: Vec<BlockParams>,
    /// Download experiment parametrisations
    pub download: Vec<BlockParams>,
    /// Read-stream download experiment parametrisations
    pub download_read_stream: Vec<BlockParams>,
    /// Drive-get experiment parametrisations
    pub drive_get: Vec<BlockParams>,
    /// Drive-write experiment parametrisations
    pub drive_write: Vec<FileParams>,
    /// Bee-write experiment parametrisations
    pub bee_write: Vec<EntryParams>,
}

impl ExperimentDefinitions {
    /// Load and parse the definitions file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::Config(format!("cannot parse {}: {e}", path.display())))
    }
}
