//! Prometheus text exposition of the latest experiment results
//!
//! One gauge family per experiment kind, one sample per registered
//! parametrisation, labelled with the snake_case parameter names. Values
//! come from the durable results log at scrape time; a parametrisation
//! without a usable record reports the sentinel `-1`.

mod server;

pub use server::MetricsServer;

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use tracing::warn;

use crate::experiment::{metric_label, ExperimentRegistry};
use crate::results::{ResultsLog, RUN_TIME_SENTINEL};
use crate::Result;

/// Metric name prefix shared by every exported family.
pub const METRIC_PREFIX: &str = "hypercorescale";

/// Renders the registry's gauges from the results log.
pub struct MetricsCollector {
    registry: Arc<ExperimentRegistry>,
    results: Arc<ResultsLog>,
}

impl MetricsCollector {
    /// Build a collector over `registry`, reading values from `results`.
    #[must_use]
    pub fn new(registry: Arc<ExperimentRegistry>, results: Arc<ResultsLog>) -> Self {
        Self { registry, results }
    }

    /// Render one scrape in the Prometheus text format.
    ///
    /// Families appear in registration order, so consecutive scrapes over
    /// unchanged results are byte-identical. A stored record that does not
    /// carry a numeric `runTimeSeconds` is reported as the sentinel rather
    /// than aborting the scrape.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from the results log.
    pub async fn scrape(&self) -> Result<String> {
        let mut values: HashMap<(String, String), f64> = HashMap::new();
        for (name, signature, value) in self.results.read_all().await? {
            let run_time = value
                .get("runTimeSeconds")
                .and_then(serde_json::Value::as_f64);
            let Some(run_time) = run_time else {
                warn!(%name, %signature, "results entry has no numeric runTimeSeconds");
                values.insert((name, signature), RUN_TIME_SENTINEL);
                continue;
            };
            values.insert((name, signature), run_time);
        }

        let mut out = String::new();
        let mut current_family = None;
        for descriptor in self.registry.descriptors() {
            let family = format!("{METRIC_PREFIX}_{}", descriptor.name());
            if current_family.as_ref() != Some(&family) {
                let _ = writeln!(
                    out,
                    "# HELP {family} Seconds taken to {}",
                    descriptor.kind().description()
                );
                let _ = writeln!(out, "# TYPE {family} gauge");
                current_family = Some(family.clone());
            }

            let labels = descriptor
                .params()
                .fields()
                .iter()
                .map(|(key, value)| format!("{}=\"{value}\"", metric_label(key)))
                .collect::<Vec<_>>()
                .join(",");
            let value = values
                .get(&(
                    descriptor.name().to_string(),
                    descriptor.params().signature(),
                ))
                .copied()
                .unwrap_or(RUN_TIME_SENTINEL);
            let _ = writeln!(out, "{family}{{{labels}}} {value}");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::experiment::{
        BlockParams, ExperimentDescriptor, ExperimentKind, ExperimentParams, FileParams,
    };
    use crate::results::ResultRecord;
    use serde_json::json;

    fn registry() -> Arc<ExperimentRegistry> {
        let descriptors = vec![
            ExperimentDescriptor::new(
                ExperimentKind::Write,
                ExperimentParams::Blocks(BlockParams {
                    nr_blocks: 10,
                    block_byte_size: 100,
                }),
            )
            .expect("descriptor"),
            ExperimentDescriptor::new(
                ExperimentKind::Write,
                ExperimentParams::Blocks(BlockParams {
                    nr_blocks: 10,
                    block_byte_size: 1000,
                }),
            )
            .expect("descriptor"),
            ExperimentDescriptor::new(
                ExperimentKind::DriveWrite,
                ExperimentParams::Files(FileParams {
                    nr_files: 2,
                    file_byte_size: 8,
                }),
            )
            .expect("descriptor"),
        ];
        Arc::new(ExperimentRegistry::from_descriptors(descriptors).expect("registry"))
    }

    async fn results(dir: &std::path::Path) -> Arc<ResultsLog> {
        Arc::new(ResultsLog::open(dir.join("results")).await.expect("open"))
    }

    #[tokio::test]
    async fn test_scrape_renders_families_in_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let results = results(dir.path()).await;

        let mut params = serde_json::Map::new();
        params.insert("nrBlocks".into(), json!(10));
        params.insert("blockByteSize".into(), json!(100));
        results
            .put(
                "write",
                "nrBlocks=10_blockByteSize=100",
                &ResultRecord::success(2.5, params),
            )
            .await
            .expect("put");

        let collector = MetricsCollector::new(registry(), results);
        let scrape = collector.scrape().await.expect("scrape");

        let expected = "\
# HELP hypercorescale_write Seconds taken to append blocks to a fresh log on disk
# TYPE hypercorescale_write gauge
hypercorescale_write{nr_blocks=\"10\",block_byte_size=\"100\"} 2.5
hypercorescale_write{nr_blocks=\"10\",block_byte_size=\"1000\"} -1
# HELP hypercorescale_drive_write Seconds taken to write files into a fresh drive
# TYPE hypercorescale_drive_write gauge
hypercorescale_drive_write{nr_files=\"2\",file_byte_size=\"8\"} -1
";
        assert_eq!(scrape, expected);
    }

    #[tokio::test]
    async fn test_consecutive_scrapes_are_identical() {
        let dir = tempfile::tempdir().expect("tempdir");
        let collector = MetricsCollector::new(registry(), results(dir.path()).await);

        let first = collector.scrape().await.expect("scrape");
        let second = collector.scrape().await.expect("scrape");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_malformed_record_reports_sentinel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("results");

        // Seed a record shape the scraper cannot use, through the raw
        // key-value log the results log replays from.
        {
            let kv = crate::storage::KvLog::new(&path);
            kv.ready().await.expect("ready");
            kv.put(
                "write/nrBlocks=10_blockByteSize=100",
                json!({"runTimeSeconds": "not-a-number"}),
            )
            .await
            .expect("put");
            kv.close().await.expect("close");
        }

        let results = Arc::new(ResultsLog::open(&path).await.expect("open"));
        let collector = MetricsCollector::new(registry(), results);
        let scrape = collector.scrape().await.expect("scrape");
        assert!(scrape.contains("hypercorescale_write{nr_blocks=\"10\",block_byte_size=\"100\"} -1"));
    }
}
