//! Integration tests for the scrape output fed by a live runner.

use std::sync::Arc;
use std::time::Duration;

use hypercorescale::config::ExperimentDefinitions;
use hypercorescale::experiment::ExperimentRegistry;
use hypercorescale::metrics::MetricsCollector;
use hypercorescale::results::ResultsLog;
use hypercorescale::runner::{Runner, RunnerConfig};

fn registry() -> Arc<ExperimentRegistry> {
    let defs: ExperimentDefinitions = serde_json::from_str(
        r#"{
            "write": [{"nrBlocks": 2, "blockByteSize": 8}],
            "driveWrite": [{"nrFiles": 2, "fileByteSize": 8}]
        }"#,
    )
    .expect("definitions");
    Arc::new(ExperimentRegistry::from_definitions(&defs).expect("registry"))
}

#[tokio::test]
async fn test_scrape_before_any_run_reports_sentinels() {
    let dir = tempfile::tempdir().expect("tempdir");
    let results = Arc::new(
        ResultsLog::open(dir.path().join("results"))
            .await
            .expect("results"),
    );

    let collector = MetricsCollector::new(registry(), results);
    let scrape = collector.scrape().await.expect("scrape");

    assert!(scrape.contains("# TYPE hypercorescale_write gauge"));
    assert!(scrape.contains("hypercorescale_write{nr_blocks=\"2\",block_byte_size=\"8\"} -1"));
    assert!(scrape.contains("hypercorescale_drive_write{nr_files=\"2\",file_byte_size=\"8\"} -1"));
}

#[tokio::test]
async fn test_scrape_picks_up_runner_results() {
    let dir = tempfile::tempdir().expect("tempdir");
    let results = Arc::new(
        ResultsLog::open(dir.path().join("results"))
            .await
            .expect("results"),
    );
    let registry = registry();
    let collector = MetricsCollector::new(registry.clone(), results.clone());

    let runner = Runner::spawn(
        registry,
        results.clone(),
        RunnerConfig {
            interval: Duration::from_millis(20),
            timeout: Duration::from_secs(60),
            scratch_root: dir.path().join("scratch"),
        },
    )
    .await
    .expect("spawn");

    let deadline = tokio::time::Instant::now() + Duration::from_secs(20);
    loop {
        if results.read_all().await.expect("read_all").len() == 2 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "no results appeared");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    runner.close().await.expect("close");

    let scrape = collector.scrape().await.expect("scrape");
    let write_line = scrape
        .lines()
        .find(|line| line.starts_with("hypercorescale_write{"))
        .expect("write sample");
    let value: f64 = write_line
        .rsplit(' ')
        .next()
        .expect("value")
        .parse()
        .expect("numeric value");
    assert!(value >= 0.0);
}
