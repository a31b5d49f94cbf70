//! Allure result files written from a simulated run

use rohcheck_core::core::report::AllureResult;
use rohcheck_core::{catalogue, AllureWriter, ClientOptions, SuiteRunner, Transport, VirtualHand};
use std::fs;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn test_results_written_per_check() {
    let dir = TempDir::new().unwrap();
    let results_dir = dir.path().join("allure-results");
    fs::create_dir_all(&results_dir).unwrap();
    fs::write(results_dir.join("stale-result.json"), "{}").unwrap();

    let hand = VirtualHand::default().shared();
    let options = ClientOptions {
        settle_delay: Duration::ZERO,
        ..ClientOptions::default()
    };
    let report = SuiteRunner::new(Transport::Simulated(hand), options)
        .with_filter("version|force_limit")
        .unwrap()
        .run(&catalogue())
        .await;

    let paths = AllureWriter::new(&results_dir).write_all(&report.results).unwrap();
    assert_eq!(paths.len(), report.results.len());

    let mut documents = Vec::new();
    for entry in fs::read_dir(&results_dir).unwrap() {
        let text = fs::read_to_string(entry.unwrap().path()).unwrap();
        documents.push(serde_json::from_str::<AllureResult>(&text).unwrap());
    }
    assert_eq!(documents.len(), report.results.len());

    let skipped = documents.iter().filter(|d| d.status == "skipped").count();
    let passed = documents.iter().filter(|d| d.status == "passed").count();
    assert_eq!(skipped, report.summary().skipped);
    assert_eq!(passed, report.summary().passed);
    assert!(skipped > 0 && passed > 0);
    assert!(documents.iter().all(|d| d.stage == "finished" && d.full_name.starts_with("rohcheck.")));
}
