//! Durable state recovery tests: corrupt files, interrupted saves and
//! restarts between cycles.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use ferry_core::{
    testing::{fixtures, MockFetcher, MockUploader},
    BulkManager, IdentityHash,
};

const EP1: &str = "https://media.example/the-show/ep1.mkv";

fn state_file(dir: &Path, name: &str) -> std::path::PathBuf {
    dir.join("state").join(name)
}

fn backups(dir: &Path) -> Vec<String> {
    fs::read_dir(dir.join("state"))
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".bak"))
        .collect()
}

#[tokio::test]
async fn test_corrupt_completion_log_is_backed_up_and_rebuilt() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    fs::create_dir_all(dir.join("state")).unwrap();
    fs::write(state_file(dir, "processed_urls.json"), "{\"abc\": {").unwrap();
    fixtures::write_backlog(dir, &[EP1]);

    let manager = BulkManager::new(
        fixtures::manager_config(dir),
        fixtures::open_state(dir),
        Arc::new(MockFetcher::new()),
        Arc::new(MockUploader::new()),
    );
    let report = manager.run_once().await.expect("run_once");
    assert_eq!(report.completed, 1);

    let saved = backups(dir);
    assert_eq!(saved.len(), 1, "backups: {:?}", saved);
    assert!(saved[0].starts_with("processed_urls.json."));
    let backup_body = fs::read_to_string(dir.join("state").join(&saved[0])).unwrap();
    assert_eq!(backup_body, "{\"abc\": {");

    let state = fixtures::open_state(dir);
    assert!(state.completions().contains(&IdentityHash::of(EP1)));
}

#[tokio::test]
async fn test_leftover_temp_file_does_not_replace_state() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    {
        let mut state = fixtures::open_state(dir);
        state.ledger_mut().record_failure(EP1, "timeout").unwrap();
    }
    // A save interrupted before its rename
    fs::write(
        dir.join("state").join(".failed_downloads.json.0000.tmp"),
        "{\"partial",
    )
    .unwrap();

    let state = fixtures::open_state(dir);
    let record = state.ledger().get(&IdentityHash::of(EP1)).expect("record");
    assert_eq!(record.failures, 1);
    assert_eq!(record.last_error, "timeout");
    assert!(backups(dir).is_empty());
}

#[tokio::test]
async fn test_state_survives_restart_between_cycles() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path();
    fixtures::write_backlog(dir, &[EP1]);

    let fetcher = Arc::new(MockFetcher::new());
    fetcher.fail_always("dns failure").await;
    let first = BulkManager::new(
        fixtures::manager_config(dir),
        fixtures::open_state(dir),
        Arc::clone(&fetcher) as Arc<dyn ferry_core::Fetcher>,
        Arc::new(MockUploader::new()),
    );
    first.run_once().await.expect("first run");
    drop(first);

    fetcher.clear_failures().await;
    let second = BulkManager::new(
        fixtures::manager_config(dir),
        fixtures::open_state(dir),
        Arc::clone(&fetcher) as Arc<dyn ferry_core::Fetcher>,
        Arc::new(MockUploader::new()),
    );
    let report = second.run_once().await.expect("second run");
    assert_eq!(report.retried, 1);
    assert_eq!(report.completed, 1);

    let raw = fs::read_to_string(state_file(dir, "failed_downloads.json")).unwrap();
    let failures: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(failures, serde_json::json!({}));

    let raw = fs::read_to_string(state_file(dir, "processed_urls.json")).unwrap();
    let completions: serde_json::Value = serde_json::from_str(&raw).unwrap();
    let entry = &completions[IdentityHash::of(EP1).as_str()];
    assert_eq!(entry["identity"], EP1);
    assert_eq!(entry["group"], "The Show");
}
