//! End-to-end tests for file-change driven reload and restart.

#![cfg(unix)]

use std::sync::Arc;
use std::time::Duration;

use procwarden::client;
use procwarden::config::WatchEntryConfig;
use procwarden::supervisor::Supervisor;
use serial_test::serial;

use super::test_helpers::{snapshot, test_config, wait_until};

#[tokio::test]
#[serial]
async fn file_changes_recycle_the_worker_session() {
    let dir = tempfile::tempdir().expect("tempdir");
    let src = dir.path().join("src");
    std::fs::create_dir(&src).expect("mkdir");

    let mut config = test_config(dir.path(), "sleep", &["30"]);
    config.watch.enabled = true;
    config.watch.entries = vec![WatchEntryConfig {
        path: src.clone(),
        ext: None,
    }];
    let config = Arc::new(config);

    let supervisor = Supervisor::new(Arc::clone(&config));
    let status = supervisor.status_handle();
    let owner = tokio::spawn(supervisor.start());

    let running = wait_until(
        || snapshot(&status).state == "running",
        Duration::from_secs(5),
    )
    .await;
    assert!(running, "supervisor never reached running");
    let first_pid = snapshot(&status).worker_pid.expect("worker pid");

    // ── A new file triggers a restart ───────────────────
    let source_file = src.join("handler.txt");
    std::fs::write(&source_file, "v1").expect("write");
    let restarted = wait_until(
        || snapshot(&status).worker_pid.is_some_and(|pid| pid != first_pid),
        Duration::from_secs(5),
    )
    .await;
    assert!(restarted, "file creation did not recycle the worker");

    // ── A modification triggers a reload ────────────────
    // Let the restart settle and the snapshot catch up before touching
    // the tree again.
    tokio::time::sleep(Duration::from_millis(400)).await;
    let second_pid = snapshot(&status).worker_pid.expect("worker pid");

    std::fs::write(&source_file, "v2 with different content").expect("rewrite");
    let reloaded = wait_until(
        || snapshot(&status).worker_pid.is_some_and(|pid| pid != second_pid),
        Duration::from_secs(5),
    )
    .await;
    assert!(reloaded, "file modification did not reload the worker");

    assert!(client::stop(&config).await.expect("send stop"));
    tokio::time::timeout(Duration::from_secs(10), owner)
        .await
        .expect("owner loop did not exit")
        .expect("owner task panicked")
        .expect("owner returned an error");
}
