// Integration tests for the run loop and its shutdown flush

mod common;

use common::{FakeBackend, Workspace};
use fpsmon::logs::LocalLogSource;
use fpsmon::metrics::MetricKind;
use fpsmon::monitor;
use fpsmon::process::IncidentKind;
use fpsmon::state::SnapshotStore;
use fpsmon::Monitor;
use std::time::Duration;

const LOG: &[&str] = &["12:00:20 DEFAULT      : FPS: 60.0, frame time (avg: 16.6 ms) Player: 8"];

#[tokio::test]
async fn test_run_flushes_snapshots_on_shutdown() {
    let workspace = Workspace::new();
    workspace.write_log("session_a", LOG);

    let mut config = workspace.config();
    config.update_interval_ms = 10;
    config.status_refresh_secs = Some(1);
    let source = LocalLogSource::new(&workspace.log_root, "console.log");
    let mut monitor: Monitor<_, FakeBackend> = Monitor::new(config, source, None);

    monitor::run(&mut monitor, tokio::time::sleep(Duration::from_millis(100)))
        .await
        .unwrap();

    assert!(!monitor.metrics().series(MetricKind::Fps).raw.is_empty());

    let state = SnapshotStore::new(&workspace.data_dir).load();
    assert_eq!(state.metrics.latest(MetricKind::Fps), Some(60.0));
    assert_eq!(state.metrics.latest(MetricKind::Players), Some(8.0));
    assert!(state.uptime.server_start_time.is_some());
}

#[tokio::test]
async fn test_run_logs_shutdown_of_tracked_server() {
    let workspace = Workspace::new();
    workspace.write_log("session_a", LOG);

    let mut config = workspace.crash_config(3);
    config.update_interval_ms = 10;
    let backend = FakeBackend::with_running(777, chrono::Utc::now());
    let source = LocalLogSource::new(&workspace.log_root, "console.log");
    let mut monitor = Monitor::new(config, source, Some(backend));

    monitor::run(&mut monitor, tokio::time::sleep(Duration::from_millis(50)))
        .await
        .unwrap();

    assert!(!workspace.server_dir.join("server.pid").exists());
    let incidents = monitor.incidents(50).unwrap();
    assert_eq!(incidents.len(), 1);
    assert_eq!(incidents[0].kind, IncidentKind::Shutdown);
}
