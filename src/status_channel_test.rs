//! Tests for the status channels.

use crate::status_channel::{
  FileStatusChannel, InProcessStatusChannel, StatusChannel, watch_startup,
};
use crate::types::{RuntimePhase, RuntimeStatus, StartupStatus, StartupStep, StepStatus};
use std::time::Duration;

fn running_checks() -> StartupStatus {
  StartupStatus {
    steps: vec![StartupStep {
      id: 1,
      name: "filesystem".to_string(),
      status: StepStatus::Running,
      message: None,
    }],
    current_step: 1,
    all_passed: None,
    runtime_started: false,
  }
}

#[tokio::test]
async fn missing_files_mean_not_yet_available() {
  let dir = tempfile::tempdir().unwrap();
  let ch = FileStatusChannel::new(dir.path());
  assert!(ch.startup_status().await.is_none());
  assert!(ch.runtime_status().await.is_none());
  assert!(ch.extraction_status().is_none());
  assert!(!ch.snapshot().await.is_resolved());
}

#[tokio::test]
async fn reads_what_the_workload_wrote() {
  let dir = tempfile::tempdir().unwrap();
  let ch = FileStatusChannel::new(dir.path());
  ch.write_startup(&running_checks()).unwrap();
  ch.write_runtime(&RuntimeStatus::new(RuntimePhase::LoadingModules, "imports"))
    .unwrap();
  let snap = ch.snapshot().await;
  assert_eq!(snap.startup, Some(running_checks()));
  assert_eq!(snap.runtime.unwrap().phase, RuntimePhase::LoadingModules);
}

#[tokio::test]
async fn partial_file_reads_as_absent() {
  let dir = tempfile::tempdir().unwrap();
  let ch = FileStatusChannel::new(dir.path());
  std::fs::write(ch.runtime_path(), b"{\"phase\":\"RUNN").unwrap();
  assert!(ch.runtime_status().await.is_none());
}

#[tokio::test]
async fn clear_removes_previous_launch_files() {
  let dir = tempfile::tempdir().unwrap();
  let ch = FileStatusChannel::new(dir.path());
  ch.clear_workload_status().unwrap();
  ch.write_startup(&running_checks()).unwrap();
  ch.clear_workload_status().unwrap();
  assert!(!ch.startup_path().exists());
}

#[tokio::test]
async fn in_process_channel_sees_published_status() {
  let (ch, publisher) = InProcessStatusChannel::new();
  assert!(ch.startup_status().await.is_none());
  publisher.publish_startup(running_checks());
  publisher.publish_runtime(RuntimeStatus::new(RuntimePhase::Running, "ok"));
  assert_eq!(ch.startup_status().await, Some(running_checks()));
  assert!(ch.snapshot().await.is_resolved());
}

#[tokio::test]
async fn watch_reports_changes_until_resolved() {
  let dir = tempfile::tempdir().unwrap();
  let ch = FileStatusChannel::new(dir.path());
  let writer = ch.clone();

  let workload = tokio::spawn(async move {
    tokio::time::sleep(Duration::from_millis(30)).await;
    writer.write_startup(&running_checks()).unwrap();
    tokio::time::sleep(Duration::from_millis(60)).await;
    let mut done = running_checks();
    done.steps[0].status = StepStatus::Ok;
    done.all_passed = Some(true);
    writer.write_startup(&done).unwrap();
  });

  let mut changes = 0;
  let resolved = tokio::time::timeout(
    Duration::from_secs(5),
    watch_startup(&ch, Duration::from_millis(10), |_| changes += 1),
  )
  .await
  .unwrap();
  workload.await.unwrap();
  assert_eq!(resolved.startup.unwrap().all_passed, Some(true));
  assert_eq!(changes, 2);
}
