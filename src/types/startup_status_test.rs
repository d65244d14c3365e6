//! Tests for `StartupStatus`.

use super::{StartupStatus, StepStatus};

const FAILED_REPORT: &str = r#"{
  "steps": [
    {"id": 1, "name": "filesystem", "status": "ok"},
    {"id": 2, "name": "database", "status": "failed", "message": "disk full"},
    {"id": 3, "name": "services", "status": "pending"}
  ],
  "currentStep": 2,
  "allPassed": false,
  "runtimeStarted": false
}"#;

#[test]
fn parses_camel_case_report() {
  let st: StartupStatus = serde_json::from_str(FAILED_REPORT).unwrap();
  assert_eq!(st.steps.len(), 3);
  assert_eq!(st.current_step, 2);
  assert!(st.has_failed());
  assert!(st.is_resolved());
}

#[test]
fn failed_steps_keeps_only_failures() {
  let st: StartupStatus = serde_json::from_str(FAILED_REPORT).unwrap();
  let failed = st.failed_steps();
  assert_eq!(failed.len(), 1);
  assert_eq!(failed[0].name, "database");
  assert_eq!(failed[0].status, StepStatus::Failed);
  assert_eq!(failed[0].message.as_deref(), Some("disk full"));
}

#[test]
fn in_progress_report_is_unresolved() {
  let st: StartupStatus =
    serde_json::from_str(r#"{"steps":[{"id":1,"name":"filesystem","status":"running"}]}"#)
      .unwrap();
  assert_eq!(st.all_passed, None);
  assert!(!st.has_failed());
  assert!(!st.is_resolved());
}

#[test]
fn runtime_started_resolves_without_verdict() {
  let st = StartupStatus {
    runtime_started: true,
    ..Default::default()
  };
  assert!(st.is_resolved());
}
