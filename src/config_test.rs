//! Tests for `SessionConfig` and `Timings`.

use crate::config::{ENV_BUILD_NUMBER, ENV_DEST, ENV_PORT, SessionConfig, Timings};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

#[test]
fn defaults_match_documented_values() {
  let t = Timings::default();
  assert_eq!(t.status_poll(), Duration::from_millis(200));
  assert_eq!(t.startup_policy().max_attempts, 30);
  assert_eq!(t.startup_policy().interval, Duration::from_secs(1));
  assert_eq!(t.request_timeout(), Duration::from_secs(2));
  assert_eq!(t.probe_timeout(), Duration::from_secs(3));
  assert_eq!(t.resume().settle, Duration::from_millis(500));
  assert_eq!(t.resume().recovery_budget, Duration::from_secs(30));
  assert_eq!(t.progress_batch, 100);

  let c = SessionConfig::default();
  assert_eq!(c.port, 8080);
  assert_eq!(c.version_token().as_str(), "0.0.0-0");
}

#[test]
fn partial_json_keeps_defaults() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("session.json");
  std::fs::write(
    &path,
    r#"{"dest": "/data/bundle", "app_version": "2.1.0", "timings": {"health_attempts": 5}}"#,
  )
  .unwrap();

  let c = SessionConfig::from_file(&path).unwrap();
  assert_eq!(c.dest, PathBuf::from("/data/bundle"));
  assert_eq!(c.version_token().as_str(), "2.1.0-0");
  assert_eq!(c.timings.health_attempts, 5);
  assert_eq!(c.timings.status_poll_ms, 200);
  assert_eq!(c.entry_module, "main");
}

#[test]
fn malformed_json_is_invalid_data() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("session.json");
  std::fs::write(&path, "{ nope").unwrap();
  let err = SessionConfig::from_file(&path).unwrap_err();
  assert_eq!(err.kind(), std::io::ErrorKind::InvalidData);
}

#[test]
fn env_overrides_win_and_bad_port_is_ignored() {
  let env: HashMap<&str, &str> = [(ENV_DEST, "/tmp/b"), (ENV_BUILD_NUMBER, "77"), (ENV_PORT, "abc")]
    .into_iter()
    .collect();
  let c = SessionConfig::default().with_overrides(|k| env.get(k).map(|v| v.to_string()));
  assert_eq!(c.dest, PathBuf::from("/tmp/b"));
  assert_eq!(c.build_number, "77");
  assert_eq!(c.port, 8080);

  let c = c.with_overrides(|k| (k == ENV_PORT).then(|| " 9000 ".to_string()));
  assert_eq!(c.port, 9000);
}

#[test]
fn bootstrap_paths_resolve_under_dest() {
  let mut c = SessionConfig::default();
  c.dest = PathBuf::from("/data/bundle");
  c.dirs.signed_native_ext = Some(PathBuf::from("/app/Frameworks"));
  let p = c.bootstrap_paths();
  assert_eq!(p.stdlib, PathBuf::from("/data/bundle/python/lib"));
  assert_eq!(p.app_code, PathBuf::from("/data/bundle/app"));
  assert_eq!(p.native_ext.extracted, PathBuf::from("/data/bundle/native"));
  assert_eq!(p.native_ext.signed, Some(PathBuf::from("/app/Frameworks")));
}

#[test]
fn zero_attempts_still_polls_once() {
  let t = Timings {
    health_attempts: 0,
    ..Timings::default()
  };
  assert_eq!(t.startup_policy().max_attempts, 1);
}
