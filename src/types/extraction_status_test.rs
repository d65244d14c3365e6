//! Tests for `ExtractionStatus`.

use super::{ExtractionPhase, ExtractionStatus};

#[test]
fn phase_serializes_lowercase() {
  let json = serde_json::to_string(&ExtractionStatus::complete(3)).unwrap();
  assert!(json.contains(r#""phase":"complete""#));
  assert!(json.contains(r#""files_extracted":3"#));
}

#[test]
fn accepts_camel_case_keys() {
  let st: ExtractionStatus = serde_json::from_str(
    r#"{"phase":"extracting","filesExtracted":100,"totalFiles":400,"currentFile":"a/b.py"}"#,
  )
  .unwrap();
  assert_eq!(st.phase, ExtractionPhase::Extracting);
  assert_eq!(st.files_extracted, 100);
  assert_eq!(st.total_files, Some(400));
  assert_eq!(st.current_file.as_deref(), Some("a/b.py"));
  assert_eq!(st.fraction(), Some(0.25));
}

#[test]
fn failed_carries_message() {
  let st = ExtractionStatus::failed(7, "boom");
  assert_eq!(st.phase, ExtractionPhase::Error);
  assert_eq!(st.error.as_deref(), Some("boom"));
  assert_eq!(st.fraction(), None);
}

#[test]
fn empty_archive_is_fully_done() {
  assert_eq!(ExtractionStatus::complete(0).fraction(), Some(1.0));
}
