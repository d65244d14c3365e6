//! JSON status files in the runtime directory.
//!
//! Writers replace files with write-then-rename so a concurrent reader sees either the old
//! or the new document, never a torn one. Readers still tolerate garbage (a writer that
//! does not follow the discipline) by treating it as "not yet available".

use crate::types::VersionToken;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::Path;
use tracing::{debug, instrument};

/// Extraction progress, written by the supervising side.
pub const EXTRACTION_STATUS_FILENAME: &str = "extraction_status.json";
/// Startup checks, written by the workload.
pub const STARTUP_STATUS_FILENAME: &str = "startup_status.json";
/// Runtime lifecycle, written by the workload.
pub const RUNTIME_STATUS_FILENAME: &str = "runtime_status.json";
/// Version marker beside the extracted bundle.
pub const VERSION_MARKER_FILENAME: &str = ".bundle_version";

/// Atomically replaces `path` with `bytes` (temp file in the same directory, then rename).
#[instrument(level = "trace", skip(bytes), fields(path = %path.display()))]
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), std::io::Error> {
  let parent = path.parent().unwrap_or_else(|| Path::new("."));
  std::fs::create_dir_all(parent)?;
  let file_name = path
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_else(|| "status".to_string());
  let tmp = parent.join(format!(".{}.{}.tmp", file_name, std::process::id()));
  {
    let mut f = std::fs::File::create(&tmp)?;
    f.write_all(bytes)?;
    f.sync_all()?;
  }
  std::fs::rename(&tmp, path).inspect_err(|_| {
    let _ = std::fs::remove_file(&tmp);
  })
}

/// Serializes `value` as pretty JSON and writes it atomically.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), std::io::Error> {
  let json = serde_json::to_vec_pretty(value)
    .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
  write_atomic(path, &json)
}

/// Loads JSON from `path`. Returns error if the file is missing or invalid.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, std::io::Error> {
  let bytes = std::fs::read(path)?;
  serde_json::from_slice(&bytes).map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

/// Loads JSON from `path`; `None` when missing, unreadable or not (yet) valid.
#[instrument(level = "trace", fields(path = %path.display()))]
pub fn read_json_if_present<T: DeserializeOwned>(path: &Path) -> Option<T> {
  match read_json(path) {
    Ok(v) => Some(v),
    Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
    Err(e) => {
      debug!(error = %e, "status file not readable yet");
      None
    }
  }
}

/// Reads the version marker in `dir`, if any.
pub fn read_version_marker(dir: &Path) -> Option<VersionToken> {
  let raw = std::fs::read_to_string(dir.join(VERSION_MARKER_FILENAME)).ok()?;
  Some(VersionToken::from_marker(&raw))
}

/// Persists the version marker in `dir`.
pub fn write_version_marker(dir: &Path, token: &VersionToken) -> Result<(), std::io::Error> {
  write_atomic(&dir.join(VERSION_MARKER_FILENAME), token.as_str().as_bytes())
}
