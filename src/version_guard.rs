//! Decides whether the bundle must be (re-)extracted and performs it when it must.

use crate::error::ExtractionError;
use crate::extractor::Extractor;
use crate::status_io;
use crate::types::{ExtractionStatus, VersionToken};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// A legacy compiled-extension file whose modern wrapper must sit beside it.
///
/// When `legacy` exists without `modern`, the tree was produced by an older packaging
/// format and is always re-extracted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleFormatCanary {
  pub legacy: PathBuf,
  pub modern: PathBuf,
}

/// Canary paths, relative to the destination directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLayout {
  pub stdlib_canary: PathBuf,
  pub entry_canary: PathBuf,
  #[serde(default)]
  pub stale_format: Vec<StaleFormatCanary>,
}

impl Default for BundleLayout {
  fn default() -> Self {
    Self {
      stdlib_canary: PathBuf::from("python/lib/os.py"),
      entry_canary: PathBuf::from("app/main.py"),
      stale_format: vec![StaleFormatCanary {
        legacy: PathBuf::from("native/_ssl.so"),
        modern: PathBuf::from("native/_ssl.fwork"),
      }],
    }
  }
}

/// Result of [VersionGuard::ensure_extracted].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionOutcome {
  /// Canaries and marker matched; nothing was written.
  UpToDate,
  /// The bundle was extracted; carries the entry count.
  Extracted(usize),
}

/// Gatekeeper in front of the extractor.
#[derive(Debug, Clone, Default)]
pub struct VersionGuard {
  layout: BundleLayout,
  extractor: Extractor,
}

impl VersionGuard {
  pub fn new(layout: BundleLayout, extractor: Extractor) -> Self {
    Self { layout, extractor }
  }

  pub fn layout(&self) -> &BundleLayout {
    &self.layout
  }

  /// True unless every canary is in place, the marker equals `current`, and no stale
  /// format is detected.
  #[instrument(level = "trace", skip(self), fields(dest = %dest.display(), token = %current))]
  pub fn needs_extraction(&self, dest: &Path, current: &VersionToken) -> bool {
    if !dest.join(&self.layout.stdlib_canary).exists() {
      info!(canary = %self.layout.stdlib_canary.display(), "stdlib canary missing");
      return true;
    }
    if !dest.join(&self.layout.entry_canary).exists() {
      info!(canary = %self.layout.entry_canary.display(), "entry module canary missing");
      return true;
    }
    match status_io::read_version_marker(dest) {
      Some(marker) if &marker == current => {}
      marker => {
        info!(persisted = ?marker.map(|m| m.to_string()), "version marker differs");
        return true;
      }
    }
    if let Some(stale) = self
      .layout
      .stale_format
      .iter()
      .find(|c| dest.join(&c.legacy).exists() && !dest.join(&c.modern).exists())
    {
      info!(legacy = %stale.legacy.display(), "stale native extension format");
      return true;
    }
    false
  }

  /// Extracts `archive_path` into `dest` unless [Self::needs_extraction] says otherwise.
  ///
  /// The marker is written only after extraction fully succeeds.
  pub fn ensure_extracted(
    &self,
    archive_path: &Path,
    dest: &Path,
    current: &VersionToken,
    progress: &mut dyn FnMut(&ExtractionStatus),
  ) -> Result<ExtractionOutcome, ExtractionError> {
    if !self.needs_extraction(dest, current) {
      info!(token = %current, "bundle up to date, skipping extraction");
      return Ok(ExtractionOutcome::UpToDate);
    }
    let bytes = fs::read(archive_path).map_err(|e| match e.kind() {
      std::io::ErrorKind::NotFound => ExtractionError::ArchiveNotFound(archive_path.to_path_buf()),
      _ => ExtractionError::InvalidArchive(format!("{}: {}", archive_path.display(), e)),
    })?;
    self.extract_and_mark(&bytes, dest, current, progress)
  }

  /// Same as [Self::ensure_extracted] for an archive already in memory.
  pub fn ensure_extracted_bytes(
    &self,
    archive: &[u8],
    dest: &Path,
    current: &VersionToken,
    progress: &mut dyn FnMut(&ExtractionStatus),
  ) -> Result<ExtractionOutcome, ExtractionError> {
    if !self.needs_extraction(dest, current) {
      return Ok(ExtractionOutcome::UpToDate);
    }
    self.extract_and_mark(archive, dest, current, progress)
  }

  fn extract_and_mark(
    &self,
    archive: &[u8],
    dest: &Path,
    current: &VersionToken,
    progress: &mut dyn FnMut(&ExtractionStatus),
  ) -> Result<ExtractionOutcome, ExtractionError> {
    reset_dir(dest)?;
    let n = self.extractor.extract(archive, dest, progress)?;
    status_io::write_version_marker(dest, current).map_err(|source| {
      ExtractionError::FileCreationFailed {
        path: dest.join(status_io::VERSION_MARKER_FILENAME),
        source,
      }
    })?;
    info!(entries = n, token = %current, "version marker written");
    Ok(ExtractionOutcome::Extracted(n))
  }
}

fn reset_dir(dest: &Path) -> Result<(), ExtractionError> {
  let failed = |source| ExtractionError::FileCreationFailed {
    path: dest.to_path_buf(),
    source,
  };
  if dest.exists() {
    fs::remove_dir_all(dest).map_err(failed)?;
  }
  fs::create_dir_all(dest).map_err(failed)
}
