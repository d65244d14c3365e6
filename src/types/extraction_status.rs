//! Progress record of a bundle extraction (`extraction_status.json`).

use serde::{Deserialize, Serialize};

/// Phase of an extraction attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionPhase {
  Extracting,
  Complete,
  Error,
}

/// Progress of an extraction attempt. Sole writer: the extractor's progress sink.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionStatus {
  pub phase: ExtractionPhase,
  #[serde(alias = "filesExtracted")]
  pub files_extracted: u64,
  #[serde(default, alias = "totalFiles")]
  pub total_files: Option<u64>,
  #[serde(default, alias = "currentFile")]
  pub current_file: Option<String>,
  #[serde(default)]
  pub error: Option<String>,
}

impl ExtractionStatus {
  /// Status written when an attempt begins.
  pub fn started(total_files: Option<u64>) -> Self {
    Self {
      phase: ExtractionPhase::Extracting,
      files_extracted: 0,
      total_files,
      current_file: None,
      error: None,
    }
  }

  /// Intermediate progress after `files_extracted` entries.
  pub fn progress(
    files_extracted: u64,
    total_files: Option<u64>,
    current_file: impl Into<String>,
  ) -> Self {
    Self {
      phase: ExtractionPhase::Extracting,
      files_extracted,
      total_files,
      current_file: Some(current_file.into()),
      error: None,
    }
  }

  /// Final status of a successful attempt.
  pub fn complete(files_extracted: u64) -> Self {
    Self {
      phase: ExtractionPhase::Complete,
      files_extracted,
      total_files: Some(files_extracted),
      current_file: None,
      error: None,
    }
  }

  /// Final status of a failed attempt.
  pub fn failed(files_extracted: u64, error: impl Into<String>) -> Self {
    Self {
      phase: ExtractionPhase::Error,
      files_extracted,
      total_files: None,
      current_file: None,
      error: Some(error.into()),
    }
  }

  /// Fraction of entries done, when the total is known.
  pub fn fraction(&self) -> Option<f64> {
    match self.total_files {
      Some(0) => Some(1.0),
      Some(total) => Some(self.files_extracted as f64 / total as f64),
      None => None,
    }
  }
}
