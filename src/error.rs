//! Error taxonomy for bundle extraction, interpreter bootstrap, launch and startup.
//!
//! Each stage has its own enum; [BootError] is the single terminal error surfaced by
//! [crate::session::RuntimeSession::boot]. Resume-time failures are not errors: they are
//! reported as [crate::resume::ResumeState::RestartRequired] and never tear down a session.

use std::path::PathBuf;
use thiserror::Error;

use crate::types::StartupStep;

/// Failure while decoding the resource bundle into the destination directory.
///
/// Fatal to the attempt; a retry always starts from an empty destination.
#[derive(Debug, Error)]
pub enum ExtractionError {
  #[error("archive not found: {}", .0.display())]
  ArchiveNotFound(PathBuf),

  #[error("invalid archive: {0}")]
  InvalidArchive(String),

  #[error("unsupported compression method {0}")]
  UnsupportedCompression(u16),

  #[error("decompression failed for {0}")]
  DecompressionFailed(String),

  #[error("failed to create {}: {source}", path.display())]
  FileCreationFailed {
    path: PathBuf,
    #[source]
    source: std::io::Error,
  },
}

/// Failure while configuring or initializing the embedded interpreter.
///
/// Cached by the bootstrapper, hence `Clone` and string payloads only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BootstrapError {
  #[error("standard library missing at {}", .0.display())]
  MissingStandardLibrary(PathBuf),

  #[error("application code missing at {}", .0.display())]
  MissingApplicationCode(PathBuf),

  #[error("interpreter configuration failed: {0}")]
  InterpreterConfigException(String),
}

/// Failure to hand the entry module to a workload thread.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LaunchError {
  #[error("interpreter is not initialized")]
  NotInitialized,

  #[error("failed to spawn workload thread: {0}")]
  Spawn(String),
}

/// Failure raised by the workload while it runs. Logged and contained by the launcher.
#[derive(Debug, Error)]
pub enum WorkloadError {
  #[error("workload exited with status {0}")]
  Exited(i32),

  #[error("workload terminated by signal")]
  Signaled,

  #[error("workload io: {0}")]
  Io(#[from] std::io::Error),

  #[error("workload failed: {0}")]
  Other(String),
}

/// Terminal error of one boot attempt, carrying full diagnostic detail.
#[derive(Debug, Error)]
pub enum BootError {
  #[error(transparent)]
  Extraction(#[from] ExtractionError),

  #[error(transparent)]
  Bootstrap(#[from] BootstrapError),

  #[error(transparent)]
  Launch(#[from] LaunchError),

  #[error("startup checks failed: {}", failed_step_names(.failed_steps))]
  StartupCheckFailure { failed_steps: Vec<StartupStep> },

  #[error("workload did not become healthy after {attempts} attempts")]
  HealthTimeout { attempts: u32 },

  #[error("session is shut down")]
  ShutDown,

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error("background task failed: {0}")]
  Task(String),

  #[error("io: {0}")]
  Io(#[from] std::io::Error),
}

impl BootError {
  /// Whether a plain retry of the boot can plausibly succeed.
  ///
  /// Bootstrap and configuration errors need a new build or new settings; everything
  /// else is worth another attempt.
  pub fn is_retryable(&self) -> bool {
    !matches!(
      self,
      BootError::Bootstrap(_) | BootError::Config(_) | BootError::ShutDown
    )
  }
}

fn failed_step_names(steps: &[StartupStep]) -> String {
  steps
    .iter()
    .map(|s| match &s.message {
      Some(m) => format!("{} ({})", s.name, m),
      None => s.name.clone(),
    })
    .collect::<Vec<_>>()
    .join(", ")
}
