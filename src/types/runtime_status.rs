//! Runtime lifecycle record written by the workload (`runtime_status.json`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle phase reported by the workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimePhase {
  EarlyInit,
  LoadingModules,
  InitializingServices,
  StartingServer,
  Running,
  Error,
  Stopped,
}

impl RuntimePhase {
  /// Phases after which the workload no longer makes startup progress.
  pub fn is_terminal(self) -> bool {
    matches!(self, RuntimePhase::Error | RuntimePhase::Stopped)
  }
}

impl fmt::Display for RuntimePhase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let s = match self {
      RuntimePhase::EarlyInit => "EARLY_INIT",
      RuntimePhase::LoadingModules => "LOADING_MODULES",
      RuntimePhase::InitializingServices => "INITIALIZING_SERVICES",
      RuntimePhase::StartingServer => "STARTING_SERVER",
      RuntimePhase::Running => "RUNNING",
      RuntimePhase::Error => "ERROR",
      RuntimePhase::Stopped => "STOPPED",
    };
    f.write_str(s)
  }
}

/// Continuously updated runtime status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeStatus {
  pub phase: RuntimePhase,
  #[serde(default)]
  pub status: String,
  /// Seconds since the Unix epoch.
  #[serde(default)]
  pub timestamp: Option<f64>,
  #[serde(default)]
  pub error: Option<String>,
  #[serde(default)]
  pub port: Option<u16>,
  #[serde(default, alias = "restartCount")]
  pub restart_count: Option<u32>,
}

impl RuntimeStatus {
  pub fn new(phase: RuntimePhase, status: impl Into<String>) -> Self {
    Self {
      phase,
      status: status.into(),
      timestamp: Some(Utc::now().timestamp_millis() as f64 / 1000.0),
      error: None,
      port: None,
      restart_count: None,
    }
  }

  /// Timestamp as a UTC date, if present and representable.
  pub fn updated_at(&self) -> Option<DateTime<Utc>> {
    let ts = self.timestamp?;
    if !ts.is_finite() {
      return None;
    }
    DateTime::from_timestamp_millis((ts * 1000.0).round() as i64)
  }

  /// True once polling this record can stop.
  pub fn is_resolved(&self) -> bool {
    self.phase == RuntimePhase::Running || self.phase.is_terminal()
  }
}
