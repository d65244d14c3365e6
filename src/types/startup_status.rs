//! Startup check report written by the workload (`startup_status.json`).

use serde::{Deserialize, Serialize};

/// Status of one startup check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
  Pending,
  Running,
  Ok,
  Failed,
}

/// One startup check as reported by the workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupStep {
  pub id: u32,
  pub name: String,
  pub status: StepStatus,
  #[serde(default)]
  pub message: Option<String>,
}

/// Startup checks as a whole. Read-only on the supervising side.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartupStatus {
  #[serde(default)]
  pub steps: Vec<StartupStep>,
  #[serde(default, alias = "currentStep")]
  pub current_step: u32,
  /// `None` while checks are still running.
  #[serde(default, alias = "allPassed")]
  pub all_passed: Option<bool>,
  #[serde(default, alias = "runtimeStarted")]
  pub runtime_started: bool,
}

impl StartupStatus {
  /// True when the workload has reported a definitive failure.
  pub fn has_failed(&self) -> bool {
    self.all_passed == Some(false)
  }

  /// Steps whose status is `failed`, in report order.
  pub fn failed_steps(&self) -> Vec<StartupStep> {
    self
      .steps
      .iter()
      .filter(|s| s.status == StepStatus::Failed)
      .cloned()
      .collect()
  }

  /// True once polling this record can stop.
  pub fn is_resolved(&self) -> bool {
    self.all_passed.is_some() || self.runtime_started
  }
}
