//! Startup polling: `Polling → {Ready, StartupFailed, TimedOut}`.
//!
//! Each attempt first looks at the workload's startup checks and fails fast on a
//! definitive failure, then probes health. The attempt budget bounds the whole loop.

use crate::error::BootError;
use crate::health::HealthProbe;
use crate::status_channel::StatusChannel;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Default number of health attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 30;
/// Default pause between two attempts.
pub const DEFAULT_ATTEMPT_INTERVAL: Duration = Duration::from_secs(1);

/// Budget of the startup poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupPolicy {
  pub max_attempts: u32,
  pub interval: Duration,
}

impl Default for StartupPolicy {
  fn default() -> Self {
    Self {
      max_attempts: DEFAULT_MAX_ATTEMPTS,
      interval: DEFAULT_ATTEMPT_INTERVAL,
    }
  }
}

/// Observable state of the startup poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupState {
  Polling { attempt: u32 },
  Ready,
  StartupFailed,
  TimedOut,
}

/// Proof that the workload became healthy once. Required by the resume supervisor.
#[derive(Debug, Clone, Copy)]
pub struct Ready {
  attempts: u32,
  at: Instant,
}

impl Ready {
  /// Health attempts it took to get here.
  pub fn attempts(&self) -> u32 {
    self.attempts
  }

  pub fn at(&self) -> Instant {
    self.at
  }

  #[cfg(test)]
  pub(crate) fn for_tests() -> Self {
    Self {
      attempts: 1,
      at: Instant::now(),
    }
  }
}

/// Polls until healthy, failed, or out of attempts.
///
/// Errors are [BootError::StartupCheckFailure] or [BootError::HealthTimeout] only.
#[instrument(level = "trace", skip(channel, probe, on_state))]
pub async fn wait_until_ready(
  channel: &dyn StatusChannel,
  probe: &dyn HealthProbe,
  policy: StartupPolicy,
  mut on_state: impl FnMut(StartupState) + Send,
) -> Result<Ready, BootError> {
  for attempt in 1..=policy.max_attempts {
    on_state(StartupState::Polling { attempt });

    match channel.startup_status().await {
      Some(status) if status.has_failed() => {
        let failed_steps = status.failed_steps();
        warn!(attempt, failed = failed_steps.len(), "startup checks failed");
        on_state(StartupState::StartupFailed);
        return Err(BootError::StartupCheckFailure { failed_steps });
      }
      _ => {}
    }

    if probe.check_health().await {
      info!(attempt, "workload is healthy");
      on_state(StartupState::Ready);
      return Ok(Ready {
        attempts: attempt,
        at: Instant::now(),
      });
    }

    if attempt < policy.max_attempts {
      tokio::time::sleep(policy.interval).await;
    }
  }

  warn!(attempts = policy.max_attempts, "workload never became healthy");
  on_state(StartupState::TimedOut);
  Err(BootError::HealthTimeout {
    attempts: policy.max_attempts,
  })
}
