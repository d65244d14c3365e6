//! Resume supervision: liveness check on every foreground transition and bounded recovery.
//!
//! ```text
//! Running --foreground--> Checking --healthy--> Running
//!                            |
//!                            +--dead--> Reconnecting --recovered--> Recovered --> Running
//!                                            |
//!                                            +--budget spent--> RestartRequired
//! RestartRequired --retry--> Checking
//! RestartRequired --hard restart--> process termination hook
//! ```
//!
//! Failures here never tear the session down; they only change the published state.

use crate::health::HealthProbe;
use crate::launcher::WorkloadLauncher;
use crate::startup_monitor::Ready;
use crate::types::ReconnectState;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{info, instrument, warn};

/// State of the resume supervisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResumeState {
  Running,
  Checking,
  Reconnecting,
  Recovered,
  RestartRequired,
}

impl fmt::Display for ResumeState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      ResumeState::Running => write!(f, "running"),
      ResumeState::Checking => write!(f, "checking"),
      ResumeState::Reconnecting => write!(f, "reconnecting"),
      ResumeState::Recovered => write!(f, "recovered"),
      ResumeState::RestartRequired => write!(f, "restart_required"),
    }
  }
}

/// What the UI overlay renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeSnapshot {
  pub state: ResumeState,
  pub reconnect: ReconnectState,
}

/// Delays and budgets of a resume cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeTimings {
  /// Wait before judging liveness, so the OS can resume suspended threads.
  pub settle: Duration,
  /// Hard ceiling of one recovery attempt.
  pub recovery_budget: Duration,
  /// Pause on `Recovered` before returning to `Running`.
  pub recovered_settle: Duration,
}

impl Default for ResumeTimings {
  fn default() -> Self {
    Self {
      settle: Duration::from_millis(500),
      recovery_budget: Duration::from_secs(30),
      recovered_settle: Duration::from_millis(500),
    }
  }
}

/// Re-confirms or re-establishes the workload's listener.
#[async_trait]
pub trait RecoveryRoutine: Send + Sync {
  /// Returns true once the workload is healthy again. Should give up within `budget`;
  /// the supervisor enforces it regardless.
  async fn recover(&self, budget: Duration) -> bool;
}

/// Relaunches the workload if its thread has died, then re-probes until healthy.
pub struct RelaunchRecovery {
  launcher: Arc<WorkloadLauncher>,
  entry_module: String,
  probe: Arc<dyn HealthProbe>,
  interval: Duration,
}

impl RelaunchRecovery {
  pub fn new(
    launcher: Arc<WorkloadLauncher>,
    entry_module: impl Into<String>,
    probe: Arc<dyn HealthProbe>,
    interval: Duration,
  ) -> Self {
    Self {
      launcher,
      entry_module: entry_module.into(),
      probe,
      interval,
    }
  }
}

#[async_trait]
impl RecoveryRoutine for RelaunchRecovery {
  #[instrument(level = "trace", skip(self))]
  async fn recover(&self, budget: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + budget;
    loop {
      if !self.launcher.is_running() {
        match self.launcher.start(&self.entry_module) {
          Ok(outcome) => info!(?outcome, "relaunched workload"),
          Err(e) => warn!(error = %e, "workload relaunch failed"),
        }
      }
      if self.probe.check_health().await {
        return true;
      }
      if tokio::time::Instant::now() + self.interval >= deadline {
        return false;
      }
      tokio::time::sleep(self.interval).await;
    }
  }
}

type HardRestartHook = Box<dyn Fn() + Send + Sync>;
type Observer = Box<dyn Fn(&ResumeSnapshot) + Send + Sync>;

/// Drives [ResumeState] on foreground transitions and user actions.
pub struct ResumeSupervisor {
  probe: Arc<dyn HealthProbe>,
  recovery: Arc<dyn RecoveryRoutine>,
  hard_restart: HardRestartHook,
  observer: Option<Observer>,
  timings: ResumeTimings,
  state: watch::Sender<ResumeSnapshot>,
  cycle: Mutex<()>,
}

impl ResumeSupervisor {
  /// Creates a supervisor in `Running`. Requires proof of the first successful startup.
  pub fn new(
    ready: Ready,
    probe: Arc<dyn HealthProbe>,
    recovery: Arc<dyn RecoveryRoutine>,
    hard_restart: impl Fn() + Send + Sync + 'static,
    timings: ResumeTimings,
  ) -> Self {
    info!(startup_attempts = ready.attempts(), "resume supervision armed");
    let (state, _) = watch::channel(ResumeSnapshot {
      state: ResumeState::Running,
      reconnect: ReconnectState::default(),
    });
    Self {
      probe,
      recovery,
      hard_restart: Box::new(hard_restart),
      observer: None,
      timings,
      state,
      cycle: Mutex::new(()),
    }
  }

  /// Calls `observer` on every transition, in order.
  pub fn with_observer(mut self, observer: impl Fn(&ResumeSnapshot) + Send + Sync + 'static) -> Self {
    self.observer = Some(Box::new(observer));
    self
  }

  /// Latest snapshot, for late subscribers.
  pub fn subscribe(&self) -> watch::Receiver<ResumeSnapshot> {
    self.state.subscribe()
  }

  pub fn snapshot(&self) -> ResumeSnapshot {
    *self.state.borrow()
  }

  pub fn state(&self) -> ResumeState {
    self.snapshot().state
  }

  pub fn reconnect_state(&self) -> ReconnectState {
    self.snapshot().reconnect
  }

  /// The app came back to the foreground. Ignored unless `Running` and idle.
  pub async fn on_foreground(&self) -> ResumeSnapshot {
    self.run_cycle_from(ResumeState::Running).await
  }

  /// The user asked to try again from the restart overlay.
  pub async fn retry(&self) -> ResumeSnapshot {
    self.run_cycle_from(ResumeState::RestartRequired).await
  }

  /// The user chose a hard restart. Only honored in `RestartRequired`.
  pub fn hard_restart(&self) -> bool {
    if self.state() != ResumeState::RestartRequired {
      return false;
    }
    warn!(attempts = self.reconnect_state().attempts, "hard restart requested");
    (self.hard_restart)();
    true
  }

  async fn run_cycle_from(&self, expected: ResumeState) -> ResumeSnapshot {
    let Ok(_cycle) = self.cycle.try_lock() else {
      return self.snapshot();
    };
    if self.state() != expected {
      return self.snapshot();
    }
    self.run_cycle().await
  }

  #[instrument(level = "trace", skip(self))]
  async fn run_cycle(&self) -> ResumeSnapshot {
    self.transition(ResumeState::Checking, |_| {});
    tokio::time::sleep(self.timings.settle).await;

    if self.probe.check_health().await {
      info!("workload alive after resume");
      return self.transition(ResumeState::Running, ReconnectState::succeed);
    }

    warn!("workload not responding after resume, reconnecting");
    self.transition(ResumeState::Reconnecting, ReconnectState::begin);
    let budget = self.timings.recovery_budget;
    let recovered = tokio::time::timeout(budget, self.recovery.recover(budget))
      .await
      .unwrap_or(false);

    if recovered {
      info!("workload recovered");
      self.transition(ResumeState::Recovered, ReconnectState::succeed);
      tokio::time::sleep(self.timings.recovered_settle).await;
      return self.transition(ResumeState::Running, |_| {});
    }

    let snapshot = self.transition(ResumeState::RestartRequired, ReconnectState::fail);
    warn!(attempts = snapshot.reconnect.attempts, "recovery failed, restart required");
    snapshot
  }

  fn transition(&self, to: ResumeState, update: impl FnOnce(&mut ReconnectState)) -> ResumeSnapshot {
    let mut next = self.snapshot();
    next.state = to;
    update(&mut next.reconnect);
    self.state.send_replace(next);
    if let Some(observer) = &self.observer {
      observer(&next);
    }
    next
  }
}
