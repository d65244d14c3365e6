//! Runs the bundled entry module on a dedicated, long-lived background thread.

use crate::error::LaunchError;
use crate::interpreter::Interpreter;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use tracing::{error, info, instrument};

/// Name of the workload thread.
pub const WORKLOAD_THREAD_NAME: &str = "bundle-workload";

/// Result of [WorkloadLauncher::start].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchOutcome {
  Started,
  AlreadyRunning,
}

/// Clears the running flag when the workload thread ends, however it ends.
struct RunningGuard(Arc<AtomicBool>);

impl Drop for RunningGuard {
  fn drop(&mut self) {
    self.0.store(false, Ordering::SeqCst);
  }
}

/// Owns the single workload thread of a session.
pub struct WorkloadLauncher {
  interpreter: Arc<dyn Interpreter>,
  running: Arc<AtomicBool>,
  handle: Mutex<Option<JoinHandle<()>>>,
  launches: AtomicU32,
}

impl WorkloadLauncher {
  pub fn new(interpreter: Arc<dyn Interpreter>) -> Self {
    Self {
      interpreter,
      running: Arc::new(AtomicBool::new(false)),
      handle: Mutex::new(None),
      launches: AtomicU32::new(0),
    }
  }

  /// Starts `entry_module` unless a workload is already running.
  ///
  /// Failures inside the workload (errors or panics) are logged on its thread and never
  /// reach the caller.
  #[instrument(level = "trace", skip(self))]
  pub fn start(&self, entry_module: &str) -> Result<LaunchOutcome, LaunchError> {
    if !self.interpreter.is_initialized() {
      return Err(LaunchError::NotInitialized);
    }
    if self
      .running
      .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
      .is_err()
    {
      info!(entry = entry_module, "workload already running");
      return Ok(LaunchOutcome::AlreadyRunning);
    }

    let mut slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(finished) = slot.take() {
      let _ = finished.join();
    }

    // Before spawning: a stop issued right after `start` returns must reach this run.
    self.interpreter.clear_stop();
    let interpreter = self.interpreter.clone();
    let guard = RunningGuard(self.running.clone());
    let entry = entry_module.to_string();
    let spawned = std::thread::Builder::new()
      .name(WORKLOAD_THREAD_NAME.to_string())
      .spawn(move || {
        let _guard = guard;
        info!(entry = %entry, "workload starting");
        match catch_unwind(AssertUnwindSafe(|| interpreter.run_main(&entry))) {
          Ok(Ok(())) => info!(entry = %entry, "workload finished"),
          Ok(Err(e)) => error!(entry = %entry, error = %e, "workload failed"),
          Err(panic) => error!(entry = %entry, panic = %panic_message(&*panic), "workload panicked"),
        }
      });

    match spawned {
      Ok(handle) => {
        *slot = Some(handle);
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(LaunchOutcome::Started)
      }
      Err(e) => {
        // The closure (and its guard) was dropped, which already cleared the flag.
        Err(LaunchError::Spawn(e.to_string()))
      }
    }
  }

  /// True while the workload thread is alive.
  pub fn is_running(&self) -> bool {
    self.running.load(Ordering::SeqCst)
  }

  /// Number of successful launches so far.
  pub fn launches(&self) -> u32 {
    self.launches.load(Ordering::SeqCst)
  }

  /// Asks the interpreter to stop the running workload.
  pub fn stop(&self) {
    if self.is_running() {
      self.interpreter.request_stop();
    }
  }

  /// Blocks until the workload thread exits. Call [Self::stop] first to ask it to.
  pub fn join(&self) {
    let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
    if let Some(h) = handle {
      let _ = h.join();
    }
  }

  /// Joins the workload thread if it has finished. Returns true when no thread is left.
  pub fn reap(&self) -> bool {
    let mut slot = self.handle.lock().unwrap_or_else(|e| e.into_inner());
    match slot.take() {
      Some(h) if h.is_finished() => {
        let _ = h.join();
        true
      }
      Some(h) => {
        *slot = Some(h);
        false
      }
      None => true,
    }
  }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
  if let Some(s) = panic.downcast_ref::<&str>() {
    (*s).to_string()
  } else if let Some(s) = panic.downcast_ref::<String>() {
    s.clone()
  } else {
    "non-string panic payload".to_string()
  }
}
