//! Composition root: one interpreter, one launcher and one extraction lock per session.
//!
//! [RuntimeSession::boot] runs strictly in order: version guard and extraction, interpreter
//! bootstrap, launch, startup polling. Every step reports through a [BootObserver].

use crate::bootstrapper::Bootstrapper;
use crate::config::SessionConfig;
use crate::error::BootError;
use crate::extractor::Extractor;
use crate::health::{HealthProbe, HttpHealthProbe, local_health_url};
use crate::interpreter::{Interpreter, ProcessInterpreter};
use crate::launcher::{LaunchOutcome, WorkloadLauncher};
use crate::resume::{RecoveryRoutine, RelaunchRecovery, ResumeSupervisor};
use crate::startup_monitor::{Ready, StartupState, wait_until_ready};
use crate::status_channel::{FileStatusChannel, StatusChannel, StatusSnapshot, watch_startup};
use crate::types::ExtractionStatus;
use crate::version_guard::{ExtractionOutcome, VersionGuard};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Progress of a boot, in order of occurrence.
#[derive(Debug, Clone, PartialEq)]
pub enum BootEvent {
  Extracting(ExtractionStatus),
  Extracted { entries: usize },
  UpToDate,
  Bootstrapped,
  Launched(LaunchOutcome),
  Startup(StartupState),
  Status(StatusSnapshot),
  Ready { attempts: u32 },
}

/// Receives [BootEvent]s; the UI boundary of a boot.
pub trait BootObserver: Send + Sync {
  fn on_event(&self, event: &BootEvent);
}

impl<F> BootObserver for F
where
  F: Fn(&BootEvent) + Send + Sync,
{
  fn on_event(&self, event: &BootEvent) {
    self(event)
  }
}

/// Summary of a successful boot.
#[derive(Debug, Clone)]
pub struct BootReport {
  pub session_id: Uuid,
  pub extraction: ExtractionOutcome,
  pub launch: LaunchOutcome,
  pub ready: Ready,
  /// Last status seen from the workload while polling.
  pub status: StatusSnapshot,
  pub elapsed: Duration,
}

/// Owns the subsystem state that used to be process-global.
pub struct RuntimeSession {
  id: Uuid,
  config: SessionConfig,
  guard: VersionGuard,
  bootstrapper: Arc<Bootstrapper>,
  launcher: Arc<WorkloadLauncher>,
  probe: Arc<dyn HealthProbe>,
  channel: Arc<dyn StatusChannel>,
  files: FileStatusChannel,
  extraction_lock: Mutex<()>,
  closed: AtomicBool,
}

impl RuntimeSession {
  pub fn new(
    config: SessionConfig,
    interpreter: Arc<dyn Interpreter>,
    probe: Arc<dyn HealthProbe>,
    channel: Arc<dyn StatusChannel>,
  ) -> Self {
    let id = Uuid::new_v4();
    let guard = VersionGuard::new(
      config.layout.clone(),
      Extractor::new(config.timings.progress_batch),
    );
    let bootstrapper = Arc::new(Bootstrapper::new(interpreter.clone(), config.workload_env()));
    let launcher = Arc::new(WorkloadLauncher::new(interpreter));
    let files = FileStatusChannel::new(config.runtime_dir.clone());
    info!(session = %id, dest = %config.dest.display(), "session created");
    Self {
      id,
      config,
      guard,
      bootstrapper,
      launcher,
      probe,
      channel,
      files,
      extraction_lock: Mutex::new(()),
      closed: AtomicBool::new(false),
    }
  }

  /// Session with the process-hosted interpreter, HTTP health probe and file status channel.
  pub fn from_config(config: SessionConfig) -> Result<Self, BootError> {
    let interpreter: Arc<dyn Interpreter> = match &config.interpreter_program {
      Some(program) => Arc::new(ProcessInterpreter::with_program(program)),
      None => Arc::new(ProcessInterpreter::new()),
    };
    let probe = HttpHealthProbe::new(
      local_health_url(config.port),
      config.timings.request_timeout(),
      config.timings.probe_timeout(),
    )
    .map_err(|e| BootError::Config(format!("health probe: {}", e)))?;
    let channel = Arc::new(FileStatusChannel::new(config.runtime_dir.clone()));
    Ok(Self::new(config, interpreter, Arc::new(probe), channel))
  }

  pub fn id(&self) -> Uuid {
    self.id
  }

  pub fn config(&self) -> &SessionConfig {
    &self.config
  }

  pub fn launcher(&self) -> Arc<WorkloadLauncher> {
    self.launcher.clone()
  }

  pub fn probe(&self) -> Arc<dyn HealthProbe> {
    self.probe.clone()
  }

  pub fn is_closed(&self) -> bool {
    self.closed.load(Ordering::SeqCst)
  }

  /// Extracts (if needed), bootstraps, launches and waits for the workload to be healthy.
  ///
  /// Safe to call again after a failure: extraction and launch are idempotent, and the
  /// bootstrap result is cached.
  #[instrument(level = "trace", skip(self, observer), fields(session = %self.id))]
  pub async fn boot(&self, observer: &dyn BootObserver) -> Result<BootReport, BootError> {
    let started = Instant::now();
    let result = self.boot_steps(observer).await;
    match &result {
      Ok(report) => info!(
        elapsed_ms = started.elapsed().as_millis() as u64,
        attempts = report.ready.attempts(),
        "boot complete"
      ),
      Err(e) => error!(error = %e, retryable = e.is_retryable(), "boot failed"),
    }
    result.map(|mut report| {
      report.elapsed = started.elapsed();
      report
    })
  }

  async fn boot_steps(&self, observer: &dyn BootObserver) -> Result<BootReport, BootError> {
    self.ensure_open()?;
    let extraction = self.ensure_extracted(observer).await?;

    self.ensure_open()?;
    self.bootstrap().await?;
    observer.on_event(&BootEvent::Bootstrapped);

    self.ensure_open()?;
    if !self.launcher.is_running() {
      if let Err(e) = self.files.clear_workload_status() {
        warn!(error = %e, "could not clear status files of a previous launch");
      }
    }
    let launch = self.launcher.start(&self.config.entry_module)?;
    observer.on_event(&BootEvent::Launched(launch));

    let (ready, status) = self.await_startup(observer).await?;
    observer.on_event(&BootEvent::Ready {
      attempts: ready.attempts(),
    });
    Ok(BootReport {
      session_id: self.id,
      extraction,
      launch,
      ready,
      status,
      elapsed: Duration::ZERO,
    })
  }

  fn ensure_open(&self) -> Result<(), BootError> {
    if self.is_closed() {
      return Err(BootError::ShutDown);
    }
    Ok(())
  }

  /// Runs the version guard and extractor off the async workers, one attempt at a time.
  async fn ensure_extracted(
    &self,
    observer: &dyn BootObserver,
  ) -> Result<ExtractionOutcome, BootError> {
    let _lock = self.extraction_lock.lock().await;

    let guard = self.guard.clone();
    let files = self.files.clone();
    let archive = self.config.archive.clone();
    let dest = self.config.dest.clone();
    let token = self.config.version_token();
    let (tx, mut rx) = mpsc::unbounded_channel::<ExtractionStatus>();

    let task = tokio::task::spawn_blocking(move || {
      guard.ensure_extracted(&archive, &dest, &token, &mut |status| {
        if let Err(e) = files.write_extraction(status) {
          warn!(error = %e, "could not write extraction status");
        }
        let _ = tx.send(status.clone());
      })
    });
    while let Some(status) = rx.recv().await {
      observer.on_event(&BootEvent::Extracting(status));
    }
    let outcome = task.await.map_err(|e| BootError::Task(e.to_string()))??;

    observer.on_event(&match outcome {
      ExtractionOutcome::UpToDate => BootEvent::UpToDate,
      ExtractionOutcome::Extracted(entries) => BootEvent::Extracted { entries },
    });
    Ok(outcome)
  }

  async fn bootstrap(&self) -> Result<(), BootError> {
    let bootstrapper = self.bootstrapper.clone();
    let paths = self.config.bootstrap_paths();
    tokio::task::spawn_blocking(move || bootstrapper.initialize(&paths))
      .await
      .map_err(|e| BootError::Task(e.to_string()))??;
    Ok(())
  }

  /// Health polling with the status watcher running alongside it.
  async fn await_startup(
    &self,
    observer: &dyn BootObserver,
  ) -> Result<(Ready, StatusSnapshot), BootError> {
    let timings = &self.config.timings;
    let ready = wait_until_ready(
      &*self.channel,
      &*self.probe,
      timings.startup_policy(),
      |state| observer.on_event(&BootEvent::Startup(state)),
    );
    let watch = watch_startup(&*self.channel, timings.status_poll(), |snapshot| {
      observer.on_event(&BootEvent::Status(snapshot.clone()))
    });
    tokio::pin!(ready, watch);

    let mut last = None;
    loop {
      tokio::select! {
        result = &mut ready => {
          let proof = result?;
          let status = match last {
            Some(snapshot) => snapshot,
            None => self.channel.snapshot().await,
          };
          return Ok((proof, status));
        }
        snapshot = &mut watch, if last.is_none() => {
          last = Some(snapshot);
        }
      }
    }
  }

  /// Supervisor that recovers by relaunching the workload and re-probing health.
  pub fn resume_supervisor(
    &self,
    ready: Ready,
    hard_restart: impl Fn() + Send + Sync + 'static,
  ) -> ResumeSupervisor {
    let recovery = Arc::new(RelaunchRecovery::new(
      self.launcher.clone(),
      self.config.entry_module.clone(),
      self.probe.clone(),
      self.config.timings.recovery_interval(),
    ));
    self.resume_supervisor_with(ready, recovery, hard_restart)
  }

  /// Supervisor with a caller-provided recovery routine.
  pub fn resume_supervisor_with(
    &self,
    ready: Ready,
    recovery: Arc<dyn RecoveryRoutine>,
    hard_restart: impl Fn() + Send + Sync + 'static,
  ) -> ResumeSupervisor {
    ResumeSupervisor::new(
      ready,
      self.probe.clone(),
      recovery,
      hard_restart,
      self.config.timings.resume(),
    )
  }

  /// Closes the session and asks the workload to stop.
  ///
  /// Returns true if no workload thread is left. An in-process runtime that ignores the
  /// stop request keeps its thread until the process exits.
  #[instrument(level = "trace", skip(self), fields(session = %self.id))]
  pub fn shutdown(&self) -> bool {
    if self.closed.swap(true, Ordering::SeqCst) {
      return self.launcher.reap();
    }
    self.launcher.stop();
    let reaped = self.launcher.reap();
    info!(reaped, "session shut down");
    reaped
  }
}
