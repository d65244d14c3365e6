//! Startup/runtime status as seen by the supervising side.
//!
//! [FileStatusChannel] polls the JSON files the workload writes into the runtime
//! directory; [InProcessStatusChannel] serves workloads that can publish directly.
//! Both answer "not yet available" with `None`.

use crate::status_io::{
  self, EXTRACTION_STATUS_FILENAME, RUNTIME_STATUS_FILENAME, STARTUP_STATUS_FILENAME,
};
use crate::types::{ExtractionStatus, RuntimeStatus, StartupStatus};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, instrument};

/// Default interval between two status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Read side of the workload's status reports.
#[async_trait]
pub trait StatusChannel: Send + Sync {
  async fn startup_status(&self) -> Option<StartupStatus>;
  async fn runtime_status(&self) -> Option<RuntimeStatus>;

  async fn snapshot(&self) -> StatusSnapshot {
    StatusSnapshot {
      startup: self.startup_status().await,
      runtime: self.runtime_status().await,
    }
  }
}

/// Both status records at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusSnapshot {
  pub startup: Option<StartupStatus>,
  pub runtime: Option<RuntimeStatus>,
}

impl StatusSnapshot {
  /// True once neither record will make further startup progress worth polling for.
  pub fn is_resolved(&self) -> bool {
    self.startup.as_ref().is_some_and(StartupStatus::is_resolved)
      || self.runtime.as_ref().is_some_and(RuntimeStatus::is_resolved)
  }
}

/// Status files in a runtime directory.
#[derive(Debug, Clone)]
pub struct FileStatusChannel {
  runtime_dir: PathBuf,
}

impl FileStatusChannel {
  pub fn new(runtime_dir: impl Into<PathBuf>) -> Self {
    Self {
      runtime_dir: runtime_dir.into(),
    }
  }

  pub fn runtime_dir(&self) -> &Path {
    &self.runtime_dir
  }

  pub fn extraction_path(&self) -> PathBuf {
    self.runtime_dir.join(EXTRACTION_STATUS_FILENAME)
  }

  pub fn startup_path(&self) -> PathBuf {
    self.runtime_dir.join(STARTUP_STATUS_FILENAME)
  }

  pub fn runtime_path(&self) -> PathBuf {
    self.runtime_dir.join(RUNTIME_STATUS_FILENAME)
  }

  /// Latest extraction progress, if any attempt has started.
  pub fn extraction_status(&self) -> Option<ExtractionStatus> {
    status_io::read_json_if_present(&self.extraction_path())
  }

  /// Records extraction progress. The supervising side is the only writer of this file.
  pub fn write_extraction(&self, status: &ExtractionStatus) -> Result<(), std::io::Error> {
    status_io::write_json_atomic(&self.extraction_path(), status)
  }

  /// Workload side: replaces `startup_status.json`.
  pub fn write_startup(&self, status: &StartupStatus) -> Result<(), std::io::Error> {
    status_io::write_json_atomic(&self.startup_path(), status)
  }

  /// Workload side: replaces `runtime_status.json`.
  pub fn write_runtime(&self, status: &RuntimeStatus) -> Result<(), std::io::Error> {
    status_io::write_json_atomic(&self.runtime_path(), status)
  }

  /// Removes the workload's files from a previous launch.
  ///
  /// The startup and runtime files belong to the workload; the supervising side only
  /// reads them. This is the one exception, and it is only valid while no workload thread
  /// is alive (before a fresh launch), so it never races the writer.
  pub fn clear_workload_status(&self) -> Result<(), std::io::Error> {
    for path in [self.startup_path(), self.runtime_path()] {
      match std::fs::remove_file(&path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => return Err(e),
        _ => {}
      }
    }
    Ok(())
  }
}

async fn read_async<T: DeserializeOwned>(path: PathBuf) -> Option<T> {
  match tokio::fs::read(&path).await {
    Ok(bytes) => serde_json::from_slice(&bytes)
      .inspect_err(|e| debug!(path = %path.display(), error = %e, "status file not parseable yet"))
      .ok(),
    Err(_) => None,
  }
}

#[async_trait]
impl StatusChannel for FileStatusChannel {
  async fn startup_status(&self) -> Option<StartupStatus> {
    read_async(self.startup_path()).await
  }

  async fn runtime_status(&self) -> Option<RuntimeStatus> {
    read_async(self.runtime_path()).await
  }
}

/// Channel for workloads running without process isolation.
#[derive(Debug, Clone)]
pub struct InProcessStatusChannel {
  startup: watch::Receiver<Option<StartupStatus>>,
  runtime: watch::Receiver<Option<RuntimeStatus>>,
}

/// Write side of an [InProcessStatusChannel].
#[derive(Debug)]
pub struct StatusPublisher {
  startup: watch::Sender<Option<StartupStatus>>,
  runtime: watch::Sender<Option<RuntimeStatus>>,
}

impl InProcessStatusChannel {
  pub fn new() -> (Self, StatusPublisher) {
    let (startup_tx, startup_rx) = watch::channel(None);
    let (runtime_tx, runtime_rx) = watch::channel(None);
    (
      Self {
        startup: startup_rx,
        runtime: runtime_rx,
      },
      StatusPublisher {
        startup: startup_tx,
        runtime: runtime_tx,
      },
    )
  }
}

impl StatusPublisher {
  pub fn publish_startup(&self, status: StartupStatus) {
    self.startup.send_replace(Some(status));
  }

  pub fn publish_runtime(&self, status: RuntimeStatus) {
    self.runtime.send_replace(Some(status));
  }
}

#[async_trait]
impl StatusChannel for InProcessStatusChannel {
  async fn startup_status(&self) -> Option<StartupStatus> {
    self.startup.borrow().clone()
  }

  async fn runtime_status(&self) -> Option<RuntimeStatus> {
    self.runtime.borrow().clone()
  }
}

/// Polls `channel` every `interval` until the snapshot resolves, reporting each change.
///
/// Returns the resolved snapshot. Callers that stop caring simply drop or abort the task.
#[instrument(level = "trace", skip(channel, on_change))]
pub async fn watch_startup(
  channel: &dyn StatusChannel,
  interval: Duration,
  mut on_change: impl FnMut(&StatusSnapshot) + Send,
) -> StatusSnapshot {
  let mut last = StatusSnapshot::default();
  loop {
    let current = channel.snapshot().await;
    if current != last {
      on_change(&current);
      last = current;
    }
    if last.is_resolved() {
      return last;
    }
    tokio::time::sleep(interval).await;
  }
}
