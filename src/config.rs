//! Session configuration: bundle paths, version token parts, canaries, port and timings.
//!
//! Loadable from JSON (every field has a default) and overridable from `BUNDLE_*`
//! environment variables.

use crate::bootstrapper::{BootstrapPaths, NativeExtSource};
use crate::health::DEFAULT_PORT;
use crate::resume::ResumeTimings;
use crate::startup_monitor::StartupPolicy;
use crate::status_io;
use crate::types::VersionToken;
use crate::version_guard::BundleLayout;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const ENV_ARCHIVE: &str = "BUNDLE_ARCHIVE";
pub const ENV_DEST: &str = "BUNDLE_DEST";
pub const ENV_RUNTIME_DIR: &str = "BUNDLE_RUNTIME_DIR";
pub const ENV_PORT: &str = "BUNDLE_PORT";
pub const ENV_APP_VERSION: &str = "BUNDLE_APP_VERSION";
pub const ENV_BUILD_NUMBER: &str = "BUNDLE_BUILD_NUMBER";

/// Delays, budgets and batch sizes, in milliseconds where they are durations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Timings {
  pub status_poll_ms: u64,
  pub health_attempts: u32,
  pub health_interval_ms: u64,
  pub request_timeout_ms: u64,
  pub probe_timeout_ms: u64,
  pub resume_settle_ms: u64,
  pub recovery_budget_ms: u64,
  pub recovery_interval_ms: u64,
  pub recovered_settle_ms: u64,
  pub progress_batch: usize,
}

impl Default for Timings {
  fn default() -> Self {
    Self {
      status_poll_ms: 200,
      health_attempts: 30,
      health_interval_ms: 1_000,
      request_timeout_ms: 2_000,
      probe_timeout_ms: 3_000,
      resume_settle_ms: 500,
      recovery_budget_ms: 30_000,
      recovery_interval_ms: 1_000,
      recovered_settle_ms: 500,
      progress_batch: 100,
    }
  }
}

impl Timings {
  pub fn status_poll(&self) -> Duration {
    Duration::from_millis(self.status_poll_ms)
  }

  pub fn request_timeout(&self) -> Duration {
    Duration::from_millis(self.request_timeout_ms)
  }

  pub fn probe_timeout(&self) -> Duration {
    Duration::from_millis(self.probe_timeout_ms)
  }

  pub fn recovery_interval(&self) -> Duration {
    Duration::from_millis(self.recovery_interval_ms)
  }

  pub fn startup_policy(&self) -> StartupPolicy {
    StartupPolicy {
      max_attempts: self.health_attempts.max(1),
      interval: Duration::from_millis(self.health_interval_ms),
    }
  }

  pub fn resume(&self) -> ResumeTimings {
    ResumeTimings {
      settle: Duration::from_millis(self.resume_settle_ms),
      recovery_budget: Duration::from_millis(self.recovery_budget_ms),
      recovered_settle: Duration::from_millis(self.recovered_settle_ms),
    }
  }
}

/// Directory names inside the extracted bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BundleDirs {
  pub interpreter_home: PathBuf,
  pub stdlib: PathBuf,
  pub app_code: PathBuf,
  pub packages: PathBuf,
  pub native_ext: PathBuf,
  /// Absolute, pre-validated native extension directory outside the bundle.
  pub signed_native_ext: Option<PathBuf>,
}

impl Default for BundleDirs {
  fn default() -> Self {
    Self {
      interpreter_home: PathBuf::from("python"),
      stdlib: PathBuf::from("python/lib"),
      app_code: PathBuf::from("app"),
      packages: PathBuf::from("site-packages"),
      native_ext: PathBuf::from("native"),
      signed_native_ext: None,
    }
  }
}

/// Everything a [crate::session::RuntimeSession] needs to boot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
  /// Compressed resource bundle.
  pub archive: PathBuf,
  /// Writable directory the bundle is extracted into.
  pub dest: PathBuf,
  /// Directory holding the status files.
  pub runtime_dir: PathBuf,
  pub app_version: String,
  pub build_number: String,
  /// Module run as `__main__`.
  pub entry_module: String,
  pub port: u16,
  /// Interpreter executable; defaults to `{interpreter_home}/bin/python3`.
  pub interpreter_program: Option<PathBuf>,
  pub dirs: BundleDirs,
  pub layout: BundleLayout,
  /// Extra environment for the workload.
  pub workload_env: BTreeMap<String, String>,
  pub timings: Timings,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      archive: PathBuf::from("bundle.zip"),
      dest: PathBuf::from("bundle"),
      runtime_dir: PathBuf::from("runtime"),
      app_version: "0.0.0".to_string(),
      build_number: "0".to_string(),
      entry_module: "main".to_string(),
      port: DEFAULT_PORT,
      interpreter_program: None,
      dirs: BundleDirs::default(),
      layout: BundleLayout::default(),
      workload_env: BTreeMap::new(),
      timings: Timings::default(),
    }
  }
}

impl SessionConfig {
  /// Reads a JSON config file. Missing fields take their defaults.
  pub fn from_file(path: &Path) -> Result<Self, std::io::Error> {
    status_io::read_json(path)
  }

  /// Applies `BUNDLE_*` overrides from the process environment.
  pub fn with_env_overrides(self) -> Self {
    self.with_overrides(|key| std::env::var(key).ok())
  }

  /// Applies `BUNDLE_*` overrides from `lookup`. Unparseable values are ignored with a warning.
  pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
    if let Some(v) = lookup(ENV_ARCHIVE) {
      self.archive = PathBuf::from(v);
    }
    if let Some(v) = lookup(ENV_DEST) {
      self.dest = PathBuf::from(v);
    }
    if let Some(v) = lookup(ENV_RUNTIME_DIR) {
      self.runtime_dir = PathBuf::from(v);
    }
    if let Some(v) = lookup(ENV_PORT) {
      match v.trim().parse() {
        Ok(port) => self.port = port,
        Err(e) => warn!(value = %v, error = %e, "ignoring {}", ENV_PORT),
      }
    }
    if let Some(v) = lookup(ENV_APP_VERSION) {
      self.app_version = v;
    }
    if let Some(v) = lookup(ENV_BUILD_NUMBER) {
      self.build_number = v;
    }
    self
  }

  pub fn version_token(&self) -> VersionToken {
    VersionToken::new(&self.app_version, &self.build_number)
  }

  /// Bootstrap inputs resolved against [Self::dest].
  pub fn bootstrap_paths(&self) -> BootstrapPaths {
    let d = &self.dirs;
    BootstrapPaths {
      interpreter_home: self.dest.join(&d.interpreter_home),
      stdlib: self.dest.join(&d.stdlib),
      app_code: self.dest.join(&d.app_code),
      packages: self.dest.join(&d.packages),
      native_ext: NativeExtSource {
        signed: d.signed_native_ext.clone(),
        extracted: self.dest.join(&d.native_ext),
      },
    }
  }

  pub fn workload_env(&self) -> Vec<(String, String)> {
    self
      .workload_env
      .iter()
      .map(|(k, v)| (k.clone(), v.clone()))
      .collect()
  }
}
