//! Fixtures shared by unit tests: an in-memory archive writer and a fake interpreter.

use crate::bootstrapper::{BootstrapPaths, NativeExtSource};
use crate::error::WorkloadError;
use crate::health::HealthProbe;
use crate::interpreter::{Interpreter, InterpreterConfig};
use async_trait::async_trait;
use flate2::Compression;
use flate2::Crc;
use flate2::write::DeflateEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Writes local file headers the way a ZIP tool would, followed by an end-of-directory
/// record so the decoder sees a non-matching signature after the last entry.
#[derive(Default)]
pub(crate) struct ArchiveBuilder {
  buf: Vec<u8>,
  last_header: usize,
}

impl ArchiveBuilder {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn stored(self, name: &str, data: &[u8]) -> Self {
    self.entry(name, 0, data, data, 0)
  }

  pub(crate) fn deflated(self, name: &str, data: &[u8]) -> Self {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    let compressed = enc.finish().unwrap();
    self.entry(name, 8, &compressed, data, 0)
  }

  pub(crate) fn dir(self, name: &str) -> Self {
    self.entry(name, 0, &[], &[], 0)
  }

  /// Entry with an arbitrary method id; payload stored as-is.
  pub(crate) fn with_method(self, name: &str, method: u16, data: &[u8]) -> Self {
    self.entry(name, method, data, data, 0)
  }

  /// Entry whose declared uncompressed size is wrong by `delta`.
  pub(crate) fn deflated_with_size_delta(self, name: &str, data: &[u8], delta: i64) -> Self {
    let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
    enc.write_all(data).unwrap();
    let compressed = enc.finish().unwrap();
    let mut b = self.entry(name, 8, &compressed, data, 0);
    let declared = (data.len() as i64 + delta) as u32;
    let at = b.last_header + 22;
    b.buf[at..at + 4].copy_from_slice(&declared.to_le_bytes());
    b
  }

  fn entry(mut self, name: &str, method: u16, payload: &[u8], plain: &[u8], flags: u16) -> Self {
    let mut crc = Crc::new();
    crc.update(plain);
    self.last_header = self.buf.len();
    let b = &mut self.buf;
    b.extend_from_slice(&0x0403_4B50u32.to_le_bytes());
    b.extend_from_slice(&20u16.to_le_bytes());
    b.extend_from_slice(&flags.to_le_bytes());
    b.extend_from_slice(&method.to_le_bytes());
    b.extend_from_slice(&0u32.to_le_bytes());
    b.extend_from_slice(&crc.sum().to_le_bytes());
    b.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    b.extend_from_slice(&(plain.len() as u32).to_le_bytes());
    b.extend_from_slice(&(name.len() as u16).to_le_bytes());
    b.extend_from_slice(&0u16.to_le_bytes());
    b.extend_from_slice(name.as_bytes());
    b.extend_from_slice(payload);
    self
  }

  pub(crate) fn finish(mut self) -> Vec<u8> {
    self.buf.extend_from_slice(&0x0605_4B50u32.to_le_bytes());
    self.buf.extend_from_slice(&[0u8; 18]);
    self.buf
  }
}

type RunFn = Box<dyn Fn(&str) -> Result<(), WorkloadError> + Send + Sync>;

/// In-process interpreter that records calls and runs a closure as the workload.
pub(crate) struct FakeInterpreter {
  pub(crate) init_calls: AtomicUsize,
  pub(crate) runs: AtomicUsize,
  pub(crate) config: Mutex<Option<InterpreterConfig>>,
  pub(crate) site_dirs: Mutex<Vec<PathBuf>>,
  fail_init: Option<String>,
  run: RunFn,
}

impl FakeInterpreter {
  pub(crate) fn new(run: impl Fn(&str) -> Result<(), WorkloadError> + Send + Sync + 'static) -> Self {
    Self {
      init_calls: AtomicUsize::new(0),
      runs: AtomicUsize::new(0),
      config: Mutex::new(None),
      site_dirs: Mutex::new(Vec::new()),
      fail_init: None,
      run: Box::new(run),
    }
  }

  pub(crate) fn idle() -> Self {
    Self::new(|_| Ok(()))
  }

  pub(crate) fn failing_init(message: &str) -> Self {
    Self {
      fail_init: Some(message.to_string()),
      ..Self::idle()
    }
  }
}

impl Interpreter for FakeInterpreter {
  fn initialize(&self, config: &InterpreterConfig) -> Result<(), String> {
    self.init_calls.fetch_add(1, Ordering::SeqCst);
    if let Some(m) = &self.fail_init {
      return Err(m.clone());
    }
    *self.config.lock().unwrap() = Some(config.clone());
    Ok(())
  }

  fn add_site_dir(&self, dir: &Path) -> Result<(), String> {
    self.site_dirs.lock().unwrap().push(dir.to_path_buf());
    Ok(())
  }

  fn is_initialized(&self) -> bool {
    self.config.lock().unwrap().is_some()
  }

  fn run_main(&self, entry_module: &str) -> Result<(), WorkloadError> {
    self.runs.fetch_add(1, Ordering::SeqCst);
    (self.run)(entry_module)
  }
}

/// Lays out an extracted bundle: stdlib, app code, packages and native dirs under `root`.
pub(crate) fn bundle_paths(root: &Path) -> BootstrapPaths {
  let paths = BootstrapPaths {
    interpreter_home: root.join("python"),
    stdlib: root.join("python/lib"),
    app_code: root.join("app"),
    packages: root.join("site-packages"),
    native_ext: NativeExtSource {
      signed: None,
      extracted: root.join("native"),
    },
  };
  for d in [&paths.stdlib, &paths.app_code, &paths.packages, &paths.native_ext.extracted] {
    std::fs::create_dir_all(d).unwrap();
  }
  paths
}

/// Health probe that becomes healthy after `healthy_after` unhealthy answers (never if `None`).
pub(crate) struct ScriptedProbe {
  pub(crate) calls: AtomicUsize,
  healthy_after: Mutex<Option<usize>>,
}

impl ScriptedProbe {
  pub(crate) fn healthy_after(n: usize) -> Self {
    Self {
      calls: AtomicUsize::new(0),
      healthy_after: Mutex::new(Some(n)),
    }
  }

  pub(crate) fn never() -> Self {
    Self {
      calls: AtomicUsize::new(0),
      healthy_after: Mutex::new(None),
    }
  }

  /// From now on, healthy after `n` more unhealthy answers (`None`: never).
  pub(crate) fn set_healthy_after(&self, n: Option<usize>) {
    let done = self.calls.load(Ordering::SeqCst);
    *self.healthy_after.lock().unwrap() = n.map(|n| done + n);
  }

  pub(crate) fn calls(&self) -> usize {
    self.calls.load(Ordering::SeqCst)
  }
}

#[async_trait]
impl HealthProbe for ScriptedProbe {
  async fn check_health(&self) -> bool {
    let previous = self.calls.fetch_add(1, Ordering::SeqCst);
    matches!(*self.healthy_after.lock().unwrap(), Some(n) if previous >= n)
  }
}
