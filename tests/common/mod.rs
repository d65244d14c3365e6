//! Fixtures shared by the integration tests: bundle archives and an HTTP workload.

#![allow(dead_code)]

use axum::Router;
use axum::routing::get;
use bundle_supervisor::error::WorkloadError;
use bundle_supervisor::health::DEFAULT_HEALTH_PATH;
use bundle_supervisor::interpreter::{Interpreter, InterpreterConfig};
use bundle_supervisor::status_channel::FileStatusChannel;
use bundle_supervisor::types::{StartupStatus, StartupStep, StepStatus};
use flate2::Compression;
use flate2::Crc;
use flate2::write::DeflateEncoder;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Local file headers followed by an end-of-central-directory record.
pub fn archive(entries: &[(&str, &[u8], bool)]) -> Vec<u8> {
  let mut buf = Vec::new();
  for (name, plain, deflate) in entries {
    let (method, payload) = if *deflate {
      let mut enc = DeflateEncoder::new(Vec::new(), Compression::default());
      enc.write_all(plain).unwrap();
      (8u16, enc.finish().unwrap())
    } else {
      (0u16, plain.to_vec())
    };
    let mut crc = Crc::new();
    crc.update(plain);
    buf.extend_from_slice(&0x0403_4B50u32.to_le_bytes());
    buf.extend_from_slice(&20u16.to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&method.to_le_bytes());
    buf.extend_from_slice(&0u32.to_le_bytes());
    buf.extend_from_slice(&crc.sum().to_le_bytes());
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(plain.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(name.len() as u16).to_le_bytes());
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(&payload);
  }
  buf.extend_from_slice(&0x0605_4B50u32.to_le_bytes());
  buf.extend_from_slice(&[0u8; 18]);
  buf
}

/// Minimal bundle: entry module, a deflated stdlib file and a packages directory.
pub fn app_bundle() -> Vec<u8> {
  let os_py = "import sys\n".repeat(50);
  archive(&[
    ("app/main.py", b"print('hello world')", false),
    ("python/lib/os.py", &os_py.as_bytes()[..500], true),
    ("site-packages/", b"", false),
  ])
}

pub fn write_bundle(dir: &Path) -> PathBuf {
  let path = dir.join("bundle.zip");
  std::fs::write(&path, app_bundle()).unwrap();
  path
}

pub fn passed_status() -> StartupStatus {
  StartupStatus {
    steps: vec![StartupStep {
      id: 1,
      name: "services".to_string(),
      status: StepStatus::Ok,
      message: None,
    }],
    current_step: 1,
    all_passed: Some(true),
    runtime_started: true,
  }
}

/// Workload that reports passed startup checks and serves the health route on a
/// pre-bound listener until asked to stop.
pub struct HttpWorkload {
  listener: Mutex<Option<std::net::TcpListener>>,
  runtime_dir: PathBuf,
  initialized: Mutex<Option<InterpreterConfig>>,
  stop: Arc<AtomicBool>,
  pub runs: AtomicUsize,
}

impl HttpWorkload {
  /// Returns the workload and the port it will listen on.
  pub fn bind(runtime_dir: &Path) -> (Self, u16) {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let workload = Self {
      listener: Mutex::new(Some(listener)),
      runtime_dir: runtime_dir.to_path_buf(),
      initialized: Mutex::new(None),
      stop: Arc::new(AtomicBool::new(false)),
      runs: AtomicUsize::new(0),
    };
    (workload, port)
  }
}

impl Interpreter for HttpWorkload {
  fn initialize(&self, config: &InterpreterConfig) -> Result<(), String> {
    *self.initialized.lock().unwrap() = Some(config.clone());
    Ok(())
  }

  fn add_site_dir(&self, _dir: &Path) -> Result<(), String> {
    Ok(())
  }

  fn is_initialized(&self) -> bool {
    self.initialized.lock().unwrap().is_some()
  }

  fn run_main(&self, _entry_module: &str) -> Result<(), WorkloadError> {
    self.runs.fetch_add(1, Ordering::SeqCst);
    let listener = self
      .listener
      .lock()
      .unwrap()
      .take()
      .ok_or_else(|| WorkloadError::Other("listener already used".to_string()))?;
    listener.set_nonblocking(true)?;
    FileStatusChannel::new(self.runtime_dir.clone()).write_startup(&passed_status())?;

    let rt = tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()?;
    let stop = Arc::clone(&self.stop);
    rt.block_on(async {
      let listener = tokio::net::TcpListener::from_std(listener)?;
      let app = Router::new().route(DEFAULT_HEALTH_PATH, get(|| async { "ok" }));
      axum::serve(listener, app)
        .with_graceful_shutdown(async move {
          while !stop.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(10)).await;
          }
        })
        .await
    })?;
    Ok(())
  }

  fn request_stop(&self) {
    self.stop.store(true, Ordering::SeqCst);
  }
}
