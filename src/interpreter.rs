//! The embedded interpreter seam.
//!
//! [Interpreter] is what the bootstrapper and the launcher talk to. [ProcessInterpreter]
//! hosts a bundled CPython executable and maps [InterpreterConfig] onto its isolated
//! environment; tests substitute in-process fakes.

use crate::error::WorkloadError;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Pre-initialization settings of the interpreter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterConfig {
  pub home: PathBuf,
  /// Module search path, in lookup order.
  pub search_paths: Vec<PathBuf>,
  pub utf8_mode: bool,
  pub coerce_c_locale: bool,
  pub write_bytecode: bool,
  pub buffered_stdio: bool,
  pub user_site: bool,
  /// Extra environment for the workload (e.g. its home directory).
  pub env: Vec<(String, String)>,
}

/// A foreign runtime that can be initialized once and then run one main module.
pub trait Interpreter: Send + Sync {
  /// Applies `config` and brings the runtime up.
  fn initialize(&self, config: &InterpreterConfig) -> Result<(), String>;

  /// Registers an additional site directory after initialization.
  fn add_site_dir(&self, dir: &Path) -> Result<(), String>;

  fn is_initialized(&self) -> bool;

  /// Runs `entry_module` as the main program. Blocks until it finishes.
  fn run_main(&self, entry_module: &str) -> Result<(), WorkloadError>;

  /// Asks a running main program to stop. Runtimes that cannot be stopped ignore it.
  /// A request made before [Self::run_main] starts applies to that run.
  fn request_stop(&self) {}

  /// Drops a stop request left over from an earlier run. Called before a new run is
  /// scheduled, never from inside [Self::run_main].
  fn clear_stop(&self) {}
}

/// Registers site directories, then runs the entry module as `__main__`.
const BOOTSTRAP_SNIPPET: &str = "\
import runpy, site, sys
entry = sys.argv[1]
for d in sys.argv[2:]:
    site.addsitedir(d)
sys.argv = [entry]
runpy.run_module(entry, run_name='__main__', alter_sys=True)
";

/// Variables that would leak the host's interpreter setup into the workload.
const SCRUBBED_ENV: &[&str] = &[
  "PYTHONSTARTUP",
  "PYTHONINSPECT",
  "PYTHONUSERBASE",
  "PYTHONEXECUTABLE",
  "PYTHONSAFEPATH",
  "VIRTUAL_ENV",
];

const STOP_POLL: Duration = Duration::from_millis(200);

#[derive(Debug, Clone)]
struct Prepared {
  program: PathBuf,
  config: InterpreterConfig,
  site_dirs: Vec<PathBuf>,
}

/// Hosts the bundled interpreter executable (`{home}/bin/python3` unless overridden).
#[derive(Debug, Default)]
pub struct ProcessInterpreter {
  program: Option<PathBuf>,
  prepared: Mutex<Option<Prepared>>,
  stop: AtomicBool,
}

impl ProcessInterpreter {
  pub fn new() -> Self {
    Self::default()
  }

  /// Uses `program` instead of the executable under the interpreter home.
  pub fn with_program(program: impl Into<PathBuf>) -> Self {
    Self {
      program: Some(program.into()),
      ..Self::default()
    }
  }

  fn prepared(&self) -> Option<Prepared> {
    self.prepared.lock().ok().and_then(|p| p.clone())
  }

  /// Builds the command that runs `entry_module`; exposed for inspection.
  pub fn command(&self, entry_module: &str) -> Result<Command, String> {
    let p = self.prepared().ok_or("interpreter is not initialized")?;
    let c = &p.config;
    let search_path = std::env::join_paths(&c.search_paths).map_err(|e| e.to_string())?;

    let mut cmd = Command::new(&p.program);
    if !c.buffered_stdio {
      cmd.arg("-u");
    }
    if !c.write_bytecode {
      cmd.arg("-B");
    }
    if !c.user_site {
      cmd.arg("-s");
    }
    if c.utf8_mode {
      cmd.args(["-X", "utf8"]);
    }
    cmd.arg("-c").arg(BOOTSTRAP_SNIPPET).arg(entry_module);
    cmd.args(&p.site_dirs);

    for var in SCRUBBED_ENV {
      cmd.env_remove(var);
    }
    cmd
      .env("PYTHONHOME", &c.home)
      .env("PYTHONPATH", search_path);
    if c.utf8_mode {
      cmd.env("PYTHONUTF8", "1").env("PYTHONIOENCODING", "utf-8");
    }
    if c.coerce_c_locale {
      cmd.env("LC_CTYPE", "C.UTF-8").env("PYTHONCOERCECLOCALE", "1");
    }
    if !c.write_bytecode {
      cmd.env("PYTHONDONTWRITEBYTECODE", "1");
    }
    if !c.buffered_stdio {
      cmd.env("PYTHONUNBUFFERED", "1");
    }
    if !c.user_site {
      cmd.env("PYTHONNOUSERSITE", "1");
    }
    for (k, v) in &c.env {
      cmd.env(k, v);
    }
    Ok(cmd)
  }
}

fn exit_result(status: ExitStatus) -> Result<(), WorkloadError> {
  match status.code() {
    Some(0) => Ok(()),
    Some(code) => Err(WorkloadError::Exited(code)),
    None => Err(WorkloadError::Signaled),
  }
}

impl Interpreter for ProcessInterpreter {
  #[instrument(level = "trace", skip(self, config), fields(home = %config.home.display()))]
  fn initialize(&self, config: &InterpreterConfig) -> Result<(), String> {
    let program = self
      .program
      .clone()
      .unwrap_or_else(|| config.home.join("bin").join("python3"));
    if !program.exists() {
      return Err(format!(
        "interpreter executable not found at {}",
        program.display()
      ));
    }
    let _: OsString = std::env::join_paths(&config.search_paths).map_err(|e| e.to_string())?;
    let mut guard = self.prepared.lock().map_err(|e| e.to_string())?;
    *guard = Some(Prepared {
      program,
      config: config.clone(),
      site_dirs: Vec::new(),
    });
    info!(search_paths = ?config.search_paths, "interpreter configured");
    Ok(())
  }

  fn add_site_dir(&self, dir: &Path) -> Result<(), String> {
    let mut guard = self.prepared.lock().map_err(|e| e.to_string())?;
    let prepared = guard.as_mut().ok_or("interpreter is not initialized")?;
    prepared.site_dirs.push(dir.to_path_buf());
    Ok(())
  }

  fn is_initialized(&self) -> bool {
    self.prepared().is_some()
  }

  fn run_main(&self, entry_module: &str) -> Result<(), WorkloadError> {
    let mut cmd = self.command(entry_module).map_err(WorkloadError::Other)?;
    let mut child = cmd.spawn()?;
    info!(pid = child.id(), entry = entry_module, "workload process started");
    loop {
      if let Some(status) = child.try_wait()? {
        return exit_result(status);
      }
      if self.stop.load(Ordering::SeqCst) {
        warn!(pid = child.id(), "stopping workload process");
        child.kill()?;
        return exit_result(child.wait()?);
      }
      std::thread::sleep(STOP_POLL);
    }
  }

  fn request_stop(&self) {
    self.stop.store(true, Ordering::SeqCst);
  }

  fn clear_stop(&self) {
    self.stop.store(false, Ordering::SeqCst);
  }
}
