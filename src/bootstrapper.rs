//! One-shot configuration and initialization of the embedded interpreter.
//!
//! The underlying runtime cannot be re-initialized in-process once started, so the first
//! result (success or failure) is cached for the lifetime of the [Bootstrapper].

use crate::error::BootstrapError;
use crate::interpreter::{Interpreter, InterpreterConfig};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Where native extensions are loaded from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeExtSource {
  /// Pre-validated, signed location (required by sandboxes that verify code signatures).
  #[serde(default)]
  pub signed: Option<PathBuf>,
  /// Location inside the freshly extracted bundle.
  pub extracted: PathBuf,
}

impl NativeExtSource {
  /// Signed location when configured and present, else the extracted one.
  ///
  /// Falling back only logs a warning: some failures surface later, when a specific
  /// extension is imported.
  pub fn resolve(&self) -> PathBuf {
    match &self.signed {
      Some(signed) if signed.is_dir() => signed.clone(),
      Some(signed) => {
        warn!(
          signed = %signed.display(),
          fallback = %self.extracted.display(),
          "signed native extension directory unavailable, loading extracted extensions"
        );
        self.extracted.clone()
      }
      None => self.extracted.clone(),
    }
  }
}

/// Filesystem inputs of [Bootstrapper::initialize].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootstrapPaths {
  pub interpreter_home: PathBuf,
  pub stdlib: PathBuf,
  pub app_code: PathBuf,
  /// Third-party packages, registered after initialization.
  pub packages: PathBuf,
  pub native_ext: NativeExtSource,
}

/// Builds the isolated interpreter configuration for `paths`.
///
/// Search order: standard library, native extensions, application code.
pub fn build_config(paths: &BootstrapPaths, env: &[(String, String)]) -> InterpreterConfig {
  InterpreterConfig {
    home: paths.interpreter_home.clone(),
    search_paths: vec![
      paths.stdlib.clone(),
      paths.native_ext.resolve(),
      paths.app_code.clone(),
    ],
    utf8_mode: true,
    coerce_c_locale: true,
    write_bytecode: false,
    buffered_stdio: false,
    user_site: false,
    env: env.to_vec(),
  }
}

/// Initializes the interpreter at most once.
pub struct Bootstrapper {
  interpreter: Arc<dyn Interpreter>,
  env: Vec<(String, String)>,
  result: OnceCell<Result<(), BootstrapError>>,
}

impl Bootstrapper {
  pub fn new(interpreter: Arc<dyn Interpreter>, env: Vec<(String, String)>) -> Self {
    Self {
      interpreter,
      env,
      result: OnceCell::new(),
    }
  }

  pub fn interpreter(&self) -> Arc<dyn Interpreter> {
    self.interpreter.clone()
  }

  /// Validates `paths`, configures and initializes the interpreter.
  ///
  /// Later calls return the first result without touching the interpreter; their
  /// `paths` are ignored.
  pub fn initialize(&self, paths: &BootstrapPaths) -> Result<(), BootstrapError> {
    self
      .result
      .get_or_init(|| self.initialize_once(paths))
      .clone()
  }

  /// True once [Self::initialize] has succeeded.
  pub fn is_initialized(&self) -> bool {
    matches!(self.result.get(), Some(Ok(())))
  }

  #[instrument(level = "trace", skip(self, paths), fields(home = %paths.interpreter_home.display()))]
  fn initialize_once(&self, paths: &BootstrapPaths) -> Result<(), BootstrapError> {
    if !paths.stdlib.is_dir() {
      return Err(BootstrapError::MissingStandardLibrary(paths.stdlib.clone()));
    }
    if !paths.app_code.is_dir() {
      return Err(BootstrapError::MissingApplicationCode(
        paths.app_code.clone(),
      ));
    }

    let config = build_config(paths, &self.env);
    self
      .interpreter
      .initialize(&config)
      .map_err(BootstrapError::InterpreterConfigException)?;

    if paths.packages.is_dir() {
      self
        .interpreter
        .add_site_dir(&paths.packages)
        .map_err(BootstrapError::InterpreterConfigException)?;
    } else {
      warn!(packages = %paths.packages.display(), "package directory missing, not registered");
    }
    info!("interpreter initialized");
    Ok(())
  }
}
