//! # bundle-supervisor
//!
//! Bootstrap and supervision of an embedded interpreter workload.
//!
//! ## Architecture
//!
//! A [RuntimeSession] owns one boot pipeline, run strictly in order:
//!
//! 1. [VersionGuard] decides whether the resource bundle must be (re-)extracted, and the
//!    hand-rolled [Extractor] decodes it (stored and deflate entries).
//! 2. [Bootstrapper] configures and initializes the [Interpreter] exactly once.
//! 3. [WorkloadLauncher] runs the entry module on a dedicated thread.
//! 4. [wait_until_ready] polls the workload's [StatusChannel] and [HealthProbe] until
//!    it is healthy, reports failed startup checks, or runs out of attempts.
//!
//! After a successful boot, a [ResumeSupervisor] re-checks liveness on every foreground
//! transition and runs bounded recovery before asking for a restart.

pub mod bootstrapper;
pub mod byte_cursor;
pub mod callback_bridge;
pub mod config;
#[cfg(test)]
mod config_test;
pub mod error;
pub mod extractor;
pub mod health;
#[cfg(test)]
mod health_test;
pub mod interpreter;
pub mod launcher;
pub mod resume;
pub mod session;
pub mod startup_monitor;
pub mod status_channel;
#[cfg(test)]
mod status_channel_test;
pub mod status_io;
#[cfg(test)]
mod test_support;
pub mod types;
pub mod version_guard;

pub use bootstrapper::{BootstrapPaths, Bootstrapper, NativeExtSource};
pub use callback_bridge::{BridgeOutcome, Completer, Pending, callback_bridge};
pub use config::{SessionConfig, Timings};
pub use error::{BootError, BootstrapError, ExtractionError, LaunchError, WorkloadError};
pub use extractor::Extractor;
pub use health::{HealthProbe, HttpHealthProbe};
pub use interpreter::{Interpreter, InterpreterConfig, ProcessInterpreter};
pub use launcher::{LaunchOutcome, WorkloadLauncher};
pub use resume::{RecoveryRoutine, RelaunchRecovery, ResumeState, ResumeSupervisor};
pub use session::{BootEvent, BootObserver, BootReport, RuntimeSession};
pub use startup_monitor::{Ready, StartupPolicy, StartupState, wait_until_ready};
pub use status_channel::{FileStatusChannel, InProcessStatusChannel, StatusChannel};
pub use types::{
  ExtractionStatus, ReconnectState, RuntimePhase, RuntimeStatus, StartupStatus, VersionToken,
};
pub use version_guard::{ExtractionOutcome, VersionGuard};
