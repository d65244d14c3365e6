//! Status records shared between the supervising side and the workload.
//!
//! All of them are plain JSON documents on disk; see [crate::status_io] for the
//! write-then-rename discipline and [crate::status_channel] for the readers.

mod extraction_status;
#[cfg(test)]
mod extraction_status_test;
mod reconnect_state;
#[cfg(test)]
mod reconnect_state_test;
mod runtime_status;
mod startup_status;
#[cfg(test)]
mod startup_status_test;
mod version_token;

pub use extraction_status::{ExtractionPhase, ExtractionStatus};
pub use reconnect_state::ReconnectState;
pub use runtime_status::{RuntimePhase, RuntimeStatus};
pub use startup_status::{StartupStatus, StartupStep, StepStatus};
pub use version_token::VersionToken;
