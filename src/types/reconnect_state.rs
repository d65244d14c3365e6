//! In-memory reconnect bookkeeping of the resume supervisor. Never persisted.

/// Overlay state shown while the supervisor is re-establishing the workload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconnectState {
  pub is_reconnecting: bool,
  pub reconnect_failed: bool,
  /// Failed recovery cycles since the last success.
  pub attempts: u32,
}

impl ReconnectState {
  pub(crate) fn begin(&mut self) {
    self.is_reconnecting = true;
    self.reconnect_failed = false;
  }

  pub(crate) fn succeed(&mut self) {
    *self = ReconnectState::default();
  }

  pub(crate) fn fail(&mut self) {
    self.is_reconnecting = false;
    self.reconnect_failed = true;
    self.attempts += 1;
  }
}
