//! Turns completion-handler APIs (sign-in, purchases, platform dialogs) into futures.
//!
//! The platform side gets a [Completer] to resolve exactly once; the async side awaits the
//! matching [Pending]. A completer dropped without an answer resolves as cancelled.

use futures::channel::oneshot;
use std::time::Duration;
use tracing::debug;

/// How a bridged call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome<T> {
  Success(T),
  Cancelled,
  Error(String),
  /// No answer within the wait timeout.
  Pending,
}

impl<T> BridgeOutcome<T> {
  pub fn is_success(&self) -> bool {
    matches!(self, BridgeOutcome::Success(_))
  }

  pub fn success(self) -> Option<T> {
    match self {
      BridgeOutcome::Success(v) => Some(v),
      _ => None,
    }
  }
}

enum Resolution<T> {
  Success(T),
  Cancelled,
  Error(String),
}

impl<T> From<Resolution<T>> for BridgeOutcome<T> {
  fn from(r: Resolution<T>) -> Self {
    match r {
      Resolution::Success(v) => BridgeOutcome::Success(v),
      Resolution::Cancelled => BridgeOutcome::Cancelled,
      Resolution::Error(e) => BridgeOutcome::Error(e),
    }
  }
}

/// Callback side. Each method consumes it, so a call resolves at most once.
pub struct Completer<T> {
  tx: oneshot::Sender<Resolution<T>>,
}

impl<T> Completer<T> {
  /// Returns false if nobody is waiting anymore.
  pub fn succeed(self, value: T) -> bool {
    self.resolve(Resolution::Success(value))
  }

  pub fn fail(self, message: impl Into<String>) -> bool {
    self.resolve(Resolution::Error(message.into()))
  }

  pub fn cancel(self) -> bool {
    self.resolve(Resolution::Cancelled)
  }

  fn resolve(self, resolution: Resolution<T>) -> bool {
    let delivered = self.tx.send(resolution).is_ok();
    if !delivered {
      debug!("bridged call resolved after its waiter went away");
    }
    delivered
  }
}

/// Async side of a bridged call.
pub struct Pending<T> {
  rx: oneshot::Receiver<Resolution<T>>,
}

impl<T> Pending<T> {
  /// Waits up to `timeout`; [BridgeOutcome::Pending] if nothing arrived.
  pub async fn wait(self, timeout: Duration) -> BridgeOutcome<T> {
    match tokio::time::timeout(timeout, self.rx).await {
      Ok(Ok(resolution)) => resolution.into(),
      Ok(Err(oneshot::Canceled)) => BridgeOutcome::Cancelled,
      Err(_) => BridgeOutcome::Pending,
    }
  }

  /// Waits without a deadline.
  pub async fn outcome(self) -> BridgeOutcome<T> {
    match self.rx.await {
      Ok(resolution) => resolution.into(),
      Err(oneshot::Canceled) => BridgeOutcome::Cancelled,
    }
  }

  /// Non-blocking check; [BridgeOutcome::Pending] while unresolved.
  pub fn poll_outcome(&mut self) -> BridgeOutcome<T> {
    match self.rx.try_recv() {
      Ok(Some(resolution)) => resolution.into(),
      Ok(None) => BridgeOutcome::Pending,
      Err(oneshot::Canceled) => BridgeOutcome::Cancelled,
    }
  }
}

/// A fresh completer/pending pair.
pub fn callback_bridge<T>() -> (Completer<T>, Pending<T>) {
  let (tx, rx) = oneshot::channel();
  (Completer { tx }, Pending { rx })
}

/// Hands a completer to `register` (which passes it to the callback API) and returns the
/// pending side.
pub fn bridge_call<T>(register: impl FnOnce(Completer<T>)) -> Pending<T> {
  let (completer, pending) = callback_bridge();
  register(completer);
  pending
}
