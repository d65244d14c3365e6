//! Tests for `ReconnectState`.

use super::ReconnectState;

#[test]
fn fail_increments_attempts_once() {
  let mut st = ReconnectState::default();
  st.begin();
  assert!(st.is_reconnecting);
  st.fail();
  assert!(!st.is_reconnecting);
  assert!(st.reconnect_failed);
  assert_eq!(st.attempts, 1);
  st.begin();
  assert!(!st.reconnect_failed);
  st.fail();
  assert_eq!(st.attempts, 2);
}

#[test]
fn succeed_resets_everything() {
  let mut st = ReconnectState {
    is_reconnecting: true,
    reconnect_failed: true,
    attempts: 3,
  };
  st.succeed();
  assert_eq!(st, ReconnectState::default());
}
