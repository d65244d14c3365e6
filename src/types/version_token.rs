//! Build identity persisted beside the extracted bundle.

use std::fmt;

/// `"{app_version}-{build_number}"`, e.g. `1.4.2-87`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionToken(String);

impl VersionToken {
  pub fn new(app_version: &str, build_number: &str) -> Self {
    Self(format!("{}-{}", app_version.trim(), build_number.trim()))
  }

  /// Wraps a token read back from disk. Surrounding whitespace is ignored.
  pub fn from_marker(raw: &str) -> Self {
    Self(raw.trim().to_string())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for VersionToken {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}
