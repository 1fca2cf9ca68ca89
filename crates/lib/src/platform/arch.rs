use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// CPU architectures a source variant can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Arch {
  X86_64,
  Aarch64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown architecture '{0}' (expected one of: x86_64, amd64, aarch64, arm64)")]
pub struct ParseArchError(pub String);

impl Arch {
  /// Detect the current CPU architecture at runtime
  pub fn current() -> Option<Self> {
    match std::env::consts::ARCH {
      "x86_64" => Some(Self::X86_64),
      "aarch64" => Some(Self::Aarch64),
      _ => None,
    }
  }

  /// Returns the kernel-style identifier for this architecture
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::X86_64 => "x86_64",
      Self::Aarch64 => "aarch64",
    }
  }

  /// Returns the Debian-style identifier for this architecture
  pub fn debian_name(&self) -> &'static str {
    match self {
      Self::X86_64 => "amd64",
      Self::Aarch64 => "arm64",
    }
  }
}

impl FromStr for Arch {
  type Err = ParseArchError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "x86_64" | "amd64" | "x64" => Ok(Self::X86_64),
      "aarch64" | "arm64" | "arm" => Ok(Self::Aarch64),
      _ => Err(ParseArchError(s.to_string())),
    }
  }
}

impl TryFrom<String> for Arch {
  type Error = ParseArchError;

  fn try_from(value: String) -> Result<Self, Self::Error> {
    value.parse()
  }
}

impl From<Arch> for String {
  fn from(arch: Arch) -> Self {
    arch.as_str().to_string()
  }
}

impl fmt::Display for Arch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.as_str())
  }
}
