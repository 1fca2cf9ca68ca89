use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::action::BuildAction;
use crate::consts::LOCAL_SOURCE_VERSION;
use crate::platform::Arch;
use crate::util::hash::HashAlgorithm;

/// Whether `name` is usable as a single path component.
///
/// Component names become directories under the work directory and project
/// names become artifact file names, so neither may be empty, `.` or `..`, or
/// contain a path separator.
pub fn is_path_safe_name(name: &str) -> bool {
  !name.is_empty() && name != "." && name != ".." && !name.contains(['/', '\\', '\0'])
}

/// Which build architectures a source variant applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchPredicate {
  /// Matches every architecture.
  #[default]
  Any,
  /// Matches only the listed architectures.
  OneOf(Vec<Arch>),
  /// Matches every architecture except the listed ones.
  Not(Vec<Arch>),
}

impl ArchPredicate {
  pub fn matches(&self, arch: Arch) -> bool {
    match self {
      ArchPredicate::Any => true,
      ArchPredicate::OneOf(archs) => archs.contains(&arch),
      ArchPredicate::Not(archs) => !archs.contains(&arch),
    }
  }
}

impl fmt::Display for ArchPredicate {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let join = |archs: &[Arch]| archs.iter().map(Arch::as_str).collect::<Vec<_>>().join(",");
    match self {
      ArchPredicate::Any => write!(f, "any"),
      ArchPredicate::OneOf(archs) => write!(f, "one_of[{}]", join(archs)),
      ArchPredicate::Not(archs) => write!(f, "not[{}]", join(archs)),
    }
  }
}

/// Expected digest of a downloaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checksum {
  pub algorithm: HashAlgorithm,
  pub digest: String,
}

impl Checksum {
  /// Create a checksum, normalizing the digest to lowercase hex.
  pub fn new(algorithm: HashAlgorithm, digest: impl Into<String>) -> Self {
    Self {
      algorithm,
      digest: digest.into().trim().to_ascii_lowercase(),
    }
  }

  pub fn sha256(digest: impl Into<String>) -> Self {
    Self::new(HashAlgorithm::Sha256, digest)
  }

  /// Compare against a computed hex digest, ignoring case.
  pub fn matches(&self, actual: &str) -> bool {
    self.digest.eq_ignore_ascii_case(actual)
  }

  /// Returns true if the digest has the right length and only hex digits.
  pub fn is_well_formed(&self) -> bool {
    self.digest.len() == self.algorithm.hex_len() && self.digest.chars().all(|c| c.is_ascii_hexdigit())
  }
}

impl fmt::Display for Checksum {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.algorithm, self.digest)
  }
}

/// Where a component's source lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceLocation {
  /// Downloaded (`http`, `https` or `file` scheme) and verified against a checksum.
  Url(String),
  /// A local directory or file, used as-is.
  Path(PathBuf),
}

impl SourceLocation {
  pub fn is_local(&self) -> bool {
    matches!(self, SourceLocation::Path(_))
  }
}

impl fmt::Display for SourceLocation {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SourceLocation::Url(url) => f.write_str(url),
      SourceLocation::Path(path) => write!(f, "{}", path.display()),
    }
  }
}

/// One candidate source for a component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceVariant {
  pub arch: ArchPredicate,
  pub location: SourceLocation,
  pub checksum: Option<Checksum>,
}

impl SourceVariant {
  /// A remote source valid for every architecture.
  pub fn url(url: impl Into<String>, checksum: Checksum) -> Self {
    Self {
      arch: ArchPredicate::Any,
      location: SourceLocation::Url(url.into()),
      checksum: Some(checksum),
    }
  }

  /// A local source valid for every architecture.
  pub fn path(path: impl Into<PathBuf>) -> Self {
    Self {
      arch: ArchPredicate::Any,
      location: SourceLocation::Path(path.into()),
      checksum: None,
    }
  }

  pub fn for_arch(mut self, arch: ArchPredicate) -> Self {
    self.arch = arch;
    self
  }
}

/// Declarative description of one buildable software unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentSpec {
  pub name: String,
  pub version: String,
  pub sources: Vec<SourceVariant>,
  /// Components that must finish building before this one starts. Ordered, no duplicates.
  pub depends_on: Vec<String>,
  pub actions: Vec<BuildAction>,
  pub license: Option<String>,
  pub license_file: Option<String>,
  /// Sub-directory of the prepared source that actions run in.
  pub relative_path: Option<String>,
}

impl ComponentSpec {
  pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      version: version.into(),
      sources: Vec::new(),
      depends_on: Vec::new(),
      actions: Vec::new(),
      license: None,
      license_file: None,
      relative_path: None,
    }
  }

  /// Returns true if the version is the `local_source` sentinel.
  pub fn is_local_source(&self) -> bool {
    self.version == LOCAL_SOURCE_VERSION
  }

  pub fn with_source(mut self, variant: SourceVariant) -> Self {
    self.sources.push(variant);
    self
  }

  /// Add a dependency, ignoring names already present.
  pub fn depends_on(mut self, name: impl Into<String>) -> Self {
    self.add_dependency(name);
    self
  }

  pub fn add_dependency(&mut self, name: impl Into<String>) {
    let name = name.into();
    if !self.depends_on.contains(&name) {
      self.depends_on.push(name);
    }
  }

  pub fn with_actions(mut self, actions: impl IntoIterator<Item = BuildAction>) -> Self {
    self.actions.extend(actions);
    self
  }

  pub fn with_license(mut self, license: impl Into<String>) -> Self {
    self.license = Some(license.into());
    self
  }

  pub fn with_relative_path(mut self, path: impl Into<String>) -> Self {
    self.relative_path = Some(path.into());
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn predicate_matching() {
    assert!(ArchPredicate::Any.matches(Arch::Aarch64));
    assert!(ArchPredicate::OneOf(vec![Arch::X86_64]).matches(Arch::X86_64));
    assert!(!ArchPredicate::OneOf(vec![Arch::X86_64]).matches(Arch::Aarch64));
    assert!(ArchPredicate::Not(vec![Arch::Aarch64]).matches(Arch::X86_64));
    assert!(!ArchPredicate::Not(vec![Arch::Aarch64]).matches(Arch::Aarch64));
  }

  #[test]
  fn predicate_display() {
    assert_eq!(ArchPredicate::Any.to_string(), "any");
    assert_eq!(
      ArchPredicate::OneOf(vec![Arch::X86_64, Arch::Aarch64]).to_string(),
      "one_of[x86_64,aarch64]"
    );
  }

  #[test]
  fn checksum_normalizes_and_compares_case_insensitively() {
    let checksum = Checksum::sha256(" ABCDEF ");
    assert_eq!(checksum.digest, "abcdef");
    assert!(checksum.matches("AbCdEf"));
    assert!(!checksum.is_well_formed());

    let valid = Checksum::sha256("a".repeat(64));
    assert!(valid.is_well_formed());
  }

  #[test]
  fn depends_on_deduplicates_and_keeps_order() {
    let spec = ComponentSpec::new("app", "1.0")
      .depends_on("zlib")
      .depends_on("openssl")
      .depends_on("zlib");
    assert_eq!(spec.depends_on, vec!["zlib", "openssl"]);
  }

  #[test]
  fn path_safe_names() {
    for ok in ["openssl", "libffi-3.4", "app.d", "..."] {
      assert!(is_path_safe_name(ok), "{ok}");
    }
    for bad in ["", ".", "..", "/etc", "a/b", "a\\b", "nul\0"] {
      assert!(!is_path_safe_name(bad), "{bad:?}");
    }
  }

  #[test]
  fn local_source_sentinel() {
    assert!(ComponentSpec::new("app", "local_source").is_local_source());
    assert!(!ComponentSpec::new("app", "1.2.3").is_local_source());
  }
}
