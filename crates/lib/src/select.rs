//! Source variant selection by target architecture.
//!
//! Selection runs for every component before any download or filesystem work,
//! so a misconfigured variant list fails the build without side effects.

use thiserror::Error;
use tracing::debug;

use crate::component::{ComponentSpec, SourceLocation, SourceVariant};
use crate::platform::Arch;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectError {
  #[error("component '{component}' has no source variant for {arch}")]
  NoMatchingVariant { component: String, arch: Arch },

  #[error("component '{component}' has {} source variants matching {arch}: {}", .predicates.len(), .predicates.join(", "))]
  AmbiguousVariant {
    component: String,
    arch: Arch,
    predicates: Vec<String>,
  },

  /// A remote variant must carry a checksum to be verified against.
  #[error("component '{component}' source {url} has no checksum")]
  MissingChecksum { component: String, url: String },

  #[error("component '{component}' source {url} has malformed checksum {checksum}")]
  InvalidChecksum {
    component: String,
    url: String,
    checksum: String,
  },
}

impl SelectError {
  /// The component the error is about.
  pub fn component(&self) -> &str {
    match self {
      SelectError::NoMatchingVariant { component, .. }
      | SelectError::AmbiguousVariant { component, .. }
      | SelectError::MissingChecksum { component, .. }
      | SelectError::InvalidChecksum { component, .. } => component,
    }
  }
}

/// Picks the one source variant that applies to the target architecture.
#[derive(Debug, Clone, Copy)]
pub struct ArchitectureSelector {
  arch: Arch,
}

impl ArchitectureSelector {
  pub fn new(arch: Arch) -> Self {
    Self { arch }
  }

  pub fn arch(&self) -> Arch {
    self.arch
  }

  /// Returns the single variant of `component` whose predicate matches.
  ///
  /// # Errors
  ///
  /// `NoMatchingVariant` if no predicate matches, `AmbiguousVariant` if more
  /// than one does.
  pub fn select<'a>(&self, component: &'a ComponentSpec) -> Result<&'a SourceVariant, SelectError> {
    let mut matching = component.sources.iter().filter(|v| v.arch.matches(self.arch));

    let Some(first) = matching.next() else {
      return Err(SelectError::NoMatchingVariant {
        component: component.name.clone(),
        arch: self.arch,
      });
    };

    if matching.next().is_some() {
      let predicates = component
        .sources
        .iter()
        .filter(|v| v.arch.matches(self.arch))
        .map(|v| v.arch.to_string())
        .collect();
      return Err(SelectError::AmbiguousVariant {
        component: component.name.clone(),
        arch: self.arch,
        predicates,
      });
    }

    debug!(component = %component.name, arch = %self.arch, source = %first.location, "selected source variant");
    Ok(first)
  }

  /// Select a variant for every component, stopping at the first error.
  ///
  /// Remote selections must also carry a well-formed checksum, so a bad
  /// digest is reported here rather than after downloads have started.
  pub fn select_all<'a>(&self, components: &'a [ComponentSpec]) -> Result<Vec<&'a SourceVariant>, SelectError> {
    components
      .iter()
      .map(|component| {
        let variant = self.select(component)?;
        check_checksum(component, variant)?;
        Ok(variant)
      })
      .collect()
  }
}

fn check_checksum(component: &ComponentSpec, variant: &SourceVariant) -> Result<(), SelectError> {
  let SourceLocation::Url(url) = &variant.location else {
    return Ok(());
  };
  match &variant.checksum {
    None => Err(SelectError::MissingChecksum {
      component: component.name.clone(),
      url: url.clone(),
    }),
    Some(checksum) if !checksum.is_well_formed() => Err(SelectError::InvalidChecksum {
      component: component.name.clone(),
      url: url.clone(),
      checksum: checksum.to_string(),
    }),
    Some(_) => Ok(()),
  }
}
