use std::collections::HashMap;

use tracing::warn;

use super::ComponentSpec;

/// Named collection of component specs.
///
/// Registering a name twice replaces the earlier spec in place: the last
/// definition wins, and a warning is logged.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
  components: Vec<ComponentSpec>,
  index: HashMap<String, usize>,
}

impl ComponentRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a spec, returning the one it replaced, if any.
  pub fn insert(&mut self, spec: ComponentSpec) -> Option<ComponentSpec> {
    match self.index.get(&spec.name) {
      Some(&slot) => {
        warn!(
          component = %spec.name,
          previous_version = %self.components[slot].version,
          version = %spec.version,
          "component defined more than once, last definition wins"
        );
        Some(std::mem::replace(&mut self.components[slot], spec))
      }
      None => {
        self.index.insert(spec.name.clone(), self.components.len());
        self.components.push(spec);
        None
      }
    }
  }

  pub fn get(&self, name: &str) -> Option<&ComponentSpec> {
    self.index.get(name).map(|&slot| &self.components[slot])
  }

  pub fn len(&self) -> usize {
    self.components.len()
  }

  pub fn is_empty(&self) -> bool {
    self.components.is_empty()
  }

  /// Iterate specs in first-registration order.
  pub fn iter(&self) -> impl Iterator<Item = &ComponentSpec> {
    self.components.iter()
  }
}

impl FromIterator<ComponentSpec> for ComponentRegistry {
  fn from_iter<T: IntoIterator<Item = ComponentSpec>>(iter: T) -> Self {
    let mut registry = Self::new();
    for spec in iter {
      registry.insert(spec);
    }
    registry
  }
}
