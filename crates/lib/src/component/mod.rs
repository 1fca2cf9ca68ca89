//! Declarative component descriptions.
//!
//! A [`ComponentSpec`] describes one buildable unit: where its source comes
//! from (possibly per architecture), which other components must be built
//! first, and the ordered [`BuildAction`](crate::action::BuildAction) list that
//! populates its staging root.
//!
//! Specs are plain data. They are loaded by [`crate::manifest`] or constructed
//! directly, collected into a [`ComponentRegistry`], and never mutated by the
//! engine.

mod registry;
mod types;

pub use registry::ComponentRegistry;
pub use types::*;
