//! Build actions.
//!
//! A component's build is an ordered list of [`BuildAction`]s run against its
//! staging root. The set of actions is closed: filesystem primitives, a
//! template render, a shell command, and an inline [`Callback`] for logic the
//! others cannot express.
//!
//! Every string field accepts `$${...}` placeholders (see
//! [`crate::placeholder`]). The executor resolves them against the component
//! workspace before running the action:
//!
//! - `$${install_dir}` - the project's install directory on the target system
//! - `$${project_dir}` - the directory holding the prepared source
//! - `$${staging_dir}` - the component's staging root
//! - `$${name}` / `$${version}` - the component's name and version
//!
//! [`ActionList`] records actions in order, mirroring how component
//! definitions are usually written.

mod builder;
mod types;

pub use builder::ActionList;
pub use types::*;
