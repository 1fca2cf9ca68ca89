//! stagehand-lib: package assembly engine
//!
//! Turns a project (a set of named components, each with versioned,
//! checksum-verified sources and an ordered list of build actions) into one
//! staged filesystem tree and hands it to a packager:
//! - [`component`]: declarative component specs and the registry holding them
//! - [`dag`] and [`select`]: build order and per-architecture source selection
//! - [`fetch`]: verified, single-flight downloads into the artifact cache
//! - [`execute`] and [`layout`]: build actions confined to a staging root
//! - [`build`]: the `ProjectBuilder` state machine tying it all together
//! - [`package`]: the packager seam and a deterministic tarball packager

pub mod action;
pub mod build;
pub mod component;
pub mod consts;
pub mod dag;
pub mod execute;
pub mod fetch;
pub mod layout;
pub mod manifest;
pub mod package;
pub mod placeholder;
pub mod platform;
pub mod project;
pub mod select;
pub mod util;
