pub mod arch;
pub mod paths;

pub use arch::{Arch, ParseArchError};

/// Returns the architecture of the running host.
///
/// Returns `None` if the architecture is not supported
pub fn host_arch() -> Option<Arch> {
  Arch::current()
}
