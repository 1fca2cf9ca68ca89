use crate::consts::{APP_NAME, CACHE_DIR_ENV};
use std::path::PathBuf;

/// Returns the user's home directory, falling back to the system temp dir
pub fn home_dir() -> PathBuf {
  std::env::var_os("HOME")
    .map(PathBuf::from)
    .unwrap_or_else(std::env::temp_dir)
}

/// Returns the directory for cache files for the application
pub fn cache_dir() -> PathBuf {
  let cache_home = std::env::var("XDG_CACHE_HOME")
    .map(PathBuf::from)
    .unwrap_or_else(|_| home_dir().join(".cache"));
  cache_home.join(APP_NAME)
}

/// Returns the directory verified source artifacts are cached in.
///
/// `STAGEHAND_CACHE_DIR` takes precedence over the XDG location.
pub fn artifact_cache_dir() -> PathBuf {
  match std::env::var_os(CACHE_DIR_ENV) {
    Some(dir) if !dir.is_empty() => PathBuf::from(dir),
    _ => cache_dir().join("artifacts"),
  }
}
