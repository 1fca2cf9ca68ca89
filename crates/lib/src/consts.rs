//! Crate-wide constants.

/// Application name used for cache and data directories.
pub const APP_NAME: &str = "stagehand";

/// Environment variable overriding the artifact cache directory.
pub const CACHE_DIR_ENV: &str = "STAGEHAND_CACHE_DIR";

/// Version string that marks a component as built from a local path.
pub const LOCAL_SOURCE_VERSION: &str = "local_source";

/// Name of the directory, inside the cache root, holding in-flight downloads.
pub const CACHE_TMP_DIR: &str = ".tmp";

/// Name of the directory, inside the work directory, that is handed to the packager.
pub const PACKAGE_ROOT_DIR: &str = "package-root";

/// Default install location prefix; the project name is appended.
pub const DEFAULT_INSTALL_PREFIX: &str = "/opt";

/// 1980-01-01T00:00:00Z, the ZIP epoch, used for reproducible timestamps.
pub const SOURCE_DATE_EPOCH: u64 = 315_532_800;
