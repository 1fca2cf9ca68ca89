//! Source artifact retrieval.
//!
//! Local sources are returned as-is. Remote sources are resolved through the
//! [`ArtifactCache`]: a verified entry is reused, otherwise the artifact is
//! downloaded, hashed while streaming and only then moved into the cache.

mod cache;
mod download;
mod retry;
mod unpack;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::component::{SourceLocation, SourceVariant};
use crate::util::hash::HashAlgorithm;

pub use cache::{ArtifactCache, CacheKey};
pub use retry::RetryConfig;
pub use unpack::prepare_source;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
  #[error("local source not found: {path}")]
  MissingLocalSource { path: String },

  #[error("remote source {url} declares no checksum")]
  MissingChecksum { url: String },

  #[error("remote source {url} has a malformed {algorithm} checksum '{digest}'")]
  InvalidChecksum {
    url: String,
    algorithm: HashAlgorithm,
    digest: String,
  },

  #[error("invalid url '{url}': {message}")]
  InvalidUrl { url: String, message: String },

  #[error("network error fetching {url}: {message}")]
  Network { url: String, message: String },

  #[error("HTTP {status} fetching {url}")]
  HttpStatus { url: String, status: u16 },

  #[error("checksum mismatch for {url}: expected {algorithm}:{expected}, got {actual}")]
  ChecksumMismatch {
    url: String,
    algorithm: HashAlgorithm,
    expected: String,
    actual: String,
  },

  #[error("failed to unpack {path}: {message}")]
  Unpack { path: String, message: String },

  #[error("relative path not found in source: {path}")]
  RelativePathNotFound { path: String },

  #[error("io error at {path}: {message}")]
  Io { path: String, message: String },
}

impl FetchError {
  pub(crate) fn io(path: &Path, err: std::io::Error) -> Self {
    FetchError::Io {
      path: path.display().to_string(),
      message: err.to_string(),
    }
  }

  /// Transient failures worth another attempt. Integrity failures never are.
  pub fn is_retryable(&self) -> bool {
    match self {
      FetchError::Network { .. } => true,
      FetchError::HttpStatus { status, .. } => *status >= 500 || *status == 408 || *status == 429,
      _ => false,
    }
  }
}

/// Resolves source variants to local artifact paths.
#[derive(Debug)]
pub struct SourceFetcher {
  cache: ArtifactCache,
  client: reqwest::Client,
  retry: RetryConfig,
}

impl SourceFetcher {
  pub fn new(cache_dir: impl Into<PathBuf>, retry: RetryConfig) -> Result<Self, FetchError> {
    let client = reqwest::Client::builder()
      .user_agent(concat!("stagehand/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| FetchError::Network {
        url: String::new(),
        message: format!("failed to build HTTP client: {e}"),
      })?;

    Ok(Self {
      cache: ArtifactCache::new(cache_dir),
      client,
      retry,
    })
  }

  pub fn cache(&self) -> &ArtifactCache {
    &self.cache
  }

  /// Resolve `variant` to a local path.
  ///
  /// Idempotent: once a digest is verified, later calls return the same
  /// cached path without touching the network.
  pub async fn resolve(&self, variant: &SourceVariant) -> Result<PathBuf, FetchError> {
    match &variant.location {
      SourceLocation::Path(path) => {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
          return Err(FetchError::MissingLocalSource {
            path: path.display().to_string(),
          });
        }
        debug!(path = ?path, "using local source");
        Ok(path.clone())
      }
      SourceLocation::Url(url) => {
        let checksum = variant
          .checksum
          .as_ref()
          .ok_or_else(|| FetchError::MissingChecksum { url: url.clone() })?;
        if !checksum.is_well_formed() {
          return Err(FetchError::InvalidChecksum {
            url: url.clone(),
            algorithm: checksum.algorithm,
            digest: checksum.digest.clone(),
          });
        }

        let key = CacheKey::new(checksum.algorithm, &checksum.digest);
        let file_name = download::url_to_filename(url);

        self
          .cache
          .get_or_fetch(&key, || async {
            if let Some(path) = self.cache.lookup(&key, &file_name).await? {
              return Ok(path);
            }
            download::fetch_verified(
              &self.client,
              url,
              checksum,
              &self.cache.entry_dir(&key),
              &self.cache.tmp_dir(),
              &self.retry,
            )
            .await
          })
          .await
      }
    }
  }
}
