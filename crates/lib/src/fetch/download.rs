//! Streaming download with checksum verification.
//!
//! The body is written to a temporary file in the cache's `.tmp` directory
//! and hashed as it arrives. Only a verified file is renamed into its cache
//! entry; a mismatch drops the temporary file.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tracing::{debug, info, warn};

use super::FetchError;
use super::retry::RetryConfig;
use crate::component::Checksum;
use crate::util::hash::StreamHasher;

const READ_BUFFER_SIZE: usize = 64 * 1024;

/// Download `url` into `dest_dir/<file name>`, retrying network failures.
pub(crate) async fn fetch_verified(
  client: &reqwest::Client,
  url: &str,
  checksum: &Checksum,
  dest_dir: &Path,
  tmp_dir: &Path,
  retry: &RetryConfig,
) -> Result<PathBuf, FetchError> {
  let mut attempt = 0;

  loop {
    match fetch_once(client, url, checksum, dest_dir, tmp_dir).await {
      Ok(path) => return Ok(path),
      Err(e) if e.is_retryable() && attempt < retry.max_retries => {
        attempt += 1;
        let delay = retry.delay_for(attempt);
        warn!(url = %url, attempt, delay = ?delay, error = %e, "download failed, retrying");
        tokio::time::sleep(delay).await;
      }
      Err(e) => return Err(e),
    }
  }
}

async fn fetch_once(
  client: &reqwest::Client,
  url: &str,
  checksum: &Checksum,
  dest_dir: &Path,
  tmp_dir: &Path,
) -> Result<PathBuf, FetchError> {
  info!(url = %url, "fetching source artifact");

  tokio::fs::create_dir_all(tmp_dir)
    .await
    .map_err(|e| FetchError::io(tmp_dir, e))?;
  let tmp = NamedTempFile::new_in(tmp_dir).map_err(|e| FetchError::io(tmp_dir, e))?;
  let handle = tmp.reopen().map_err(|e| FetchError::io(tmp.path(), e))?;
  let mut file = tokio::fs::File::from_std(handle);
  let mut hasher = StreamHasher::new(checksum.algorithm);

  let size = match url.strip_prefix("file://") {
    Some(path) => copy_local(Path::new(path), &mut file, &mut hasher, tmp.path()).await?,
    None => stream_http(client, url, &mut file, &mut hasher, tmp.path()).await?,
  };

  file.flush().await.map_err(|e| FetchError::io(tmp.path(), e))?;
  drop(file);

  let actual = hasher.finalize_hex();
  if !checksum.matches(&actual) {
    return Err(FetchError::ChecksumMismatch {
      url: url.to_string(),
      algorithm: checksum.algorithm,
      expected: checksum.digest.clone(),
      actual,
    });
  }
  debug!(url = %url, checksum = %checksum, "checksum verified");

  tokio::fs::create_dir_all(dest_dir)
    .await
    .map_err(|e| FetchError::io(dest_dir, e))?;
  let dest = dest_dir.join(url_to_filename(url));
  tmp.persist(&dest).map_err(|e| FetchError::io(&dest, e.error))?;
  set_readable(&dest)?;

  info!(url = %url, path = ?dest, size, "download complete");
  Ok(dest)
}

async fn stream_http(
  client: &reqwest::Client,
  url: &str,
  file: &mut tokio::fs::File,
  hasher: &mut StreamHasher,
  tmp_path: &Path,
) -> Result<u64, FetchError> {
  let mut response = client.get(url).send().await.map_err(|e| request_error(url, e))?;

  let status = response.status();
  if !status.is_success() {
    return Err(FetchError::HttpStatus {
      url: url.to_string(),
      status: status.as_u16(),
    });
  }

  let mut size = 0u64;
  while let Some(chunk) = response.chunk().await.map_err(|e| request_error(url, e))? {
    hasher.update(&chunk);
    file.write_all(&chunk).await.map_err(|e| FetchError::io(tmp_path, e))?;
    size += chunk.len() as u64;
  }
  Ok(size)
}

async fn copy_local(
  source: &Path,
  file: &mut tokio::fs::File,
  hasher: &mut StreamHasher,
  tmp_path: &Path,
) -> Result<u64, FetchError> {
  let mut input = tokio::fs::File::open(source)
    .await
    .map_err(|e| FetchError::io(source, e))?;
  let mut buf = vec![0u8; READ_BUFFER_SIZE];
  let mut size = 0u64;

  loop {
    let n = input.read(&mut buf).await.map_err(|e| FetchError::io(source, e))?;
    if n == 0 {
      break;
    }
    hasher.update(&buf[..n]);
    file.write_all(&buf[..n]).await.map_err(|e| FetchError::io(tmp_path, e))?;
    size += n as u64;
  }
  Ok(size)
}

fn request_error(url: &str, err: reqwest::Error) -> FetchError {
  if err.is_builder() {
    FetchError::InvalidUrl {
      url: url.to_string(),
      message: err.to_string(),
    }
  } else {
    FetchError::Network {
      url: url.to_string(),
      message: err.to_string(),
    }
  }
}

#[cfg(unix)]
fn set_readable(path: &Path) -> Result<(), FetchError> {
  use std::os::unix::fs::PermissionsExt;
  std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).map_err(|e| FetchError::io(path, e))
}

#[cfg(not(unix))]
fn set_readable(_path: &Path) -> Result<(), FetchError> {
  Ok(())
}

/// Convert a URL to a safe filename.
///
/// Takes the last path component and sanitizes it. Falls back to hash of URL
/// if no suitable filename can be extracted.
pub(crate) fn url_to_filename(url: &str) -> String {
  if let Some(filename) = url.rsplit('/').next() {
    let filename = filename.split(['?', '#']).next().unwrap_or(filename);

    let sanitized: String = filename
      .chars()
      .map(|c| {
        if c.is_alphanumeric() || c == '-' || c == '_' || c == '.' {
          c
        } else {
          '_'
        }
      })
      .collect();

    if !sanitized.is_empty() && sanitized != "." && sanitized != ".." {
      return sanitized;
    }
  }

  let mut hasher = Sha256::new();
  hasher.update(url.as_bytes());
  format!("download_{}", &hex::encode(hasher.finalize())[..16])
}
