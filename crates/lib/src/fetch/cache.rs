//! Verified artifact cache.
//!
//! Entries live at `<root>/<algorithm>/<digest>/<file name>` and are never
//! modified once written. Within a process, resolution of one key is
//! single-flight: the first caller downloads, concurrent callers await its
//! outcome. Failed outcomes are dropped from the in-flight map so a later
//! call can try again.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::{debug, warn};

use super::FetchError;
use crate::consts::CACHE_TMP_DIR;
use crate::util::hash::{HashAlgorithm, hash_file};

/// In-process identity of a cached artifact.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
  pub algorithm: HashAlgorithm,
  pub digest: String,
}

impl CacheKey {
  pub fn new(algorithm: HashAlgorithm, digest: &str) -> Self {
    Self {
      algorithm,
      digest: digest.to_ascii_lowercase(),
    }
  }
}

type Inflight = Arc<OnceCell<Result<PathBuf, FetchError>>>;

#[derive(Debug)]
pub struct ArtifactCache {
  root: PathBuf,
  inflight: Mutex<HashMap<CacheKey, Inflight>>,
}

impl ArtifactCache {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self {
      root: root.into(),
      inflight: Mutex::new(HashMap::new()),
    }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  /// Directory holding the entry for `key`.
  pub fn entry_dir(&self, key: &CacheKey) -> PathBuf {
    self.root.join(key.algorithm.as_str()).join(&key.digest)
  }

  /// Directory for partial downloads. Same filesystem as the entries, so persisting is a rename.
  pub fn tmp_dir(&self) -> PathBuf {
    self.root.join(CACHE_TMP_DIR)
  }

  /// Return the path for `key`, running `fetch` only if no other caller is already doing so.
  pub async fn get_or_fetch<F, Fut>(&self, key: &CacheKey, fetch: F) -> Result<PathBuf, FetchError>
  where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<PathBuf, FetchError>>,
  {
    let cell = {
      let mut inflight = self.inflight.lock().await;
      inflight
        .entry(key.clone())
        .or_insert_with(|| Arc::new(OnceCell::new()))
        .clone()
    };

    let result = cell.get_or_init(fetch).await.clone();

    if result.is_err() {
      let mut inflight = self.inflight.lock().await;
      if inflight.get(key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
        inflight.remove(key);
      }
    }

    result
  }

  /// Look for a verified entry left on disk by an earlier run.
  ///
  /// The file is re-hashed first. A corrupted entry is removed so it can be
  /// downloaded again.
  pub async fn lookup(&self, key: &CacheKey, file_name: &str) -> Result<Option<PathBuf>, FetchError> {
    let dir = self.entry_dir(key);
    let path = dir.join(file_name);
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
      return Ok(None);
    }

    let algorithm = key.algorithm;
    let hashed = path.clone();
    let actual = tokio::task::spawn_blocking(move || hash_file(&hashed, algorithm))
      .await
      .map_err(|e| FetchError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
      })?;

    match actual {
      Ok(actual) if actual.eq_ignore_ascii_case(&key.digest) => {
        debug!(path = ?path, "using cached artifact");
        Ok(Some(path))
      }
      Ok(actual) => {
        warn!(path = ?path, expected = %key.digest, actual = %actual, "cached artifact is corrupt, removing");
        tokio::fs::remove_dir_all(&dir).await.map_err(|e| FetchError::io(&dir, e))?;
        Ok(None)
      }
      Err(e) => {
        warn!(path = ?path, error = %e, "cached artifact unreadable, removing");
        tokio::fs::remove_dir_all(&dir).await.map_err(|e| FetchError::io(&dir, e))?;
        Ok(None)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::util::hash::hash_bytes;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use tempfile::TempDir;

  #[tokio::test]
  async fn concurrent_callers_share_one_fetch() {
    let temp = TempDir::new().unwrap();
    let cache = Arc::new(ArtifactCache::new(temp.path()));
    let calls = Arc::new(AtomicUsize::new(0));
    let key = CacheKey::new(HashAlgorithm::Sha256, &"a".repeat(64));

    let mut handles = Vec::new();
    for _ in 0..8 {
      let cache = cache.clone();
      let calls = calls.clone();
      let key = key.clone();
      handles.push(tokio::spawn(async move {
        cache
          .get_or_fetch(&key, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            Ok(PathBuf::from("/cache/artifact"))
          })
          .await
      }));
    }

    for handle in handles {
      assert_eq!(handle.await.unwrap().unwrap(), PathBuf::from("/cache/artifact"));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn failures_are_not_memoized() {
    let temp = TempDir::new().unwrap();
    let cache = ArtifactCache::new(temp.path());
    let key = CacheKey::new(HashAlgorithm::Md5, &"b".repeat(32));

    let first = cache
      .get_or_fetch(&key, || async {
        Err(FetchError::Network {
          url: "https://example.com".to_string(),
          message: "reset".to_string(),
        })
      })
      .await;
    assert!(first.is_err());

    let second = cache.get_or_fetch(&key, || async { Ok(PathBuf::from("/ok")) }).await;
    assert_eq!(second.unwrap(), PathBuf::from("/ok"));
  }

  #[tokio::test]
  async fn lookup_verifies_disk_entries() {
    let temp = TempDir::new().unwrap();
    let cache = ArtifactCache::new(temp.path());
    let digest = hash_bytes(b"payload", HashAlgorithm::Sha256);
    let key = CacheKey::new(HashAlgorithm::Sha256, &digest);

    assert_eq!(cache.lookup(&key, "file.bin").await.unwrap(), None);

    let dir = cache.entry_dir(&key);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("file.bin"), b"payload").unwrap();
    assert_eq!(cache.lookup(&key, "file.bin").await.unwrap(), Some(dir.join("file.bin")));
  }

  #[tokio::test]
  async fn lookup_removes_corrupt_entries() {
    let temp = TempDir::new().unwrap();
    let cache = ArtifactCache::new(temp.path());
    let key = CacheKey::new(HashAlgorithm::Sha256, &hash_bytes(b"payload", HashAlgorithm::Sha256));

    let dir = cache.entry_dir(&key);
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("file.bin"), b"tampered").unwrap();

    assert_eq!(cache.lookup(&key, "file.bin").await.unwrap(), None);
    assert!(!dir.exists());
  }

  #[test]
  fn layout_is_algorithm_then_digest() {
    let cache = ArtifactCache::new("/cache");
    let key = CacheKey::new(HashAlgorithm::Sha512, "ABC");
    assert_eq!(cache.entry_dir(&key), PathBuf::from("/cache/sha512/abc"));
    assert_eq!(cache.tmp_dir(), PathBuf::from("/cache/.tmp"));
  }
}
