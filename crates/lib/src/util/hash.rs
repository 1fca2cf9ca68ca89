//! Hashing utilities for artifact verification and tree fingerprints.
//!
//! This module provides:
//! - `HashAlgorithm`: the checksum algorithms a source variant may declare
//! - `StreamHasher`: incremental hashing for downloads
//! - `hash_file()` / `hash_bytes()`: one-shot hashing with a given algorithm
//! - `hash_directory()`: deterministic fingerprint of an assembled tree

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

use md5::Md5;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use walkdir::WalkDir;

/// Checksum algorithm used to verify a fetched artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
  Sha256,
  Sha512,
  Md5,
}

impl HashAlgorithm {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Sha256 => "sha256",
      Self::Sha512 => "sha512",
      Self::Md5 => "md5",
    }
  }

  /// Length of a hex-encoded digest produced by this algorithm.
  pub fn hex_len(&self) -> usize {
    match self {
      Self::Sha256 => 64,
      Self::Sha512 => 128,
      Self::Md5 => 32,
    }
  }
}

impl fmt::Display for HashAlgorithm {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for HashAlgorithm {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "sha256" => Ok(Self::Sha256),
      "sha512" => Ok(Self::Sha512),
      "md5" => Ok(Self::Md5),
      other => Err(format!("unsupported checksum algorithm '{other}'")),
    }
  }
}

/// Incremental hasher over any supported algorithm.
pub enum StreamHasher {
  Sha256(Sha256),
  Sha512(Sha512),
  Md5(Md5),
}

impl StreamHasher {
  pub fn new(algorithm: HashAlgorithm) -> Self {
    match algorithm {
      HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
      HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
      HashAlgorithm::Md5 => Self::Md5(Md5::new()),
    }
  }

  pub fn update(&mut self, data: &[u8]) {
    match self {
      Self::Sha256(h) => h.update(data),
      Self::Sha512(h) => h.update(data),
      Self::Md5(h) => h.update(data),
    }
  }

  /// Consume the hasher and return the lowercase hex digest.
  pub fn finalize_hex(self) -> String {
    match self {
      Self::Sha256(h) => hex::encode(h.finalize()),
      Self::Sha512(h) => hex::encode(h.finalize()),
      Self::Md5(h) => hex::encode(h.finalize()),
    }
  }
}

/// A full 64-character SHA256 fingerprint of an assembled tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl fmt::Display for ContentHash {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0)
  }
}

/// Error during file or directory hashing.
#[derive(Debug, Clone, thiserror::Error, Serialize, Deserialize)]
pub enum DirHashError {
  #[error("failed to walk directory: {message}")]
  WalkDir { message: String },

  #[error("failed to read file {path}: {message}")]
  ReadFile { path: String, message: String },

  #[error("failed to read symlink {path}: {message}")]
  ReadSymlink { path: String, message: String },
}

/// Compute a deterministic hash of a directory's contents.
///
/// The hash covers file contents, the executable bit, directory structure and
/// symlink targets. Timestamps and ownership are ignored. Entries are sorted by
/// path.
///
/// # Arguments
///
/// * `path` - The directory to hash
/// * `exclude` - List of file/directory names to skip
pub fn hash_directory(path: &Path, exclude: &[&str]) -> Result<ContentHash, DirHashError> {
  let mut entries: Vec<(String, String)> = Vec::new();

  let walker = WalkDir::new(path).sort_by_file_name().into_iter().filter_entry(|e| {
    e.file_name()
      .to_str()
      .map(|name| !exclude.contains(&name))
      .unwrap_or(true)
  });

  for entry in walker {
    let entry = entry.map_err(|e| DirHashError::WalkDir { message: e.to_string() })?;
    let entry_path = entry.path();

    let rel_path = entry_path
      .strip_prefix(path)
      .unwrap_or(entry_path)
      .to_string_lossy()
      .to_string();

    // Skip the root directory itself
    if rel_path.is_empty() {
      continue;
    }

    let file_type = entry.file_type();
    let entry_hash = if file_type.is_file() {
      let content_hash = hash_file(entry_path, HashAlgorithm::Sha256)?;
      format!("F:{}:{}:{}", rel_path, is_executable(entry_path), content_hash)
    } else if file_type.is_dir() {
      format!("D:{}", rel_path)
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry_path).map_err(|e| DirHashError::ReadSymlink {
        path: entry_path.display().to_string(),
        message: e.to_string(),
      })?;
      let target_hash = hash_bytes(target.to_string_lossy().as_bytes(), HashAlgorithm::Sha256);
      format!("L:{}:{}", rel_path, target_hash)
    } else {
      // Skip special files (sockets, devices, etc.)
      continue;
    };

    entries.push((rel_path, entry_hash));
  }

  entries.sort_by(|a, b| a.0.cmp(&b.0));

  let mut hasher = Sha256::new();
  for (_, entry_hash) in entries {
    hasher.update(entry_hash.as_bytes());
    hasher.update(b"\n");
  }

  Ok(ContentHash(hex::encode(hasher.finalize())))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
  use std::os::unix::fs::PermissionsExt;
  fs::metadata(path)
    .map(|m| m.permissions().mode() & 0o111 != 0)
    .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
  false
}

/// Hash a file's contents with the given algorithm.
///
/// Returns the lowercase hex digest.
pub fn hash_file(path: &Path, algorithm: HashAlgorithm) -> Result<String, DirHashError> {
  let mut file = fs::File::open(path).map_err(|e| DirHashError::ReadFile {
    path: path.display().to_string(),
    message: e.to_string(),
  })?;

  let mut hasher = StreamHasher::new(algorithm);
  let mut buffer = [0u8; 8192];

  loop {
    let bytes_read = file.read(&mut buffer).map_err(|e| DirHashError::ReadFile {
      path: path.display().to_string(),
      message: e.to_string(),
    })?;
    if bytes_read == 0 {
      break;
    }
    hasher.update(&buffer[..bytes_read]);
  }

  Ok(hasher.finalize_hex())
}

/// Hash arbitrary bytes with the given algorithm.
pub fn hash_bytes(data: &[u8], algorithm: HashAlgorithm) -> String {
  let mut hasher = StreamHasher::new(algorithm);
  hasher.update(data);
  hasher.finalize_hex()
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::fs;
  use tempfile::tempdir;

  #[test]
  fn known_digests() {
    assert_eq!(
      hash_bytes(b"hello", HashAlgorithm::Sha256),
      "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    );
    assert_eq!(hash_bytes(b"hello", HashAlgorithm::Md5), "5d41402abc4b2a76b9719d911017c592");
    assert_eq!(hash_bytes(b"hello", HashAlgorithm::Sha512).len(), HashAlgorithm::Sha512.hex_len());
  }

  #[test]
  fn algorithm_parses_case_insensitively() {
    assert_eq!("SHA256".parse::<HashAlgorithm>().unwrap(), HashAlgorithm::Sha256);
    assert!("crc32".parse::<HashAlgorithm>().is_err());
  }

  #[test]
  fn hash_file_matches_hash_bytes() {
    let temp = tempdir().unwrap();
    let file_path = temp.path().join("test.txt");
    fs::write(&file_path, "hello world").unwrap();

    for alg in [HashAlgorithm::Sha256, HashAlgorithm::Sha512, HashAlgorithm::Md5] {
      assert_eq!(hash_file(&file_path, alg).unwrap(), hash_bytes(b"hello world", alg));
    }
  }

  #[test]
  fn directory_hash_is_deterministic() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("a.txt"), "content a").unwrap();
    fs::write(temp.path().join("b.txt"), "content b").unwrap();

    let hash1 = hash_directory(temp.path(), &[]).unwrap();
    let hash2 = hash_directory(temp.path(), &[]).unwrap();

    assert_eq!(hash1, hash2);
    assert_eq!(hash1.0.len(), 64);
  }

  #[test]
  fn directory_hash_changes_with_content() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("file.txt"), "original").unwrap();
    let hash1 = hash_directory(temp.path(), &[]).unwrap();

    fs::write(temp.path().join("file.txt"), "modified").unwrap();
    let hash2 = hash_directory(temp.path(), &[]).unwrap();

    assert_ne!(hash1, hash2);
  }

  #[test]
  fn same_content_different_structure_different_hash() {
    let temp1 = tempdir().unwrap();
    fs::write(temp1.path().join("file.txt"), "content").unwrap();

    let temp2 = tempdir().unwrap();
    fs::create_dir(temp2.path().join("subdir")).unwrap();
    fs::write(temp2.path().join("subdir/file.txt"), "content").unwrap();

    assert_ne!(
      hash_directory(temp1.path(), &[]).unwrap(),
      hash_directory(temp2.path(), &[]).unwrap()
    );
  }

  #[test]
  fn directory_hash_respects_exclusions() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("file.txt"), "content").unwrap();
    let hash1 = hash_directory(temp.path(), &[]).unwrap();

    fs::create_dir(temp.path().join("tmp")).unwrap();
    fs::write(temp.path().join("tmp/scratch"), "temp").unwrap();

    assert_eq!(hash1, hash_directory(temp.path(), &["tmp"]).unwrap());
  }

  #[cfg(unix)]
  #[test]
  fn directory_hash_sees_executable_bit() {
    use std::os::unix::fs::PermissionsExt;

    let temp = tempdir().unwrap();
    let file = temp.path().join("run");
    fs::write(&file, "#!/bin/sh").unwrap();
    fs::set_permissions(&file, fs::Permissions::from_mode(0o644)).unwrap();
    let before = hash_directory(temp.path(), &[]).unwrap();

    fs::set_permissions(&file, fs::Permissions::from_mode(0o755)).unwrap();
    assert_ne!(before, hash_directory(temp.path(), &[]).unwrap());
  }

  #[cfg(unix)]
  #[test]
  fn directory_hash_includes_symlink_targets() {
    let temp = tempdir().unwrap();
    std::os::unix::fs::symlink("a", temp.path().join("link")).unwrap();
    let hash1 = hash_directory(temp.path(), &[]).unwrap();

    fs::remove_file(temp.path().join("link")).unwrap();
    std::os::unix::fs::symlink("b", temp.path().join("link")).unwrap();

    assert_ne!(hash1, hash_directory(temp.path(), &[]).unwrap());
  }
}
