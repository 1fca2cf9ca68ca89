//! Deterministic tarball packager.
//!
//! Entries are sorted by path; mtimes are pinned to `SOURCE_DATE_EPOCH`,
//! ownership to root, and modes normalized to 755/644 (777 for symlinks), so
//! identical trees produce byte-identical archives.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use flate2::Compression;
use flate2::write::GzEncoder;
use tar::{Builder, EntryType, Header};
use tracing::info;
use walkdir::WalkDir;
use xz2::write::XzEncoder;

use super::{PackageMetadata, Packager, PackagerError};
use crate::consts::SOURCE_DATE_EPOCH;
use crate::project::CompressionType;

/// Writes `<stem>.tar`, `<stem>.tar.gz` or `<stem>.tar.xz` plus a `<artifact>.metadata.json` sidecar.
#[derive(Debug, Clone)]
pub struct TarPackager {
  output_dir: PathBuf,
}

impl TarPackager {
  pub fn new(output_dir: impl Into<PathBuf>) -> Self {
    Self {
      output_dir: output_dir.into(),
    }
  }
}

impl Packager for TarPackager {
  fn name(&self) -> &str {
    "tar"
  }

  fn package(&self, root: &Path, metadata: &PackageMetadata) -> Result<PathBuf, PackagerError> {
    let options = metadata.package_options;
    let extension = match options.compression_type {
      CompressionType::None => "tar",
      CompressionType::Gzip => "tar.gz",
      CompressionType::Xz => "tar.xz",
    };

    fs::create_dir_all(&self.output_dir).map_err(|e| PackagerError::io(&self.output_dir, e))?;
    let artifact = self
      .output_dir
      .join(format!("{}.{extension}", metadata.artifact_stem()));
    let file = File::create(&artifact).map_err(|e| PackagerError::io(&artifact, e))?;
    let writer = BufWriter::new(file);

    let written = match options.compression_type {
      CompressionType::Gzip => {
        let encoder = GzEncoder::new(writer, Compression::new(options.compression_level));
        write_tree(root, encoder)
          .and_then(|encoder| encoder.finish())
          .and_then(|mut writer| writer.flush())
      }
      CompressionType::Xz => {
        let encoder = XzEncoder::new(writer, options.compression_level);
        write_tree(root, encoder)
          .and_then(|encoder| encoder.finish())
          .and_then(|mut writer| writer.flush())
      }
      CompressionType::None => write_tree(root, writer).and_then(|mut writer| writer.flush()),
    };
    written.map_err(|e| PackagerError::io(&artifact, e))?;

    let sidecar = PathBuf::from(format!("{}.metadata.json", artifact.display()));
    let json = serde_json::to_vec_pretty(metadata).map_err(|e| PackagerError::Metadata(e.to_string()))?;
    fs::write(&sidecar, json).map_err(|e| PackagerError::io(&sidecar, e))?;

    info!(artifact = ?artifact, "package written");
    Ok(artifact)
  }
}

/// Append every entry under `root` to a tar stream and return the inner writer.
fn write_tree<W: Write>(root: &Path, writer: W) -> io::Result<W> {
  let mut builder = Builder::new(writer);
  builder.follow_symlinks(false);

  for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry.path().strip_prefix(root).map_err(io::Error::other)?;
    let meta = entry.path().symlink_metadata()?;
    let mut header = Header::new_gnu();
    header.set_mtime(SOURCE_DATE_EPOCH);
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;

    let file_type = meta.file_type();
    if file_type.is_dir() {
      header.set_entry_type(EntryType::Directory);
      header.set_size(0);
      header.set_mode(0o755);
      header.set_cksum();
      builder.append_data(&mut header, rel, io::empty())?;
    } else if file_type.is_symlink() {
      let target = fs::read_link(entry.path())?;
      header.set_entry_type(EntryType::Symlink);
      header.set_size(0);
      header.set_mode(0o777);
      builder.append_link(&mut header, rel, target)?;
    } else if file_type.is_file() {
      header.set_entry_type(EntryType::Regular);
      header.set_size(meta.len());
      header.set_mode(normalized_mode(&meta));
      header.set_cksum();
      builder.append_data(&mut header, rel, File::open(entry.path())?)?;
    }
    // Device nodes, sockets and fifos are not packaged.
  }

  builder.into_inner()
}

#[cfg(unix)]
fn normalized_mode(meta: &fs::Metadata) -> u32 {
  use std::os::unix::fs::PermissionsExt;
  if meta.permissions().mode() & 0o111 != 0 { 0o755 } else { 0o644 }
}

#[cfg(not(unix))]
fn normalized_mode(_meta: &fs::Metadata) -> u32 {
  0o644
}
