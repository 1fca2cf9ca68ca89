//! Source preparation: turn a fetched artifact into a project directory.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use flate2::read::GzDecoder;
use tar::Archive;
use tracing::{debug, info};

use super::FetchError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveKind {
  Tar,
  TarGz,
}

fn archive_kind(path: &Path) -> Option<ArchiveKind> {
  let name = path.file_name()?.to_str()?.to_ascii_lowercase();
  if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
    Some(ArchiveKind::TarGz)
  } else if name.ends_with(".tar") {
    Some(ArchiveKind::Tar)
  } else {
    None
  }
}

/// Prepare the project directory for one component.
///
/// A local directory is used in place. Anything else is unpacked (tar and
/// gzipped tar) or copied under its file name into a fresh `source_dir`.
/// `relative_path`, when set, selects a sub-directory of the result.
pub fn prepare_source(artifact: &Path, source_dir: &Path, relative_path: Option<&str>) -> Result<PathBuf, FetchError> {
  let base = if artifact.is_dir() {
    debug!(path = ?artifact, "using local source directory in place");
    artifact.to_path_buf()
  } else {
    if source_dir.exists() {
      fs::remove_dir_all(source_dir).map_err(|e| FetchError::io(source_dir, e))?;
    }
    fs::create_dir_all(source_dir).map_err(|e| FetchError::io(source_dir, e))?;

    match archive_kind(artifact) {
      Some(kind) => unpack(artifact, source_dir, kind)?,
      None => {
        let name = artifact.file_name().ok_or_else(|| FetchError::Unpack {
          path: artifact.display().to_string(),
          message: "artifact has no file name".to_string(),
        })?;
        let dest = source_dir.join(name);
        fs::copy(artifact, &dest).map_err(|e| FetchError::io(&dest, e))?;
      }
    }
    source_dir.to_path_buf()
  };

  match relative_path {
    Some(rel) => {
      let project_dir = base.join(rel);
      if !project_dir.is_dir() {
        return Err(FetchError::RelativePathNotFound {
          path: project_dir.display().to_string(),
        });
      }
      Ok(project_dir)
    }
    None => Ok(base),
  }
}

fn unpack(archive_path: &Path, dest: &Path, kind: ArchiveKind) -> Result<(), FetchError> {
  let file = File::open(archive_path).map_err(|e| FetchError::io(archive_path, e))?;
  let reader = BufReader::new(file);

  let result = match kind {
    ArchiveKind::TarGz => unpack_entries(Archive::new(GzDecoder::new(reader)), dest),
    ArchiveKind::Tar => unpack_entries(Archive::new(reader), dest),
  };

  result.map_err(|e| FetchError::Unpack {
    path: archive_path.display().to_string(),
    message: e.to_string(),
  })?;

  info!(archive = ?archive_path, dest = ?dest, "unpacked source archive");
  Ok(())
}

fn unpack_entries<R: std::io::Read>(mut archive: Archive<R>, dest: &Path) -> std::io::Result<()> {
  archive.set_preserve_permissions(true);
  archive.set_overwrite(true);
  // Entries that would land outside `dest` are skipped by `unpack`.
  archive.unpack(dest)
}
