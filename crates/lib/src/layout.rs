//! Staging root conventions and filesystem primitives.
//!
//! Each component builds into its own staging root, which stands in for the
//! project's install directory. Destination paths are resolved as follows:
//!
//! - relative paths join the staging root
//! - absolute paths inside the staging root are used as-is
//! - absolute paths inside the install directory are rebased onto the staging root
//! - anything else fails with `PathEscape`
//!
//! After lexical normalization, the nearest existing ancestor of every
//! destination is canonicalized and prefix-tested against the canonical
//! staging root, so `..` segments and symlinks cannot leave it.
//!
//! Source paths (copy and template sources) resolve against the component's
//! project directory when relative and are not confined.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::execute::types::ActionError;
use crate::placeholder;

/// Default mode for rendered templates.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Filesystem primitives confined to one component's staging root.
#[derive(Debug, Clone)]
pub struct LayoutAssembler {
  root: PathBuf,
  project_dir: PathBuf,
  install_dir: PathBuf,
}

impl LayoutAssembler {
  /// Create a fresh, empty staging root at `root`, removing anything already there.
  pub fn create(root: &Path, project_dir: &Path, install_dir: &Path) -> Result<Self, ActionError> {
    if root.symlink_metadata().is_ok() {
      fs::remove_dir_all(root).map_err(|e| ActionError::io(root, e))?;
    }
    fs::create_dir_all(root).map_err(|e| ActionError::io(root, e))?;
    Self::open(root, project_dir, install_dir)
  }

  /// Use an existing directory as the staging root.
  pub fn open(root: &Path, project_dir: &Path, install_dir: &Path) -> Result<Self, ActionError> {
    let root = dunce::canonicalize(root).map_err(|e| ActionError::io(root, e))?;
    Ok(Self {
      root,
      project_dir: project_dir.to_path_buf(),
      install_dir: normalize(install_dir),
    })
  }

  /// The canonical staging root.
  pub fn root(&self) -> &Path {
    &self.root
  }

  pub fn project_dir(&self) -> &Path {
    &self.project_dir
  }

  /// Path of `path` relative to the staging root.
  pub fn relative(&self, path: &Path) -> PathBuf {
    path.strip_prefix(&self.root).unwrap_or(path).to_path_buf()
  }

  /// Resolve a source path against the project directory.
  pub fn resolve_source(&self, path: &str) -> PathBuf {
    let path = Path::new(path);
    if path.is_absolute() {
      path.to_path_buf()
    } else {
      self.project_dir.join(path)
    }
  }

  /// Resolve a destination path, failing with `PathEscape` if it leaves the staging root.
  pub fn resolve_dest(&self, path: &str) -> Result<PathBuf, ActionError> {
    self.resolve_dest_with(path, true)
  }

  /// Resolve a destination. With `follow_leaf` false, an existing symlink at the
  /// final component is not followed, since it is about to be replaced.
  fn resolve_dest_with(&self, path: &str, follow_leaf: bool) -> Result<PathBuf, ActionError> {
    let requested = Path::new(path);
    let candidate = if requested.is_absolute() {
      let normalized = normalize(requested);
      if normalized.starts_with(&self.root) {
        normalized
      } else if let Ok(rest) = normalized.strip_prefix(&self.install_dir) {
        self.root.join(rest)
      } else {
        return Err(self.escape(path));
      }
    } else {
      normalize(&self.root.join(requested))
    };

    if !candidate.starts_with(&self.root) {
      return Err(self.escape(path));
    }
    self.ensure_contained(path, &candidate, follow_leaf)?;
    Ok(candidate)
  }

  /// Canonicalize the nearest existing ancestor of `candidate` and check it stays under the root.
  fn ensure_contained(&self, original: &str, candidate: &Path, follow_leaf: bool) -> Result<(), ActionError> {
    let mut probe = if follow_leaf { Some(candidate) } else { candidate.parent() };

    while let Some(current) = probe {
      let Ok(meta) = current.symlink_metadata() else {
        probe = current.parent();
        continue;
      };

      return match dunce::canonicalize(current) {
        Ok(real) if real.starts_with(&self.root) => Ok(()),
        Ok(_) => Err(self.escape(original)),
        // Dangling symlink: judge it by where it points.
        Err(_) if meta.file_type().is_symlink() => {
          let target = fs::read_link(current).map_err(|e| ActionError::io(current, e))?;
          let parent = current.parent().unwrap_or(&self.root);
          let resolved = normalize(&parent.join(target));
          if resolved.starts_with(&self.root) {
            Ok(())
          } else {
            Err(self.escape(original))
          }
        }
        Err(e) => Err(ActionError::io(current, e)),
      };
    }

    Ok(())
  }

  fn escape(&self, path: &str) -> ActionError {
    ActionError::PathEscape {
      path: path.to_string(),
      root: self.root.display().to_string(),
    }
  }

  /// Create a directory and its parents.
  pub fn make_dir(&self, path: &str) -> Result<PathBuf, ActionError> {
    let dest = self.resolve_dest(path)?;
    fs::create_dir_all(&dest).map_err(|e| ActionError::io(&dest, e))?;
    debug!(path = ?dest, "created directory");
    Ok(dest)
  }

  /// Copy a file or directory tree into the staging root.
  ///
  /// Returns the staging-relative path of every file and symlink written.
  pub fn copy_file(&self, source: &str, dest: &str) -> Result<Vec<PathBuf>, ActionError> {
    let src = self.resolve_source(source);
    let src_meta = src.symlink_metadata().map_err(|_| ActionError::MissingSource {
      path: src.display().to_string(),
    })?;

    let mut dst = self.resolve_dest(dest)?;
    if dst.is_dir() {
      if let Some(name) = src.file_name() {
        dst = dst.join(name);
        self.ensure_contained(dest, &dst, true)?;
      }
    }

    let written = if src_meta.is_dir() {
      self.copy_tree(&src, &dst)?
    } else {
      create_parent(&dst)?;
      if src_meta.file_type().is_symlink() {
        let target = fs::read_link(&src).map_err(|e| ActionError::io(&src, e))?;
        replace_with_symlink(&target, &dst)?;
      } else {
        fs::copy(&src, &dst).map_err(|e| ActionError::io(&dst, e))?;
      }
      vec![self.relative(&dst)]
    };

    debug!(source = ?src, dest = ?dst, files = written.len(), "copied");
    Ok(written)
  }

  fn copy_tree(&self, src: &Path, dst: &Path) -> Result<Vec<PathBuf>, ActionError> {
    let mut written = Vec::new();

    for entry in WalkDir::new(src).sort_by_file_name() {
      let entry = entry.map_err(|e| ActionError::Io {
        path: src.display().to_string(),
        message: e.to_string(),
      })?;
      let rel = entry.path().strip_prefix(src).unwrap_or(entry.path());
      let target = dst.join(rel);
      let file_type = entry.file_type();

      if file_type.is_dir() {
        fs::create_dir_all(&target).map_err(|e| ActionError::io(&target, e))?;
      } else if file_type.is_symlink() {
        let link = fs::read_link(entry.path()).map_err(|e| ActionError::io(entry.path(), e))?;
        replace_with_symlink(&link, &target)?;
        written.push(self.relative(&target));
      } else {
        create_parent(&target)?;
        fs::copy(entry.path(), &target).map_err(|e| ActionError::io(&target, e))?;
        written.push(self.relative(&target));
      }
    }

    Ok(written)
  }

  /// Create a symlink at `link` pointing at `target`, replacing any existing entry.
  ///
  /// The target is written verbatim and need not exist yet.
  pub fn symlink(&self, target: &str, link: &str) -> Result<PathBuf, ActionError> {
    let link_path = self.resolve_dest_with(link, false)?;
    create_parent(&link_path)?;
    replace_with_symlink(Path::new(target), &link_path)?;
    debug!(link = ?link_path, target = %target, "created symlink");
    Ok(link_path)
  }

  /// Write `contents` to `dest` and set its mode.
  pub fn write_file(&self, dest: &str, contents: &[u8], mode: u32) -> Result<PathBuf, ActionError> {
    let path = self.resolve_dest(dest)?;
    create_parent(&path)?;
    fs::write(&path, contents).map_err(|e| ActionError::io(&path, e))?;
    set_mode(&path, mode)?;
    Ok(path)
  }

  /// Render the template at `source` with `variables` and write it to `dest`.
  ///
  /// The template sees only `variables`; any other `$${...}` reference fails.
  pub fn render_template(
    &self,
    source: &str,
    dest: &str,
    mode: Option<u32>,
    variables: &BTreeMap<String, String>,
  ) -> Result<PathBuf, ActionError> {
    let template = self.resolve_source(source);
    let content = fs::read_to_string(&template).map_err(|e| match e.kind() {
      std::io::ErrorKind::NotFound => ActionError::MissingSource {
        path: template.display().to_string(),
      },
      _ => ActionError::io(&template, e),
    })?;

    let rendered = placeholder::substitute(&content, variables).map_err(|e| ActionError::TemplateRenderError {
      template: template.display().to_string(),
      message: e.to_string(),
    })?;

    let path = self.write_file(dest, rendered.as_bytes(), mode.unwrap_or(DEFAULT_FILE_MODE))?;
    debug!(template = ?template, dest = ?path, "rendered template");
    Ok(path)
  }

  /// Create an empty file if none exists.
  pub fn touch(&self, path: &str) -> Result<PathBuf, ActionError> {
    let dest = self.resolve_dest(path)?;
    create_parent(&dest)?;
    fs::OpenOptions::new()
      .create(true)
      .append(true)
      .open(&dest)
      .map_err(|e| ActionError::io(&dest, e))?;
    Ok(dest)
  }

  /// Copy the staging tree into `dest`, preserving symlinks and permissions.
  ///
  /// Entries already present in `dest` are replaced and reported.
  pub fn merge_into(&self, dest: &Path) -> Result<MergeSummary, ActionError> {
    let mut summary = MergeSummary::default();
    fs::create_dir_all(dest).map_err(|e| ActionError::io(dest, e))?;

    for entry in WalkDir::new(&self.root).min_depth(1).sort_by_file_name() {
      let entry = entry.map_err(|e| ActionError::Io {
        path: self.root.display().to_string(),
        message: e.to_string(),
      })?;
      let rel = entry.path().strip_prefix(&self.root).unwrap_or(entry.path());
      let target = dest.join(rel);
      let existing = target.symlink_metadata().ok();

      if entry.file_type().is_dir() {
        match existing {
          Some(meta) if meta.is_dir() => {}
          Some(_) => {
            fs::remove_file(&target).map_err(|e| ActionError::io(&target, e))?;
            summary.replaced.push(rel.to_path_buf());
            fs::create_dir(&target).map_err(|e| ActionError::io(&target, e))?;
          }
          None => fs::create_dir_all(&target).map_err(|e| ActionError::io(&target, e))?,
        }
        continue;
      }

      if let Some(meta) = existing {
        summary.replaced.push(rel.to_path_buf());
        let removed = if meta.is_dir() {
          fs::remove_dir_all(&target)
        } else {
          fs::remove_file(&target)
        };
        removed.map_err(|e| ActionError::io(&target, e))?;
      }

      if entry.file_type().is_symlink() {
        let link = fs::read_link(entry.path()).map_err(|e| ActionError::io(entry.path(), e))?;
        replace_with_symlink(&link, &target)?;
      } else {
        fs::copy(entry.path(), &target).map_err(|e| ActionError::io(&target, e))?;
      }
      summary.files += 1;
    }

    Ok(summary)
  }
}

/// Result of merging one staging root into the package tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeSummary {
  /// Files and symlinks written.
  pub files: usize,
  /// Paths, relative to the merge destination, that overwrote an existing entry.
  pub replaced: Vec<PathBuf>,
}

/// Resolve `.` and `..` without touching the filesystem.
fn normalize(path: &Path) -> PathBuf {
  let mut out = PathBuf::new();
  for component in path.components() {
    match component {
      Component::CurDir => {}
      Component::ParentDir => {
        out.pop();
      }
      other => out.push(other.as_os_str()),
    }
  }
  out
}

fn create_parent(path: &Path) -> Result<(), ActionError> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent).map_err(|e| ActionError::io(parent, e))?;
  }
  Ok(())
}

fn replace_with_symlink(target: &Path, link: &Path) -> Result<(), ActionError> {
  if let Ok(meta) = link.symlink_metadata() {
    let removed = if meta.is_dir() {
      fs::remove_dir_all(link)
    } else {
      fs::remove_file(link)
    };
    removed.map_err(|e| ActionError::io(link, e))?;
  }
  create_symlink(target, link).map_err(|e| ActionError::io(link, e))
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
  std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
  std::os::windows::fs::symlink_file(target, link)
}

#[cfg(unix)]
fn set_mode(path: &Path, mode: u32) -> Result<(), ActionError> {
  use std::os::unix::fs::PermissionsExt;
  fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| ActionError::io(path, e))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path, _mode: u32) -> Result<(), ActionError> {
  Ok(())
}
