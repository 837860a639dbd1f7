//! On-disk layout of the mirror: per-origin store roots, documents and logs.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::asset_paths::to_forward_slashes;
use crate::models::OriginKind;

/// Owned description of every directory the mirror writes to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorLayout {
  /// Base directory every other path hangs from.
  pub base_dir: PathBuf,
  /// Store root for [`OriginKind::Cdn`].
  pub cdn_root: PathBuf,
  /// Store root for [`OriginKind::Persistent`].
  pub persistent_root: PathBuf,
  /// Store root for [`OriginKind::LocalExport`] and [`OriginKind::Unknown`].
  pub external_root: PathBuf,
  /// Default directory for rewritten documents.
  pub documents_dir: PathBuf,
  /// Directory holding one provenance log per run.
  pub logs_dir: PathBuf,
}

impl MirrorLayout {
  /// Store root assigned to `origin`.
  pub fn root_for(&self, origin: OriginKind) -> &Path {
    match origin {
      OriginKind::Cdn => &self.cdn_root,
      OriginKind::Persistent => &self.persistent_root,
      OriginKind::LocalExport | OriginKind::Unknown => &self.external_root,
    }
  }

  /// Create every directory of the layout. Failure here aborts the run.
  pub fn ensure_dirs(&self, with_logs: bool) -> Result<()> {
    let mut dirs = vec![
      &self.cdn_root,
      &self.persistent_root,
      &self.external_root,
      &self.documents_dir,
    ];
    if with_logs {
      dirs.push(&self.logs_dir);
    }
    for dir in dirs {
      fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
  }

  /// Express `path` relative to the base directory with forward slashes.
  ///
  /// Paths outside the base directory are returned unchanged.
  pub fn relative_to_base(&self, path: &Path) -> String {
    let relative = path.strip_prefix(&self.base_dir).unwrap_or(path);
    to_forward_slashes(relative)
  }
}
