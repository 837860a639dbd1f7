//! Checksum-gated asset store partitioned by origin.
//!
//! The store is the only writer of the asset tree. Content under an existing name is
//! never replaced: identical bytes are reused, different bytes go to the first free
//! `name-N.ext` slot, and a slot already holding the same bytes is reused as well.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use same_file::is_same_file;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::asset_paths::ConflictNaming;
use crate::error::{MirrorError, MirrorResult};
use crate::layout::MirrorLayout;
use crate::models::{ResolutionOutcome, ResolvedSource, SourceKind, StoredAsset, TargetKey};

/// Upper bound on conflict slots probed for a single key.
pub const MAX_CONFLICT_SLOTS: usize = 10_000;

/// Result of committing candidate bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
  /// Where the content lives after the commit.
  pub asset: StoredAsset,
  /// How the commit was settled.
  pub outcome: ResolutionOutcome,
}

/// Store rooted at the per-origin directories of a [`MirrorLayout`].
pub struct DedupStore<'a> {
  layout: &'a MirrorLayout,
  naming: &'a ConflictNaming,
  writer: Mutex<()>,
}

impl<'a> DedupStore<'a> {
  /// Create a store writing below `layout` and naming conflicts with `naming`.
  pub fn new(layout: &'a MirrorLayout, naming: &'a ConflictNaming) -> Self {
    Self {
      layout,
      naming,
      writer: Mutex::new(()),
    }
  }

  /// Store resolved bytes under their key.
  pub fn commit_source(&self, source: &ResolvedSource) -> MirrorResult<Commit> {
    let fresh = match source.kind {
      SourceKind::Local(_) => ResolutionOutcome::CopiedFromSource,
      SourceKind::Remote(_) => ResolutionOutcome::FetchedRemote,
    };
    let local = match &source.kind {
      SourceKind::Local(path) => Some(path.as_path()),
      SourceKind::Remote(_) => None,
    };
    self.commit_bytes(&source.key, &source.bytes, fresh, local)
  }

  /// Store `bytes` under `key`.
  ///
  /// `fresh` is the outcome reported when the primary name was free. `local_source`
  /// enables the same-file shortcut when the candidate already is the stored file.
  pub fn commit_bytes(
    &self,
    key: &TargetKey,
    bytes: &[u8],
    fresh: ResolutionOutcome,
    local_source: Option<&Path>,
  ) -> MirrorResult<Commit> {
    let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
    let root = self.layout.root_for(key.origin);
    let candidate = checksum(bytes);

    for attempt in 0..=MAX_CONFLICT_SLOTS {
      let name = if attempt == 0 {
        key.filename.clone()
      } else {
        self.naming.slot(&key.filename, attempt)
      };
      let path = join_store_path(root, &name);

      match existing_checksum(&path, local_source, &candidate)? {
        Some(existing) if existing == candidate => {
          debug!("{} already stored at {}", key.filename, path.display());
          return Ok(self.settle(key, path, candidate, ResolutionOutcome::CachedIdentical));
        }
        Some(_) => continue,
        None => {
          if !write_new_file(&path, bytes)? {
            // Slot taken by a writer outside this process since the probe.
            if checksum(&read_existing(&path)?) == candidate {
              return Ok(self.settle(key, path, candidate, ResolutionOutcome::CachedIdentical));
            }
            continue;
          }
          let written = checksum(&read_existing(&path)?);
          if written != candidate {
            return Err(MirrorError::ChecksumMismatchUnresolved {
              path,
              attempts: attempt + 1,
            });
          }
          let outcome = if attempt == 0 {
            fresh
          } else {
            ResolutionOutcome::Renamed
          };
          debug!("{} stored at {} ({})", key.filename, path.display(), outcome);
          return Ok(self.settle(key, path, candidate, outcome));
        }
      }
    }

    Err(MirrorError::ChecksumMismatchUnresolved {
      path: join_store_path(root, &key.filename),
      attempts: MAX_CONFLICT_SLOTS + 1,
    })
  }

  /// Asset already stored under the primary name of `key`, if any.
  pub fn lookup(&self, key: &TargetKey) -> MirrorResult<Option<StoredAsset>> {
    let path = join_store_path(self.layout.root_for(key.origin), &key.filename);
    if !path.is_file() {
      return Ok(None);
    }
    let stored = checksum(&read_existing(&path)?);
    Ok(Some(self.settle(key, path, stored, ResolutionOutcome::CachedIdentical).asset))
  }

  fn settle(&self, key: &TargetKey, path: PathBuf, checksum: String, outcome: ResolutionOutcome) -> Commit {
    Commit {
      asset: StoredAsset {
        final_relative_path: self.layout.relative_to_base(&path),
        path,
        checksum,
        origin: key.origin,
      },
      outcome,
    }
  }
}

/// Hex encoded SHA-256 of `bytes`.
pub fn checksum(bytes: &[u8]) -> String {
  format!("{:x}", Sha256::digest(bytes))
}

fn join_store_path(root: &Path, filename: &str) -> PathBuf {
  filename
    .split('/')
    .filter(|segment| !segment.is_empty())
    .fold(root.to_path_buf(), |path, segment| path.join(segment))
}

/// Checksum of whatever occupies `path`, or `None` when the slot is free.
///
/// A directory occupying the slot yields a checksum that never matches.
fn existing_checksum(path: &Path, local_source: Option<&Path>, candidate: &str) -> MirrorResult<Option<String>> {
  let metadata = match fs::metadata(path) {
    Ok(metadata) => metadata,
    Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
    Err(source) => {
      return Err(MirrorError::ReadFailure {
        path: path.to_path_buf(),
        source,
      });
    }
  };

  if !metadata.is_file() {
    return Ok(Some(String::new()));
  }

  if let Some(source) = local_source
    && is_same_file(source, path).unwrap_or(false)
  {
    return Ok(Some(candidate.to_string()));
  }

  Ok(Some(checksum(&read_existing(path)?)))
}

fn read_existing(path: &Path) -> MirrorResult<Vec<u8>> {
  fs::read(path).map_err(|source| MirrorError::ReadFailure {
    path: path.to_path_buf(),
    source,
  })
}

/// Write `bytes` to `path` only if nothing exists there yet.
///
/// Content goes to a temporary sibling first and is then hard linked into place, so a
/// reader never observes a partially written asset. Returns `false` if the slot was
/// taken in the meantime.
fn write_new_file(path: &Path, bytes: &[u8]) -> MirrorResult<bool> {
  let write_failure = |source: std::io::Error| MirrorError::WriteFailure {
    path: path.to_path_buf(),
    source,
  };

  let parent = path.parent().unwrap_or(Path::new("."));
  fs::create_dir_all(parent).map_err(write_failure)?;

  let file_name = path
    .file_name()
    .map(|name| name.to_string_lossy().into_owned())
    .unwrap_or_default();
  let staging = parent.join(format!(".{file_name}.{}.partial", std::process::id()));
  // Writes within a process hold the store lock, so a staging file under our pid is a
  // leftover from an interrupted run that happened to share it.
  match fs::remove_file(&staging) {
    Ok(()) => debug!("removed stale staging file {}", staging.display()),
    Err(err) if err.kind() == ErrorKind::NotFound => {}
    Err(err) => return Err(write_failure(err)),
  }

  let staged = OpenOptions::new()
    .write(true)
    .create_new(true)
    .open(&staging)
    .and_then(|mut file| {
      file.write_all(bytes)?;
      file.sync_all()
    });
  if let Err(err) = staged {
    let _ = fs::remove_file(&staging);
    return Err(write_failure(err));
  }

  let placed = match fs::hard_link(&staging, path) {
    Ok(()) => Ok(true),
    Err(err) if err.kind() == ErrorKind::AlreadyExists => Ok(false),
    Err(_) if !path.exists() => fs::rename(&staging, path).map(|_| true),
    Err(err) => Err(err),
  };
  let _ = fs::remove_file(&staging);
  placed.map_err(write_failure)
}
