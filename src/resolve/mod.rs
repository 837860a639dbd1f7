//! Content resolution: deciding where the bytes of a reference come from.
//!
//! A local export directory always wins over the network. Every distinct
//! `(origin, filename)` key is read or fetched at most once per run, even when several
//! worker threads ask for it at the same time.

mod fetch;
mod keys;

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::debug;

use crate::classify::parse_absolute;
use crate::config::MirrorPolicy;
use crate::error::{MirrorError, MirrorResult};
use crate::models::{AssetReference, OriginKind, ResolvedSource, SourceKind, TargetKey};

pub use fetch::{Fetcher, HttpFetcher};
pub use keys::{base_filename, export_remainder, target_key};

/// Shared result of resolving one key.
pub type Resolution = Arc<MirrorResult<ResolvedSource>>;

/// State of the local export directory for the current document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportSource {
  /// Directory exists and is consulted first.
  Present(PathBuf),
  /// Directory was expected but is absent.
  Missing(PathBuf),
  /// No directory applies to this run.
  Absent,
}

impl ExportSource {
  /// Inspect `dir` on disk.
  pub fn probe(dir: &Path) -> Self {
    if dir.is_dir() {
      Self::Present(dir.to_path_buf())
    } else {
      Self::Missing(dir.to_path_buf())
    }
  }
}

/// Memoizing resolver for one run.
pub struct ContentResolver<'a> {
  policy: &'a MirrorPolicy,
  export: ExportSource,
  fetcher: Option<&'a dyn Fetcher>,
  memo: Mutex<HashMap<TargetKey, Arc<OnceLock<Resolution>>>>,
}

impl<'a> ContentResolver<'a> {
  /// Create a resolver. Passing `None` as fetcher disables remote fetches.
  pub fn new(policy: &'a MirrorPolicy, export: ExportSource, fetcher: Option<&'a dyn Fetcher>) -> Self {
    Self {
      policy,
      export,
      fetcher,
      memo: Mutex::new(HashMap::new()),
    }
  }

  /// Key `reference` will be stored under.
  pub fn key_for(&self, reference: &AssetReference) -> TargetKey {
    target_key(reference, self.policy)
  }

  /// Obtain the bytes for `reference`, reusing an earlier resolution of the same key.
  pub fn resolve(&self, reference: &AssetReference) -> Resolution {
    let key = self.key_for(reference);
    let cell = {
      let mut memo = self.memo.lock().unwrap_or_else(PoisonError::into_inner);
      Arc::clone(memo.entry(key.clone()).or_default())
    };

    Arc::clone(cell.get_or_init(|| Arc::new(self.load(reference, key))))
  }

  fn load(&self, reference: &AssetReference, key: TargetKey) -> MirrorResult<ResolvedSource> {
    if let ExportSource::Present(dir) = &self.export {
      for candidate in local_candidates(dir, reference) {
        if !candidate.is_file() {
          continue;
        }
        debug!("{} <- {}", key.filename, candidate.display());
        let bytes = fs::read(&candidate).map_err(|source| MirrorError::ReadFailure {
          path: candidate.clone(),
          source,
        })?;
        return Ok(ResolvedSource {
          key,
          kind: SourceKind::Local(candidate),
          bytes,
        });
      }
    }

    if let (Some(fetcher), Some(_)) = (self.fetcher, parse_absolute(&reference.raw_url)) {
      let url = reference.fetch_url();
      let bytes = fetcher.fetch(&url)?;
      return Ok(ResolvedSource {
        key,
        kind: SourceKind::Remote(url),
        bytes,
      });
    }

    match &self.export {
      ExportSource::Missing(path) if reference.origin == OriginKind::LocalExport => {
        Err(MirrorError::SourceMissing { path: path.clone() })
      }
      _ => Err(MirrorError::Unavailable {
        raw_url: reference.raw_url.clone(),
      }),
    }
  }
}

/// Files inside the export directory that may hold the reference, in preference order.
fn local_candidates(dir: &Path, reference: &AssetReference) -> Vec<PathBuf> {
  let mut candidates = Vec::new();

  if reference.origin == OriginKind::LocalExport {
    let remainder = export_remainder(&reference.raw_url);
    if !remainder.is_empty() {
      candidates.push(remainder.iter().fold(dir.to_path_buf(), |path, segment| path.join(segment)));
    }
  }

  let base = base_filename(&reference.raw_url);
  if !base.is_empty() && base != "." && base != ".." {
    let by_name = dir.join(base);
    if !candidates.contains(&by_name) {
      candidates.push(by_name);
    }
  }

  candidates
}
