//! Per-reference failures raised while resolving and storing assets.
//!
//! None of these abort a run on their own: the pipeline converts each one into a
//! `NotFound` provenance record and carries on with the remaining references.

use std::path::PathBuf;

use thiserror::Error;

/// Failure attached to a single asset reference.
#[derive(Debug, Error)]
pub enum MirrorError {
  /// The local export directory that should hold the asset does not exist.
  #[error("source directory {} does not exist", path.display())]
  SourceMissing {
    /// Directory that was expected on disk.
    path: PathBuf,
  },
  /// Remote fetch failed with a transport error or a non-success status.
  #[error("failed to fetch {url}: {reason}")]
  FetchFailure {
    /// URL that was requested.
    url: String,
    /// Human readable reason reported by the HTTP client.
    reason: String,
  },
  /// Reading a local source file failed.
  #[error("failed to read {}: {source}", path.display())]
  ReadFailure {
    /// File that could not be read.
    path: PathBuf,
    /// Underlying I/O error.
    source: std::io::Error,
  },
  /// Writing into the asset store failed.
  #[error("failed to write {}: {source}", path.display())]
  WriteFailure {
    /// Store path that could not be written.
    path: PathBuf,
    /// Underlying I/O error.
    source: std::io::Error,
  },
  /// The store could not settle on a slot whose content matches the candidate.
  #[error("no consistent slot for {} after {attempts} attempts", path.display())]
  ChecksumMismatchUnresolved {
    /// Base path the conflict probing started from.
    path: PathBuf,
    /// Number of slots probed.
    attempts: usize,
  },
  /// No local copy exists and the reference cannot be fetched.
  #[error("no source available for {raw_url}")]
  Unavailable {
    /// Reference as written in the document.
    raw_url: String,
  },
}

impl MirrorError {
  /// Short stable tag used in provenance records.
  pub fn kind(&self) -> &'static str {
    match self {
      Self::SourceMissing { .. } => "source-missing",
      Self::FetchFailure { .. } => "fetch-failure",
      Self::ReadFailure { .. } => "read-failure",
      Self::WriteFailure { .. } => "write-failure",
      Self::ChecksumMismatchUnresolved { .. } => "checksum-mismatch-unresolved",
      Self::Unavailable { .. } => "unavailable",
    }
  }
}

/// Result alias for per-reference operations.
pub type MirrorResult<T> = Result<T, MirrorError>;
