//! Data structures produced while mirroring the assets of a document.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logical source category of an asset reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OriginKind {
  /// Hashed build assets served from the CDN host.
  Cdn,
  /// Long-lived assets served from the persistent host.
  Persistent,
  /// Files saved next to the document by a browser "save page" export.
  LocalExport,
  /// Anything else; mirrored into the generic external store.
  Unknown,
}

impl OriginKind {
  /// Tag written to logs and provenance records.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Cdn => "cdn",
      Self::Persistent => "persistent",
      Self::LocalExport => "local-export",
      Self::Unknown => "unknown",
    }
  }
}

impl fmt::Display for OriginKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// How a single reference was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResolutionOutcome {
  /// Store already held byte-identical content; nothing was written.
  CachedIdentical,
  /// Bytes came from the local export directory and were written to the store.
  CopiedFromSource,
  /// Bytes were downloaded and written to the store.
  FetchedRemote,
  /// Store held different content under the same name; a suffixed slot was written.
  Renamed,
  /// No bytes could be obtained or stored; the reference is left unchanged.
  NotFound,
}

impl ResolutionOutcome {
  /// All outcomes in reporting order.
  pub const ALL: [ResolutionOutcome; 5] = [
    Self::CachedIdentical,
    Self::CopiedFromSource,
    Self::FetchedRemote,
    Self::Renamed,
    Self::NotFound,
  ];

  /// Tag written to logs and provenance records.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::CachedIdentical => "cached-identical",
      Self::CopiedFromSource => "copied-from-source",
      Self::FetchedRemote => "fetched-remote",
      Self::Renamed => "renamed",
      Self::NotFound => "not-found",
    }
  }
}

impl fmt::Display for ResolutionOutcome {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// Where a reference was declared inside the document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLocator {
  /// Lowercased name of the declaring element (`script`, `link`, `img`, ...).
  pub element: String,
  /// Attribute holding the value, or `None` for a literal inside inline script text.
  pub attribute: Option<String>,
  /// Byte range of the raw value within the document text.
  pub span: Range<usize>,
  /// 1-based line number of the value.
  pub line: usize,
  /// 1-based index of this reference among the references on the same line.
  pub occurrence: usize,
}

/// A reference found by the extractor, before classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedReference {
  /// Value exactly as written in the document.
  pub raw_url: String,
  /// Declaration context used to rewrite the value in place.
  pub locator: ReferenceLocator,
}

/// A classified reference ready for resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference {
  /// Value exactly as written in the document.
  pub raw_url: String,
  /// Classified origin.
  pub origin: OriginKind,
  /// Declaration context used to rewrite the value in place.
  pub locator: ReferenceLocator,
}

impl AssetReference {
  /// URL suitable for an HTTP request: HTML entity `&amp;` decoded, protocol-relative
  /// values upgraded to `https:`.
  pub fn fetch_url(&self) -> String {
    let decoded = self.raw_url.trim().replace("&amp;", "&");
    if decoded.starts_with("//") {
      format!("https:{decoded}")
    } else {
      decoded
    }
  }
}

/// Store key: origin plus the store-relative filename.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TargetKey {
  /// Origin deciding the store root.
  pub origin: OriginKind,
  /// Path below the origin root, `/`-separated.
  pub filename: String,
}

/// Provenance of candidate bytes handed to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
  /// Read from a file in the local export directory.
  Local(PathBuf),
  /// Downloaded from the given URL.
  Remote(String),
}

/// Bytes obtained for a target key.
#[derive(Debug, Clone)]
pub struct ResolvedSource {
  /// Key the bytes should be committed under.
  pub key: TargetKey,
  /// Where the bytes came from.
  pub kind: SourceKind,
  /// Candidate content.
  pub bytes: Vec<u8>,
}

/// An asset as it lives in the store after a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
  /// Path relative to the base directory, `/`-separated.
  pub final_relative_path: String,
  /// Absolute location on disk.
  pub path: PathBuf,
  /// Hex encoded SHA-256 of the stored content.
  pub checksum: String,
  /// Origin the asset was stored under.
  pub origin: OriginKind,
}

/// One audit entry per processed reference occurrence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvenanceRecord {
  /// Time the record was produced.
  pub timestamp: DateTime<Utc>,
  /// Logical name of the processed document.
  pub document: String,
  /// Reference as written in the document.
  pub raw_url: String,
  /// Rewritten value, absent when the reference was left unchanged.
  pub final_path: Option<String>,
  /// Guessed MIME type of the asset.
  pub media_type: String,
  /// How the reference was settled.
  pub outcome: ResolutionOutcome,
  /// Classified origin.
  pub origin: OriginKind,
  /// 1-based line of the reference in the input document.
  pub line: usize,
  /// 1-based occurrence index on that line.
  pub occurrence: usize,
  /// Error tag and message for references that could not be mirrored.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub detail: Option<String>,
}

/// Counts per outcome for a finished run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
  /// Number of reference occurrences per outcome.
  pub outcomes: BTreeMap<ResolutionOutcome, usize>,
}

impl RunSummary {
  /// Record one more occurrence of `outcome`.
  pub fn record(&mut self, outcome: ResolutionOutcome) {
    *self.outcomes.entry(outcome).or_default() += 1;
  }

  /// Number of occurrences settled as `outcome`.
  pub fn count(&self, outcome: ResolutionOutcome) -> usize {
    self.outcomes.get(&outcome).copied().unwrap_or(0)
  }

  /// Total number of processed occurrences.
  pub fn total(&self) -> usize {
    self.outcomes.values().sum()
  }
}

impl fmt::Display for RunSummary {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parts: Vec<String> = ResolutionOutcome::ALL
      .iter()
      .filter(|outcome| self.count(**outcome) > 0)
      .map(|outcome| format!("{} {}", self.count(*outcome), outcome))
      .collect();
    if parts.is_empty() {
      f.write_str("no references")
    } else {
      write!(f, "{} references: {}", self.total(), parts.join(", "))
    }
  }
}
