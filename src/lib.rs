#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

pub mod asset_paths;
pub mod classify;
pub mod config;
pub mod error;
pub mod extract;
pub mod layout;
pub mod models;
pub mod pipeline;
pub mod provenance;
pub mod resolve;
pub mod rewrite;
pub mod store;

pub use classify::OriginClassifier;
pub use config::{DEFAULT_CONFIG_FILE, MirrorConfig, MirrorPolicy, RunOptions};
pub use error::{MirrorError, MirrorResult};
pub use extract::ReferenceScanner;
pub use layout::MirrorLayout;
pub use models::{
  AssetReference, OriginKind, ProvenanceRecord, ResolutionOutcome, RunSummary, StoredAsset,
  TargetKey,
};
pub use pipeline::{DocumentInput, DocumentOutput, MirrorPipeline, MirrorReport};
pub use resolve::{ContentResolver, ExportSource, Fetcher, HttpFetcher};
pub use store::DedupStore;
