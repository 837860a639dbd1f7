//! Helpers for filtering references and naming files in the asset store.
//!
//! The responsibilities are split into focused submodules so that the logic for
//! filtering references, normalising store filenames, and computing document-relative
//! paths can be tested independently. The store, the resolver and the rewrite engine
//! all share them.

mod filters;
mod naming;
mod relative;

pub use filters::should_ignore_asset_reference;
pub use naming::{ConflictNaming, FilenameNormalization, INDEX_FILENAME, split_extension};
pub use relative::{relative_asset_path, to_forward_slashes};
