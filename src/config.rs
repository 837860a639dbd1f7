//! Mirror configuration loader and per-run options.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::asset_paths::{ConflictNaming, FilenameNormalization};
use crate::layout::MirrorLayout;
use crate::rewrite::CleanLevel;

/// Name of the configuration file looked up in the base directory.
pub const DEFAULT_CONFIG_FILE: &str = "mirror.config.json";

/// Discoverable configuration describing hosts, store layout and policies.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Host serving hashed build assets.
    pub cdn_host: String,
    /// Host serving long-lived assets.
    pub persistent_host: String,
    /// Suffix appended to a document stem to name its sibling export directory.
    pub export_dir_suffix: String,
    /// Store root for CDN assets, relative to the base directory.
    pub cdn_dir: String,
    /// Store root for persistent assets, relative to the base directory.
    pub persistent_dir: String,
    /// Store root for local exports and unknown origins, relative to the base directory.
    pub external_dir: String,
    /// Directory receiving rewritten documents, relative to the base directory.
    pub documents_dir: String,
    /// Directory receiving provenance logs, relative to the base directory.
    pub logs_dir: String,
    /// Upper bound for a single HTTP request.
    pub fetch_timeout_secs: u64,
    /// User agent sent with remote fetches.
    pub user_agent: String,
    /// How path segments are turned into store filenames.
    pub filename_normalization: FilenameNormalization,
    /// Separator placed between a file stem and its conflict counter.
    pub conflict_separator: String,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            cdn_host: "cdn.oaistatic.com".into(),
            persistent_host: "persistent.oaistatic.com".into(),
            export_dir_suffix: "_fichiers".into(),
            cdn_dir: "cdn-assets".into(),
            persistent_dir: "persistent".into(),
            external_dir: "external-assets".into(),
            documents_dir: "documents".into(),
            logs_dir: "logs".into(),
            fetch_timeout_secs: 10,
            user_agent: concat!("oaistatic_mirror/", env!("CARGO_PKG_VERSION")).into(),
            filename_normalization: FilenameNormalization::Preserve,
            conflict_separator: "-".into(),
        }
    }
}

impl MirrorConfig {
    /// Attempt to load configuration from the provided base directory.
    ///
    /// A missing or unparsable file yields the defaults so a bare directory works
    /// without any setup.
    pub fn discover(base_dir: &Path) -> Self {
        let candidate = base_dir.join(DEFAULT_CONFIG_FILE);
        Self::from_path(&candidate).unwrap_or_default()
    }

    /// Read configuration from a specific JSON file, ignoring failures.
    pub fn from_path(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Read configuration from a file the operator named explicitly.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("failed to parse config {}", path.display()))
    }

    /// Resolve the store layout below `base_dir`.
    pub fn to_layout(&self, base_dir: &Path) -> MirrorLayout {
        MirrorLayout {
            base_dir: base_dir.to_path_buf(),
            cdn_root: base_dir.join(&self.cdn_dir),
            persistent_root: base_dir.join(&self.persistent_dir),
            external_root: base_dir.join(&self.external_dir),
            documents_dir: base_dir.join(&self.documents_dir),
            logs_dir: base_dir.join(&self.logs_dir),
        }
    }

    /// Naming policies shared by the resolver and the store.
    pub fn policy(&self) -> MirrorPolicy {
        MirrorPolicy {
            normalization: self.filename_normalization,
            conflict_naming: ConflictNaming::new(&self.conflict_separator),
        }
    }

    /// Timeout applied to every remote fetch.
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs.max(1))
    }

    /// Directory name of the sibling export for a document called `document_name`.
    pub fn export_dir_name(&self, document_name: &str) -> String {
        let file_name = Path::new(document_name)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| document_name.to_string());
        let stem = match file_name.rsplit_once('.') {
            Some((stem, _)) if !stem.is_empty() => stem.to_string(),
            _ => file_name,
        };
        format!("{stem}{}", self.export_dir_suffix)
    }
}

/// Named policy parameters replacing per-variant code paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorPolicy {
    /// Filename normalisation applied to every store key.
    pub normalization: FilenameNormalization,
    /// Scheme used to derive alternate names on content conflicts.
    pub conflict_naming: ConflictNaming,
}

impl Default for MirrorPolicy {
    fn default() -> Self {
        MirrorConfig::default().policy()
    }
}

/// Switches supplied by the operator for a single run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Replace an existing output document whose content differs.
    pub force_overwrite: bool,
    /// Continue without confirmation when an explicit source directory is missing.
    pub skip_prompts: bool,
    /// Suppress progress messages.
    pub silent: bool,
    /// Emit per-reference progress messages.
    pub verbose: bool,
    /// Write a provenance log file for the run.
    pub write_log: bool,
    /// Emit the rewritten document on standard output instead of a file.
    pub output_to_stdout: bool,
    /// Permit remote fetches for references without a local copy.
    pub allow_fetch: bool,
    /// Replace mirrored stylesheet links with inline `<style>` elements.
    pub inline_styles: bool,
    /// Tidy the rewritten document before it is written.
    pub clean: CleanLevel,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            force_overwrite: false,
            skip_prompts: false,
            silent: false,
            verbose: false,
            write_log: true,
            output_to_stdout: false,
            allow_fetch: true,
            inline_styles: false,
            clean: CleanLevel::Off,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn discover_falls_back_to_defaults() {
        let temp = tempdir().expect("failed to create temp dir");
        let config = MirrorConfig::discover(temp.path());
        assert_eq!(config.cdn_host, "cdn.oaistatic.com");
        assert_eq!(config.export_dir_suffix, "_fichiers");
    }

    #[test]
    fn discover_merges_partial_file_with_defaults() {
        let temp = tempdir().expect("failed to create temp dir");
        fs::write(
            temp.path().join(DEFAULT_CONFIG_FILE),
            r#"{"cdn_host": "cdn.example-static.com", "fetch_timeout_secs": 3}"#,
        )
        .expect("failed to write config");

        let config = MirrorConfig::discover(temp.path());
        assert_eq!(config.cdn_host, "cdn.example-static.com");
        assert_eq!(config.fetch_timeout(), Duration::from_secs(3));
        assert_eq!(config.persistent_host, "persistent.oaistatic.com");
    }

    #[test]
    fn load_reports_malformed_files() {
        let temp = tempdir().expect("failed to create temp dir");
        let path = temp.path().join("broken.json");
        fs::write(&path, "{not json").expect("failed to write config");

        let err = MirrorConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse config"));
    }

    #[test]
    fn derives_export_dir_from_document_stem() {
        let config = MirrorConfig::default();
        assert_eq!(config.export_dir_name("page.html"), "page_fichiers");
        assert_eq!(config.export_dir_name("/tmp/chats/report.v2.htm"), "report.v2_fichiers");
        assert_eq!(config.export_dir_name("transcript"), "transcript_fichiers");
    }

    #[test]
    fn layout_roots_live_under_base_dir() {
        let layout = MirrorConfig::default().to_layout(Path::new("/srv/archive"));
        assert_eq!(layout.cdn_root, Path::new("/srv/archive/cdn-assets"));
        assert_eq!(layout.external_root, Path::new("/srv/archive/external-assets"));
        assert_eq!(layout.logs_dir, Path::new("/srv/archive/logs"));
    }
}
