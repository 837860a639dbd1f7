//! Per-document orchestration: extract, classify, resolve, commit, rewrite and record.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::asset_paths::relative_asset_path;
use crate::classify::OriginClassifier;
use crate::config::{MirrorConfig, MirrorPolicy, RunOptions};
use crate::error::MirrorError;
use crate::extract::ReferenceScanner;
use crate::layout::MirrorLayout;
use crate::models::{AssetReference, ProvenanceRecord, ResolutionOutcome, RunSummary, TargetKey};
use crate::provenance::{ProvenanceLog, guess_media_type};
use crate::resolve::{ContentResolver, ExportSource, Fetcher};
use crate::rewrite::{clean_document, inline_stylesheets, rewrite_document};
use crate::store::{Commit, DedupStore};

/// A document handed to the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInput {
  /// Logical name, used for the export directory, the output file and the log file.
  pub name: String,
  /// Full markup.
  pub text: String,
  /// File the text was read from; its directory holds the sibling export.
  pub location: Option<PathBuf>,
}

impl DocumentInput {
  /// Read a document from disk. Failure here aborts the run.
  pub fn from_path(path: &Path) -> Result<Self> {
    let text =
      fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .with_context(|| format!("{} does not name a file", path.display()))?;
    Ok(Self {
      name,
      text,
      location: Some(path.to_path_buf()),
    })
  }

  /// Wrap text obtained elsewhere, such as standard input.
  pub fn from_text(name: impl Into<String>, text: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      text: text.into(),
      location: None,
    }
  }
}

/// Where the rewritten document went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentOutput {
  /// Left to the caller to print on standard output.
  Stdout,
  /// Written to the path.
  Written(PathBuf),
  /// The path already held identical content.
  Unchanged(PathBuf),
}

/// Everything a finished run produced.
#[derive(Debug)]
pub struct MirrorReport {
  /// Rewritten document text.
  pub document: String,
  /// Destination of the rewritten document.
  pub output: DocumentOutput,
  /// One record per reference occurrence, in document order.
  pub records: Vec<ProvenanceRecord>,
  /// Counts per outcome.
  pub summary: RunSummary,
  /// Provenance log written for this run.
  pub log_path: Option<PathBuf>,
  /// Stylesheet links replaced by inline `<style>` elements.
  pub inlined_styles: usize,
  /// Comments, tags and attributes removed by the cleaning pass.
  pub cleaned: usize,
}

/// Settlement of one target key, shared by every occurrence that maps to it.
enum Settled {
  Stored(Commit),
  Failed(String),
}

/// Mirror pipeline bound to a configuration, a base directory and run options.
pub struct MirrorPipeline<'a> {
  config: &'a MirrorConfig,
  options: &'a RunOptions,
  layout: MirrorLayout,
  policy: MirrorPolicy,
  fetcher: Option<&'a dyn Fetcher>,
  source_dir: Option<PathBuf>,
  output_path: Option<PathBuf>,
}

impl<'a> MirrorPipeline<'a> {
  /// Create a pipeline storing below `base_dir`. Without a fetcher the run is offline.
  pub fn new(config: &'a MirrorConfig, options: &'a RunOptions, base_dir: &Path) -> Self {
    let base_dir = std::path::absolute(base_dir).unwrap_or_else(|_| base_dir.to_path_buf());
    Self {
      config,
      options,
      layout: config.to_layout(&base_dir),
      policy: config.policy(),
      fetcher: None,
      source_dir: None,
      output_path: None,
    }
  }

  /// Fetch references with no local copy through `fetcher`.
  pub fn with_fetcher(mut self, fetcher: &'a dyn Fetcher) -> Self {
    self.fetcher = Some(fetcher);
    self
  }

  /// Read local copies from `dir` instead of the sibling export directory.
  pub fn with_source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
    self.source_dir = Some(dir.into());
    self
  }

  /// Write the rewritten document to `path` instead of the documents directory.
  pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.output_path = Some(path.into());
    self
  }

  /// Directories this pipeline writes to.
  pub fn layout(&self) -> &MirrorLayout {
    &self.layout
  }

  /// Path the rewritten `document` is written to, and which its asset paths are
  /// relative to even when it goes to standard output.
  pub fn output_path_for(&self, document: &DocumentInput) -> PathBuf {
    let path = match &self.output_path {
      Some(path) => path.clone(),
      None => {
        let file_name = Path::new(&document.name)
          .file_name()
          .map(|name| name.to_os_string())
          .unwrap_or_else(|| "document.html".into());
        self.layout.documents_dir.join(file_name)
      }
    };
    std::path::absolute(&path).unwrap_or(path)
  }

  /// Mirror every asset `document` references and produce the rewritten text.
  pub fn run(&self, document: &DocumentInput) -> Result<MirrorReport> {
    let started = Utc::now();
    self.layout.ensure_dirs(self.options.write_log)?;

    let classifier = OriginClassifier::new(self.config, &document.name);
    let export = self.export_source(document, classifier.export_dir_name())?;

    let references: Vec<AssetReference> =
      ReferenceScanner::new(&document.text, &self.config.cdn_host)
        .references()
        .map(|reference| classifier.classify_reference(reference))
        .collect();
    info!("{}: {} asset references", document.name, references.len());

    let fetcher = self.fetcher.filter(|_| self.options.allow_fetch);
    let resolver = ContentResolver::new(&self.policy, export, fetcher);
    prefetch(&resolver, &references);

    let mut log = if self.options.write_log {
      ProvenanceLog::create(&self.layout.logs_dir, &document.name, started)?
    } else {
      ProvenanceLog::disabled()
    };

    let output_path = self.output_path_for(document);
    let output_dir = output_path.parent().unwrap_or(Path::new("")).to_path_buf();

    let store = DedupStore::new(&self.layout, &self.policy.conflict_naming);
    let mut settled: HashMap<TargetKey, Settled> = HashMap::new();
    let mut replacements: HashMap<String, String> = HashMap::new();
    let mut stylesheets: HashMap<String, PathBuf> = HashMap::new();
    let mut records = Vec::with_capacity(references.len());
    let mut summary = RunSummary::default();

    for reference in &references {
      let key = resolver.key_for(reference);
      let settlement = settled
        .entry(key.clone())
        .or_insert_with(|| settle(&resolver, &store, reference, &key));

      let (outcome, final_path, detail) = match settlement {
        Settled::Stored(commit) => {
          let relative = relative_asset_path(&output_dir, &commit.asset.path);
          if reference.locator.element == "link"
            && reference.locator.attribute.as_deref() == Some("href")
          {
            stylesheets.insert(relative.replace('&', "&amp;"), commit.asset.path.clone());
          }
          replacements.insert(reference.raw_url.clone(), relative.clone());
          (commit.outcome, Some(relative), None)
        }
        Settled::Failed(detail) => (ResolutionOutcome::NotFound, None, Some(detail.clone())),
      };

      match &detail {
        Some(detail) => warn!("{} (line {}): {}", reference.raw_url, reference.locator.line, detail),
        None => debug!("{} -> {} ({})", reference.raw_url, final_path.as_deref().unwrap_or(""), outcome),
      }

      let record = ProvenanceRecord {
        timestamp: Utc::now(),
        document: document.name.clone(),
        raw_url: reference.raw_url.clone(),
        final_path,
        media_type: guess_media_type(&key.filename, &reference.locator.element),
        outcome,
        origin: reference.origin,
        line: reference.locator.line,
        occurrence: reference.locator.occurrence,
        detail,
      };
      log.append(&record)?;
      summary.record(outcome);
      records.push(record);
    }

    let cleaning = clean_document(
      &rewrite_document(&document.text, &references, &replacements),
      self.options.clean,
    );
    if cleaning.removed > 0 {
      debug!("cleaning removed {} comments, tags and attributes", cleaning.removed);
    }
    let mut text = cleaning.text;
    let mut inlined_styles = 0;
    if self.options.inline_styles {
      let inlining = inline_stylesheets(&text, &stylesheets);
      text = inlining.text;
      inlined_styles = inlining.inlined;
    }

    let output = if self.options.output_to_stdout {
      DocumentOutput::Stdout
    } else {
      self.write_output(&output_path, &text)?
    };
    info!("{}: {}", document.name, summary);

    Ok(MirrorReport {
      document: text,
      output,
      records,
      summary,
      log_path: log.path().map(Path::to_path_buf),
      inlined_styles,
      cleaned: cleaning.removed,
    })
  }

  fn export_source(&self, document: &DocumentInput, export_dir_name: &str) -> Result<ExportSource> {
    if let Some(dir) = &self.source_dir {
      if dir.is_dir() {
        return Ok(ExportSource::Present(dir.clone()));
      }
      if !self.options.skip_prompts {
        bail!(
          "source directory {} does not exist (pass --yes to continue without it)",
          dir.display()
        );
      }
      warn!("source directory {} does not exist, continuing without local copies", dir.display());
      return Ok(ExportSource::Missing(dir.clone()));
    }

    let Some(parent) = document.location.as_deref().and_then(Path::parent) else {
      return Ok(ExportSource::Absent);
    };
    let export = ExportSource::probe(&parent.join(export_dir_name));
    if let ExportSource::Missing(dir) = &export {
      info!("no export directory at {}", dir.display());
    }
    Ok(export)
  }

  fn write_output(&self, path: &Path, text: &str) -> Result<DocumentOutput> {
    match fs::read(path) {
      Ok(existing) if existing == text.as_bytes() => {
        info!("{} is up to date", path.display());
        return Ok(DocumentOutput::Unchanged(path.to_path_buf()));
      }
      Ok(_) if !self.options.force_overwrite => {
        bail!("{} already exists with different content (pass --force to replace it)", path.display());
      }
      Ok(_) => {}
      Err(err) if err.kind() == ErrorKind::NotFound => {}
      Err(err) => return Err(err).with_context(|| format!("failed to read {}", path.display())),
    }

    if let Some(parent) = path.parent() {
      fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    info!("wrote {}", path.display());
    Ok(DocumentOutput::Written(path.to_path_buf()))
  }
}

/// Resolve every distinct key in parallel so the sequential commit pass only hits the memo.
fn prefetch(resolver: &ContentResolver<'_>, references: &[AssetReference]) {
  let mut seen = HashSet::new();
  let unique: Vec<&AssetReference> = references
    .iter()
    .filter(|reference| seen.insert(resolver.key_for(reference)))
    .collect();
  unique.par_iter().for_each(|reference| {
    resolver.resolve(reference);
  });
}

fn settle(
  resolver: &ContentResolver<'_>,
  store: &DedupStore<'_>,
  reference: &AssetReference,
  key: &TargetKey,
) -> Settled {
  let resolution = resolver.resolve(reference);
  match resolution.as_ref() {
    Ok(source) => match store.commit_source(source) {
      Ok(commit) => Settled::Stored(commit),
      Err(err) => Settled::Failed(describe(&err)),
    },
    Err(err) => match store.lookup(key) {
      Ok(Some(asset)) => {
        debug!("{}: using stored copy after {}", key.filename, err.kind());
        Settled::Stored(Commit {
          asset,
          outcome: ResolutionOutcome::CachedIdentical,
        })
      }
      Ok(None) => Settled::Failed(describe(err)),
      Err(lookup) => Settled::Failed(format!("{}; {}", describe(err), describe(&lookup))),
    },
  }
}

fn describe(err: &MirrorError) -> String {
  format!("{}: {}", err.kind(), err)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::MirrorResult;
  use crate::rewrite::CleanLevel;
  use std::sync::Mutex;
  use tempfile::tempdir;

  struct MapFetcher {
    bodies: HashMap<String, Vec<u8>>,
    calls: Mutex<Vec<String>>,
  }

  impl MapFetcher {
    fn new(entries: &[(&str, &[u8])]) -> Self {
      Self {
        bodies: entries
          .iter()
          .map(|(url, body)| (url.to_string(), body.to_vec()))
          .collect(),
        calls: Mutex::new(Vec::new()),
      }
    }
  }

  impl Fetcher for MapFetcher {
    fn fetch(&self, url: &str) -> MirrorResult<Vec<u8>> {
      self.calls.lock().unwrap().push(url.to_string());
      self.bodies.get(url).cloned().ok_or_else(|| MirrorError::FetchFailure {
        url: url.to_string(),
        reason: "HTTP 404 Not Found".into(),
      })
    }
  }

  fn offline_options() -> RunOptions {
    RunOptions {
      write_log: false,
      ..RunOptions::default()
    }
  }

  #[test]
  fn fetched_assets_are_rewritten_relative_to_the_output() -> Result<()> {
    let temp = tempdir()?;
    let config = MirrorConfig::default();
    let options = offline_options();
    let fetcher = MapFetcher::new(&[("https://cdn.oaistatic.com/assets/app.js", b"app")]);
    let pipeline = MirrorPipeline::new(&config, &options, temp.path()).with_fetcher(&fetcher);

    let document = DocumentInput::from_text(
      "chat.html",
      r#"<script src="https://cdn.oaistatic.com/assets/app.js"></script>"#,
    );
    let report = pipeline.run(&document)?;

    assert_eq!(report.document, r#"<script src="../cdn-assets/assets/app.js"></script>"#);
    assert_eq!(report.output, DocumentOutput::Written(temp.path().join("documents/chat.html")));
    assert_eq!(report.records[0].outcome, ResolutionOutcome::FetchedRemote);
    assert!(report.log_path.is_none());
    Ok(())
  }

  #[test]
  fn failed_fetches_keep_the_original_url() -> Result<()> {
    let temp = tempdir()?;
    let config = MirrorConfig::default();
    let options = offline_options();
    let fetcher = MapFetcher::new(&[]);
    let pipeline = MirrorPipeline::new(&config, &options, temp.path()).with_fetcher(&fetcher);

    let text = r#"<img src="https://persistent.oaistatic.com/x/y.png">"#;
    let report = pipeline.run(&DocumentInput::from_text("chat.html", text))?;

    assert_eq!(report.document, text);
    let record = &report.records[0];
    assert_eq!(record.outcome, ResolutionOutcome::NotFound);
    assert_eq!(record.final_path, None);
    assert!(record.detail.as_deref().unwrap_or("").starts_with("fetch-failure"));
    Ok(())
  }

  #[test]
  fn offline_runs_reuse_previously_stored_copies() -> Result<()> {
    let temp = tempdir()?;
    let config = MirrorConfig::default();
    let text = r#"<script src="https://cdn.oaistatic.com/assets/app.js"></script>"#;

    let online = RunOptions {
      output_to_stdout: true,
      ..offline_options()
    };
    let fetcher = MapFetcher::new(&[("https://cdn.oaistatic.com/assets/app.js", b"app")]);
    MirrorPipeline::new(&config, &online, temp.path())
      .with_fetcher(&fetcher)
      .run(&DocumentInput::from_text("chat.html", text))?;

    let offline = RunOptions {
      allow_fetch: false,
      ..online
    };
    let report = MirrorPipeline::new(&config, &offline, temp.path())
      .with_fetcher(&fetcher)
      .run(&DocumentInput::from_text("chat.html", text))?;

    assert_eq!(fetcher.calls.lock().unwrap().len(), 1);
    assert_eq!(report.records[0].outcome, ResolutionOutcome::CachedIdentical);
    assert_eq!(report.output, DocumentOutput::Stdout);
    Ok(())
  }

  #[test]
  fn missing_explicit_source_requires_confirmation() -> Result<()> {
    let temp = tempdir()?;
    let config = MirrorConfig::default();
    let document = DocumentInput::from_text("chat.html", "<img src=\"chat_fichiers/a.png\">");

    let options = offline_options();
    let refused = MirrorPipeline::new(&config, &options, temp.path())
      .with_source_dir(temp.path().join("nowhere"))
      .run(&document);
    assert!(refused.is_err());

    let confirmed = RunOptions {
      skip_prompts: true,
      ..offline_options()
    };
    let report = MirrorPipeline::new(&config, &confirmed, temp.path())
      .with_source_dir(temp.path().join("nowhere"))
      .run(&document)?;
    let detail = report.records[0].detail.as_deref().unwrap_or("");
    assert!(detail.starts_with("source-missing"), "{detail}");
    Ok(())
  }

  #[test]
  fn differing_outputs_are_only_replaced_with_force() -> Result<()> {
    let temp = tempdir()?;
    let config = MirrorConfig::default();
    let output = temp.path().join("out.html");
    fs::write(&output, "old")?;

    let options = offline_options();
    let document = DocumentInput::from_text("chat.html", "<p>new</p>");
    let refused = MirrorPipeline::new(&config, &options, temp.path())
      .with_output_path(&output)
      .run(&document);
    assert!(refused.is_err());
    assert_eq!(fs::read_to_string(&output)?, "old");

    let forced = RunOptions {
      force_overwrite: true,
      ..offline_options()
    };
    let pipeline = MirrorPipeline::new(&config, &forced, temp.path()).with_output_path(&output);
    assert_eq!(pipeline.run(&document)?.output, DocumentOutput::Written(output.clone()));
    assert_eq!(pipeline.run(&document)?.output, DocumentOutput::Unchanged(output.clone()));
    Ok(())
  }

  #[test]
  fn same_named_exports_in_different_folders_stay_apart() -> Result<()> {
    let temp = tempdir()?;
    let saved = temp.path().join("saved");
    fs::create_dir_all(saved.join("page_fichiers/a"))?;
    fs::create_dir_all(saved.join("page_fichiers/b"))?;
    fs::write(saved.join("page_fichiers/a/logo.png"), b"AAA")?;
    fs::write(saved.join("page_fichiers/b/logo.png"), b"BBB")?;
    let page = saved.join("page.html");
    fs::write(&page, r#"<img src="page_fichiers/a/logo.png"><img src="page_fichiers/b/logo.png">"#)?;

    let base = temp.path().join("mirror");
    let config = MirrorConfig::default();
    let options = offline_options();
    let report = MirrorPipeline::new(&config, &options, &base).run(&DocumentInput::from_path(&page)?)?;

    let outcomes: Vec<ResolutionOutcome> = report.records.iter().map(|record| record.outcome).collect();
    assert_eq!(outcomes, vec![ResolutionOutcome::CopiedFromSource; 2]);
    assert_ne!(report.records[0].final_path, report.records[1].final_path);
    assert_eq!(fs::read(base.join("external-assets/a/logo.png"))?, b"AAA");
    assert_eq!(fs::read(base.join("external-assets/b/logo.png"))?, b"BBB");
    assert_eq!(
      report.document,
      r#"<img src="../external-assets/a/logo.png"><img src="../external-assets/b/logo.png">"#
    );
    Ok(())
  }

  #[test]
  fn cleaning_runs_on_the_rewritten_document() -> Result<()> {
    let temp = tempdir()?;
    let config = MirrorConfig::default();
    let options = RunOptions {
      clean: CleanLevel::StripStyle,
      ..offline_options()
    };
    let fetcher = MapFetcher::new(&[("https://cdn.oaistatic.com/assets/app.js", b"app")]);
    let pipeline = MirrorPipeline::new(&config, &options, temp.path()).with_fetcher(&fetcher);

    let report = pipeline.run(&DocumentInput::from_text(
      "chat.html",
      r#"<!-- saved --><script style="x" src="https://cdn.oaistatic.com/assets/app.js"></script>"#,
    ))?;

    assert_eq!(report.cleaned, 2);
    assert_eq!(report.document, r#"<script src="../cdn-assets/assets/app.js"></script>"#);
    assert_eq!(report.records[0].outcome, ResolutionOutcome::FetchedRemote);
    Ok(())
  }

  #[test]
  fn stylesheets_can_be_inlined() -> Result<()> {
    let temp = tempdir()?;
    let config = MirrorConfig::default();
    let options = RunOptions {
      inline_styles: true,
      ..offline_options()
    };
    let fetcher = MapFetcher::new(&[("https://cdn.oaistatic.com/assets/site.css", b"body{}")]);
    let pipeline = MirrorPipeline::new(&config, &options, temp.path()).with_fetcher(&fetcher);

    let report = pipeline.run(&DocumentInput::from_text(
      "chat.html",
      r#"<link rel="stylesheet" href="https://cdn.oaistatic.com/assets/site.css">"#,
    ))?;

    assert_eq!(report.inlined_styles, 1);
    assert_eq!(report.document, "<style>\nbody{}\n</style>");
    Ok(())
  }
}
