use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Result;
use oaistatic_mirror::provenance::read_records;
use oaistatic_mirror::{
  DocumentInput, DocumentOutput, Fetcher, MirrorConfig, MirrorError, MirrorPipeline, MirrorResult,
  ResolutionOutcome, RunOptions,
};
use tempfile::tempdir;

const APP_URL: &str = "https://cdn.example-static.com/assets/app.js";

const PAGE: &str = r#"<html><head>
<script src="https://cdn.example-static.com/assets/app.js"></script>
</head><body>
<p>The transcript mentions https://cdn.example-static.com/assets/app.js in prose.</p>
<img src="page_fichiers/logo.png" alt="logo">
<script defer src="https://cdn.example-static.com/assets/app.js"></script>
</body></html>
"#;

#[derive(Default)]
struct StubFetcher {
  bodies: HashMap<String, Vec<u8>>,
  calls: Mutex<Vec<String>>,
}

impl StubFetcher {
  fn serving(url: &str, body: &[u8]) -> Self {
    let mut bodies = HashMap::new();
    bodies.insert(url.to_string(), body.to_vec());
    Self {
      bodies,
      calls: Mutex::new(Vec::new()),
    }
  }

  fn calls(&self) -> Vec<String> {
    self.calls.lock().unwrap().clone()
  }
}

impl Fetcher for StubFetcher {
  fn fetch(&self, url: &str) -> MirrorResult<Vec<u8>> {
    self.calls.lock().unwrap().push(url.to_string());
    self.bodies.get(url).cloned().ok_or_else(|| MirrorError::FetchFailure {
      url: url.to_string(),
      reason: "HTTP 404 Not Found".into(),
    })
  }
}

struct Fixture {
  _temp: tempfile::TempDir,
  base: PathBuf,
  page: PathBuf,
}

fn fixture() -> Result<Fixture> {
  let temp = tempdir()?;
  let base = temp.path().join("mirror");
  fs::create_dir_all(&base)?;
  fs::write(
    base.join("mirror.config.json"),
    r#"{ "cdn_host": "cdn.example-static.com" }"#,
  )?;

  let saved = temp.path().join("saved");
  fs::create_dir_all(saved.join("page_fichiers"))?;
  fs::write(saved.join("page_fichiers/logo.png"), b"\x89PNG logo")?;
  let page = saved.join("page.html");
  fs::write(&page, PAGE)?;

  Ok(Fixture {
    _temp: temp,
    base,
    page,
  })
}

/// Every stored file below `dir` except the provenance logs.
fn snapshot(dir: &Path) -> Result<BTreeMap<PathBuf, Vec<u8>>> {
  let mut files = BTreeMap::new();
  let mut pending = vec![dir.to_path_buf()];
  while let Some(current) = pending.pop() {
    for entry in fs::read_dir(&current)? {
      let path = entry?.path();
      if path.is_dir() {
        if path.file_name().is_some_and(|name| name != "logs") {
          pending.push(path);
        }
      } else {
        let relative = path.strip_prefix(dir)?.to_path_buf();
        files.insert(relative, fs::read(&path)?);
      }
    }
  }
  Ok(files)
}

#[test]
fn cdn_and_sibling_assets_are_mirrored_once() -> Result<()> {
  let fixture = fixture()?;
  let config = MirrorConfig::discover(&fixture.base);
  let options = RunOptions::default();
  let fetcher = StubFetcher::serving(APP_URL, b"console.log('app')");

  let report = MirrorPipeline::new(&config, &options, &fixture.base)
    .with_fetcher(&fetcher)
    .run(&DocumentInput::from_path(&fixture.page)?)?;

  assert_eq!(fetcher.calls(), vec![APP_URL.to_string()]);
  assert_eq!(
    fs::read(fixture.base.join("cdn-assets/assets/app.js"))?,
    b"console.log('app')"
  );
  assert_eq!(fs::read(fixture.base.join("external-assets/logo.png"))?, b"\x89PNG logo");

  let outcomes: Vec<ResolutionOutcome> = report.records.iter().map(|record| record.outcome).collect();
  assert_eq!(outcomes, vec![
    ResolutionOutcome::FetchedRemote,
    ResolutionOutcome::CopiedFromSource,
    ResolutionOutcome::FetchedRemote,
  ]);

  assert_eq!(report.document.matches(r#"src="../cdn-assets/assets/app.js""#).count(), 2);
  assert!(report.document.contains(r#"<img src="../external-assets/logo.png" alt="logo">"#));
  assert!(report.document.contains("mentions https://cdn.example-static.com/assets/app.js in prose"));

  let output = fixture.base.join("documents/page.html");
  assert_eq!(report.output, DocumentOutput::Written(output.clone()));
  assert_eq!(fs::read_to_string(&output)?, report.document);

  let log_path = report.log_path.expect("provenance log should be written");
  let logged = read_records(&log_path)?;
  assert_eq!(logged.len(), 3);
  assert_eq!(logged[1].raw_url, "page_fichiers/logo.png");
  assert_eq!(logged[1].media_type, "image/png");
  assert_eq!(logged[2].line, 6);
  assert_eq!(logged[0].final_path, logged[2].final_path);
  Ok(())
}

#[test]
fn rerunning_changes_nothing() -> Result<()> {
  let fixture = fixture()?;
  let config = MirrorConfig::discover(&fixture.base);
  let options = RunOptions::default();
  let fetcher = StubFetcher::serving(APP_URL, b"console.log('app')");
  let pipeline = MirrorPipeline::new(&config, &options, &fixture.base).with_fetcher(&fetcher);
  let document = DocumentInput::from_path(&fixture.page)?;

  let first = pipeline.run(&document)?;
  let stored = snapshot(&fixture.base)?;
  let second = pipeline.run(&document)?;

  assert_eq!(snapshot(&fixture.base)?, stored);
  assert_eq!(second.document, first.document);
  assert!(matches!(second.output, DocumentOutput::Unchanged(_)));
  assert_eq!(second.summary.count(ResolutionOutcome::Renamed), 0);
  assert_eq!(second.summary.count(ResolutionOutcome::CachedIdentical), 3);

  let first_paths: Vec<_> = first.records.iter().map(|record| record.final_path.clone()).collect();
  let second_paths: Vec<_> = second.records.iter().map(|record| record.final_path.clone()).collect();
  assert_eq!(first_paths, second_paths);
  assert_ne!(first.log_path, second.log_path);
  Ok(())
}

#[test]
fn changed_remote_content_never_overwrites_the_store() -> Result<()> {
  let fixture = fixture()?;
  let config = MirrorConfig::discover(&fixture.base);
  let options = RunOptions {
    output_to_stdout: true,
    write_log: false,
    ..RunOptions::default()
  };
  let document = DocumentInput::from_text(
    "chat.html",
    format!(r#"<script src="{APP_URL}"></script>"#),
  );

  let old = StubFetcher::serving(APP_URL, b"v1");
  let first = MirrorPipeline::new(&config, &options, &fixture.base)
    .with_fetcher(&old)
    .run(&document)?;
  let new = StubFetcher::serving(APP_URL, b"v2");
  let second = MirrorPipeline::new(&config, &options, &fixture.base)
    .with_fetcher(&new)
    .run(&document)?;

  assert_eq!(first.records[0].outcome, ResolutionOutcome::FetchedRemote);
  assert_eq!(second.records[0].outcome, ResolutionOutcome::Renamed);
  assert_ne!(first.records[0].final_path, second.records[0].final_path);
  assert_eq!(fs::read(fixture.base.join("cdn-assets/assets/app.js"))?, b"v1");
  assert_eq!(fs::read(fixture.base.join("cdn-assets/assets/app-1.js"))?, b"v2");
  assert!(second.document.contains("../cdn-assets/assets/app-1.js"));
  Ok(())
}

#[test]
fn resolved_urls_leave_no_attribute_behind() -> Result<()> {
  let fixture = fixture()?;
  let config = MirrorConfig::discover(&fixture.base);
  let options = RunOptions {
    write_log: false,
    ..RunOptions::default()
  };
  let fetcher = StubFetcher::serving(APP_URL, b"app");

  let report = MirrorPipeline::new(&config, &options, &fixture.base)
    .with_fetcher(&fetcher)
    .run(&DocumentInput::from_path(&fixture.page)?)?;

  for record in &report.records {
    assert_ne!(record.outcome, ResolutionOutcome::NotFound);
    let final_path = record.final_path.as_deref().expect("resolved records carry a path");
    assert!(report.document.contains(final_path));
    assert!(!report.document.contains(&format!("src=\"{}\"", record.raw_url)));
  }
  Ok(())
}

#[test]
fn offline_runs_report_unreachable_assets() -> Result<()> {
  let fixture = fixture()?;
  let config = MirrorConfig::discover(&fixture.base);
  let options = RunOptions {
    allow_fetch: false,
    output_to_stdout: true,
    ..RunOptions::default()
  };
  let fetcher = StubFetcher::default();

  let report = MirrorPipeline::new(&config, &options, &fixture.base)
    .with_fetcher(&fetcher)
    .run(&DocumentInput::from_path(&fixture.page)?)?;

  assert!(fetcher.calls().is_empty());
  assert_eq!(report.summary.count(ResolutionOutcome::NotFound), 2);
  assert_eq!(report.summary.count(ResolutionOutcome::CopiedFromSource), 1);
  assert_eq!(report.document.matches(r#"src="https://cdn.example-static.com/assets/app.js""#).count(), 2);

  let logged = read_records(report.log_path.as_deref().expect("log enabled"))?;
  assert!(logged.iter().filter(|record| record.outcome == ResolutionOutcome::NotFound).all(|record| {
    record.detail.as_deref().is_some_and(|detail| detail.starts_with("unavailable"))
  }));
  Ok(())
}
