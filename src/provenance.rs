//! Append-only provenance log, one JSON object per line and one file per run.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use crate::models::ProvenanceRecord;

/// Log sink for a single run. A disabled log accepts and drops records.
pub struct ProvenanceLog {
  file: Option<(PathBuf, File)>,
}

impl ProvenanceLog {
  /// Create a fresh log file in `logs_dir` named after the document and start time.
  pub fn create(logs_dir: &Path, document_name: &str, started: DateTime<Utc>) -> Result<Self> {
    fs::create_dir_all(logs_dir)
      .with_context(|| format!("failed to create {}", logs_dir.display()))?;

    let stem = Path::new(document_name)
      .file_stem()
      .map(|stem| stem.to_string_lossy().into_owned())
      .filter(|stem| !stem.is_empty())
      .unwrap_or_else(|| "document".to_string());
    let stamp = started.format("%Y%m%dT%H%M%SZ");

    let mut counter = 0;
    loop {
      let name = if counter == 0 {
        format!("{stem}-{stamp}.jsonl")
      } else {
        format!("{stem}-{stamp}-{counter}.jsonl")
      };
      let path = logs_dir.join(name);
      match OpenOptions::new().append(true).create_new(true).open(&path) {
        Ok(file) => {
          return Ok(Self {
            file: Some((path, file)),
          });
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => counter += 1,
        Err(err) => {
          return Err(err).with_context(|| format!("failed to create {}", path.display()));
        }
      }
    }
  }

  /// A log that records nothing.
  pub fn disabled() -> Self {
    Self { file: None }
  }

  /// Location of the log file, if logging is enabled.
  pub fn path(&self) -> Option<&Path> {
    self.file.as_ref().map(|(path, _)| path.as_path())
  }

  /// Append one record and flush it to disk.
  pub fn append(&mut self, record: &ProvenanceRecord) -> Result<()> {
    let Some((path, file)) = self.file.as_mut() else {
      return Ok(());
    };
    let mut line = serde_json::to_string(record).context("failed to serialise provenance record")?;
    line.push('\n');
    file
      .write_all(line.as_bytes())
      .and_then(|_| file.flush())
      .with_context(|| format!("failed to append to {}", path.display()))
  }
}

/// Read back every record of a log file.
pub fn read_records(path: &Path) -> Result<Vec<ProvenanceRecord>> {
  let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
  let mut records = Vec::new();
  for (index, line) in BufReader::new(file).lines().enumerate() {
    let line = line.with_context(|| format!("failed to read {}", path.display()))?;
    if line.trim().is_empty() {
      continue;
    }
    let record = serde_json::from_str(&line)
      .with_context(|| format!("malformed record on line {} of {}", index + 1, path.display()))?;
    records.push(record);
  }
  Ok(records)
}

/// Guess the MIME type of an asset from its filename, falling back to the element.
pub fn guess_media_type(filename: &str, element: &str) -> String {
  if let Some(mime) = mime_guess::from_path(filename).first() {
    return mime.essence_str().to_string();
  }
  match element {
    "script" => "text/javascript",
    "video" => "video/*",
    "audio" => "audio/*",
    "img" | "source" | "input" => "image/*",
    _ => "application/octet-stream",
  }
  .to_string()
}
