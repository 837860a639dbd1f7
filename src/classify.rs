//! Origin classification by host and sibling-directory matching.

use percent_encoding::percent_decode_str;
use url::Url;

use crate::config::MirrorConfig;
use crate::models::{AssetReference, ExtractedReference, OriginKind};

/// Pure classifier bound to one document's export directory name.
#[derive(Debug, Clone)]
pub struct OriginClassifier {
  cdn_host: String,
  persistent_host: String,
  export_dir_name: String,
}

impl OriginClassifier {
  /// Build a classifier for the document called `document_name`.
  pub fn new(config: &MirrorConfig, document_name: &str) -> Self {
    Self {
      cdn_host: config.cdn_host.to_ascii_lowercase(),
      persistent_host: config.persistent_host.to_ascii_lowercase(),
      export_dir_name: config.export_dir_name(document_name),
    }
  }

  /// Name of the sibling export directory this classifier matches.
  pub fn export_dir_name(&self) -> &str {
    &self.export_dir_name
  }

  /// Classify a raw reference. Host rules win over the sibling-directory rule.
  pub fn classify(&self, raw_url: &str) -> OriginKind {
    match parse_absolute(raw_url) {
      Some(url) => {
        let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
        if host == self.cdn_host {
          OriginKind::Cdn
        } else if host == self.persistent_host {
          OriginKind::Persistent
        } else {
          OriginKind::Unknown
        }
      }
      None if self.is_sibling_export(raw_url) => OriginKind::LocalExport,
      None => OriginKind::Unknown,
    }
  }

  /// Attach the classified origin to an extracted reference.
  pub fn classify_reference(&self, reference: ExtractedReference) -> AssetReference {
    AssetReference {
      origin: self.classify(&reference.raw_url),
      raw_url: reference.raw_url,
      locator: reference.locator,
    }
  }

  fn is_sibling_export(&self, raw_url: &str) -> bool {
    let path = strip_query(raw_url.trim());
    let path = path.trim_start_matches("./");
    let Some(first) = path.split('/').next() else {
      return false;
    };
    let decoded = percent_decode_str(first).decode_utf8_lossy();
    decoded == self.export_dir_name
  }
}

/// Parse `raw_url` as an absolute `http(s)` URL, upgrading protocol-relative values.
pub fn parse_absolute(raw_url: &str) -> Option<Url> {
  let trimmed = raw_url.trim().replace("&amp;", "&");
  let candidate = if trimmed.starts_with("//") {
    format!("https:{trimmed}")
  } else {
    trimmed
  };
  let url = Url::parse(&candidate).ok()?;
  matches!(url.scheme(), "http" | "https").then_some(url)
}

/// Drop the query string and fragment of a relative reference.
pub fn strip_query(raw_url: &str) -> &str {
  let end = raw_url.find(['?', '#']).unwrap_or(raw_url.len());
  &raw_url[..end]
}
