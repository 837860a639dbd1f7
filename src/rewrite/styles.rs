//! Replace mirrored stylesheet links with inline `<style>` elements.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use tracing::warn;

use crate::extract::{attribute_value, inside_any, opaque_regions};

/// Outcome of an inlining pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct StylesheetInlining {
  /// Rewritten document text.
  pub text: String,
  /// Number of links replaced.
  pub inlined: usize,
}

fn link_pattern() -> &'static Regex {
  static PATTERN: OnceLock<Regex> = OnceLock::new();
  PATTERN.get_or_init(|| {
    Regex::new(r#"(?i)<link\b(?:[^>"']|"[^"]*"|'[^']*')*>"#).expect("invalid link regex")
  })
}

/// Inline every `<link rel="stylesheet">` whose `href` is a key of `stylesheets`.
///
/// Keys are `href` values as they appear in `text` after rewriting; values are the
/// stored files holding the CSS. Unreadable files leave their link in place.
pub fn inline_stylesheets(text: &str, stylesheets: &HashMap<String, PathBuf>) -> StylesheetInlining {
  let opaque = opaque_regions(text);
  let mut output = String::with_capacity(text.len());
  let mut cursor = 0;
  let mut inlined = 0;

  for found in link_pattern().find_iter(text) {
    if inside_any(&opaque, found.start()) {
      continue;
    }
    let tag = found.as_str();
    let is_stylesheet = attribute_value(tag, "rel").is_some_and(|rel| {
      rel
        .split_whitespace()
        .any(|token| token.eq_ignore_ascii_case("stylesheet"))
    });
    if !is_stylesheet {
      continue;
    }
    let Some(href) = attribute_value(tag, "href").map(str::trim) else {
      continue;
    };
    let Some(path) = stylesheets.get(href) else {
      continue;
    };

    let css = match fs::read_to_string(path) {
      Ok(css) => css,
      Err(err) => {
        warn!("keeping link to {}: failed to read {}: {}", href, path.display(), err);
        continue;
      }
    };

    let media = attribute_value(tag, "media")
      .map(|media| format!(" media=\"{}\"", media.trim().replace('"', "&quot;")))
      .unwrap_or_default();
    output.push_str(&text[cursor..found.start()]);
    output.push_str(&format!("<style{media}>\n{}\n</style>", css.replace("</style", "<\\/style")));
    cursor = found.end();
    inlined += 1;
  }
  output.push_str(&text[cursor..]);

  StylesheetInlining {
    text: output,
    inlined,
  }
}
