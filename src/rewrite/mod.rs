//! Document rewriting scoped to the spans the extractor recognised.
//!
//! Replacement never runs as a global substitution: a URL quoted in the prose of a
//! transcript (or inside a code sample) stays exactly as written even when the same
//! literal is rewritten in a `src` attribute a few lines below.

mod clean;
mod styles;

use std::collections::HashMap;

use crate::models::AssetReference;

pub use clean::{CleanLevel, Cleaning, clean_document};
pub use styles::{StylesheetInlining, inline_stylesheets};

/// Replace every reference whose raw URL has an entry in `replacements`.
///
/// References without an entry keep their original text, and every byte outside the
/// replaced spans is copied unchanged.
pub fn rewrite_document(
  text: &str,
  references: &[AssetReference],
  replacements: &HashMap<String, String>,
) -> String {
  let mut ordered: Vec<&AssetReference> = references.iter().collect();
  ordered.sort_by_key(|reference| reference.locator.span.start);

  let mut output = String::with_capacity(text.len());
  let mut cursor = 0;
  for reference in ordered {
    let span = &reference.locator.span;
    if span.start < cursor || span.end > text.len() {
      continue;
    }
    let Some(replacement) = replacements.get(&reference.raw_url) else {
      continue;
    };

    output.push_str(&text[cursor..span.start]);
    if reference.locator.attribute.is_some() {
      output.push_str(&replacement.replace('&', "&amp;"));
    } else {
      output.push_str(replacement);
    }
    cursor = span.end;
  }
  output.push_str(&text[cursor..]);

  output
}
