//! Optional tidying of a transcript: comments, the generator tag and presentational
//! attributes.
//!
//! Elements are never removed apart from `<meta name="generator">`, so every script,
//! stylesheet and image the mirror rewrote stays in the document.

use std::ops::Range;

use crate::extract::{markup_comments, opaque_regions, start_tags};

/// How much a cleaning pass removes. Each level includes the ones before it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CleanLevel {
  /// Leave the document as rewritten.
  #[default]
  Off,
  /// Drop comments and the `<meta name="generator">` tag.
  Basic,
  /// Also drop `style` attributes.
  StripStyle,
  /// Also drop `data-*` attributes and `on*` event handlers.
  Aggressive,
}

impl CleanLevel {
  fn strips_attribute(self, name: &str) -> bool {
    match self {
      CleanLevel::Off | CleanLevel::Basic => false,
      CleanLevel::StripStyle => name == "style",
      CleanLevel::Aggressive => name == "style" || name.starts_with("data-") || name.starts_with("on"),
    }
  }
}

/// Outcome of a cleaning pass.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Cleaning {
  /// Cleaned document text.
  pub text: String,
  /// Comments, tags and attributes removed.
  pub removed: usize,
}

/// Remove what `level` asks for from `text`.
///
/// Only markup is touched: text inside `<script>`, `<style>` and `<textarea>` bodies is
/// copied unchanged, comment-like strings included.
pub fn clean_document(text: &str, level: CleanLevel) -> Cleaning {
  if level == CleanLevel::Off {
    return Cleaning {
      text: text.to_string(),
      removed: 0,
    };
  }

  let mut cuts = markup_comments(text);
  for tag in start_tags(text, &opaque_regions(text)) {
    let is_generator = tag.name == "meta"
      && tag.attributes.iter().any(|attribute| {
        attribute.name == "name" && text[attribute.value.clone()].trim().eq_ignore_ascii_case("generator")
      });
    if is_generator {
      cuts.push(tag.span);
      continue;
    }
    cuts.extend(
      tag
        .attributes
        .iter()
        .filter(|attribute| level.strips_attribute(&attribute.name))
        .map(|attribute| with_leading_space(text, attribute.span.clone())),
    );
  }
  cuts.sort_by_key(|cut| cut.start);

  let mut output = String::with_capacity(text.len());
  let mut cursor = 0;
  let mut removed = 0;
  for cut in cuts {
    if cut.start < cursor {
      continue;
    }
    output.push_str(&text[cursor..cut.start]);
    cursor = cut.end;
    removed += 1;
  }
  output.push_str(&text[cursor..]);

  Cleaning { text: output, removed }
}

/// Widen an attribute span over the whitespace separating it from the previous token.
fn with_leading_space(text: &str, span: Range<usize>) -> Range<usize> {
  text[..span.start].trim_end().len()..span.end
}

#[cfg(test)]
mod tests {
  use super::*;

  const PAGE: &str = concat!(
    "<head><meta name=\"generator\" content=\"SingleFile\"><!-- saved page -->\n",
    "<script src=\"../cdn-assets/app.js\" onload=\"boot()\"></script>\n",
    "<script>const marker = '<!-- keep -->';</script></head>\n",
    "<body><div class=\"message\" style=\"color: red\" data-testid=\"turn\">hi</div>\n",
    "<textarea><b style=\"x\">raw</b></textarea></body>",
  );

  #[test]
  fn off_returns_the_document_unchanged() {
    let cleaning = clean_document(PAGE, CleanLevel::Off);
    assert_eq!(cleaning.text, PAGE);
    assert_eq!(cleaning.removed, 0);
  }

  #[test]
  fn basic_drops_comments_and_generator_only() {
    let cleaning = clean_document(PAGE, CleanLevel::Basic);
    assert_eq!(cleaning.removed, 2);
    assert!(!cleaning.text.contains("generator"));
    assert!(!cleaning.text.contains("saved page"));
    assert!(cleaning.text.contains("'<!-- keep -->'"));
    assert!(cleaning.text.contains(r#"style="color: red""#));
    assert!(cleaning.text.contains(r#"onload="boot()""#));
  }

  #[test]
  fn strip_style_keeps_scripts_and_raw_text() {
    let cleaning = clean_document(PAGE, CleanLevel::StripStyle);
    assert!(cleaning.text.contains(r#"<div class="message" data-testid="turn">hi</div>"#));
    assert!(cleaning.text.contains(r#"<textarea><b style="x">raw</b></textarea>"#));
    assert!(cleaning.text.contains(r#"<script src="../cdn-assets/app.js" onload="boot()"></script>"#));
  }

  #[test]
  fn aggressive_drops_data_and_handler_attributes() {
    let cleaning = clean_document(PAGE, CleanLevel::Aggressive);
    assert!(cleaning.text.contains(r#"<div class="message">hi</div>"#));
    assert!(cleaning.text.contains(r#"<script src="../cdn-assets/app.js"></script>"#));
    assert_eq!(cleaning.removed, 5);
  }
}
