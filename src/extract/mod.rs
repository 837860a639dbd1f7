//! Reference extraction: every asset location a document names, with enough context to
//! rewrite it in place.
//!
//! Scanning is a pure function of the document text. [`ReferenceScanner::references`]
//! can be called any number of times and always yields the same sequence, ordered by
//! position in the document.

mod inline;
mod markup;

use std::iter::Peekable;
use std::ops::Range;

use regex::Regex;

use crate::models::{ExtractedReference, ReferenceLocator};
use markup::Hit;
pub(crate) use markup::{attribute_value, inside_any, markup_comments, opaque_regions, start_tags};

/// Scanner over one document.
pub struct ReferenceScanner<'a> {
  text: &'a str,
  opaque: Vec<Range<usize>>,
  script_bodies: Vec<Range<usize>>,
  cdn_literal: Regex,
  line_starts: Vec<usize>,
}

impl<'a> ReferenceScanner<'a> {
  /// Prepare a scanner for `text`; inline script literals are matched against `cdn_host`.
  pub fn new(text: &'a str, cdn_host: &str) -> Self {
    let line_starts = std::iter::once(0)
      .chain(text.match_indices('\n').map(|(index, _)| index + 1))
      .collect();

    Self {
      text,
      opaque: markup::opaque_regions(text),
      script_bodies: markup::inline_script_bodies(text),
      cdn_literal: inline::cdn_literal_pattern(cdn_host),
      line_starts,
    }
  }

  /// Lazily yield every reference in document order.
  pub fn references(&self) -> impl Iterator<Item = ExtractedReference> + '_ {
    let tags = markup::scan_tags(self.text, &self.opaque);
    let literals = inline::scan_inline_scripts(self.text, &self.script_bodies, &self.cdn_literal);

    let mut current_line = 0;
    let mut on_line = 0;
    MergeByStart::new(tags, literals.into_iter()).map(move |hit| {
      let line = self.line_of(hit.span.start);
      if line == current_line {
        on_line += 1;
      } else {
        current_line = line;
        on_line = 1;
      }

      ExtractedReference {
        raw_url: self.text[hit.span.clone()].to_string(),
        locator: ReferenceLocator {
          element: hit.element,
          attribute: hit.attribute,
          span: hit.span,
          line,
          occurrence: on_line,
        },
      }
    })
  }

  fn line_of(&self, offset: usize) -> usize {
    self.line_starts.partition_point(|start| *start <= offset)
  }
}

/// Merge two position-ordered hit streams into one.
struct MergeByStart<A: Iterator<Item = Hit>, B: Iterator<Item = Hit>> {
  left: Peekable<A>,
  right: Peekable<B>,
}

impl<A: Iterator<Item = Hit>, B: Iterator<Item = Hit>> MergeByStart<A, B> {
  fn new(left: A, right: B) -> Self {
    Self {
      left: left.peekable(),
      right: right.peekable(),
    }
  }
}

impl<A: Iterator<Item = Hit>, B: Iterator<Item = Hit>> Iterator for MergeByStart<A, B> {
  type Item = Hit;

  fn next(&mut self) -> Option<Hit> {
    let take_right = match (self.left.peek(), self.right.peek()) {
      (Some(left), Some(right)) => right.span.start < left.span.start,
      (Some(_), None) => false,
      (None, _) => true,
    };
    if take_right {
      self.right.next()
    } else {
      self.left.next()
    }
  }
}
