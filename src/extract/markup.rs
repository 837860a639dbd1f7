//! Tag and attribute scanning over raw document text.

use std::ops::Range;
use std::sync::OnceLock;

use regex::Regex;

use crate::asset_paths::should_ignore_asset_reference;

/// A raw value found in an asset-bearing context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Hit {
    pub element: String,
    pub attribute: Option<String>,
    pub span: Range<usize>,
}

/// Link relations whose `href` names a file the page needs to render.
const ASSET_LINK_RELS: &[&str] = &[
    "stylesheet",
    "icon",
    "mask-icon",
    "apple-touch-icon",
    "preload",
    "modulepreload",
    "prefetch",
    "manifest",
];

fn tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r#"(?i)<(script|link|img|source|video|audio|track|embed|input)\b((?:[^>"']|"[^"]*"|'[^']*')*)>"#,
        )
        .expect("invalid tag regex")
    })
}

fn any_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)<([a-z][a-z0-9-]*)\b((?:[^>"']|"[^"]*"|'[^']*')*)>"#)
            .expect("invalid start tag regex")
    })
}

fn attribute_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)([a-z_:][-a-z0-9_:.]*)\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s"'=<>`]+))"#)
            .expect("invalid attribute regex")
    })
}

fn comment_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("invalid comment regex"))
}

fn raw_text_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            ["script", "style", "textarea"]
                .iter()
                .map(|name| {
                    Regex::new(&format!(
                        r#"(?is)<{name}\b(?:[^>"']|"[^"]*"|'[^']*')*>(.*?)</{name}\s*>"#
                    ))
                    .expect("invalid raw text element regex")
                })
                .collect()
        })
        .as_slice()
}

fn comment_ranges(text: &str) -> Vec<Range<usize>> {
    comment_pattern()
        .find_iter(text)
        .map(|found| found.range())
        .collect()
}

/// Bodies of script, style and textarea elements that do not open inside a comment.
fn raw_text_bodies(text: &str, comments: &[Range<usize>]) -> Vec<Range<usize>> {
    let mut bodies = Vec::new();
    for pattern in raw_text_patterns() {
        for caps in pattern.captures_iter(text) {
            let (Some(whole), Some(body)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if !body.is_empty() && !inside_any(comments, whole.start()) {
                bodies.push(body.range());
            }
        }
    }
    bodies.sort_by_key(|body| body.start);
    bodies
}

/// Byte ranges whose content is never markup: comments and raw text element bodies.
///
/// The result is sorted and non-overlapping.
pub(crate) fn opaque_regions(text: &str) -> Vec<Range<usize>> {
    let comments = comment_ranges(text);
    let mut regions = raw_text_bodies(text, &comments);
    regions.extend(comments);
    merge_regions(regions)
}

/// Comments that are real markup, not `<!--` text inside a script or style body.
pub(crate) fn markup_comments(text: &str) -> Vec<Range<usize>> {
    let comments = comment_ranges(text);
    let bodies = raw_text_bodies(text, &comments);
    comments
        .into_iter()
        .filter(|comment| !inside_any(&bodies, comment.start))
        .collect()
}

fn merge_regions(mut regions: Vec<Range<usize>>) -> Vec<Range<usize>> {
    regions.sort_by_key(|region| region.start);
    let mut merged: Vec<Range<usize>> = Vec::with_capacity(regions.len());
    for region in regions {
        match merged.last_mut() {
            Some(last) if region.start <= last.end => last.end = last.end.max(region.end),
            _ => merged.push(region),
        }
    }
    merged
}

/// Bodies of `<script>` elements without a `src` attribute, outside comments.
pub(crate) fn inline_script_bodies(text: &str) -> Vec<Range<usize>> {
    let Some(pattern) = raw_text_patterns().first() else {
        return Vec::new();
    };
    let comments = comment_ranges(text);

    pattern
        .captures_iter(text)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let body = caps.get(1)?;
            if body.is_empty() || inside_any(&comments, whole.start()) {
                return None;
            }
            let opening = &text[whole.start()..body.start()];
            let has_src = attributes(opening, 0).iter().any(|(name, _)| name == "src");
            (!has_src).then(|| body.range())
        })
        .collect()
}

pub(crate) fn inside_any(regions: &[Range<usize>], offset: usize) -> bool {
    let index = regions.partition_point(|region| region.start <= offset);
    regions[..index].iter().any(|region| region.contains(&offset))
}

/// Complement of `opaque` within `0..len`.
fn markup_gaps(len: usize, opaque: &[Range<usize>]) -> Vec<Range<usize>> {
    let mut gaps = Vec::with_capacity(opaque.len() + 1);
    let mut cursor = 0;
    for region in opaque {
        if region.start > cursor {
            gaps.push(cursor..region.start);
        }
        cursor = cursor.max(region.end);
    }
    if cursor < len {
        gaps.push(cursor..len);
    }
    gaps
}

/// Scan every asset-bearing tag outside opaque regions, in document order.
pub(crate) fn scan_tags<'t>(
    text: &'t str,
    opaque: &[Range<usize>],
) -> impl Iterator<Item = Hit> + 't {
    markup_gaps(text.len(), opaque)
        .into_iter()
        .flat_map(move |gap| {
            let offset = gap.start;
            tag_pattern()
                .captures_iter(&text[gap])
                .flat_map(move |caps| {
                    let element = caps
                        .get(1)
                        .map(|m| m.as_str().to_ascii_lowercase())
                        .unwrap_or_default();
                    match caps.get(2) {
                        Some(attrs) => tag_hits(&element, attrs.as_str(), offset + attrs.start()),
                        None => Vec::new(),
                    }
                })
        })
}

/// An attribute with a value, in document coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Attribute {
    /// Lowercased name.
    pub name: String,
    /// The whole `name="value"` text, quotes included.
    pub span: Range<usize>,
    /// The value without quotes.
    pub value: Range<usize>,
}

/// A start tag outside opaque regions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct StartTag {
    pub name: String,
    pub span: Range<usize>,
    pub attributes: Vec<Attribute>,
}

fn parse_attributes(attrs: &str, offset: usize) -> Vec<Attribute> {
    attribute_pattern()
        .captures_iter(attrs)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let name = caps.get(1)?.as_str().to_ascii_lowercase();
            let value = caps.get(2).or_else(|| caps.get(3)).or_else(|| caps.get(4))?;
            Some(Attribute {
                name,
                span: (offset + whole.start())..(offset + whole.end()),
                value: (offset + value.start())..(offset + value.end()),
            })
        })
        .collect()
}

/// Parsed attributes as `(lowercased name, value span)` in document coordinates.
fn attributes(attrs: &str, offset: usize) -> Vec<(String, Range<usize>)> {
    parse_attributes(attrs, offset)
        .into_iter()
        .map(|attribute| (attribute.name, attribute.value))
        .collect()
}

/// Value of the first attribute called `name` (lowercase) in a single tag.
pub(crate) fn attribute_value<'t>(tag: &'t str, name: &str) -> Option<&'t str> {
    parse_attributes(tag, 0)
        .into_iter()
        .find(|attribute| attribute.name == name)
        .map(|attribute| &tag[attribute.value])
}

/// Every start tag outside `opaque`, in document order.
pub(crate) fn start_tags(text: &str, opaque: &[Range<usize>]) -> Vec<StartTag> {
    let mut tags = Vec::new();
    for gap in markup_gaps(text.len(), opaque) {
        let offset = gap.start;
        for caps in any_tag_pattern().captures_iter(&text[gap]) {
            let (Some(whole), Some(name), Some(attrs)) = (caps.get(0), caps.get(1), caps.get(2)) else {
                continue;
            };
            tags.push(StartTag {
                name: name.as_str().to_ascii_lowercase(),
                span: (offset + whole.start())..(offset + whole.end()),
                attributes: parse_attributes(attrs.as_str(), offset + attrs.start()),
            });
        }
    }
    tags
}

fn tag_hits(element: &str, attrs: &str, offset: usize) -> Vec<Hit> {
    let parsed = attributes(attrs, offset);
    let value_of = |name: &str| {
        parsed
            .iter()
            .find(|(attr, _)| attr == name)
            .map(|(_, span)| &attrs[(span.start - offset)..(span.end - offset)])
    };

    let scanned: &[&str] = match element {
        "img" | "source" => &["src", "srcset"],
        "script" | "audio" | "track" | "embed" => &["src"],
        "video" => &["src", "poster"],
        "input" => {
            if value_of("type").is_some_and(|kind| kind.eq_ignore_ascii_case("image")) {
                &["src"]
            } else {
                &[]
            }
        }
        "link" => {
            let rel = value_of("rel").unwrap_or_default().to_ascii_lowercase();
            if rel.split_whitespace().any(|token| ASSET_LINK_RELS.contains(&token)) {
                &["href"]
            } else {
                &[]
            }
        }
        _ => &[],
    };

    let mut hits = Vec::new();
    for (name, span) in &parsed {
        if !scanned.contains(&name.as_str()) || span.is_empty() {
            continue;
        }
        let value = &attrs[(span.start - offset)..(span.end - offset)];
        if name == "srcset" {
            for candidate in srcset_candidates(value) {
                let absolute = (span.start + candidate.start)..(span.start + candidate.end);
                push_hit(&mut hits, element, name, absolute, &value[candidate]);
            }
        } else {
            push_hit(&mut hits, element, name, span.clone(), value);
        }
    }
    hits
}

fn push_hit(hits: &mut Vec<Hit>, element: &str, attribute: &str, span: Range<usize>, value: &str) {
    // Surrounding whitespace is legal in attribute values but not part of the URL.
    let leading = value.len() - value.trim_start().len();
    let trimmed = value.trim();
    if should_ignore_asset_reference(trimmed) {
        return;
    }
    let start = span.start + leading;
    hits.push(Hit {
        element: element.to_string(),
        attribute: Some(attribute.to_string()),
        span: start..(start + trimmed.len()),
    });
}

/// Split a `srcset` value into URL spans relative to the value start.
fn srcset_candidates(value: &str) -> Vec<Range<usize>> {
    let bytes = value.as_bytes();
    let mut spans = Vec::new();
    let mut index = 0;

    while index < bytes.len() {
        while index < bytes.len() && (bytes[index].is_ascii_whitespace() || bytes[index] == b',') {
            index += 1;
        }
        let start = index;
        while index < bytes.len() && !bytes[index].is_ascii_whitespace() {
            index += 1;
        }
        let mut end = index;
        while end > start && bytes[end - 1] == b',' {
            end -= 1;
        }
        if end > start {
            spans.push(start..end);
        }
        // Skip the descriptor up to the next candidate separator.
        if end == index {
            while index < bytes.len() && bytes[index] != b',' {
                index += 1;
            }
        }
    }

    spans
}
