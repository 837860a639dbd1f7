//! String literals inside inline scripts that name CDN assets.
//!
//! Exported transcripts bootstrap through module scripts such as
//! `import "https://cdn.oaistatic.com/assets/app.js"` or dynamic `import(...)` calls.
//! Only complete quoted literals are reported so prose mentioning the host is left alone.

use std::ops::Range;

use regex::Regex;

use crate::extract::markup::Hit;

const QUOTES: &[u8] = b"\"'`";

/// Build the literal matcher for `cdn_host`.
pub(crate) fn cdn_literal_pattern(cdn_host: &str) -> Regex {
    Regex::new(&format!(
        r#"(?i)(?:https?:)?//{}/[^"'`\s\\<>()]+"#,
        regex::escape(cdn_host)
    ))
    .expect("invalid CDN literal regex")
}

/// Report every quoted CDN URL literal inside the given script bodies.
pub(crate) fn scan_inline_scripts(
    text: &str,
    bodies: &[Range<usize>],
    pattern: &Regex,
) -> Vec<Hit> {
    let bytes = text.as_bytes();
    let mut hits = Vec::new();

    for body in bodies {
        for found in pattern.find_iter(&text[body.clone()]) {
            let start = body.start + found.start();
            let end = body.start + found.end();
            if start == 0 || end >= bytes.len() {
                continue;
            }
            let open = bytes[start - 1];
            if QUOTES.contains(&open) && bytes[end] == open {
                hits.push(Hit {
                    element: "script".into(),
                    attribute: None,
                    span: start..end,
                });
            }
        }
    }

    hits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::markup::inline_script_bodies;

    fn literals(text: &str) -> Vec<&str> {
        let bodies = inline_script_bodies(text);
        let pattern = cdn_literal_pattern("cdn.oaistatic.com");
        scan_inline_scripts(text, &bodies, &pattern)
            .into_iter()
            .map(|hit| &text[hit.span])
            .collect()
    }

    #[test]
    fn finds_static_and_dynamic_imports() {
        let text = r#"<script type="module">
import "https://cdn.oaistatic.com/assets/manifest-1.js";
const m = import('https://cdn.oaistatic.com/assets/chunk-2.js');
</script>"#;
        assert_eq!(literals(text), vec![
            "https://cdn.oaistatic.com/assets/manifest-1.js",
            "https://cdn.oaistatic.com/assets/chunk-2.js",
        ]);
    }

    #[test]
    fn ignores_unquoted_mentions_and_other_hosts() {
        let text = r#"<script>
// see https://cdn.oaistatic.com/assets/readme.js for details
load("https://example.com/assets/x.js");
</script>"#;
        assert!(literals(text).is_empty());
    }

    #[test]
    fn ignores_literals_outside_script_bodies() {
        let text = r#"<p>"https://cdn.oaistatic.com/assets/app.js"</p>"#;
        assert!(literals(text).is_empty());
    }

    #[test]
    fn accepts_protocol_relative_literals() {
        let text = "<script>const u = `//cdn.oaistatic.com/assets/font.woff2`;</script>";
        assert_eq!(literals(text), vec!["//cdn.oaistatic.com/assets/font.woff2"]);
    }
}
