use serde::Deserialize;

/// Filename used when a URL path ends in a directory.
pub const INDEX_FILENAME: &str = "index";

/// Strategy turning decoded URL path segments into store filenames.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilenameNormalization {
    /// Keep segments as written, only replacing characters no filesystem accepts.
    #[default]
    Preserve,
    /// Fold accented Latin letters to ASCII and replace anything outside `[A-Za-z0-9._-]`.
    Transliterate,
}

impl FilenameNormalization {
    /// Normalise one decoded path segment. Empty and dot segments are dropped.
    pub fn normalize_segment(self, segment: &str) -> Option<String> {
        let trimmed = segment.trim();
        if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
            return None;
        }

        let normalised = match self {
            Self::Preserve => trimmed
                .chars()
                .map(|c| if is_reserved(c) { '_' } else { c })
                .collect::<String>(),
            Self::Transliterate => {
                let mut out = String::with_capacity(trimmed.len());
                for c in trimmed.chars() {
                    let folded = fold_latin(c).unwrap_or(c);
                    let mapped = if folded.is_ascii_alphanumeric() || matches!(folded, '.' | '-' | '_') {
                        folded
                    } else {
                        '_'
                    };
                    if mapped == '_' && out.ends_with('_') {
                        continue;
                    }
                    out.push(mapped);
                }
                out
            }
        };

        Some(normalised)
    }

    /// Normalise a sequence of decoded segments into a `/`-separated relative filename.
    ///
    /// A trailing empty segment (directory URL) or an empty path maps to [`INDEX_FILENAME`].
    pub fn normalize_path<'a>(self, segments: impl IntoIterator<Item = &'a str>) -> String {
        let mut parts = Vec::new();
        let mut ends_with_directory = true;
        for segment in segments {
            ends_with_directory = segment.trim().is_empty();
            if let Some(part) = self.normalize_segment(segment) {
                parts.push(part);
            }
        }

        if ends_with_directory || parts.is_empty() {
            parts.push(INDEX_FILENAME.to_string());
        }
        parts.join("/")
    }
}

fn is_reserved(c: char) -> bool {
    c.is_control() || matches!(c, '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}

fn fold_latin(c: char) -> Option<char> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'À' | 'Á' | 'Â' | 'Ã' | 'Ä' | 'Å' => 'A',
        'ç' => 'c',
        'Ç' => 'C',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'È' | 'É' | 'Ê' | 'Ë' => 'E',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'Ì' | 'Í' | 'Î' | 'Ï' => 'I',
        'ñ' => 'n',
        'Ñ' => 'N',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' => 'o',
        'Ò' | 'Ó' | 'Ô' | 'Õ' | 'Ö' | 'Ø' => 'O',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'Ù' | 'Ú' | 'Û' | 'Ü' => 'U',
        'ý' | 'ÿ' => 'y',
        'Ý' => 'Y',
        _ => return None,
    };
    Some(folded)
}

/// Scheme deriving alternate store names when content under a name differs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictNaming {
    separator: String,
}

impl ConflictNaming {
    /// Create a scheme inserting `separator` and a counter before the extension.
    pub fn new(separator: &str) -> Self {
        Self {
            separator: separator.to_string(),
        }
    }

    /// Name of conflict slot `counter` for `filename`, e.g. `assets/app-2.js`.
    pub fn slot(&self, filename: &str, counter: usize) -> String {
        let (dir, name) = match filename.rsplit_once('/') {
            Some((dir, name)) => (Some(dir), name),
            None => (None, filename),
        };
        let (stem, ext) = split_extension(name);
        let renamed = match ext {
            Some(ext) => format!("{stem}{}{counter}.{ext}", self.separator),
            None => format!("{stem}{}{counter}", self.separator),
        };
        match dir {
            Some(dir) => format!("{dir}/{renamed}"),
            None => renamed,
        }
    }
}

impl Default for ConflictNaming {
    fn default() -> Self {
        Self::new("-")
    }
}

/// Split `name` at its last dot. Leading dots belong to the stem.
pub fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(index) if index > 0 && index + 1 < name.len() => (&name[..index], Some(&name[index + 1..])),
        _ => (name, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preserve_keeps_unicode_but_replaces_reserved_characters() {
        let policy = FilenameNormalization::Preserve;
        assert_eq!(policy.normalize_segment("résumé v2.png").as_deref(), Some("résumé v2.png"));
        assert_eq!(policy.normalize_segment("a:b?.js").as_deref(), Some("a_b_.js"));
        assert_eq!(policy.normalize_segment(".."), None);
    }

    #[test]
    fn transliterate_folds_accents_and_collapses_separators() {
        let policy = FilenameNormalization::Transliterate;
        assert_eq!(policy.normalize_segment("Été  à Paris.png").as_deref(), Some("Ete_a_Paris.png"));
        assert_eq!(policy.normalize_segment("图像.svg").as_deref(), Some("_.svg"));
    }

    #[test]
    fn directory_urls_map_to_index() {
        let policy = FilenameNormalization::Preserve;
        assert_eq!(policy.normalize_path(["assets", ""]), "assets/index");
        assert_eq!(policy.normalize_path(Vec::<&str>::new()), "index");
        assert_eq!(policy.normalize_path(["assets", "..", "app.js"]), "assets/app.js");
    }

    #[test]
    fn conflict_slots_insert_counter_before_extension() {
        let naming = ConflictNaming::default();
        assert_eq!(naming.slot("app.js", 1), "app-1.js");
        assert_eq!(naming.slot("assets/vendor.min.css", 3), "assets/vendor.min-3.css");
        assert_eq!(naming.slot("LICENSE", 2), "LICENSE-2");
        assert_eq!(naming.slot(".hidden", 1), ".hidden-1");
        assert_eq!(ConflictNaming::new("_").slot("a.png", 4), "a_4.png");
    }
}
