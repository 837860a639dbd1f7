use regex::Regex;

fn asset_reference_ignores() -> &'static [Regex] {
    use std::sync::OnceLock;

    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            vec![
                Regex::new(r"(?i)^data:").expect("invalid data URI regex"),
                Regex::new(r"(?i)^blob:").expect("invalid blob URI regex"),
                Regex::new(r"(?i)^javascript:").expect("invalid javascript URI regex"),
                Regex::new(r"(?i)^mailto:").expect("invalid mailto regex"),
                Regex::new(r"(?i)^about:").expect("invalid about URI regex"),
                Regex::new(r"^#").expect("invalid fragment regex"),
                Regex::new(r"^\s*$").expect("invalid blank regex"),
            ]
        })
        .as_slice()
}

/// Determine whether an attribute value should be skipped during extraction.
///
/// Inline payloads, pseudo-schemes and fragment links never point at a file that
/// could be mirrored, so they are left untouched in the document.
pub fn should_ignore_asset_reference(value: &str) -> bool {
    asset_reference_ignores()
        .iter()
        .any(|pattern| pattern.is_match(value.trim_start()))
}

#[cfg(test)]
mod tests {
    use super::should_ignore_asset_reference;

    #[test]
    fn ignores_data_and_blob_uris() {
        assert!(should_ignore_asset_reference("data:image/png;base64,abc"));
        assert!(should_ignore_asset_reference("blob:https://chatgpt.com/1234"));
    }

    #[test]
    fn ignores_pseudo_schemes_and_fragments() {
        assert!(should_ignore_asset_reference("javascript:void(0)"));
        assert!(should_ignore_asset_reference("MAILTO:user@example.com"));
        assert!(should_ignore_asset_reference("#top"));
        assert!(should_ignore_asset_reference("   "));
    }

    #[test]
    fn keeps_urls_and_relative_paths() {
        assert!(!should_ignore_asset_reference("https://cdn.oaistatic.com/assets/app.js"));
        assert!(!should_ignore_asset_reference("page_fichiers/logo.png"));
        assert!(!should_ignore_asset_reference("//cdn.oaistatic.com/assets/app.js"));
    }
}
