//! Store keys derived from classified references.

use percent_encoding::percent_decode_str;

use crate::classify::{parse_absolute, strip_query};
use crate::config::MirrorPolicy;
use crate::models::{AssetReference, OriginKind, TargetKey};

/// Compute the `(origin, filename)` key a reference is stored under.
///
/// CDN and persistent assets keep their URL path below the host so hashed bundles
/// stay grouped as on the server; unknown hosts are prefixed with the host name.
/// Sibling exports keep their path below the export directory, so `a/logo.png` and
/// `b/logo.png` stay apart. Other relative references collapse to their base filename.
pub fn target_key(reference: &AssetReference, policy: &MirrorPolicy) -> TargetKey {
  let normalization = policy.normalization;
  let filename = match (reference.origin, parse_absolute(&reference.raw_url)) {
    (OriginKind::Cdn | OriginKind::Persistent, Some(url)) => {
      let segments = decoded_segments(url.path());
      normalization.normalize_path(segments.iter().map(String::as_str))
    }
    (OriginKind::Unknown, Some(url)) => {
      let mut segments = vec![url.host_str().unwrap_or("unknown-host").to_string()];
      segments.extend(decoded_segments(url.path()));
      normalization.normalize_path(segments.iter().map(String::as_str))
    }
    (OriginKind::LocalExport, _) => {
      let remainder = export_remainder(&reference.raw_url);
      if remainder.is_empty() {
        normalization.normalize_path([base_filename(&reference.raw_url).as_str()])
      } else {
        normalization.normalize_path(remainder.iter().map(String::as_str))
      }
    }
    _ => {
      let base = base_filename(&reference.raw_url);
      normalization.normalize_path([base.as_str()])
    }
  };

  TargetKey {
    origin: reference.origin,
    filename,
  }
}

/// Last decoded path segment of a reference, without query or fragment.
pub fn base_filename(raw_url: &str) -> String {
  let path = match parse_absolute(raw_url) {
    Some(url) => url.path().to_string(),
    None => strip_query(raw_url.trim()).to_string(),
  };
  decoded_segments(&path).pop().unwrap_or_default()
}

/// Decoded path segments of a relative reference, with the first segment removed.
///
/// For `page_fichiers/sub/logo.png` this yields `["sub", "logo.png"]`. Dot segments are
/// dropped so the result never climbs out of the export directory.
pub fn export_remainder(raw_url: &str) -> Vec<String> {
  let path = strip_query(raw_url.trim()).trim_start_matches("./");
  decoded_segments(path)
    .into_iter()
    .skip(1)
    .filter(|segment| !segment.is_empty() && segment != "." && segment != "..")
    .collect()
}

fn decoded_segments(path: &str) -> Vec<String> {
  path
    .trim_start_matches('/')
    .split('/')
    .map(|segment| percent_decode_str(segment).decode_utf8_lossy().into_owned())
    .collect()
}
