use std::path::{Component, Path};

use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};

/// Characters escaped when a store path is written back into an attribute value.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'\'')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Render a path with forward slashes regardless of the host separator.
pub fn to_forward_slashes(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

/// Compute the `/`-separated path leading from directory `from_dir` to `target`.
///
/// Both paths are expected to be absolute (or relative to the same root). The result is
/// percent-encoded per segment so it can be placed directly into an HTML attribute.
pub fn relative_asset_path(from_dir: &Path, target: &Path) -> String {
    let from: Vec<Component> = from_dir
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect();
    let to: Vec<Component> = target
        .components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect();

    let shared = from
        .iter()
        .zip(to.iter())
        .take_while(|(left, right)| left == right)
        .count();

    let mut segments: Vec<String> = Vec::new();
    for _ in shared..from.len() {
        segments.push("..".to_string());
    }
    for component in &to[shared..] {
        let segment = component.as_os_str().to_string_lossy();
        segments.push(utf8_percent_encode(&segment, PATH_SEGMENT).to_string());
    }

    segments.join("/")
}
