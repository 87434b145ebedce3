//! Static asset path resolution.

use std::path::{Path, PathBuf};

/// Resolve a `/static/*` URL suffix to a file under the static root.
///
/// Canonicalizes to defeat traversal via `..`, encoded sequences and
/// symlinks: the resolved path must remain within the root.
pub fn resolve_static(suffix: &str, static_root: &Path) -> Option<PathBuf> {
    let clean = normalize_url(suffix);

    if clean.is_empty() || clean.contains("..") {
        return None;
    }

    let local = static_root.join(&clean);

    let canonical = local.canonicalize().ok()?;
    let root_canonical = static_root.canonicalize().ok()?;

    if !canonical.starts_with(&root_canonical) {
        return None;
    }

    canonical.is_file().then_some(canonical)
}

/// Normalize URL: decode percent escapes, strip query string, trim slashes
fn normalize_url(url: &str) -> String {
    use percent_encoding::percent_decode_str;
    let decoded = percent_decode_str(url)
        .decode_utf8()
        .map(std::borrow::Cow::into_owned)
        .unwrap_or_default();

    let path = decoded.split('?').next().unwrap_or(&decoded);
    path.trim_matches('/').to_string()
}
