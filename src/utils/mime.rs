//! Content-type resolution by file extension.

use std::path::Path;

pub mod types {
    pub const HTML: &str = "text/html; charset=utf-8";
    pub const PLAIN: &str = "text/plain; charset=utf-8";
    pub const JSON: &str = "application/json";
    pub const JAVASCRIPT: &str = "application/javascript";
    pub const CSS: &str = "text/css";
}

/// Content type for a file path; unknown extensions are octet-stream.
pub fn from_path(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => types::HTML,
        Some("css") => types::CSS,
        Some("js") | Some("mjs") => types::JAVASCRIPT,
        Some("json") => types::JSON,
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("ico") => "image/x-icon",
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("txt") | Some("md") => types::PLAIN,
        Some("wasm") => "application/wasm",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_common_types() {
        assert_eq!(from_path(&PathBuf::from("a.html")), types::HTML);
        assert_eq!(from_path(&PathBuf::from("a.css")), types::CSS);
        assert_eq!(from_path(&PathBuf::from("a.js")), types::JAVASCRIPT);
        assert_eq!(from_path(&PathBuf::from("a.svg")), "image/svg+xml");
    }

    #[test]
    fn test_unknown_is_octet_stream() {
        assert_eq!(from_path(&PathBuf::from("a.weird")), "application/octet-stream");
        assert_eq!(from_path(&PathBuf::from("noext")), "application/octet-stream");
    }
}
