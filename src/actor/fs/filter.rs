//! Path filter chain.
//!
//! Ordered predicates over paths, run in the watcher thread before events
//! reach the debouncer. Predicates must be pure and non-blocking.

use std::path::Path;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::TemplarConfig;

/// A single filter decision.
pub type Filter = Box<dyn Fn(&Path) -> bool + Send + Sync>;

/// Ordered chain of accept/reject predicates. A path is accepted when every
/// filter in the chain returns true, or when it is exact-allowed (the config
/// file itself must produce events even though no source glob matches it).
pub struct FilterChain {
    allow_exact: Vec<std::path::PathBuf>,
    filters: Vec<Filter>,
}

/// Directories never worth watching, regardless of configuration.
const SKIP_DIRS: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    "target",
    "vendor",
    ".templar",
];

impl FilterChain {
    pub fn new() -> Self {
        Self {
            allow_exact: Vec::new(),
            filters: Vec::new(),
        }
    }

    /// Build the default chain from configuration: source extensions,
    /// test/generated rejections, VCS and dependency-cache directories,
    /// and the user ignore globs.
    pub fn from_config(config: &TemplarConfig) -> Self {
        let mut chain = Self::new();

        chain.add(Box::new(|p| !in_skip_dir(p)));
        chain.add(Box::new(|p| !is_test_file(p)));
        chain.add(Box::new(|p| !is_generated_output(p)));

        let watch = build_globset(&config.build.watch);
        chain.add(Box::new(move |p| {
            // With no watch globs configured, fall back to source extensions.
            match &watch {
                Some(set) => set.is_match(p),
                None => has_source_extension(p),
            }
        }));

        if let Some(ignore) = build_globset(&config.build.ignore) {
            chain.add(Box::new(move |p| !ignore.is_match(p)));
        }

        if config.config_path.is_absolute() {
            chain.allow(config.config_path.clone());
        }

        chain
    }

    /// Append a predicate to the chain.
    pub fn add(&mut self, filter: Filter) {
        self.filters.push(filter);
    }

    /// Exact-allow a path, bypassing the predicate chain.
    pub fn allow(&mut self, path: std::path::PathBuf) {
        self.allow_exact.push(path);
    }

    /// Run the chain. First rejecting filter wins.
    pub fn accepts(&self, path: &Path) -> bool {
        if self.allow_exact.iter().any(|p| p == path) {
            return true;
        }
        self.filters.iter().all(|f| f(path))
    }
}

impl Default for FilterChain {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile glob patterns, skipping invalid ones with a warning.
fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    let mut any = false;
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
                any = true;
            }
            Err(e) => crate::log!("watch"; "invalid glob '{}': {}", pattern, e),
        }
    }
    if !any {
        return None;
    }
    builder.build().ok()
}

fn in_skip_dir(path: &Path) -> bool {
    path.components().any(|c| {
        c.as_os_str()
            .to_str()
            .is_some_and(|s| SKIP_DIRS.contains(&s))
    })
}

/// Component or host-language source file.
fn has_source_extension(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("templ") | Some("go")
    )
}

/// Test files are never rebuilt by the dev loop (`foo_test.templ`, `foo_test.go`).
fn is_test_file(path: &Path) -> bool {
    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
        return false;
    };
    stem.ends_with("_test")
}

/// Generated outputs would cause rebuild loops (`foo_templ.go`).
fn is_generated_output(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with("_templ.go"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn chain() -> FilterChain {
        FilterChain::from_config(&TemplarConfig::default())
    }

    #[test]
    fn test_accepts_component_source() {
        assert!(chain().accepts(&PathBuf::from("components/button.templ")));
        assert!(chain().accepts(&PathBuf::from("components/card.go")));
    }

    #[test]
    fn test_rejects_test_files() {
        assert!(!chain().accepts(&PathBuf::from("components/button_test.templ")));
        assert!(!chain().accepts(&PathBuf::from("components/button_test.go")));
    }

    #[test]
    fn test_rejects_generated_outputs() {
        assert!(!chain().accepts(&PathBuf::from("components/button_templ.go")));
    }

    #[test]
    fn test_rejects_vcs_and_dependency_dirs() {
        assert!(!chain().accepts(&PathBuf::from(".git/objects/ab/cdef")));
        assert!(!chain().accepts(&PathBuf::from("node_modules/pkg/index.templ")));
        assert!(!chain().accepts(&PathBuf::from("target/debug/out.templ")));
    }

    #[test]
    fn test_rejects_unrelated_extensions() {
        assert!(!chain().accepts(&PathBuf::from("README.md")));
        assert!(!chain().accepts(&PathBuf::from("style.css")));
    }

    #[test]
    fn test_user_ignore_globs() {
        let mut config = TemplarConfig::default();
        config.build.ignore = vec!["**/drafts/**".to_string()];
        let chain = FilterChain::from_config(&config);

        assert!(!chain.accepts(&PathBuf::from("components/drafts/wip.templ")));
        assert!(chain.accepts(&PathBuf::from("components/button.templ")));
    }

    #[test]
    fn test_custom_filter_order() {
        let mut chain = FilterChain::new();
        chain.add(Box::new(|p| p.extension().is_some()));
        chain.add(Box::new(|p| !p.ends_with("skip.templ")));

        assert!(chain.accepts(&PathBuf::from("keep.templ")));
        assert!(!chain.accepts(&PathBuf::from("skip.templ")));
    }
}
