//! Component scanner.
//!
//! Walks scan roots for component files, lexes declarations, and produces
//! Component records for the registry. Stateless and safe for parallel
//! invocation on distinct files; parse errors on a single file become
//! diagnostics attached to that file and never abort the batch.

mod lexer;
mod params;

pub use lexer::{LexOutput, RawDecl, lex};
pub use params::{parse_param, parse_params, split_params};

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use globset::{Glob, GlobSet, GlobSetBuilder};
use rayon::prelude::*;

use crate::cache::hash_file;
use crate::config::TemplarConfig;
use crate::core::Diagnostic;
use crate::registry::Component;

/// Extension of component source files.
pub const COMPONENT_EXT: &str = "templ";

/// Result of scanning one or more files.
#[derive(Debug, Default)]
pub struct ScanBatch {
    pub components: Vec<Component>,
    pub diagnostics: Vec<Diagnostic>,
    pub scanned_files: usize,
}

impl ScanBatch {
    fn merge(mut self, other: ScanBatch) -> Self {
        self.components.extend(other.components);
        self.diagnostics.extend(other.diagnostics);
        self.scanned_files += other.scanned_files;
        self
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Component scanner configured with the project's exclusion patterns.
pub struct Scanner {
    exclude: Option<GlobSet>,
}

impl Scanner {
    pub fn new(config: &TemplarConfig) -> Self {
        Self {
            exclude: build_globset(&config.components.exclude_patterns),
        }
    }

    /// Scan a single component file.
    pub fn scan_file(&self, path: &Path) -> ScanBatch {
        let mut batch = ScanBatch {
            scanned_files: 1,
            ..Default::default()
        };
        let file = path.display().to_string();

        let source = match std::fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) => {
                batch
                    .diagnostics
                    .push(Diagnostic::error(&file, 0, 0, format!("cannot read: {e}")));
                return batch;
            }
        };

        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let hash = hash_file(path);

        let out = lexer::lex(&source, &file);
        batch.diagnostics.extend(out.diagnostics);

        for decl in out.decls {
            let mut component = Component::new(decl.name, path.to_path_buf(), out.package.clone());
            component.params = params::parse_params(&decl.params_src).into();
            component.dependencies = decl.references;
            component.modified = modified;
            component.hash = hash;
            batch.components.push(component);
        }

        batch
    }

    /// Recursively scan a directory for component files.
    pub fn scan_directory(&self, root: &Path) -> ScanBatch {
        if !root.exists() {
            let mut batch = ScanBatch::default();
            batch.diagnostics.push(Diagnostic::warning(
                root.display().to_string(),
                0,
                0,
                "scan root does not exist",
            ));
            return batch;
        }

        let files: Vec<PathBuf> = jwalk::WalkDir::new(root)
            .skip_hidden(true)
            .into_iter()
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path())
            .filter(|p| self.is_component_file(p))
            .collect();

        files
            .par_iter()
            .map(|path| self.scan_file(path))
            .reduce(ScanBatch::default, ScanBatch::merge)
    }

    /// Scan several roots, merging the results.
    pub fn scan_roots(&self, roots: &[PathBuf]) -> ScanBatch {
        roots
            .iter()
            .map(|root| self.scan_directory(root))
            .fold(ScanBatch::default(), ScanBatch::merge)
    }

    /// Rescan the changed files of an event batch (created + modified).
    /// Deleted paths are the caller's concern; they carry no content.
    pub fn rescan_changed(&self, paths: &[PathBuf]) -> ScanBatch {
        paths
            .par_iter()
            .filter(|p| self.is_component_file(p))
            .map(|path| self.scan_file(path))
            .reduce(ScanBatch::default, ScanBatch::merge)
    }

    /// Whether the scanner cares about this path.
    pub fn is_component_file(&self, path: &Path) -> bool {
        let is_component = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e == COMPONENT_EXT);
        if !is_component {
            return false;
        }
        match &self.exclude {
            Some(set) => !set.is_match(path),
            None => true,
        }
    }
}

fn build_globset(patterns: &[String]) -> Option<GlobSet> {
    if patterns.is_empty() {
        return None;
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        match Glob::new(pattern) {
            Ok(glob) => {
                builder.add(glob);
            }
            Err(e) => crate::log!("scan"; "invalid exclude glob '{}': {}", pattern, e),
        }
    }
    builder.build().ok()
}
