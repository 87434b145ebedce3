//! `components` section configuration.
//!
//! ```yaml
//! components:
//!   scan_paths: ["./components"]   # roots searched recursively
//!   exclude_patterns: []           # per-file exclusion globs
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Component discovery settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComponentsConfig {
    /// Roots for recursive component discovery (relative to project root).
    pub scan_paths: Vec<PathBuf>,

    /// Glob patterns excluding individual files from scanning.
    pub exclude_patterns: Vec<String>,
}

impl Default for ComponentsConfig {
    fn default() -> Self {
        Self {
            scan_paths: vec![PathBuf::from("components")],
            exclude_patterns: Vec::new(),
        }
    }
}
