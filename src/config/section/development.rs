//! `development` section configuration.
//!
//! ```yaml
//! development:
//!   watch: true          # filesystem watcher + incremental rebuilds
//!   hot_reload: true     # master switch for the broadcast layer
//! ```
//!
//! The two switches are independent: `watch: false` stops the whole
//! incremental loop (one-shot scan only), while `hot_reload: false` keeps
//! rebuilding on change but never pushes to browsers.

use serde::{Deserialize, Serialize};

/// Development loop settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DevelopmentConfig {
    /// Enable the filesystem watcher and incremental rebuilds.
    pub watch: bool,

    /// Master switch for the reload broadcast layer.
    pub hot_reload: bool,
}

impl Default for DevelopmentConfig {
    fn default() -> Self {
        Self {
            watch: true,
            hot_reload: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_defaults_on() {
        let config = test_parse_config("");
        assert!(config.development.watch);
        assert!(config.development.hot_reload);
    }

    #[test]
    fn test_hot_reload_off_keeps_watch_on() {
        let config = test_parse_config("development:\n  hot_reload: false\n");
        assert!(!config.development.hot_reload);
        assert!(config.development.watch);
    }

    #[test]
    fn test_watch_off_keeps_hot_reload_on() {
        let config = test_parse_config("development:\n  watch: false\n");
        assert!(!config.development.watch);
        assert!(config.development.hot_reload);
    }
}
