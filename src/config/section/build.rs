//! `build` section configuration.
//!
//! ```yaml
//! build:
//!   command: templ generate        # generator invocation (head allowlisted)
//!   watch: ["**/*.templ"]          # glob patterns to watch
//!   ignore: ["node_modules/**"]    # glob patterns to exclude
//!   cache_dir: .templar/cache      # optional persistent build cache
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default allowlist of recognized generator executables. Narrowable via
/// `allowed_commands`; never widened implicitly.
pub const DEFAULT_ALLOWED_COMMANDS: &[&str] =
    &["templ", "go", "npm", "yarn", "pnpm", "make", "git"];

/// Build and watch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// Generator invocation. Split on whitespace, never through a shell.
    pub command: String,

    /// Glob patterns selecting files to watch. Empty: component and
    /// host-language source extensions.
    pub watch: Vec<String>,

    /// Glob patterns excluded from watching.
    pub ignore: Vec<String>,

    /// Optional persistent cache directory (relative to project root).
    pub cache_dir: Option<PathBuf>,

    /// Executables the build command head may resolve to.
    pub allowed_commands: Vec<String>,

    /// Maximum cached artifacts held in memory.
    pub cache_max_entries: usize,

    /// Maximum aggregate artifact bytes held in memory.
    pub cache_max_bytes: u64,

    /// Retry bound for transient build failures.
    pub retry_attempts: u32,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            command: "templ generate".to_string(),
            watch: Vec::new(),
            ignore: Vec::new(),
            cache_dir: None,
            allowed_commands: DEFAULT_ALLOWED_COMMANDS
                .iter()
                .map(|s| s.to_string())
                .collect(),
            cache_max_entries: 1024,
            cache_max_bytes: 256 * 1024 * 1024,
            retry_attempts: 2,
        }
    }
}

impl BuildConfig {
    /// The command split into argv tokens (no shell interpretation).
    pub fn command_tokens(&self) -> Vec<String> {
        self.command.split_whitespace().map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_build_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.build.command, "templ generate");
        assert!(config.build.cache_dir.is_none());
        assert!(config.build.allowed_commands.contains(&"templ".to_string()));
    }

    #[test]
    fn test_command_tokens_never_shell() {
        let config = test_parse_config("build:\n  command: go generate ./...\n");
        assert_eq!(config.build.command_tokens(), ["go", "generate", "./..."]);
    }

    #[test]
    fn test_watch_and_ignore_globs() {
        let config = test_parse_config(
            "build:\n  watch: [\"**/*.templ\"]\n  ignore: [\"**/dist/**\"]\n",
        );
        assert_eq!(config.build.watch, ["**/*.templ"]);
        assert_eq!(config.build.ignore, ["**/dist/**"]);
    }

    #[test]
    fn test_cache_dir() {
        let config = test_parse_config("build:\n  cache_dir: .templar/cache\n");
        assert_eq!(
            config.build.cache_dir.as_deref(),
            Some(std::path::Path::new(".templar/cache"))
        );
    }
}
