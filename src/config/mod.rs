//! Project configuration management for `templar.yml`.
//!
//! # Module Structure
//!
//! ```text
//! config/
//! ├── section/       # Configuration section definitions
//! │   ├── server     # server: port, host, origins, static dir
//! │   ├── build      # build: command, watch, ignore, cache
//! │   ├── components # components: scan paths, exclusions
//! │   └── development# development: hot reload switch
//! ├── error          # ConfigError
//! ├── handle         # Global config handle (arc-swap)
//! └── mod.rs         # TemplarConfig (this file)
//! ```
//!
//! Precedence: command-line flags > `TEMPLAR_*` environment variables >
//! file values > defaults.

mod error;
mod handle;
pub mod section;

pub use error::ConfigError;
pub use handle::{cfg, init_config, reload_config};
pub use section::{
    BuildConfig, ComponentsConfig, DEFAULT_ALLOWED_COMMANDS, DevelopmentConfig, ServerConfig,
};

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::cli::Cli;

/// Default config file name.
pub const CONFIG_FILE: &str = "templar.yml";

// ============================================================================
// root configuration
// ============================================================================

/// Root configuration structure representing templar.yml
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplarConfig {
    /// CLI arguments reference (internal use only)
    #[serde(skip)]
    pub cli: Option<&'static Cli>,

    /// Absolute path to the config file (internal use only)
    #[serde(skip)]
    pub config_path: PathBuf,

    /// Project root directory - parent of config file (internal use only)
    #[serde(skip)]
    pub root: PathBuf,

    /// HTTP/WebSocket server settings
    pub server: ServerConfig,

    /// Build and watch settings
    pub build: BuildConfig,

    /// Component discovery settings
    pub components: ComponentsConfig,

    /// Development loop settings
    pub development: DevelopmentConfig,
}

impl Default for TemplarConfig {
    fn default() -> Self {
        Self {
            cli: None,
            config_path: PathBuf::new(),
            root: PathBuf::new(),
            server: ServerConfig::default(),
            build: BuildConfig::default(),
            components: ComponentsConfig::default(),
            development: DevelopmentConfig::default(),
        }
    }
}

impl TemplarConfig {
    /// Load configuration from CLI arguments.
    ///
    /// For non-Init commands, searches upward from cwd to find the config
    /// file. The project root is the config file's parent directory.
    pub fn load(cli: &'static Cli) -> Result<Self, ConfigError> {
        let (config_path, exists) = resolve_config_path(cli);

        if !cli.is_init() && !exists {
            return Err(ConfigError::field(
                "config",
                format!(
                    "config file '{}' not found; run 'templar init' to create a project",
                    cli.config.display()
                ),
            ));
        }

        let mut config = if exists && !cli.is_init() {
            Self::from_path(&config_path)?
        } else {
            Self::default()
        };

        config.root = config_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        config.config_path = config_path;
        config.cli = Some(cli);

        config.apply_env()?;
        config.apply_cli(cli);

        if !cli.is_init() {
            config.validate()?;
        }

        Ok(config)
    }

    /// Parse a config file, warning on unknown keys.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_str_with_warnings(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_str_with_warnings(content: &str) -> Result<Self, serde_yaml::Error> {
        let de = serde_yaml::Deserializer::from_str(content);
        let mut unknown = Vec::new();
        let config: Self = serde_ignored::deserialize(de, |path| {
            unknown.push(path.to_string());
        })?;

        for key in &unknown {
            crate::log!("config"; "unknown key `{}` ignored", key);
        }
        Ok(config)
    }

    // ------------------------------------------------------------------
    // Overrides
    // ------------------------------------------------------------------

    /// Apply `TEMPLAR_*` environment variables (dotted → underscore).
    fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Some(v) = env_var("TEMPLAR_SERVER_PORT") {
            self.server.port = v
                .parse()
                .map_err(|_| ConfigError::field("server.port", format!("`{v}` is not a port")))?;
        }
        if let Some(v) = env_var("TEMPLAR_SERVER_HOST") {
            self.server.host = v;
        }
        if let Some(v) = env_var("TEMPLAR_SERVER_ALLOWED_ORIGINS") {
            self.server.allowed_origins = split_list(&v);
        }
        if let Some(v) = env_var("TEMPLAR_BUILD_COMMAND") {
            self.build.command = v;
        }
        if let Some(v) = env_var("TEMPLAR_BUILD_WATCH") {
            self.build.watch = split_list(&v);
        }
        if let Some(v) = env_var("TEMPLAR_BUILD_IGNORE") {
            self.build.ignore = split_list(&v);
        }
        if let Some(v) = env_var("TEMPLAR_BUILD_CACHE_DIR") {
            self.build.cache_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = env_var("TEMPLAR_COMPONENTS_SCAN_PATHS") {
            self.components.scan_paths = split_list(&v).into_iter().map(PathBuf::from).collect();
        }
        if let Some(v) = env_var("TEMPLAR_COMPONENTS_EXCLUDE_PATTERNS") {
            self.components.exclude_patterns = split_list(&v);
        }
        if let Some(v) = env_var("TEMPLAR_DEVELOPMENT_WATCH") {
            self.development.watch = parse_bool(&v).ok_or_else(|| {
                ConfigError::field("development.watch", format!("`{v}` is not a boolean"))
            })?;
        }
        if let Some(v) = env_var("TEMPLAR_DEVELOPMENT_HOT_RELOAD") {
            self.development.hot_reload = parse_bool(&v).ok_or_else(|| {
                ConfigError::field("development.hot_reload", format!("`{v}` is not a boolean"))
            })?;
        }
        Ok(())
    }

    /// Apply command-line flags (highest precedence).
    fn apply_cli(&mut self, cli: &Cli) {
        if let crate::cli::Commands::Serve {
            port, host, watch, ..
        } = &cli.command
        {
            if let Some(port) = port {
                self.server.port = *port;
            }
            if let Some(host) = host {
                self.server.host = host.clone();
            }
            // --watch steers the filesystem watcher, not the broadcast
            // layer; development.hot_reload has its own key.
            if let Some(watch) = watch {
                self.development.watch = *watch;
            }
        }
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::field("server.port", "port must be 1-65535"));
        }

        if self.server.host == "0.0.0.0" {
            crate::log!("config"; "server.host 0.0.0.0 exposes the dev server to the network");
        }

        for origin in &self.server.allowed_origins {
            if url::Url::parse(origin).is_err() {
                return Err(ConfigError::field(
                    "server.allowed_origins",
                    format!("`{origin}` is not a valid origin"),
                ));
            }
        }

        if self.components.scan_paths.is_empty() {
            return Err(ConfigError::field(
                "components.scan_paths",
                "at least one scan path is required",
            ));
        }

        let tokens = self.build.command_tokens();
        crate::pipeline::command::validate_command(&tokens, &self.build.allowed_commands)
            .map_err(|e| ConfigError::field("build.command", e.to_string()))?;

        Ok(())
    }

    // ------------------------------------------------------------------
    // Path helpers
    // ------------------------------------------------------------------

    pub fn get_root(&self) -> &Path {
        &self.root
    }

    /// Join a possibly-relative, possibly-tilde path onto the project root.
    pub fn root_join(&self, path: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        let expanded = PathBuf::from(expanded);
        if expanded.is_absolute() {
            expanded
        } else {
            self.root.join(expanded)
        }
    }

    /// Absolute scan roots.
    pub fn scan_roots(&self) -> Vec<PathBuf> {
        self.components
            .scan_paths
            .iter()
            .map(|p| self.root_join(p))
            .collect()
    }

    /// Absolute static asset root.
    pub fn static_root(&self) -> PathBuf {
        self.root_join(&self.server.static_dir)
    }

    /// Absolute persistent cache directory, when configured.
    pub fn cache_dir(&self) -> Option<PathBuf> {
        self.build.cache_dir.as_ref().map(|p| self.root_join(p))
    }

    /// Whether a changed path is the config file itself.
    pub fn is_config_file(&self, path: &Path) -> bool {
        path == self.config_path
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Resolve config file path based on command.
fn resolve_config_path(cli: &Cli) -> (PathBuf, bool) {
    let cwd = env::current_dir().unwrap_or_default();

    if cli.config.is_absolute() {
        let exists = cli.config.exists();
        return (cli.config.clone(), exists);
    }

    if cli.is_init() {
        let path = cwd.join(&cli.config);
        let exists = path.exists();
        return (path, exists);
    }

    // Search upward from cwd
    match find_config_file(&cwd, &cli.config) {
        Some(path) => (path, true),
        None => (cwd.join(&cli.config), false),
    }
}

/// Search for the config file upward from `start`.
fn find_config_file(start: &Path, name: &Path) -> Option<PathBuf> {
    let mut dir = Some(start);
    while let Some(current) = dir {
        let candidate = current.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
        dir = current.parent();
    }
    None
}

fn env_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.is_empty())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a YAML string into a config, panicking on error (test helper).
#[cfg(test)]
pub(crate) fn test_parse_config(yaml: &str) -> TemplarConfig {
    TemplarConfig::from_str_with_warnings(yaml).expect("test config should parse")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_yaml_gives_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.server.port, 8080);
        assert!(config.development.hot_reload);
    }

    #[test]
    fn test_unknown_keys_do_not_fail() {
        let config = test_parse_config("server:\n  port: 9000\nfrobnicate: true\n");
        assert_eq!(config.server.port, 9000);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a, b ,c"), ["a", "b", "c"]);
        assert_eq!(split_list(""), Vec::<String>::new());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("true"), Some(true));
        assert_eq!(parse_bool("OFF"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_validate_rejects_port_zero() {
        let mut config = test_parse_config("");
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_empty_scan_paths() {
        let mut config = test_parse_config("");
        config.components.scan_paths.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_shell_metacharacters_in_command() {
        let mut config = test_parse_config("");
        config.build.command = "templ; rm -rf /".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_unlisted_command_head() {
        let mut config = test_parse_config("");
        config.build.command = "bash build.sh".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_accepts_default_command() {
        let config = test_parse_config("");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_root_join_relative_and_absolute() {
        let mut config = test_parse_config("");
        config.root = PathBuf::from("/proj");
        assert_eq!(
            config.root_join(Path::new("components")),
            PathBuf::from("/proj/components")
        );
        assert_eq!(
            config.root_join(Path::new("/tmp/x")),
            PathBuf::from("/tmp/x")
        );
    }

    #[test]
    fn test_cli_watch_flag_maps_to_watcher_not_broadcast() {
        use clap::Parser;

        let cli = Cli::parse_from(["templar", "serve", "--watch", "false"]);
        let mut config = test_parse_config("");
        config.apply_cli(&cli);

        assert!(!config.development.watch);
        // The broadcast switch is a separate knob and stays untouched.
        assert!(config.development.hot_reload);
    }

    #[test]
    fn test_env_overrides_beat_file_values() {
        let mut config = test_parse_config("server:\n  port: 8080\n");

        // SAFETY: this test owns these variable names; no other test reads
        // them, so the process-global mutation cannot race meaningfully.
        unsafe {
            env::set_var("TEMPLAR_SERVER_PORT", "9001");
            env::set_var("TEMPLAR_BUILD_WATCH", "**/*.templ, **/*.go");
        }
        let result = config.apply_env();
        unsafe {
            env::remove_var("TEMPLAR_SERVER_PORT");
            env::remove_var("TEMPLAR_BUILD_WATCH");
        }

        result.unwrap();
        assert_eq!(config.server.port, 9001);
        assert_eq!(config.build.watch, ["**/*.templ", "**/*.go"]);
    }

    #[test]
    fn test_env_override_bad_boolean_is_config_error() {
        let mut config = test_parse_config("");

        unsafe {
            env::set_var("TEMPLAR_DEVELOPMENT_HOT_RELOAD", "perhaps");
        }
        let result = config.apply_env();
        unsafe {
            env::remove_var("TEMPLAR_DEVELOPMENT_HOT_RELOAD");
        }

        assert!(result.is_err());
    }

    #[test]
    fn test_find_config_file_searches_upward() {
        let dir = tempfile::TempDir::new().unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "server:\n  port: 1234\n").unwrap();

        let found = find_config_file(&nested, Path::new(CONFIG_FILE)).unwrap();
        assert_eq!(found, dir.path().join(CONFIG_FILE));
    }
}
