//! `server` section configuration.
//!
//! ```yaml
//! server:
//!   host: localhost          # bind host (0.0.0.0 exposes to LAN, warns)
//!   port: 8080               # HTTP port
//!   allowed_origins: []      # origins permitted to open the reload channel
//!   static_dir: static       # directory served under /static/*
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Development server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    /// - `localhost` (default): local access only
    /// - `0.0.0.0`: all interfaces (permitted with a warning)
    pub host: String,

    /// HTTP port number (1-65535).
    pub port: u16,

    /// Origins permitted to upgrade the reload channel.
    /// Empty list means: only the server's own bind host.
    pub allowed_origins: Vec<String>,

    /// Static asset directory served under `/static/*` (relative to root).
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 8080,
            allowed_origins: Vec::new(),
            static_dir: PathBuf::from("static"),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::config::test_parse_config;

    #[test]
    fn test_server_defaults() {
        let config = test_parse_config("");
        assert_eq!(config.server.host, "localhost");
        assert_eq!(config.server.port, 8080);
        assert!(config.server.allowed_origins.is_empty());
    }

    #[test]
    fn test_server_override() {
        let config = test_parse_config("server:\n  host: 0.0.0.0\n  port: 3000\n");
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 3000);
    }

    #[test]
    fn test_allowed_origins_list() {
        let config =
            test_parse_config("server:\n  allowed_origins:\n    - http://localhost:8080\n");
        assert_eq!(config.server.allowed_origins.len(), 1);
    }

    #[test]
    fn test_partial_override_keeps_defaults() {
        let config = test_parse_config("server:\n  port: 9999\n");
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.host, "localhost");
    }
}
