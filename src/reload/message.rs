//! Hot Reload Message Protocol
//!
//! JSON message format for WebSocket communication between the development
//! server and browser clients.
//!
//! # Message Types
//!
//! - `hello`: handshake; server version + registered component list
//! - `reload`: refresh, optionally scoped to named components
//! - `error`: build diagnostics for the browser overlay
//! - `components-changed`: the component set changed
//! - `ping`/`pong`: liveness (clients ping, server pongs)

use serde::{Deserialize, Serialize};

use crate::core::Diagnostic;

/// Message sent over the reload channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ReloadMessage {
    /// Connection established; first message each client receives.
    Hello {
        /// Server version for compatibility check
        version: String,
        /// Currently registered component names
        components: Vec<String>,
    },

    /// Trigger a reload, scoped to the named components (empty = all).
    Reload {
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        components: Vec<String>,
    },

    /// Build diagnostics (display overlay, no reload)
    Error { diagnostics: Vec<Diagnostic> },

    /// Clear the error overlay (a build succeeded after an error)
    ClearError,

    /// The registered component set changed
    ComponentsChanged {
        added: Vec<String>,
        removed: Vec<String>,
    },

    /// Liveness probe (client → server)
    Ping,

    /// Liveness answer (server → client)
    Pong,
}

impl ReloadMessage {
    pub fn hello(components: Vec<String>) -> Self {
        Self::Hello {
            version: env!("CARGO_PKG_VERSION").to_string(),
            components,
        }
    }

    pub fn reload(components: Vec<String>) -> Self {
        Self::Reload { components }
    }

    pub fn error(diagnostics: Vec<Diagnostic>) -> Self {
        Self::Error { diagnostics }
    }

    pub fn components_changed(added: Vec<String>, removed: Vec<String>) -> Self {
        Self::ComponentsChanged { added, removed }
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"kind":"reload"}"#.to_string())
    }

    /// Parse from JSON string
    pub fn from_json(s: &str) -> Option<Self> {
        serde_json::from_str(s).ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reload_wire_shape() {
        let msg = ReloadMessage::reload(vec!["Button".to_string()]);
        assert_eq!(msg.to_json(), r#"{"kind":"reload","components":["Button"]}"#);
    }

    #[test]
    fn test_unscoped_reload_omits_components() {
        let msg = ReloadMessage::reload(vec![]);
        assert_eq!(msg.to_json(), r#"{"kind":"reload"}"#);
    }

    #[test]
    fn test_error_wire_shape() {
        let msg = ReloadMessage::error(vec![Diagnostic::error("a.templ", 12, 4, "boom")]);
        let json = msg.to_json();
        assert!(json.starts_with(r#"{"kind":"error","diagnostics":["#));
        assert!(json.contains(r#""line":12"#));
        assert!(json.contains(r#""severity":"error""#));
    }

    #[test]
    fn test_components_changed_wire_shape() {
        let msg = ReloadMessage::components_changed(vec!["Card".to_string()], vec![]);
        assert_eq!(
            msg.to_json(),
            r#"{"kind":"components-changed","added":["Card"],"removed":[]}"#
        );
    }

    #[test]
    fn test_ping_pong_wire_shape() {
        assert_eq!(ReloadMessage::Ping.to_json(), r#"{"kind":"ping"}"#);
        assert_eq!(ReloadMessage::Pong.to_json(), r#"{"kind":"pong"}"#);
    }

    #[test]
    fn test_ping_parses() {
        assert!(matches!(
            ReloadMessage::from_json(r#"{"kind":"ping"}"#),
            Some(ReloadMessage::Ping)
        ));
    }

    #[test]
    fn test_roundtrip() {
        let msg = ReloadMessage::hello(vec!["Button".to_string(), "Card".to_string()]);
        let parsed = ReloadMessage::from_json(&msg.to_json()).unwrap();
        match parsed {
            ReloadMessage::Hello {
                version,
                components,
            } => {
                assert_eq!(version, env!("CARGO_PKG_VERSION"));
                assert_eq!(components, ["Button", "Card"]);
            }
            _ => panic!("expected hello"),
        }
    }

    #[test]
    fn test_unknown_kind_is_none() {
        assert!(ReloadMessage::from_json(r#"{"kind":"mystery"}"#).is_none());
    }
}
