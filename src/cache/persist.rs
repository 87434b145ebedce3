//! Build diagnostics persistence.
//!
//! The last failing build per component is written to disk so a restarted
//! server (and freshly connected clients) can show the current error overlay
//! before the first rebuild.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::Diagnostic;

/// State directory under the project root.
pub const STATE_DIR: &str = ".templar";

/// Diagnostics state file name
const DIAGNOSTICS_FILE: &str = "diagnostics.json";

/// Diagnostics of one failing component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedFailure {
    pub component: String,
    pub diagnostics: Vec<Diagnostic>,
}

/// All failing components, keyed by name.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct PersistedDiagnostics {
    failures: Vec<PersistedFailure>,
}

impl PersistedDiagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure, replacing any prior entry for the component.
    pub fn set(&mut self, component: &str, diagnostics: Vec<Diagnostic>) {
        self.failures.retain(|f| f.component != component);
        self.failures.push(PersistedFailure {
            component: component.to_string(),
            diagnostics,
        });
    }

    /// Clear a component's failure (its build succeeded).
    /// Returns whether anything was cleared.
    pub fn clear(&mut self, component: &str) -> bool {
        let before = self.failures.len();
        self.failures.retain(|f| f.component != component);
        self.failures.len() < before
    }

    pub fn first(&self) -> Option<&PersistedFailure> {
        self.failures.first()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }
}

fn state_path(root: &Path) -> PathBuf {
    root.join(STATE_DIR).join(DIAGNOSTICS_FILE)
}

/// Persist diagnostics state. Skips the write when content is unchanged.
pub fn persist_diagnostics(state: &PersistedDiagnostics, root: &Path) -> std::io::Result<()> {
    let path = state_path(root);
    fs::create_dir_all(path.parent().expect("state path has a parent"))?;

    let json = serde_json::to_string_pretty(state)?;
    if path.exists() && fs::read_to_string(&path).is_ok_and(|existing| existing == json) {
        return Ok(());
    }

    fs::write(&path, &json)?;
    crate::debug!("persist"; "saved {} failing component(s)", state.len());
    Ok(())
}

/// Restore diagnostics state; missing file is an empty state.
pub fn restore_diagnostics(root: &Path) -> PersistedDiagnostics {
    let path = state_path(root);
    if !path.exists() {
        return PersistedDiagnostics::new();
    }

    match fs::read_to_string(&path) {
        Ok(json) => serde_json::from_str(&json).unwrap_or_else(|e| {
            crate::log!("persist"; "unreadable diagnostics state, starting empty: {}", e);
            PersistedDiagnostics::new()
        }),
        Err(_) => PersistedDiagnostics::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn diag(msg: &str) -> Diagnostic {
        Diagnostic::error("a.templ", 1, 1, msg)
    }

    #[test]
    fn test_set_replaces_prior_entry() {
        let mut state = PersistedDiagnostics::new();
        state.set("Button", vec![diag("first")]);
        state.set("Button", vec![diag("second")]);

        assert_eq!(state.len(), 1);
        assert_eq!(state.first().unwrap().diagnostics[0].message, "second");
    }

    #[test]
    fn test_clear() {
        let mut state = PersistedDiagnostics::new();
        state.set("Button", vec![diag("x")]);

        assert!(state.clear("Button"));
        assert!(!state.clear("Button"));
        assert!(state.is_empty());
    }

    #[test]
    fn test_persist_restore_roundtrip() {
        let dir = TempDir::new().unwrap();
        let mut state = PersistedDiagnostics::new();
        state.set("Card", vec![diag("broken")]);

        persist_diagnostics(&state, dir.path()).unwrap();
        let restored = restore_diagnostics(dir.path());

        assert_eq!(restored.len(), 1);
        assert_eq!(restored.first().unwrap().component, "Card");
    }

    #[test]
    fn test_restore_missing_is_empty() {
        let dir = TempDir::new().unwrap();
        assert!(restore_diagnostics(dir.path()).is_empty());
    }
}
