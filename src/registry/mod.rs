//! Thread-safe component registry.
//!
//! Single-writer / multi-reader discipline over a `parking_lot::RwLock`;
//! `get_all()` returns a defensively-copied snapshot so readers never hold
//! the lock. The registry exclusively owns Component records: the scanner
//! mutates only through registry operations.

mod component;
mod graph;

pub use component::{Component, MAX_NAME_LEN, NameError, Parameter, validate_name};

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::cache::Fingerprint;
use crate::core::Diagnostic;
use graph::NameGraph;

/// How a scan batch is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchMode {
    /// The batch is the complete truth: entries absent from it are removed.
    Replace,
    /// The batch upserts; existing entries it does not mention are kept.
    Update,
}

/// Outcome of applying a scan batch.
#[derive(Debug, Default)]
pub struct RegistryDelta {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    /// Present before and after, but content hash or path changed.
    pub changed: Vec<String>,
    pub diagnostics: Vec<Diagnostic>,
}

impl RegistryDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.changed.is_empty()
    }

    /// Names needing a rebuild (added or changed).
    pub fn dirty(&self) -> Vec<String> {
        self.added.iter().chain(&self.changed).cloned().collect()
    }
}

pub struct ComponentRegistry {
    inner: RwLock<FxHashMap<String, Component>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FxHashMap::default()),
        }
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Register a component. Idempotent keyed on name; a changed file path
    /// replaces the prior entry. A self-referencing component registers but
    /// yields an error diagnostic.
    pub fn register(&self, component: Component) -> Result<Vec<Diagnostic>, NameError> {
        validate_name(&component.name)?;

        let mut diagnostics = Vec::new();
        if component.dependencies.iter().any(|d| d == &component.name) {
            diagnostics.push(Diagnostic::error(
                component.path.display().to_string(),
                0,
                0,
                format!("component `{}` references itself", component.name),
            ));
        }

        self.inner
            .write()
            .insert(component.name.clone(), component);
        Ok(diagnostics)
    }

    /// Remove a component by name. Dependents keep their now-unresolved
    /// reference; each one is surfaced as a diagnostic.
    pub fn remove(&self, name: &str) -> (Option<Component>, Vec<Diagnostic>) {
        let mut inner = self.inner.write();
        let removed = inner.remove(name);

        let mut diagnostics = Vec::new();
        if removed.is_some() {
            for dependent in inner.values() {
                if dependent.dependencies.iter().any(|d| d == name) {
                    diagnostics.push(Diagnostic::warning(
                        dependent.path.display().to_string(),
                        0,
                        0,
                        format!(
                            "component `{}` references removed component `{}`",
                            dependent.name, name
                        ),
                    ));
                }
            }
        }
        (removed, diagnostics)
    }

    /// Apply a scan batch. In Replace mode, entries missing from the batch
    /// are removed; in Update mode they are kept.
    pub fn apply_batch(&self, batch: Vec<Component>, mode: BatchMode) -> RegistryDelta {
        let mut delta = RegistryDelta::default();
        let mut inner = self.inner.write();

        let batch_names: FxHashSet<String> = batch.iter().map(|c| c.name.clone()).collect();

        for component in batch {
            if let Err(e) = validate_name(&component.name) {
                delta.diagnostics.push(Diagnostic::error(
                    component.path.display().to_string(),
                    0,
                    0,
                    e.to_string(),
                ));
                continue;
            }
            if component.dependencies.iter().any(|d| d == &component.name) {
                delta.diagnostics.push(Diagnostic::error(
                    component.path.display().to_string(),
                    0,
                    0,
                    format!("component `{}` references itself", component.name),
                ));
            }

            match inner.get(&component.name) {
                None => {
                    delta.added.push(component.name.clone());
                    inner.insert(component.name.clone(), component);
                }
                Some(existing) => {
                    if existing.hash != component.hash || existing.path != component.path {
                        delta.changed.push(component.name.clone());
                        inner.insert(component.name.clone(), component);
                    }
                    // Identical content: keep the existing entry (and its
                    // build markers) untouched.
                }
            }
        }

        if mode == BatchMode::Replace {
            let stale: Vec<String> = inner
                .keys()
                .filter(|name| !batch_names.contains(*name))
                .cloned()
                .collect();
            for name in stale {
                inner.remove(&name);
                delta.removed.push(name);
            }
        }

        delta.added.sort();
        delta.removed.sort();
        delta.changed.sort();
        delta
    }

    /// Remove every component that originated from `path`.
    pub fn remove_by_path(&self, path: &std::path::Path) -> Vec<String> {
        let mut inner = self.inner.write();
        let names: Vec<String> = inner
            .values()
            .filter(|c| c.path == path)
            .map(|c| c.name.clone())
            .collect();
        for name in &names {
            inner.remove(name);
        }
        names
    }

    /// Mark a component unbuildable (build failed) or clear the marker.
    pub fn set_unbuildable(&self, name: &str, unbuildable: bool) {
        if let Some(component) = self.inner.write().get_mut(name) {
            component.unbuildable = unbuildable;
        }
    }

    /// Record a successful build so the artifact can be served even when a
    /// later build breaks.
    pub fn record_built(&self, name: &str, fingerprint: Fingerprint) {
        if let Some(component) = self.inner.write().get_mut(name) {
            component.unbuildable = false;
            component.last_good = Some(fingerprint);
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub fn get(&self, name: &str) -> Option<Component> {
        self.inner.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(name)
    }

    /// Snapshot of all components, sorted by name. Not a live view.
    pub fn get_all(&self) -> Vec<Component> {
        let mut all: Vec<Component> = self.inner.read().values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    /// Sorted component names.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Cycles of length ≥ 2 in the dependency graph, as sorted name lists.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let inner = self.inner.read();
        let data: Vec<(&str, &[String])> = inner
            .values()
            .map(|c| (c.name.as_str(), c.dependencies.as_slice()))
            .collect();
        NameGraph::new(data.iter().copied()).cycles()
    }

    /// Direct and transitive dependents of a component.
    pub fn dependents(&self, name: &str) -> FxHashSet<String> {
        let inner = self.inner.read();
        let data: Vec<(&str, &[String])> = inner
            .values()
            .map(|c| (c.name.as_str(), c.dependencies.as_slice()))
            .collect();
        NameGraph::new(data.iter().copied()).dependents(name)
    }

    /// References to names that do not resolve, as (component, missing).
    pub fn unresolved(&self) -> Vec<(String, String)> {
        let inner = self.inner.read();
        let mut out = Vec::new();
        for component in inner.values() {
            for dep in &component.dependencies {
                if !inner.contains_key(dep) {
                    out.push((component.name.clone(), dep.clone()));
                }
            }
        }
        out.sort();
        out
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn component(name: &str, deps: &[&str]) -> Component {
        let mut c = Component::new(name, PathBuf::from(format!("components/{name}.templ")), "ui");
        c.dependencies = deps.iter().map(|d| d.to_string()).collect();
        c
    }

    #[test]
    fn test_register_and_get() {
        let registry = ComponentRegistry::new();
        registry.register(component("Button", &[])).unwrap();

        let got = registry.get("Button").unwrap();
        assert_eq!(got.name, "Button");
        assert!(registry.contains("Button"));
        assert!(!registry.contains("Missing"));
    }

    #[test]
    fn test_register_rejects_invalid_name() {
        let registry = ComponentRegistry::new();
        assert!(registry.register(component("a/b", &[])).is_err());
        assert!(registry.register(component(&"x".repeat(101), &[])).is_err());
    }

    #[test]
    fn test_register_idempotent_replaces_by_name() {
        let registry = ComponentRegistry::new();
        registry.register(component("Button", &[])).unwrap();

        let mut moved = component("Button", &[]);
        moved.path = PathBuf::from("ui/button.templ");
        registry.register(moved).unwrap();

        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.get("Button").unwrap().path,
            PathBuf::from("ui/button.templ")
        );
    }

    #[test]
    fn test_self_loop_registers_with_diagnostic() {
        let registry = ComponentRegistry::new();
        let diags = registry.register(component("Loop", &["Loop"])).unwrap();

        assert_eq!(diags.len(), 1);
        assert!(diags[0].is_error());
        assert!(registry.contains("Loop"));
    }

    #[test]
    fn test_remove_surfaces_dangling_references() {
        let registry = ComponentRegistry::new();
        registry.register(component("Icon", &[])).unwrap();
        registry.register(component("Button", &["Icon"])).unwrap();

        let (removed, diags) = registry.remove("Icon");
        assert!(removed.is_some());
        assert_eq!(diags.len(), 1);
        assert!(diags[0].message.contains("Button"));

        // Dependent keeps the unresolved reference.
        assert_eq!(registry.get("Button").unwrap().dependencies, ["Icon"]);
        assert_eq!(registry.unresolved(), [("Button".into(), "Icon".into())]);
    }

    #[test]
    fn test_get_all_is_a_snapshot() {
        let registry = ComponentRegistry::new();
        registry.register(component("B", &[])).unwrap();
        registry.register(component("A", &[])).unwrap();

        let snapshot = registry.get_all();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].name, "A");

        registry.remove("A");
        // The snapshot is unaffected by later writes.
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn test_detect_cycles_a_b_c() {
        let registry = ComponentRegistry::new();
        registry.register(component("A", &["B"])).unwrap();
        registry.register(component("B", &["C"])).unwrap();
        registry.register(component("C", &["A"])).unwrap();

        let cycles = registry.detect_cycles();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0], vec!["A", "B", "C"]);
    }

    #[test]
    fn test_dependents() {
        let registry = ComponentRegistry::new();
        registry.register(component("Icon", &[])).unwrap();
        registry.register(component("Button", &["Icon"])).unwrap();
        registry.register(component("Card", &["Button"])).unwrap();

        let deps = registry.dependents("Icon");
        assert!(deps.contains("Button"));
        assert!(deps.contains("Card"));
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn test_apply_batch_update_mode() {
        let registry = ComponentRegistry::new();
        registry.register(component("Keep", &[])).unwrap();

        let mut changed = component("Keep", &[]);
        changed.hash = crate::cache::hash_bytes(b"new content");

        let delta = registry.apply_batch(
            vec![changed, component("New", &[])],
            BatchMode::Update,
        );

        assert_eq!(delta.added, ["New"]);
        assert_eq!(delta.changed, ["Keep"]);
        assert!(delta.removed.is_empty());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_apply_batch_replace_mode_drops_stale() {
        let registry = ComponentRegistry::new();
        registry.register(component("Old", &[])).unwrap();

        let delta = registry.apply_batch(vec![component("New", &[])], BatchMode::Replace);

        assert_eq!(delta.added, ["New"]);
        assert_eq!(delta.removed, ["Old"]);
        assert!(!registry.contains("Old"));
    }

    #[test]
    fn test_apply_batch_unchanged_content_is_not_dirty() {
        let registry = ComponentRegistry::new();
        let c = component("Same", &[]);
        registry.register(c.clone()).unwrap();

        let delta = registry.apply_batch(vec![c], BatchMode::Update);
        assert!(delta.is_empty());
    }

    #[test]
    fn test_build_markers() {
        let registry = ComponentRegistry::new();
        registry.register(component("Button", &[])).unwrap();

        registry.set_unbuildable("Button", true);
        assert!(registry.get("Button").unwrap().unbuildable);

        let fp = Fingerprint::from_bytes([7; 32]);
        registry.record_built("Button", fp);
        let c = registry.get("Button").unwrap();
        assert!(!c.unbuildable);
        assert_eq!(c.last_good, Some(fp));
    }

    #[test]
    fn test_remove_by_path() {
        let registry = ComponentRegistry::new();
        registry.register(component("Button", &[])).unwrap();
        registry.register(component("Card", &[])).unwrap();

        let removed = registry.remove_by_path(std::path::Path::new("components/Button.templ"));
        assert_eq!(removed, ["Button"]);
        assert!(registry.contains("Card"));
    }
}
