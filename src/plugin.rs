//! Plugin capability contract.
//!
//! Plugins declare, at registration, the set of capabilities they provide;
//! the manager dispatches by capability tag. Plugin discovery and lifecycle
//! live outside the core; only this contract matters here.

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::actor::fs::ChangeEvent;
use crate::registry::Component;

/// Capabilities a plugin may declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Rewrite or annotate a component record after scanning.
    ComponentPreprocess,
    /// Observe build completion per component.
    BuildHook,
    /// Observe filtered watch events.
    WatchHook,
}

/// A registered plugin. Methods are called only for declared capabilities.
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;
    fn capabilities(&self) -> &[Capability];

    fn preprocess_component(&self, _component: &mut Component) {}
    fn on_build(&self, _component: &str, _success: bool) {}
    fn on_watch(&self, _event: &ChangeEvent) {}
}

/// Dispatches to plugins by capability tag.
#[derive(Default)]
pub struct PluginManager {
    by_capability: FxHashMap<Capability, Vec<Arc<dyn Plugin>>>,
}

impl PluginManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under each capability it declares.
    pub fn register(&mut self, plugin: Arc<dyn Plugin>) {
        crate::debug!("plugin"; "registered `{}` ({} capabilities)",
            plugin.name(), plugin.capabilities().len());
        for capability in plugin.capabilities() {
            self.by_capability
                .entry(*capability)
                .or_default()
                .push(Arc::clone(&plugin));
        }
    }

    pub fn preprocess_component(&self, component: &mut Component) {
        if let Some(plugins) = self.by_capability.get(&Capability::ComponentPreprocess) {
            for plugin in plugins {
                plugin.preprocess_component(component);
            }
        }
    }

    pub fn on_build(&self, component: &str, success: bool) {
        if let Some(plugins) = self.by_capability.get(&Capability::BuildHook) {
            for plugin in plugins {
                plugin.on_build(component, success);
            }
        }
    }

    pub fn on_watch(&self, event: &ChangeEvent) {
        if let Some(plugins) = self.by_capability.get(&Capability::WatchHook) {
            for plugin in plugins {
                plugin.on_watch(event);
            }
        }
    }

    pub fn count(&self, capability: Capability) -> usize {
        self.by_capability
            .get(&capability)
            .map_or(0, |plugins| plugins.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    struct TagPlugin {
        calls: AtomicU64,
    }

    impl Plugin for TagPlugin {
        fn name(&self) -> &str {
            "tag"
        }

        fn capabilities(&self) -> &[Capability] {
            &[Capability::ComponentPreprocess]
        }

        fn preprocess_component(&self, component: &mut Component) {
            self.calls.fetch_add(1, Ordering::Relaxed);
            component.package = format!("tagged::{}", component.package);
        }
    }

    #[test]
    fn test_dispatch_by_declared_capability_only() {
        let mut manager = PluginManager::new();
        let plugin = Arc::new(TagPlugin {
            calls: AtomicU64::new(0),
        });
        manager.register(Arc::clone(&plugin) as Arc<dyn Plugin>);

        assert_eq!(manager.count(Capability::ComponentPreprocess), 1);
        assert_eq!(manager.count(Capability::BuildHook), 0);

        let mut component = Component::new("Button", PathBuf::from("b.templ"), "ui");
        manager.preprocess_component(&mut component);
        assert_eq!(component.package, "tagged::ui");

        // BuildHook was not declared: dispatch never reaches the plugin.
        manager.on_build("Button", true);
        assert_eq!(plugin.calls.load(Ordering::Relaxed), 1);
    }
}
