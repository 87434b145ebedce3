//! Build Actor
//!
//! Sits between the watcher and the pipeline: debounced change batches come
//! in, registry updates and build submissions go out. The scanner and
//! pipeline receive a registry handle, never the other way around; build
//! outcomes travel over the event bus.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc;

use super::fs::ChangeBatch;
use super::messages::BuildMsg;
use crate::bus::{Event, EventBus};
use crate::config::cfg;
use crate::core::{CancelToken, set_healthy};
use crate::pipeline::BuildPipeline;
use crate::registry::{BatchMode, ComponentRegistry, RegistryDelta};
use crate::scanner::Scanner;

/// Build Actor - routes change batches into rescans and build submissions
pub struct BuildActor {
    rx: mpsc::Receiver<BuildMsg>,
    scanner: Scanner,
    registry: Arc<ComponentRegistry>,
    pipeline: Arc<BuildPipeline>,
    bus: EventBus,
}

impl BuildActor {
    pub fn new(
        rx: mpsc::Receiver<BuildMsg>,
        registry: Arc<ComponentRegistry>,
        pipeline: Arc<BuildPipeline>,
        bus: EventBus,
    ) -> Self {
        Self {
            rx,
            scanner: Scanner::new(&cfg()),
            registry,
            pipeline,
            bus,
        }
    }

    /// Run the actor event loop until cancelled or shut down.
    pub async fn run(mut self, cancel: CancelToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                msg = self.rx.recv() => {
                    match msg {
                        Some(BuildMsg::Shutdown) | None => break,
                        Some(BuildMsg::Changes(batch)) => self.handle_changes(batch),
                        Some(BuildMsg::Resync { roots }) => self.handle_resync(&roots),
                        Some(BuildMsg::BuildAll) => self.handle_build_all(),
                    }
                }
            }
        }
        crate::debug!("build"; "actor stopped");
    }

    // ------------------------------------------------------------------
    // Handlers
    // ------------------------------------------------------------------

    fn handle_changes(&mut self, batch: ChangeBatch) {
        let config = cfg();

        // Config edits replace the whole world view.
        if batch.paths().any(|p| config.is_config_file(p)) {
            match crate::config::reload_config() {
                Ok(true) => {
                    crate::log!("config"; "configuration reloaded");
                    self.scanner = Scanner::new(&cfg());
                    self.full_rescan();
                    self.bus.publish(Event::ReloadRequested {
                        components: Vec::new(),
                    });
                    return;
                }
                Ok(false) => {}
                Err(e) => {
                    crate::log!("config"; "reload failed, keeping previous config: {}", e);
                    return;
                }
            }
        }

        // An unhealthy project retries a full rescan on any change.
        if !crate::core::is_healthy() {
            crate::debug!("build"; "retrying scan after change");
            self.full_rescan();
            return;
        }

        let (created, modified, removed) = batch.split();

        for path in &removed {
            for name in self.registry.remove_by_path(path) {
                crate::log!("build"; "component removed: {}", name);
                self.bus.publish(Event::ComponentRemoved { name });
            }
        }

        let mut to_scan: Vec<PathBuf> = created;
        to_scan.extend(modified);
        if to_scan.is_empty() {
            return;
        }

        // Watched host-language sources carry no component declarations;
        // their generated functions changed underneath every preview.
        let host_sources = to_scan
            .iter()
            .any(|p| !self.scanner.is_component_file(p));

        let scan = self.scanner.rescan_changed(&to_scan);
        for diagnostic in &scan.diagnostics {
            crate::log!("scan"; "{}", diagnostic);
        }

        let delta = self.registry.apply_batch(scan.components, BatchMode::Update);
        self.publish_delta(&delta);

        let dirty = delta.dirty();
        if !dirty.is_empty() {
            crate::debug!("build"; "submitting {} component(s)", dirty.len());
            self.pipeline.submit(dirty);
        }

        if host_sources {
            self.bus.publish(Event::ReloadRequested {
                components: Vec::new(),
            });
        }
    }

    fn handle_resync(&mut self, roots: &[PathBuf]) {
        crate::log!("build"; "resync: rescanning {} root(s)", roots.len());
        self.full_rescan();
    }

    fn handle_build_all(&mut self) {
        self.full_rescan();
        self.pipeline.build_all();
    }

    /// Rescan every configured root, replacing the registry's contents.
    fn full_rescan(&mut self) {
        let roots = cfg().scan_roots();
        let scan = self.scanner.scan_roots(&roots);
        for diagnostic in &scan.diagnostics {
            crate::log!("scan"; "{}", diagnostic);
        }

        let delta = self.registry.apply_batch(scan.components, BatchMode::Replace);
        self.publish_delta(&delta);

        for cycle in self.registry.detect_cycles() {
            crate::log!("scan"; "dependency cycle: {}", cycle.join(" -> "));
        }

        set_healthy(true);

        let dirty = delta.dirty();
        if !dirty.is_empty() {
            self.pipeline.submit(dirty);
        }
    }

    fn publish_delta(&self, delta: &RegistryDelta) {
        for diagnostic in &delta.diagnostics {
            crate::log!("scan"; "{}", diagnostic);
        }
        // Changed-but-present components reload via their build events;
        // membership changes are what clients need to hear about here.
        for name in &delta.added {
            crate::log!("build"; "component registered: {}", name);
            self.bus.publish(Event::ComponentRegistered { name: name.clone() });
        }
        for name in &delta.removed {
            crate::log!("build"; "component removed: {}", name);
            self.bus.publish(Event::ComponentRemoved { name: name.clone() });
        }
    }
}
