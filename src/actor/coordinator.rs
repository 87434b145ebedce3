//! Actor Coordinator - wires up the hot reload actor system.
//!
//! A thin orchestrator: creates channels, wires actors to their
//! collaborators, bridges the event bus to the hub, and runs everything
//! until shutdown.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use crossbeam::channel::Receiver;
use tokio::sync::mpsc;

use super::build::BuildActor;
use super::fs::{FilterChain, FsActor};
use super::messages::{BuildMsg, HubMsg};
use super::ws::HubActor;
use crate::bus::{Event, EventBus, EventKind, Subscription};
use crate::cache;
use crate::config::TemplarConfig;
use crate::core::CancelToken;
use crate::monitor::Monitor;
use crate::pipeline::BuildPipeline;
use crate::registry::ComponentRegistry;

const CHANNEL_BUFFER: usize = 32;

/// Coordinator - wires up and runs the actor system.
pub struct Coordinator {
    config: Arc<TemplarConfig>,
    registry: Arc<ComponentRegistry>,
    pipeline: Arc<BuildPipeline>,
    bus: EventBus,
    monitor: Arc<dyn Monitor>,
    cancel: CancelToken,
    ws_port: Option<u16>,
    shutdown_rx: Option<Receiver<()>>,
}

impl Coordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Arc<TemplarConfig>,
        registry: Arc<ComponentRegistry>,
        pipeline: Arc<BuildPipeline>,
        bus: EventBus,
        monitor: Arc<dyn Monitor>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            config,
            registry,
            pipeline,
            bus,
            monitor,
            cancel,
            ws_port: None,
            shutdown_rx: None,
        }
    }

    /// Set the reload channel base port.
    pub fn with_ws_port(mut self, port: u16) -> Self {
        self.ws_port = Some(port);
        self
    }

    /// Set shutdown signal receiver.
    pub fn with_shutdown_signal(mut self, rx: Receiver<()>) -> Self {
        self.shutdown_rx = Some(rx);
        self
    }

    /// Run the actor system.
    ///
    /// The watcher → build loop always runs; the broadcast layer (reload
    /// listener, hub, bus bridge) only when `development.hot_reload` is on.
    pub async fn run(mut self) -> Result<()> {
        let (build_tx, build_rx) = mpsc::channel::<BuildMsg>(CHANNEL_BUFFER);

        // Watcher: scan roots plus the project root, so templar.yml edits
        // are observed (the debouncer collapses overlap duplicates).
        let mut watch_paths = self.config.scan_roots();
        watch_paths.push(self.config.get_root().to_path_buf());
        let filters = FilterChain::from_config(&self.config);

        // A broken notify facility degrades to periodic full rescans.
        let fs_actor = match FsActor::new(
            watch_paths.clone(),
            filters,
            build_tx.clone(),
            self.bus.clone(),
        ) {
            Ok((fs_actor, _handle)) => Some(fs_actor),
            Err(e) => {
                crate::log!("watch"; "filesystem notify unavailable ({}), polling instead", e);
                let build_tx = build_tx.clone();
                let cancel = self.cancel.clone();
                let roots = watch_paths.clone();
                tokio::spawn(async move {
                    let mut tick = tokio::time::interval(Duration::from_secs(10));
                    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
                    tick.tick().await; // skip the immediate first tick
                    loop {
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tick.tick() => {
                                let msg = BuildMsg::Resync { roots: roots.clone() };
                                if build_tx.send(msg).await.is_err() {
                                    break;
                                }
                            }
                        }
                    }
                });
                None
            }
        };

        let build_actor = BuildActor::new(
            build_rx,
            Arc::clone(&self.registry),
            Arc::clone(&self.pipeline),
            self.bus.clone(),
        );

        // Broadcast layer: reload listener + hub + bus bridge.
        let (hub_tx, hub_actor) = if self.config.development.hot_reload {
            let (hub_tx, hub_rx) = mpsc::channel::<HubMsg>(CHANNEL_BUFFER);

            if let Some(port) = self.ws_port {
                match crate::reload::server::start_ws_server(
                    port,
                    hub_tx.clone(),
                    self.cancel.clone(),
                ) {
                    Ok(actual_port) => crate::cli::serve::set_actual_ws_port(actual_port),
                    Err(e) => crate::log!("actor"; "reload channel failed: {}", e),
                }
            }

            // Restore persisted failures so reconnecting clients see the
            // overlay.
            let persisted = cache::restore_diagnostics(self.config.get_root());
            let hub = HubActor::new(
                hub_rx,
                Arc::clone(&self.registry),
                self.config.server.allowed_origins.clone(),
                self.config.server.host.clone(),
                Arc::clone(&self.monitor),
            );
            let hub = match persisted.first() {
                Some(failure) => hub.with_pending_error(failure.diagnostics.clone()),
                None => hub,
            };

            // Bus → hub bridge (build outcomes become client messages).
            let bridge_sub = self.bus.subscribe(&[
                EventKind::BuildCompleted,
                EventKind::BuildFailed,
                EventKind::ComponentRegistered,
                EventKind::ComponentRemoved,
                EventKind::ReloadRequested,
            ]);
            {
                let hub_tx = hub_tx.clone();
                let root = self.config.get_root().to_path_buf();
                let cancel = self.cancel.clone();
                std::thread::spawn(move || {
                    run_bridge(bridge_sub, hub_tx, root, persisted, cancel)
                });
            }

            (Some(hub_tx), Some(hub))
        } else {
            crate::debug!("actor"; "hot reload disabled, broadcast layer not started");
            (None, None)
        };

        crate::debug!("actor"; "start");
        let cancel = self.cancel.clone();
        let fs_handle = fs_actor.map(|fs| tokio::spawn(fs.run(cancel.clone())));
        let build_handle = tokio::spawn(build_actor.run(cancel.clone()));
        let hub_handle = hub_actor.map(|hub| tokio::spawn(hub.run(cancel.clone())));

        // Wait for an external shutdown signal or any actor ending.
        if let Some(rx) = self.shutdown_rx.take() {
            loop {
                if rx.try_recv().is_ok() || cancel.is_cancelled() {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        } else {
            cancel.cancelled().await;
        }

        crate::debug!("actor"; "shutting down");
        self.cancel.cancel();
        self.pipeline.cancel_all();
        let _ = build_tx.send(BuildMsg::Shutdown).await;
        if let Some(hub_tx) = &hub_tx {
            let _ = hub_tx.send(HubMsg::Shutdown).await;
        }

        let grace = Duration::from_millis(500);
        if let Some(fs_handle) = fs_handle {
            let _ = tokio::time::timeout(grace, fs_handle).await;
        }
        let _ = tokio::time::timeout(grace, build_handle).await;
        if let Some(hub_handle) = hub_handle {
            let _ = tokio::time::timeout(grace, hub_handle).await;
        }

        crate::debug!("actor"; "stopped");
        Ok(())
    }
}

/// Bridge: drain bus events, group them, and translate to hub messages.
///
/// Build failures are persisted so a restart replays the current overlay.
fn run_bridge(
    sub: Subscription,
    hub_tx: mpsc::Sender<HubMsg>,
    root: PathBuf,
    mut persisted: cache::PersistedDiagnostics,
    cancel: CancelToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let Some(first) = sub.recv_timeout(Duration::from_millis(200)) else {
            continue;
        };

        // Group everything already queued into one translation pass.
        let mut events = vec![first];
        while let Some(event) = sub.try_recv() {
            events.push(event);
        }

        let mut added = Vec::new();
        let mut removed = Vec::new();
        let mut reload: Vec<String> = Vec::new();
        let mut reload_all = false;
        let mut dirty_state = false;

        for event in events {
            match event {
                Event::BuildCompleted {
                    name,
                    artifact_changed,
                    ..
                } => {
                    if persisted.clear(&name) {
                        dirty_state = true;
                        if hub_tx.blocking_send(HubMsg::ClearError).is_err() {
                            return;
                        }
                    }
                    if artifact_changed && !reload.contains(&name) {
                        reload.push(name);
                    }
                }
                Event::BuildFailed { name, diagnostics } => {
                    persisted.set(&name, diagnostics.clone());
                    dirty_state = true;
                    if hub_tx.blocking_send(HubMsg::Error { diagnostics }).is_err() {
                        return;
                    }
                }
                Event::ComponentRegistered { name } => added.push(name),
                Event::ComponentRemoved { name } => removed.push(name),
                Event::ReloadRequested { components } => {
                    if components.is_empty() {
                        reload_all = true;
                    }
                    for name in components {
                        if !reload.contains(&name) {
                            reload.push(name);
                        }
                    }
                }
                _ => {}
            }
        }

        if dirty_state
            && let Err(e) = cache::persist_diagnostics(&persisted, &root)
        {
            crate::debug!("persist"; "write failed: {}", e);
        }

        if !added.is_empty() || !removed.is_empty() {
            let msg = HubMsg::ComponentsChanged { added, removed };
            if hub_tx.blocking_send(msg).is_err() {
                return;
            }
        }

        if reload_all {
            reload.clear();
        }
        if (reload_all || !reload.is_empty())
            && hub_tx
                .blocking_send(HubMsg::Reload {
                    components: reload,
                })
                .is_err()
        {
            return;
        }
    }
}
