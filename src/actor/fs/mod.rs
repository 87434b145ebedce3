//! FileSystem Actor
//!
//! Watches scan roots for changes and sends debounced, filtered batches to
//! the BuildActor. Implements the "Watcher-First" pattern: the watcher
//! starts buffering before the initial scan so no event is lost.
//!
//! Architecture:
//! ```text
//! notify → filter chain (watcher thread) → Debouncer → ChangeBatch → BuildMsg
//! ```

mod debouncer;
mod filter;
mod roots;
mod types;


pub use filter::{Filter, FilterChain};
pub use types::{ChangeBatch, ChangeEvent, ChangeKind};

use std::path::PathBuf;
use std::sync::Arc;

use notify::RecommendedWatcher;
use tokio::sync::mpsc;

use super::messages::BuildMsg;
use crate::bus::{Event, EventBus};
use crate::core::CancelToken;
use debouncer::Debouncer;
use roots::WatchRoots;

/// Runtime control messages for the watcher.
pub enum FsControl {
    AddRoot(PathBuf),
    RemoveRoot(PathBuf),
    AddFilter(Filter),
    Stop,
}

/// Handle used to steer a running FsActor.
#[derive(Clone)]
pub struct FsHandle {
    tx: mpsc::Sender<FsControl>,
}

impl FsHandle {
    pub fn add_root(&self, path: PathBuf) {
        let _ = self.tx.try_send(FsControl::AddRoot(path));
    }

    pub fn remove_root(&self, path: PathBuf) {
        let _ = self.tx.try_send(FsControl::RemoveRoot(path));
    }

    pub fn add_filter(&self, filter: Filter) {
        let _ = self.tx.try_send(FsControl::AddFilter(filter));
    }

    /// Stop emitting and drain. Returns once the actor loop observed it.
    pub fn stop(&self) {
        let _ = self.tx.try_send(FsControl::Stop);
    }
}

/// FileSystem Actor - watches for file changes
pub struct FsActor {
    /// Channel to receive bridged notify events
    raw_rx: mpsc::Receiver<RawEvent>,
    /// Watcher handle (must be kept alive)
    watcher: RecommendedWatcher,
    /// Watch-root consistency layer
    watch_roots: WatchRoots,
    /// Channel to send messages to BuildActor
    build_tx: mpsc::Sender<BuildMsg>,
    /// Debouncer state
    debouncer: Debouncer,
    /// Filter chain (shared with the notify callback)
    filters: Arc<parking_lot::RwLock<FilterChain>>,
    /// Control channel
    control_rx: mpsc::Receiver<FsControl>,
    /// Bus for FileChanged / Resync events
    bus: EventBus,
}

/// Events crossing the notify → tokio bridge.
enum RawEvent {
    Change(PathBuf, ChangeKind),
    /// The notify facility signalled dropped events; a full rescan is needed.
    Resync,
}

impl FsActor {
    /// Create a new FsActor. The watcher starts immediately, buffering
    /// events while the caller performs the initial scan.
    pub fn new(
        paths: Vec<PathBuf>,
        filters: FilterChain,
        build_tx: mpsc::Sender<BuildMsg>,
        bus: EventBus,
    ) -> notify::Result<(Self, FsHandle)> {
        let (raw_tx, raw_rx) = mpsc::channel::<RawEvent>(1024);
        let filters = Arc::new(parking_lot::RwLock::new(filters));
        let callback_filters = Arc::clone(&filters);

        // The notify callback runs on the watcher thread: classify, filter,
        // forward. Predicates must stay pure and non-blocking.
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            for raw in classify_notify(res, &callback_filters.read()) {
                if raw_tx.blocking_send(raw).is_err() {
                    break; // actor gone
                }
            }
        })?;

        let mut watch_roots = WatchRoots::new(paths);
        watch_roots.attach_existing(&mut watcher);

        let (control_tx, control_rx) = mpsc::channel(16);

        Ok((
            Self {
                raw_rx,
                watcher,
                watch_roots,
                build_tx,
                debouncer: Debouncer::new(),
                filters,
                control_rx,
                bus,
            },
            FsHandle { tx: control_tx },
        ))
    }

    /// Run the actor event loop until cancelled or stopped.
    pub async fn run(mut self, cancel: CancelToken) {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(control) = self.control_rx.recv() => {
                    if self.handle_control(control) {
                        break;
                    }
                }
                Some(raw) = self.raw_rx.recv() => self.handle_raw(raw).await,
                _ = tokio::time::sleep(self.debouncer.sleep_duration()) => {
                    // Ensure watcher roots remain attached.
                    self.watch_roots.maintain(&mut self.watcher);
                    if self.flush_ready().await.is_err() {
                        break;
                    }
                }
            }
        }
        crate::debug!("watch"; "stopped");
    }

    /// Returns true when the actor should stop.
    fn handle_control(&mut self, control: FsControl) -> bool {
        match control {
            FsControl::AddRoot(path) => self.watch_roots.add(&mut self.watcher, path),
            FsControl::RemoveRoot(path) => self.watch_roots.remove(&mut self.watcher, &path),
            FsControl::AddFilter(filter) => self.filters.write().add(filter),
            FsControl::Stop => return true,
        }
        false
    }

    async fn handle_raw(&mut self, raw: RawEvent) {
        match raw {
            RawEvent::Change(path, kind) => self.debouncer.add(path, kind),
            RawEvent::Resync => self.emit_resync().await,
        }
    }

    /// Emit Resync markers for every root; consumers perform a full rescan.
    async fn emit_resync(&mut self) {
        let roots: Vec<PathBuf> = self.watch_roots.roots().to_vec();
        crate::log!("watch"; "event overflow, requesting rescan of {} root(s)", roots.len());
        for root in &roots {
            self.bus.publish(Event::Resync { root: root.clone() });
        }
        let _ = self.build_tx.send(BuildMsg::Resync { roots }).await;
    }

    /// Flush debounced events downstream.
    ///
    /// Returns `Err(())` if the BuildActor shut down.
    async fn flush_ready(&mut self) -> Result<(), ()> {
        let batch = self.debouncer.take_ready();
        if batch.is_empty() {
            return Ok(());
        }

        for event in &batch.0 {
            crate::debug!("watch"; "{}: {}", event.kind.label(), event.path.display());
            self.bus.publish(Event::FileChanged(event.clone()));
        }

        self.build_tx
            .send(BuildMsg::Changes(batch))
            .await
            .map_err(|_| ())
    }
}

/// Translate a notify event into filtered raw events.
///
/// Renames are modeled as Removed(old) + Created(new). Metadata-only
/// modifications and editor temp files are dropped here.
fn classify_notify(
    res: notify::Result<notify::Event>,
    filters: &FilterChain,
) -> Vec<RawEvent> {
    use notify::EventKind;
    use notify::event::{ModifyKind, RenameMode};

    let event = match res {
        Ok(event) => event,
        Err(e) => {
            crate::log!("watch"; "notify error: {}", e);
            return vec![RawEvent::Resync];
        }
    };

    if event.need_rescan() {
        return vec![RawEvent::Resync];
    }

    let mut out = Vec::new();
    let mut push = |path: &PathBuf, kind: ChangeKind| {
        if is_temp_file(path) || !filters.accepts(path) {
            return;
        }
        out.push(RawEvent::Change(path.clone(), kind));
    };

    match event.kind {
        EventKind::Create(_) => {
            for path in &event.paths {
                push(path, ChangeKind::Created);
            }
        }
        EventKind::Remove(_) => {
            for path in &event.paths {
                push(path, ChangeKind::Removed);
            }
        }
        EventKind::Modify(ModifyKind::Name(mode)) => match (mode, event.paths.as_slice()) {
            (RenameMode::Both, [from, to]) => {
                push(from, ChangeKind::Removed);
                push(to, ChangeKind::Created);
            }
            (RenameMode::From, [from]) => push(from, ChangeKind::Removed),
            (RenameMode::To, [to]) => push(to, ChangeKind::Created),
            _ => {
                // Platform reported an untyped rename: reconcile by existence.
                for path in &event.paths {
                    let kind = if path.exists() {
                        ChangeKind::Created
                    } else {
                        ChangeKind::Removed
                    };
                    push(path, kind);
                }
            }
        },
        EventKind::Modify(ModifyKind::Metadata(_)) => {
            // mtime/atime/chmod noise may trigger endless rebuild loops
        }
        EventKind::Modify(_) => {
            for path in &event.paths {
                push(path, ChangeKind::Modified);
            }
        }
        _ => {}
    }

    out
}

/// Check if path is a temp/backup file (editor artifacts).
fn is_temp_file(path: &std::path::Path) -> bool {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

    matches!(ext, "bck" | "bak" | "backup" | "swp" | "swo" | "tmp")
        || name.ends_with('~')
        || name.starts_with('.')
}
