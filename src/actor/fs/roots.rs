use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use rustc_hash::FxHashSet;

/// Watch-root consistency manager.
///
/// Responsibility:
/// - Attach existing roots at startup
/// - Re-attach roots that were removed and recreated
/// - Track added/removed roots at runtime
pub(super) struct WatchRoots {
    desired: Vec<PathBuf>,
    attached: FxHashSet<PathBuf>,
}

impl WatchRoots {
    pub(super) fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            desired: paths,
            attached: FxHashSet::default(),
        }
    }

    /// Attach all existing roots. Unwatchable roots (permission denied,
    /// vanished) log a warning and are skipped; the watcher continues on
    /// the remaining roots.
    pub(super) fn attach_existing(&mut self, watcher: &mut RecommendedWatcher) {
        let desired = std::mem::take(&mut self.desired);
        for path in &desired {
            if !path.exists() {
                crate::log!("watch"; "scan root missing, will re-attach when created: {}", path.display());
                continue;
            }
            match watcher.watch(path, RecursiveMode::Recursive) {
                Ok(()) => {
                    self.attached.insert(path.clone());
                }
                Err(err) => {
                    crate::log!("watch"; "cannot watch {}: {}", path.display(), err);
                }
            }
        }
        self.desired = desired;
    }

    /// Ensure every desired root that exists is attached.
    pub(super) fn maintain(&mut self, watcher: &mut RecommendedWatcher) {
        // Drop stale handles for roots that no longer exist.
        self.attached.retain(|path| path.exists());

        for path in &self.desired {
            if self.attached.contains(path) || !path.exists() {
                continue;
            }

            if watcher.watch(path, RecursiveMode::Recursive).is_ok() {
                self.attached.insert(path.clone());
                crate::debug!("watch"; "re-attached watch: {}", path.display());
            }
        }
    }

    /// Add a root at runtime.
    pub(super) fn add(&mut self, watcher: &mut RecommendedWatcher, path: PathBuf) {
        if !self.desired.contains(&path) {
            self.desired.push(path.clone());
        }
        if path.exists() && watcher.watch(&path, RecursiveMode::Recursive).is_ok() {
            self.attached.insert(path);
        }
    }

    /// Remove a root at runtime.
    pub(super) fn remove(&mut self, watcher: &mut RecommendedWatcher, path: &Path) {
        self.desired.retain(|p| p != path);
        if self.attached.remove(path) {
            let _ = watcher.unwatch(path);
        }
    }

    pub(super) fn roots(&self) -> &[PathBuf] {
        &self.desired
    }
}
