//! Pure debouncer: per-path sliding windows, no business logic.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use rustc_hash::FxHashMap;

use super::types::{ChangeBatch, ChangeEvent, ChangeKind};

/// Sliding window: further activity on a path extends its window.
pub(super) const DEBOUNCE_MS: u64 = 300;
/// Upper bound: a path continuously busy for this long is emitted anyway.
pub(super) const FLUSH_MS: u64 = 2_000;

struct Pending {
    kind: ChangeKind,
    first_seen: Instant,
    last_seen: Instant,
}

/// Coalesces rapid repeated events per path.
///
/// Emission rule: a path is ready when its window elapsed with no further
/// activity, or when the flush bound has passed since its first event.
pub(super) struct Debouncer {
    changes: FxHashMap<PathBuf, Pending>,
    window: Duration,
    flush: Duration,
}

impl Debouncer {
    pub(super) fn new() -> Self {
        Self::with_window(Duration::from_millis(DEBOUNCE_MS), Duration::from_millis(FLUSH_MS))
    }

    pub(super) fn with_window(window: Duration, flush: Duration) -> Self {
        Self {
            changes: FxHashMap::default(),
            window,
            flush,
        }
    }

    /// Record a change, applying merge rules:
    /// - Removed + Created/Modified → the restore event wins
    /// - Modified + Removed → upgrade to Removed
    /// - Created + Removed → appeared then vanished, discard entirely
    /// - otherwise the first kind wins; the window always extends
    pub(super) fn add(&mut self, path: PathBuf, kind: ChangeKind) {
        let now = Instant::now();

        if let Some(pending) = self.changes.get_mut(&path) {
            match (pending.kind, kind) {
                (ChangeKind::Removed, ChangeKind::Created | ChangeKind::Modified) => {
                    crate::debug!("watch"; "restore removed->{}: {}", kind.label(), path.display());
                    pending.kind = kind;
                }
                (ChangeKind::Modified, ChangeKind::Removed) => {
                    crate::debug!("watch"; "upgrade modified->removed: {}", path.display());
                    pending.kind = ChangeKind::Removed;
                }
                (ChangeKind::Created, ChangeKind::Removed) => {
                    crate::debug!("watch"; "discard created+removed: {}", path.display());
                    self.changes.remove(&path);
                    return;
                }
                _ => {}
            }
            if let Some(pending) = self.changes.get_mut(&path) {
                pending.last_seen = now;
            }
            return;
        }

        crate::debug!("watch"; "event {}: {}", kind.label(), path.display());
        self.changes.insert(
            path,
            Pending {
                kind,
                first_seen: now,
                last_seen: now,
            },
        );
    }

    /// Take every path whose window elapsed (or flush bound hit).
    pub(super) fn take_ready(&mut self) -> ChangeBatch {
        let now = Instant::now();
        let window = self.window;
        let flush = self.flush;

        let ready: Vec<PathBuf> = self
            .changes
            .iter()
            .filter(|(_, p)| {
                now.duration_since(p.last_seen) >= window
                    || now.duration_since(p.first_seen) >= flush
            })
            .map(|(path, _)| path.clone())
            .collect();

        let mut batch = Vec::with_capacity(ready.len());
        for path in ready {
            if let Some(pending) = self.changes.remove(&path) {
                batch.push(ChangeEvent::now(path, pending.kind));
            }
        }
        ChangeBatch(batch)
    }

    /// Time until the earliest path could become ready.
    pub(super) fn sleep_duration(&self) -> Duration {
        let now = Instant::now();
        let mut earliest = Duration::from_secs(86_400);

        for pending in self.changes.values() {
            let window_left = self.window.saturating_sub(now.duration_since(pending.last_seen));
            let flush_left = self.flush.saturating_sub(now.duration_since(pending.first_seen));
            earliest = earliest.min(window_left.min(flush_left));
        }

        earliest.max(Duration::from_millis(1))
    }

    pub(super) fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn path(s: &str) -> PathBuf {
        Path::new(s).to_path_buf()
    }

    #[test]
    fn test_zero_window_emits_immediately() {
        let mut d = Debouncer::with_window(Duration::ZERO, Duration::from_secs(2));
        d.add(path("a.templ"), ChangeKind::Modified);

        let batch = d.take_ready();
        assert_eq!(batch.0.len(), 1);
        assert!(d.is_empty());
    }

    #[test]
    fn test_window_holds_recent_events() {
        let mut d = Debouncer::new();
        d.add(path("a.templ"), ChangeKind::Modified);

        assert!(d.take_ready().is_empty());
        assert!(!d.is_empty());
    }

    #[test]
    fn test_activity_extends_window() {
        let mut d = Debouncer::with_window(Duration::from_millis(30), Duration::from_secs(2));
        d.add(path("a.templ"), ChangeKind::Modified);
        std::thread::sleep(Duration::from_millis(20));
        d.add(path("a.templ"), ChangeKind::Modified);
        std::thread::sleep(Duration::from_millis(20));

        // 40ms since first event but only 20ms since last: still held.
        assert!(d.take_ready().is_empty());

        std::thread::sleep(Duration::from_millis(15));
        assert_eq!(d.take_ready().0.len(), 1);
    }

    #[test]
    fn test_flush_bound_forces_emission() {
        let mut d = Debouncer::with_window(Duration::from_secs(60), Duration::from_millis(20));
        d.add(path("a.templ"), ChangeKind::Modified);
        std::thread::sleep(Duration::from_millis(25));

        // Window never elapsed, flush bound did.
        assert_eq!(d.take_ready().0.len(), 1);
    }

    #[test]
    fn test_created_then_removed_discards() {
        let mut d = Debouncer::with_window(Duration::ZERO, Duration::from_secs(2));
        d.add(path("a.templ"), ChangeKind::Created);
        d.add(path("a.templ"), ChangeKind::Removed);

        assert!(d.take_ready().is_empty());
        assert!(d.is_empty());
    }

    #[test]
    fn test_modified_then_removed_upgrades() {
        let mut d = Debouncer::with_window(Duration::ZERO, Duration::from_secs(2));
        d.add(path("a.templ"), ChangeKind::Modified);
        d.add(path("a.templ"), ChangeKind::Removed);

        let batch = d.take_ready();
        assert_eq!(batch.0.len(), 1);
        assert_eq!(batch.0[0].kind, ChangeKind::Removed);
    }

    #[test]
    fn test_removed_then_created_restores() {
        let mut d = Debouncer::with_window(Duration::ZERO, Duration::from_secs(2));
        d.add(path("a.templ"), ChangeKind::Removed);
        d.add(path("a.templ"), ChangeKind::Created);

        let batch = d.take_ready();
        assert_eq!(batch.0[0].kind, ChangeKind::Created);
    }

    #[test]
    fn test_independent_paths_have_independent_windows() {
        let mut d = Debouncer::with_window(Duration::from_millis(30), Duration::from_secs(2));
        d.add(path("old.templ"), ChangeKind::Modified);
        std::thread::sleep(Duration::from_millis(35));
        d.add(path("new.templ"), ChangeKind::Modified);

        let batch = d.take_ready();
        assert_eq!(batch.0.len(), 1);
        assert_eq!(batch.0[0].path, path("old.templ"));
    }

    #[test]
    fn test_sleep_duration_tracks_earliest() {
        let mut d = Debouncer::new();
        assert!(d.sleep_duration() >= Duration::from_secs(3600));

        d.add(path("a.templ"), ChangeKind::Modified);
        assert!(d.sleep_duration() <= Duration::from_millis(DEBOUNCE_MS));
    }
}
