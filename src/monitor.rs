//! Metrics collaborator.
//!
//! Components receive an explicit `Arc<dyn Monitor>` at construction instead
//! of reaching for a global. `NoopMonitor` is used when monitoring is
//! disabled; `DevMonitor` keeps simple counters for the health endpoint.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Observation points the core emits. All methods must be cheap and
/// non-blocking; implementations may not panic.
pub trait Monitor: Send + Sync {
    fn build_started(&self, _component: &str) {}
    fn build_finished(&self, _component: &str, _status: &str, _duration: Duration) {}
    fn event_dropped(&self, _subscriber: &str) {}
    fn client_connected(&self) {}
    fn client_disconnected(&self) {}
    fn client_shed(&self) {}
}

/// Used when monitoring is disabled.
pub struct NoopMonitor;

impl Monitor for NoopMonitor {}

/// Counter snapshot from `DevMonitor`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MonitorSnapshot {
    pub builds_started: u64,
    pub builds_succeeded: u64,
    pub builds_failed: u64,
    pub builds_cached: u64,
    pub events_dropped: u64,
    pub clients_connected: u64,
    pub clients_shed: u64,
}

/// Atomic-counter monitor for the dev loop.
#[derive(Default)]
pub struct DevMonitor {
    builds_started: AtomicU64,
    builds_succeeded: AtomicU64,
    builds_failed: AtomicU64,
    builds_cached: AtomicU64,
    events_dropped: AtomicU64,
    clients_connected: AtomicU64,
    clients_shed: AtomicU64,
}

impl DevMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            builds_started: self.builds_started.load(Ordering::Relaxed),
            builds_succeeded: self.builds_succeeded.load(Ordering::Relaxed),
            builds_failed: self.builds_failed.load(Ordering::Relaxed),
            builds_cached: self.builds_cached.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
            clients_connected: self.clients_connected.load(Ordering::Relaxed),
            clients_shed: self.clients_shed.load(Ordering::Relaxed),
        }
    }
}

impl Monitor for DevMonitor {
    fn build_started(&self, _component: &str) {
        self.builds_started.fetch_add(1, Ordering::Relaxed);
    }

    fn build_finished(&self, _component: &str, status: &str, _duration: Duration) {
        let counter = match status {
            "success" => &self.builds_succeeded,
            "cached" => &self.builds_cached,
            _ => &self.builds_failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn event_dropped(&self, _subscriber: &str) {
        self.events_dropped.fetch_add(1, Ordering::Relaxed);
    }

    fn client_connected(&self) {
        self.clients_connected.fetch_add(1, Ordering::Relaxed);
    }

    fn client_disconnected(&self) {}

    fn client_shed(&self) {
        self.clients_shed.fetch_add(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dev_monitor_counts_by_status() {
        let monitor = DevMonitor::new();
        monitor.build_started("A");
        monitor.build_finished("A", "success", Duration::from_millis(5));
        monitor.build_started("B");
        monitor.build_finished("B", "cached", Duration::from_millis(1));
        monitor.build_started("C");
        monitor.build_finished("C", "failure", Duration::from_millis(9));

        let snap = monitor.snapshot();
        assert_eq!(snap.builds_started, 3);
        assert_eq!(snap.builds_succeeded, 1);
        assert_eq!(snap.builds_cached, 1);
        assert_eq!(snap.builds_failed, 1);
    }

    #[test]
    fn test_noop_monitor_is_callable() {
        let monitor = NoopMonitor;
        monitor.build_started("A");
        monitor.client_shed();
    }
}
