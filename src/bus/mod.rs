//! Typed in-process publish/subscribe.
//!
//! Each subscriber owns a bounded intake queue. `publish` never blocks: when
//! a subscriber's queue is full the oldest queued event is discarded and the
//! subscriber's drop counter incremented. Ordering is preserved
//! per-subscriber; no ordering is guaranteed across subscribers.

mod event;

pub use event::{BuildStatus, Event, EventKind};

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

/// Default per-subscriber queue capacity.
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Cheaply cloneable handle to the bus. All clones publish to the same
/// subscriber set.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

struct BusInner {
    subscribers: Mutex<Vec<Subscriber>>,
    next_id: AtomicU64,
}

struct Subscriber {
    id: u64,
    mask: u16,
    tx: Sender<Event>,
    /// Receiver clone kept for drop-oldest on overflow.
    rx: Receiver<Event>,
    dropped: Arc<AtomicU64>,
}

/// A live subscription. Dropping it unsubscribes synchronously and closes
/// the intake queue.
pub struct Subscription {
    id: u64,
    rx: Receiver<Event>,
    dropped: Arc<AtomicU64>,
    bus: Arc<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BusInner {
                subscribers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Subscribe to the given event kinds with the default queue capacity.
    pub fn subscribe(&self, kinds: &[EventKind]) -> Subscription {
        self.subscribe_with_capacity(kinds, DEFAULT_QUEUE_CAPACITY)
    }

    /// Subscribe with an explicit intake queue capacity.
    pub fn subscribe_with_capacity(&self, kinds: &[EventKind], capacity: usize) -> Subscription {
        let mask = kinds.iter().fold(0u16, |m, k| m | k.bit());
        let (tx, rx) = channel::bounded(capacity.max(1));
        let dropped = Arc::new(AtomicU64::new(0));
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);

        self.inner.subscribers.lock().push(Subscriber {
            id,
            mask,
            tx,
            rx: rx.clone(),
            dropped: Arc::clone(&dropped),
        });

        Subscription {
            id,
            rx,
            dropped,
            bus: Arc::clone(&self.inner),
        }
    }

    /// Publish an event to all matching subscribers. Never blocks.
    pub fn publish(&self, event: Event) {
        let bit = event.kind().bit();
        let subscribers = self.inner.subscribers.lock();

        for sub in subscribers.iter() {
            if sub.mask & bit == 0 {
                continue;
            }
            Self::offer(sub, event.clone());
        }
    }

    /// Deliver to one subscriber with drop-oldest on overflow.
    fn offer(sub: &Subscriber, event: Event) {
        let mut event = event;
        // Two attempts: free one slot, retry. A concurrent reader can only
        // make more room, never less.
        for _ in 0..2 {
            match sub.tx.try_send(event) {
                Ok(()) => return,
                Err(channel::TrySendError::Full(e)) => {
                    if sub.rx.try_recv().is_ok() {
                        sub.dropped.fetch_add(1, Ordering::Relaxed);
                    }
                    event = e;
                }
                // Subscriber side already dropped; unsubscribe will reap it.
                Err(channel::TrySendError::Disconnected(_)) => return,
            }
        }
        // Queue still full after freeing a slot: drop the new event instead.
        sub.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl Subscription {
    /// Blocking receive. Returns None when the bus side is gone.
    pub fn recv(&self) -> Option<Event> {
        self.rx.recv().ok()
    }

    /// Non-blocking receive.
    pub fn try_recv(&self) -> Option<Event> {
        match self.rx.try_recv() {
            Ok(e) => Some(e),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Receive with a timeout. Returns None on timeout or disconnect.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<Event> {
        match self.rx.recv_timeout(timeout) {
            Ok(e) => Some(e),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Events dropped due to queue overflow since subscribing.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        // Synchronous unsubscribe: the publisher-side sender is removed
        // under the lock, so no event is delivered after this returns.
        self.bus.subscribers.lock().retain(|s| s.id != self.id);
    }
}
