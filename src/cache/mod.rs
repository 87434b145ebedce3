//! Content-addressed build cache.
//!
//! In-memory LRU bounded by entry count and aggregate artifact bytes, with
//! optional disk spill. Safe for concurrent lookup and store; stores to an
//! existing fingerprint are idempotent.

mod disk;
mod fingerprint;
mod persist;

pub use disk::{CacheError, DiskCache};
pub use fingerprint::{ContentHash, Fingerprint, hash_bytes, hash_file};
pub use persist::{
    PersistedDiagnostics, PersistedFailure, STATE_DIR, persist_diagnostics, restore_diagnostics,
};

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use lru::LruCache;
use parking_lot::Mutex;

use crate::core::Diagnostic;

/// A cached build output.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Opaque artifact bytes (shared; clones are cheap).
    pub artifact: Arc<Vec<u8>>,
    pub diagnostics: Vec<Diagnostic>,
    pub size: u64,
}

/// Counters exposed by `stats()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub total_bytes: u64,
    pub hits: u64,
    pub misses: u64,
    pub stores: u64,
    pub evictions: u64,
}

struct Inner {
    entries: LruCache<Fingerprint, CacheEntry>,
    total_bytes: u64,
}

pub struct BuildCache {
    inner: Mutex<Inner>,
    disk: Option<DiskCache>,
    max_entries: usize,
    max_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
    stores: AtomicU64,
    evictions: AtomicU64,
}

impl BuildCache {
    /// Create a cache bounded by entry count and total artifact bytes.
    /// A backing directory enables disk spill.
    pub fn new(max_entries: usize, max_bytes: u64, backing_dir: Option<PathBuf>) -> Self {
        let disk = backing_dir.and_then(|dir| match DiskCache::open(dir) {
            Ok(disk) => Some(disk),
            Err(e) => {
                crate::log!("cache"; "disabling persistent cache: {}", e);
                None
            }
        });

        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                total_bytes: 0,
            }),
            disk,
            max_entries: max_entries.max(1),
            max_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stores: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Build from configuration.
    pub fn from_config(config: &crate::config::TemplarConfig) -> Self {
        Self::new(
            config.build.cache_max_entries,
            config.build.cache_max_bytes,
            config.cache_dir(),
        )
    }

    /// Look up a fingerprint, consulting memory then disk. A disk hit is
    /// promoted into memory.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Option<CacheEntry> {
        if let Some(entry) = self.inner.lock().entries.get(fingerprint).cloned() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry);
        }

        if let Some(disk) = &self.disk {
            match disk.load(fingerprint) {
                Ok(Some((artifact, diagnostics))) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    let entry = CacheEntry {
                        size: artifact.len() as u64,
                        artifact: Arc::new(artifact),
                        diagnostics,
                    };
                    self.insert(*fingerprint, entry.clone());
                    return Some(entry);
                }
                Ok(None) => {}
                Err(e) => {
                    // Corrupt entry already removed; treated as a miss.
                    crate::log!("cache"; "{}", e);
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store an artifact under a fingerprint. Idempotent.
    pub fn store(&self, fingerprint: Fingerprint, artifact: Vec<u8>, diagnostics: Vec<Diagnostic>) {
        {
            let inner = self.inner.lock();
            if inner.entries.contains(&fingerprint) {
                return;
            }
        }

        if let Some(disk) = &self.disk
            && let Err(e) = disk.store(&fingerprint, &artifact, &diagnostics)
        {
            crate::log!("cache"; "spill failed: {}", e);
        }

        let entry = CacheEntry {
            size: artifact.len() as u64,
            artifact: Arc::new(artifact),
            diagnostics,
        };
        self.stores.fetch_add(1, Ordering::Relaxed);
        self.insert(fingerprint, entry);
    }

    fn insert(&self, fingerprint: Fingerprint, entry: CacheEntry) {
        let mut inner = self.inner.lock();
        if inner.entries.contains(&fingerprint) {
            return;
        }
        inner.total_bytes += entry.size;
        inner.entries.put(fingerprint, entry);
        self.evict_to_bounds(&mut inner);
    }

    /// Evict least-recently-used entries until both bounds hold.
    fn evict_to_bounds(&self, inner: &mut Inner) {
        while inner.entries.len() > self.max_entries || inner.total_bytes > self.max_bytes {
            let Some((_, evicted)) = inner.entries.pop_lru() else {
                break;
            };
            inner.total_bytes = inner.total_bytes.saturating_sub(evicted.size);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Evict down to explicit bounds (operational pressure relief).
    pub fn evict(&self, max_entries: usize, max_bytes: u64) {
        let mut inner = self.inner.lock();
        while inner.entries.len() > max_entries || inner.total_bytes > max_bytes {
            let Some((_, evicted)) = inner.entries.pop_lru() else {
                break;
            };
            inner.total_bytes = inner.total_bytes.saturating_sub(evicted.size);
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            entries: inner.entries.len(),
            total_bytes: inner.total_bytes,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fp(n: u8) -> Fingerprint {
        Fingerprint::from_bytes([n; 32])
    }

    #[test]
    fn test_lookup_after_store() {
        let cache = BuildCache::new(16, 1 << 20, None);
        cache.store(fp(1), b"artifact".to_vec(), vec![]);

        let entry = cache.lookup(&fp(1)).unwrap();
        assert_eq!(entry.artifact.as_slice(), b"artifact");
        assert_eq!(entry.size, 8);
    }

    #[test]
    fn test_miss_counts() {
        let cache = BuildCache::new(16, 1 << 20, None);
        assert!(cache.lookup(&fp(9)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 0);
    }

    #[test]
    fn test_store_is_idempotent() {
        let cache = BuildCache::new(16, 1 << 20, None);
        cache.store(fp(1), b"first".to_vec(), vec![]);
        cache.store(fp(1), b"second".to_vec(), vec![]);

        assert_eq!(cache.lookup(&fp(1)).unwrap().artifact.as_slice(), b"first");
        assert_eq!(cache.stats().entries, 1);
        assert_eq!(cache.stats().total_bytes, 5);
    }

    #[test]
    fn test_entry_count_bound_evicts_lru() {
        let cache = BuildCache::new(2, 1 << 20, None);
        cache.store(fp(1), b"a".to_vec(), vec![]);
        cache.store(fp(2), b"b".to_vec(), vec![]);

        // Touch 1 so 2 becomes least-recently-used.
        cache.lookup(&fp(1));
        cache.store(fp(3), b"c".to_vec(), vec![]);

        assert!(cache.lookup(&fp(2)).is_none());
        assert!(cache.lookup(&fp(1)).is_some());
        assert!(cache.lookup(&fp(3)).is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_byte_bound_evicts() {
        let cache = BuildCache::new(100, 10, None);
        cache.store(fp(1), vec![0; 6], vec![]);
        cache.store(fp(2), vec![0; 6], vec![]);

        // 12 bytes > 10: the older entry is evicted.
        assert!(cache.lookup(&fp(1)).is_none());
        assert!(cache.lookup(&fp(2)).is_some());
    }

    #[test]
    fn test_disk_spill_survives_memory_eviction() {
        let dir = TempDir::new().unwrap();
        let cache = BuildCache::new(1, 1 << 20, Some(dir.path().to_path_buf()));

        cache.store(fp(1), b"persisted".to_vec(), vec![]);
        cache.store(fp(2), b"evictor".to_vec(), vec![]);

        // fp(1) was evicted from memory but spills back in from disk.
        let entry = cache.lookup(&fp(1)).unwrap();
        assert_eq!(entry.artifact.as_slice(), b"persisted");
    }

    #[test]
    fn test_explicit_evict() {
        let cache = BuildCache::new(100, 1 << 20, None);
        for i in 0..5 {
            cache.store(fp(i), vec![0; 4], vec![]);
        }
        cache.evict(2, u64::MAX);
        assert_eq!(cache.stats().entries, 2);
    }
}
