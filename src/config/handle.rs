//! Global config with atomic reload support.
//!
//! Uses `arc-swap` for lock-free reads and atomic config replacement.
//! This enables hot-reloading of `templar.yml` during watch mode.

use std::sync::{Arc, LazyLock};

use anyhow::Result;
use arc_swap::ArcSwap;

use super::TemplarConfig;

/// Global config storage.
pub static CONFIG: LazyLock<ArcSwap<TemplarConfig>> =
    LazyLock::new(|| ArcSwap::from_pointee(TemplarConfig::default()));

/// Hash of the current config file content, for change detection.
static CONFIG_HASH: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);

#[inline]
pub fn cfg() -> Arc<TemplarConfig> {
    CONFIG.load_full()
}

#[inline]
pub fn init_config(config: TemplarConfig) -> Arc<TemplarConfig> {
    if config.config_path.exists()
        && let Ok(content) = std::fs::read(&config.config_path)
    {
        CONFIG_HASH.store(content_hash(&content), std::sync::atomic::Ordering::Relaxed);
    }

    let arc = Arc::new(config);
    CONFIG.store(Arc::clone(&arc));
    arc
}

/// Reload config from disk if its content changed.
///
/// Returns `Ok(true)` if config was updated, `Ok(false)` if unchanged.
pub fn reload_config() -> Result<bool> {
    let current = cfg();
    let cli = current
        .cli
        .expect("CLI should be set during initialization");

    let content = std::fs::read(&current.config_path)?;
    let new_hash = content_hash(&content);

    let old_hash = CONFIG_HASH.load(std::sync::atomic::Ordering::Relaxed);
    if new_hash == old_hash {
        return Ok(false);
    }

    let new_config = TemplarConfig::load(cli)?;
    CONFIG.store(Arc::new(new_config));
    CONFIG_HASH.store(new_hash, std::sync::atomic::Ordering::Relaxed);

    Ok(true)
}

/// Truncated blake3 used only for content-change detection.
fn content_hash(bytes: &[u8]) -> u64 {
    let hash = blake3::hash(bytes);
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&hash.as_bytes()[..8]);
    u64::from_le_bytes(buf)
}
