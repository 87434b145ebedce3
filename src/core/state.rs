//! Build state tracking for serve mode.
//!
//! Three orthogonal states:
//! - `SERVING`: Is the project ready to serve requests? (initial scan complete)
//! - `HEALTHY`: Did the last scan/build cycle succeed? (hot-reload vs retry scan)
//! - `SHUTDOWN`: Has shutdown been requested? (Ctrl+C received)

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use tiny_http::Server;

/// Project is ready to serve requests (initial scan complete)
/// - `false`: Show loading page
/// - `true`: Serve normally
static SERVING: AtomicBool = AtomicBool::new(false);

/// Last scan/build cycle succeeded
/// - `false`: Next file change triggers a full rescan
/// - `true`: Next file change triggers an incremental rebuild
static HEALTHY: AtomicBool = AtomicBool::new(false);

/// Shutdown has been requested (Ctrl+C received)
static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// HTTP server reference for graceful shutdown
static SERVER: OnceLock<Arc<Server>> = OnceLock::new();

/// Shutdown signal sender for the actor system
static SHUTDOWN_TX: OnceLock<crossbeam::channel::Sender<()>> = OnceLock::new();

// =============================================================================
// SERVING state
// =============================================================================

/// Check if the project is ready to serve requests
pub fn is_serving() -> bool {
    SERVING.load(Ordering::SeqCst)
}

/// Mark the project as ready to serve (call after the initial scan completes)
pub fn set_serving() {
    SERVING.store(true, Ordering::SeqCst);
}

// =============================================================================
// HEALTHY state
// =============================================================================

/// Check if the last scan/build cycle succeeded
pub fn is_healthy() -> bool {
    HEALTHY.load(Ordering::SeqCst)
}

/// Set the health state
pub fn set_healthy(healthy: bool) {
    HEALTHY.store(healthy, Ordering::SeqCst);
}

// =============================================================================
// SHUTDOWN state
// =============================================================================

/// Setup the global Ctrl+C handler. Call once at program start
///
/// The handler behavior depends on whether a server has been registered:
/// - Before `register_server()`: sets SHUTDOWN, process exits with code 130
/// - After `register_server()`: graceful shutdown (unblock server, notify actors)
pub fn setup_shutdown_handler() -> anyhow::Result<()> {
    ctrlc::set_handler(|| {
        request_shutdown();

        if SERVER.get().is_none() {
            // No server registered yet (e.g., during config load)
            std::process::exit(super::EXIT_INTERRUPTED);
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))
}

/// Request shutdown programmatically (also invoked by the Ctrl+C handler)
pub fn request_shutdown() {
    SHUTDOWN.store(true, Ordering::SeqCst);

    // Notify actor system
    if let Some(tx) = SHUTDOWN_TX.get() {
        let _ = tx.send(());
    }

    // Unblock HTTP server
    if let Some(server) = SERVER.get() {
        crate::log!("serve"; "shutting down...");
        server.unblock();
    }
}

/// Register the HTTP server for graceful shutdown
///
/// Call this after binding the server, before entering the request loop
pub fn register_server(server: Arc<Server>, shutdown_tx: crossbeam::channel::Sender<()>) {
    let _ = SERVER.set(server);
    let _ = SHUTDOWN_TX.set(shutdown_tx);
}

/// Check if shutdown has been requested
///
/// Uses Relaxed ordering for performance - worst case is processing
/// a few more items before stopping, which is acceptable
pub fn is_shutdown() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serving() {
        SERVING.store(false, Ordering::SeqCst);
        assert!(!is_serving());

        set_serving();
        assert!(is_serving());
    }

    #[test]
    fn test_healthy() {
        set_healthy(false);
        assert!(!is_healthy());

        set_healthy(true);
        assert!(is_healthy());
    }
}
