//! Actor Message Definitions
//!
//! Message types for inter-actor communication.
//!
//! ```text
//! FsActor --BuildMsg--> BuildActor --(bus)--> bridge --HubMsg--> HubActor
//! ```

use std::net::TcpStream;
use std::path::PathBuf;

use super::fs::ChangeBatch;
use crate::core::Diagnostic;

// =============================================================================
// BuildActor Messages
// =============================================================================

/// Messages to the Build Actor
pub enum BuildMsg {
    /// Debounced, filtered filesystem changes
    Changes(ChangeBatch),
    /// The watcher lost events; rescan these roots from scratch
    Resync { roots: Vec<PathBuf> },
    /// Rescan and rebuild everything
    BuildAll,
    /// Shutdown
    Shutdown,
}

// =============================================================================
// HubActor Messages
// =============================================================================

/// Messages to the Broadcast Hub Actor
pub enum HubMsg {
    /// New client connection (pre-handshake TCP stream)
    AddClient(TcpStream),
    /// Request a reload broadcast, scoped to the named components.
    /// Coalesced: bursts within the window produce one message per client.
    Reload { components: Vec<String> },
    /// Build diagnostics for the browser overlay
    Error { diagnostics: Vec<Diagnostic> },
    /// Clear the error overlay (a build succeeded after an error)
    ClearError,
    /// The registry's component set changed
    ComponentsChanged {
        added: Vec<String>,
        removed: Vec<String>,
    },
    /// Shutdown: close all sessions with a close frame
    Shutdown,
}
