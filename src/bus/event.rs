//! Event types routed by the bus.

use std::path::PathBuf;
use std::time::Duration;

use crate::actor::fs::ChangeEvent;
use crate::core::Diagnostic;

/// Outcome of a completed (non-failed) build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildStatus {
    /// The generator ran and produced a fresh artifact.
    Success,
    /// The artifact was served from the content-addressed cache.
    Cached,
}

impl BuildStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Cached => "cached",
        }
    }
}

/// Value-typed event routed through the bus. The bus owns no data; every
/// event is a self-contained value.
#[derive(Debug, Clone)]
pub enum Event {
    /// A debounced filesystem change passed the watcher's filter chain.
    FileChanged(ChangeEvent),
    /// A component entered the registry (new or replaced).
    ComponentRegistered { name: String },
    /// A component left the registry.
    ComponentRemoved { name: String },
    /// The pipeline started building a component.
    BuildStarted { name: String },
    /// A build finished without failure.
    BuildCompleted {
        name: String,
        status: BuildStatus,
        duration: Duration,
        /// Whether the artifact bytes differ from the previous build.
        artifact_changed: bool,
    },
    /// The generator exited non-zero (or retries were exhausted).
    BuildFailed {
        name: String,
        diagnostics: Vec<Diagnostic>,
    },
    /// A reload should reach connected clients, independent of a build.
    ReloadRequested { components: Vec<String> },
    /// The notify facility dropped events; consumers must rescan this root.
    Resync { root: PathBuf },
}

/// Discriminant used for subscription filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum EventKind {
    FileChanged = 1 << 0,
    ComponentRegistered = 1 << 1,
    ComponentRemoved = 1 << 2,
    BuildStarted = 1 << 3,
    BuildCompleted = 1 << 4,
    BuildFailed = 1 << 5,
    ReloadRequested = 1 << 6,
    Resync = 1 << 7,
}

impl EventKind {
    /// All kinds, for subscribe-to-everything consumers.
    pub const ALL: &'static [EventKind] = &[
        EventKind::FileChanged,
        EventKind::ComponentRegistered,
        EventKind::ComponentRemoved,
        EventKind::BuildStarted,
        EventKind::BuildCompleted,
        EventKind::BuildFailed,
        EventKind::ReloadRequested,
        EventKind::Resync,
    ];

    pub(super) fn bit(self) -> u16 {
        self as u16
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::FileChanged(_) => EventKind::FileChanged,
            Event::ComponentRegistered { .. } => EventKind::ComponentRegistered,
            Event::ComponentRemoved { .. } => EventKind::ComponentRemoved,
            Event::BuildStarted { .. } => EventKind::BuildStarted,
            Event::BuildCompleted { .. } => EventKind::BuildCompleted,
            Event::BuildFailed { .. } => EventKind::BuildFailed,
            Event::ReloadRequested { .. } => EventKind::ReloadRequested,
            Event::Resync { .. } => EventKind::Resync,
        }
    }
}
