use std::path::PathBuf;
use std::time::SystemTime;

/// What happened to a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
}

impl ChangeKind {
    pub fn label(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
            Self::Removed => "removed",
        }
    }
}

/// A debounced filesystem change. Renames arrive as two events:
/// Removed(old) followed by Created(new).
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub timestamp: SystemTime,
}

impl ChangeEvent {
    pub fn now(path: PathBuf, kind: ChangeKind) -> Self {
        Self {
            path,
            kind,
            timestamp: SystemTime::now(),
        }
    }
}

/// A batch of debounced changes emitted together.
#[derive(Debug, Default)]
pub struct ChangeBatch(pub Vec<ChangeEvent>);

impl ChangeBatch {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &std::path::Path> {
        self.0.iter().map(|e| e.path.as_path())
    }

    /// Split into (created, modified, removed) path lists.
    pub fn split(self) -> (Vec<PathBuf>, Vec<PathBuf>, Vec<PathBuf>) {
        let mut created = Vec::new();
        let mut modified = Vec::new();
        let mut removed = Vec::new();

        for event in self.0 {
            match event.kind {
                ChangeKind::Created => created.push(event.path),
                ChangeKind::Modified => modified.push(event.path),
                ChangeKind::Removed => removed.push(event.path),
            }
        }

        (created, modified, removed)
    }
}
