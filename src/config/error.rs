//! Configuration error taxonomy. All variants are fatal at startup.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid or missing configuration. Surfaced at startup with the file path
/// and the offending field; the process exits with code 2.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{}: cannot read config: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("invalid value for `{field}`: {reason}")]
    Field { field: String, reason: String },
}

impl ConfigError {
    pub fn field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Field {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
