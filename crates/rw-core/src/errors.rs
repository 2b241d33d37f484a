use std::path::PathBuf;

use thiserror::Error;

/// Settings backend failures.
///
/// Callers treat every variant as fatal for the current operation.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error on settings file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Settings file '{path}' is corrupted: {source}")]
    Corrupted {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Settings lock is held by another process")]
    LockTimeout,

    #[error("Settings lock poisoned")]
    Poisoned,

    #[error(
        "Project directories are unavailable - this usually indicates an unsupported OS or missing home directory"
    )]
    ProjectDirectoriesUnavailable,
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
