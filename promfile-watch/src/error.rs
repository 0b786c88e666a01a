use std::path::PathBuf;

use thiserror::Error;

/// Setup failures returned synchronously by [`crate::watch`].
///
/// Conditions that end a running watch (removal, rename, symlink drift,
/// notifier failure) are never reported here; they close the handle.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("file does not exist: {path}")]
    NotFound { path: PathBuf },

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("task failure: {0}")]
    Task(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> WatchError {
    WatchError::Io {
        path: path.into(),
        source,
    }
}
