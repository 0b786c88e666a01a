use std::path::PathBuf;

use promfile_watch::WatchError;
use thiserror::Error;

/// Error surface for content loading, the HTTP endpoint and the runtime.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("file is empty: {path}")]
    EmptyContent { path: PathBuf },

    #[error("watch error: {0}")]
    Watch(#[from] WatchError),

    #[error("task failure: {0}")]
    Task(String),
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ServerError {
    ServerError::Io {
        path: path.into(),
        source,
    }
}
