//! Serve the bytes of one file over HTTP and keep them fresh as the file,
//! or the symlinks leading to it, change on disk.

pub mod content;
mod error;
pub mod http;
mod runtime;

pub use content::{ContentStatus, ContentStore};
pub use error::ServerError;
pub use runtime::{
    init_tracing, run, start_blocking, LogFormat, ServeConfig, Server, DEFAULT_LISTEN,
    DEFAULT_REWATCH_DELAY,
};
