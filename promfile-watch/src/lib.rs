//! Watch a single file for content changes, including files reached through
//! symbolic links that get atomically repointed (mounted config volumes).
//!
//! [`watch`] returns a [`WatchHandle`] that yields one unit signal per
//! observed content change and closes when the watch can no longer be trusted:
//! the file was removed or renamed, a link in its resolution chain was
//! repointed, the notifier failed, or the caller cancelled. After an
//! unprompted closure the caller re-invokes [`watch`] on the same path.

pub mod chain;
mod error;
pub mod file;
pub mod trace;
mod watch;

pub use chain::{watch_chain, DEFAULT_CHAIN_POLL_INTERVAL};
pub use error::WatchError;
pub use file::{classify, watch_file, EventClass};
pub use trace::{trace_symlinks, SymlinkChain, SymlinkEdge, MAX_SYMLINK_HOPS};
pub use watch::{watch, watch_with_config, WatchConfig, WatchHandle};
