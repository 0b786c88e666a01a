use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::chain::{watch_chain, DEFAULT_CHAIN_POLL_INTERVAL};
use crate::error::{io_err, WatchError};
use crate::file::watch_file;
use crate::trace::trace_symlinks;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// How often the symlink chain is re-read. Bounds the latency with which
    /// a repointed link closes the watch.
    pub chain_poll_interval: Duration,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            chain_poll_interval: DEFAULT_CHAIN_POLL_INTERVAL,
        }
    }
}

/// Receiving end of a watch.
///
/// Each value means "the file may have changed, re-read it". Closure means the
/// watch is over: either the caller cancelled it, or it must be recreated with
/// another call to [`watch`]. The handle carries no reason; callers tell the
/// two apart by checking their own cancellation token.
///
/// Delivery is backpressured: a consumer that stops draining the handle stalls
/// the watch, so drain it promptly.
#[derive(Debug)]
pub struct WatchHandle {
    path: PathBuf,
    changes: mpsc::Receiver<()>,
}

impl WatchHandle {
    /// Wait for the next change signal; `None` once the watch has ended.
    pub async fn changed(&mut self) -> Option<()> {
        self.changes.recv().await
    }

    pub fn is_closed(&self) -> bool {
        self.changes.is_closed()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Watch `path` with the default configuration.
pub async fn watch(
    cancel: CancellationToken,
    path: impl AsRef<Path>,
) -> Result<WatchHandle, WatchError> {
    watch_with_config(cancel, path, &WatchConfig::default()).await
}

/// Start watching `path`.
///
/// Fails if the path does not exist or the notifier cannot subscribe to it;
/// nothing keeps running in that case. Must be called from within a tokio
/// runtime.
pub async fn watch_with_config(
    cancel: CancellationToken,
    path: impl AsRef<Path>,
    config: &WatchConfig,
) -> Result<WatchHandle, WatchError> {
    let path = path.as_ref();
    match tokio::fs::metadata(path).await {
        Ok(_) => {}
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(WatchError::NotFound {
                path: path.to_path_buf(),
            });
        }
        Err(err) => return Err(io_err(path, err)),
    }
    let path = std::path::absolute(path).map_err(|e| io_err(path, e))?;

    // Internal tasks live exactly as long as the multiplexer.
    let inner = cancel.child_token();
    let file_rx = match watch_file(inner.clone(), &path) {
        Ok(rx) => rx,
        Err(err) => {
            inner.cancel();
            return Err(err);
        }
    };

    let chain = {
        let path = path.clone();
        match tokio::task::spawn_blocking(move || trace_symlinks(&path)).await {
            Ok(chain) => chain,
            Err(err) => {
                inner.cancel();
                return Err(WatchError::Task(format!("symlink trace join error: {err}")));
            }
        }
    };
    tracing::debug!(path = %path.display(), links = chain.len(), "traced symlink chain");
    let chain_rx = watch_chain(inner.clone(), chain, config.chain_poll_interval);

    let (out_tx, out_rx) = mpsc::channel::<()>(1);
    tokio::spawn(multiplex(path.clone(), inner, file_rx, chain_rx, out_tx));

    Ok(WatchHandle {
        path,
        changes: out_rx,
    })
}

async fn multiplex(
    path: PathBuf,
    cancel: CancellationToken,
    mut file_rx: mpsc::Receiver<()>,
    mut chain_rx: mpsc::Receiver<()>,
    out_tx: mpsc::Sender<()>,
) {
    let _stop_watchers = cancel.clone().drop_guard();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                tracing::debug!(path = %path.display(), "watch cancelled");
                break;
            }
            _ = chain_rx.recv() => {
                tracing::info!(path = %path.display(), "symlink chain changed, watch ended");
                break;
            }
            _ = out_tx.closed() => {
                tracing::debug!(path = %path.display(), "watch handle dropped");
                break;
            }
            change = file_rx.recv() => {
                if change.is_none() {
                    tracing::info!(path = %path.display(), "file watch ended");
                    break;
                }
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => break,
                    sent = out_tx.send(()) => {
                        if sent.is_err() {
                            tracing::debug!(path = %path.display(), "watch handle dropped");
                            break;
                        }
                    }
                }
            }
        }
    }
}
