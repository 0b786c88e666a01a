//! Polling watcher for the symlink chain of a watched path.
//!
//! No native notification exists for a link being repointed, so the chain is
//! re-read on a fixed interval and compared against the snapshot taken when
//! the watch started. Link changes are therefore observed with up to one
//! interval of latency.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::trace::{SymlinkChain, SymlinkEdge};

pub const DEFAULT_CHAIN_POLL_INTERVAL: Duration = Duration::from_secs(1);

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Debug)]
enum Drift {
    Retargeted { edge: SymlinkEdge, now: PathBuf },
    Unreadable { edge: SymlinkEdge, error: io::Error },
    CheckFailed(String),
}

/// Poll `chain` every `interval` and close the returned receiver as soon as
/// any link no longer reads back as its recorded target.
///
/// The receiver never yields a value: closure is the only signal. It also
/// closes when `cancel` fires. An empty chain is only ever closed by
/// cancellation.
pub fn watch_chain(
    cancel: CancellationToken,
    chain: SymlinkChain,
    interval: Duration,
) -> mpsc::Receiver<()> {
    let (drift_tx, drift_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        let _drift_tx = drift_tx;

        if chain.is_empty() {
            cancel.cancelled().await;
            return;
        }

        let chain = Arc::new(chain);
        let mut ticker = tokio::time::interval(interval.max(MIN_POLL_INTERVAL));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Some(drift) = check_chain(Arc::clone(&chain)).await {
                        log_drift(&drift);
                        break;
                    }
                }
            }
        }
    });

    drift_rx
}

async fn check_chain(chain: Arc<SymlinkChain>) -> Option<Drift> {
    tokio::task::spawn_blocking(move || check_chain_blocking(&chain))
        .await
        .unwrap_or_else(|err| Some(Drift::CheckFailed(format!("chain check join error: {err}"))))
}

fn check_chain_blocking(chain: &SymlinkChain) -> Option<Drift> {
    chain.iter().find_map(|edge| match fs::read_link(&edge.link) {
        Ok(now) if now == edge.target => None,
        Ok(now) => Some(Drift::Retargeted {
            edge: edge.clone(),
            now,
        }),
        Err(error) => Some(Drift::Unreadable {
            edge: edge.clone(),
            error,
        }),
    })
}

fn log_drift(drift: &Drift) {
    match drift {
        Drift::Retargeted { edge, now } => tracing::info!(
            link = %edge.link.display(),
            recorded = %edge.target.display(),
            current = %now.display(),
            "symlink repointed, closing watch",
        ),
        Drift::Unreadable { edge, error } => tracing::info!(
            link = %edge.link.display(),
            error = %error,
            "symlink no longer readable, closing watch",
        ),
        Drift::CheckFailed(reason) => tracing::warn!(
            error = %reason,
            "symlink chain check failed, closing watch",
        ),
    }
}
