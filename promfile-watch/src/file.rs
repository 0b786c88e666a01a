//! Native change notifications for the literal watched path.

use std::path::{Path, PathBuf};

use notify::event::ModifyKind;
use notify::{recommended_watcher, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::WatchError;

/// Raw events buffered between the notifier thread and the forwarding task.
/// When full, the notifier thread blocks, so a stalled consumer backs up
/// into the kernel queue instead of process memory.
const EVENT_QUEUE_CAPACITY: usize = 64;

/// What a raw notifier event means for the watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventClass {
    /// Content or metadata changed: the caller should re-read.
    Forward,
    /// Not a change to the watched content.
    Ignore,
    /// The watched path is gone or renamed; the watch must be recreated.
    Terminal,
}

/// Classify a raw event kind.
///
/// Creation is ignored because some writers recreate the file instead of
/// writing to it; the follow-up write is what gets forwarded. Access events
/// (open, read, close) do not change anything.
pub fn classify(kind: &EventKind) -> EventClass {
    match kind {
        EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => EventClass::Terminal,
        EventKind::Create(_) | EventKind::Access(_) => EventClass::Ignore,
        EventKind::Modify(_) | EventKind::Any | EventKind::Other => EventClass::Forward,
    }
}

/// Subscribe to native notifications for `path` and forward one signal per
/// change event.
///
/// The subscription is created before returning, so notifier failures are
/// setup errors. The returned receiver closes on removal, rename, notifier
/// error or cancellation; the subscription is released on each of those
/// paths.
pub fn watch_file(
    cancel: CancellationToken,
    path: &Path,
) -> Result<mpsc::Receiver<()>, WatchError> {
    let (on_event, event_rx) = event_bridge(EVENT_QUEUE_CAPACITY);
    let mut watcher: RecommendedWatcher = recommended_watcher(on_event)?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;
    tracing::debug!(path = %path.display(), "watching file");

    let (change_tx, change_rx) = mpsc::channel::<()>(1);
    tokio::spawn(forward_events(
        watcher,
        path.to_path_buf(),
        event_rx,
        change_tx,
        cancel,
    ));

    Ok(change_rx)
}

/// Callback for the notifier thread plus the receiving end it feeds.
///
/// The callback blocks while the queue is full and returns once the receiver
/// is gone.
fn event_bridge(
    capacity: usize,
) -> (
    impl FnMut(notify::Result<Event>) + Send + 'static,
    mpsc::Receiver<notify::Result<Event>>,
) {
    let (event_tx, event_rx) = mpsc::channel::<notify::Result<Event>>(capacity);
    let on_event = move |event| {
        let _ = event_tx.blocking_send(event);
    };
    (on_event, event_rx)
}

async fn forward_events(
    watcher: RecommendedWatcher,
    path: PathBuf,
    mut event_rx: mpsc::Receiver<notify::Result<Event>>,
    change_tx: mpsc::Sender<()>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = event_rx.recv() => event,
        };
        let Some(event) = event else { break };

        let event = match event {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "file watcher error");
                break;
            }
        };

        match classify(&event.kind) {
            EventClass::Ignore => continue,
            EventClass::Terminal => {
                tracing::info!(path = %path.display(), kind = ?event.kind, "watched file removed or renamed");
                break;
            }
            EventClass::Forward => {
                // A link-count change arrives just before the removal itself.
                if !still_exists(&path).await {
                    tracing::info!(path = %path.display(), kind = ?event.kind, "watched file no longer exists");
                    break;
                }
                tracing::trace!(path = %path.display(), kind = ?event.kind, "file changed");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = change_tx.send(()) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    // The notifier thread may be blocked on a full queue; closing the
    // receiver first releases it before the watcher is torn down.
    drop(event_rx);
    drop(watcher);
    tracing::debug!(path = %path.display(), "file watcher stopped");
}

async fn still_exists(path: &Path) -> bool {
    matches!(tokio::fs::try_exists(path).await, Ok(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::Duration;

    use notify::event::{
        AccessKind, AccessMode, CreateKind, DataChange, MetadataKind, RemoveKind, RenameMode,
    };
    use tempfile::TempDir;
    use tokio::time::timeout;

    #[test]
    fn removal_and_rename_are_terminal() {
        assert_eq!(classify(&EventKind::Remove(RemoveKind::File)), EventClass::Terminal);
        assert_eq!(classify(&EventKind::Remove(RemoveKind::Any)), EventClass::Terminal);
        for mode in [RenameMode::From, RenameMode::To, RenameMode::Both, RenameMode::Any] {
            assert_eq!(
                classify(&EventKind::Modify(ModifyKind::Name(mode))),
                EventClass::Terminal,
                "rename mode {mode:?}"
            );
        }
    }

    #[test]
    fn creation_and_access_are_ignored() {
        assert_eq!(classify(&EventKind::Create(CreateKind::File)), EventClass::Ignore);
        assert_eq!(
            classify(&EventKind::Access(AccessKind::Close(AccessMode::Write))),
            EventClass::Ignore
        );
    }

    #[test]
    fn writes_and_metadata_changes_are_forwarded() {
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            EventClass::Forward
        );
        assert_eq!(
            classify(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
            EventClass::Forward
        );
        assert_eq!(classify(&EventKind::Any), EventClass::Forward);
    }

    fn raw_event() -> notify::Result<Event> {
        Ok(Event::new(EventKind::Any))
    }

    #[test]
    fn bridge_blocks_notifier_while_queue_is_full() {
        let (mut on_event, mut event_rx) = event_bridge(2);
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let notifier = std::thread::spawn(move || {
            for _ in 0..3 {
                on_event(raw_event());
            }
            done_tx.send(()).expect("report done");
        });

        assert!(
            done_rx.recv_timeout(Duration::from_millis(300)).is_err(),
            "third event must wait for room in the queue"
        );

        assert!(event_rx.blocking_recv().is_some());
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("notifier resumes once the queue drains");
        notifier.join().expect("notifier thread");

        assert!(event_rx.blocking_recv().is_some());
        assert!(event_rx.blocking_recv().is_some());
        assert!(event_rx.try_recv().is_err(), "nothing beyond the three events");
    }

    #[test]
    fn closing_bridge_releases_blocked_notifier() {
        let (mut on_event, event_rx) = event_bridge(1);
        let (done_tx, done_rx) = std::sync::mpsc::channel();
        let notifier = std::thread::spawn(move || {
            on_event(raw_event());
            on_event(raw_event());
            done_tx.send(()).expect("report done");
        });

        assert!(done_rx.recv_timeout(Duration::from_millis(300)).is_err());
        drop(event_rx);
        done_rx
            .recv_timeout(Duration::from_secs(5))
            .expect("notifier released when the receiver closes");
        notifier.join().expect("notifier thread");
    }

    #[tokio::test]
    async fn missing_path_is_a_setup_error() {
        let dir = TempDir::new().expect("tempdir");
        let result = watch_file(CancellationToken::new(), &dir.path().join("missing"));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn write_is_forwarded() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("metrics.txt");
        fs::write(&path, "a 1\n").expect("write");

        let mut changes = watch_file(CancellationToken::new(), &path).expect("watch");
        fs::write(&path, "a 2\n").expect("rewrite");

        let signal = timeout(Duration::from_secs(5), changes.recv())
            .await
            .expect("change in time");
        assert_eq!(signal, Some(()));
    }

    #[tokio::test]
    async fn cancellation_closes_receiver() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("metrics.txt");
        fs::write(&path, "a 1\n").expect("write");

        let cancel = CancellationToken::new();
        let mut changes = watch_file(cancel.clone(), &path).expect("watch");
        cancel.cancel();

        let closed = timeout(Duration::from_secs(2), changes.recv())
            .await
            .expect("closed in time");
        assert!(closed.is_none());
    }
}
