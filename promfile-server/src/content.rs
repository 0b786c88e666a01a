//! In-memory copy of the served file.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::error::{io_err, ServerError};

#[derive(Debug)]
struct Snapshot {
    bytes: Bytes,
    loaded_at_unix: u64,
    reloads: u64,
}

/// Point-in-time view of the store, rendered by `/status`.
#[derive(Debug, Clone, Serialize)]
pub struct ContentStatus {
    pub path: String,
    pub bytes: usize,
    pub reloads: u64,
    pub loaded_at_unix: u64,
}

/// Last successfully loaded content of a file. Cheap to clone.
#[derive(Debug, Clone)]
pub struct ContentStore {
    path: PathBuf,
    snapshot: Arc<RwLock<Snapshot>>,
}

impl ContentStore {
    /// Load `path` for the first time. Unlike [`ContentStore::reload`], a
    /// failure here leaves nothing to serve.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ServerError> {
        let path = path.into();
        let bytes = load(&path).await?;
        Ok(Self {
            path,
            snapshot: Arc::new(RwLock::new(Snapshot {
                bytes,
                loaded_at_unix: unix_seconds_now(),
                reloads: 0,
            })),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file. On failure the previous content stays in place.
    /// Returns the new content length.
    pub async fn reload(&self) -> Result<usize, ServerError> {
        let bytes = load(&self.path).await?;
        let len = bytes.len();

        let mut snapshot = self.snapshot.write().await;
        snapshot.bytes = bytes;
        snapshot.loaded_at_unix = unix_seconds_now();
        snapshot.reloads += 1;
        Ok(len)
    }

    pub async fn bytes(&self) -> Bytes {
        self.snapshot.read().await.bytes.clone()
    }

    pub async fn status(&self) -> ContentStatus {
        let snapshot = self.snapshot.read().await;
        ContentStatus {
            path: self.path.display().to_string(),
            bytes: snapshot.bytes.len(),
            reloads: snapshot.reloads,
            loaded_at_unix: snapshot.loaded_at_unix,
        }
    }
}

/// Read `path`, rejecting empty content (a file caught mid-rewrite).
pub async fn load(path: &Path) -> Result<Bytes, ServerError> {
    let data = tokio::fs::read(path).await.map_err(|e| io_err(path, e))?;
    if data.is_empty() {
        return Err(ServerError::EmptyContent {
            path: path.to_path_buf(),
        });
    }
    Ok(Bytes::from(data))
}

pub(crate) fn unix_seconds_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn open_rejects_empty_file() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("metrics.txt");
        fs::write(&path, "").expect("write");

        let err = ContentStore::open(&path).await.expect_err("empty file");
        assert!(matches!(err, ServerError::EmptyContent { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn open_rejects_missing_file() {
        let dir = TempDir::new().expect("tempdir");
        let err = ContentStore::open(dir.path().join("missing"))
            .await
            .expect_err("missing file");
        assert!(matches!(err, ServerError::Io { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn reload_replaces_content_and_counts() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("metrics.txt");
        fs::write(&path, "up 1\n").expect("write");

        let store = ContentStore::open(&path).await.expect("open");
        fs::write(&path, "up 0\nerrors 3\n").expect("rewrite");
        let len = store.reload().await.expect("reload");

        assert_eq!(len, 14);
        assert_eq!(store.bytes().await, Bytes::from_static(b"up 0\nerrors 3\n"));
        let status = store.status().await;
        assert_eq!(status.reloads, 1);
        assert_eq!(status.bytes, 14);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_content() {
        let dir = TempDir::new().expect("tempdir");
        let path = dir.path().join("metrics.txt");
        fs::write(&path, "up 1\n").expect("write");

        let store = ContentStore::open(&path).await.expect("open");
        fs::write(&path, "").expect("truncate");
        assert!(store.reload().await.is_err());

        fs::remove_file(&path).expect("remove");
        assert!(store.reload().await.is_err());

        assert_eq!(store.bytes().await, Bytes::from_static(b"up 1\n"));
        assert_eq!(store.status().await.reloads, 0);
    }
}
