use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use promfile_watch::{watch_with_config, WatchConfig, WatchError, WatchHandle};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::content::{unix_seconds_now, ContentStore};
use crate::error::{io_err, ServerError};
use crate::http;

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_REWATCH_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct ServeConfig {
    pub file: PathBuf,
    pub listen: SocketAddr,
    pub watch: WatchConfig,
    /// Pause before re-establishing an ended watch, and between attempts while
    /// the file is missing.
    pub rewatch_delay: Duration,
}

impl ServeConfig {
    pub fn new(file: impl Into<PathBuf>, listen: SocketAddr) -> Self {
        Self {
            file: file.into(),
            listen,
            watch: WatchConfig::default(),
            rewatch_delay: DEFAULT_REWATCH_DELAY,
        }
    }
}

type Task = (&'static str, JoinHandle<Result<(), ServerError>>);

/// A running server: HTTP endpoint plus the task keeping content fresh.
pub struct Server {
    addr: SocketAddr,
    content: ContentStore,
    shutdown: CancellationToken,
    tasks: Vec<Task>,
}

impl Server {
    /// Watch and load the file, bind the listener and spawn the server tasks.
    ///
    /// A missing or empty file at startup is fatal; later failures only keep
    /// the previous content in place.
    pub async fn start(config: ServeConfig) -> Result<Self, ServerError> {
        let shutdown = CancellationToken::new();
        let abort_start = shutdown.clone().drop_guard();

        // Watch first so a write landing during the initial load is signalled.
        let watching =
            watch_with_config(shutdown.child_token(), &config.file, &config.watch).await?;
        let content = ContentStore::open(&config.file).await?;
        let listener = TcpListener::bind(config.listen)
            .await
            .map_err(|e| io_err(config.listen.to_string(), e))?;
        let addr = listener
            .local_addr()
            .map_err(|e| io_err(config.listen.to_string(), e))?;

        let started_at_unix = unix_seconds_now();
        abort_start.disarm();

        let reload_handle = {
            let shutdown = shutdown.clone();
            let content = content.clone();
            tokio::spawn(async move {
                let result = reload_task(
                    content,
                    watching,
                    config.watch,
                    config.rewatch_delay,
                    shutdown.clone(),
                )
                .await;
                shutdown.cancel();
                result
            })
        };

        let http_handle = {
            let shutdown = shutdown.clone();
            let router = http::router(content.clone(), started_at_unix);
            tokio::spawn(async move {
                let result = http::serve(listener, router, shutdown.clone()).await;
                shutdown.cancel();
                result
            })
        };

        Ok(Self {
            addr,
            content,
            shutdown,
            tasks: vec![("reload", reload_handle), ("http", http_handle)],
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn content(&self) -> &ContentStore {
        &self.content
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Wait for every task to finish; the first task to end stops the others.
    pub async fn wait(self) -> Result<(), ServerError> {
        let mut first_err = None;
        for (name, handle) in self.tasks {
            if let Err(err) = handle_join(name, handle.await) {
                tracing::error!(task = name, error = %err, "server task failed");
                first_err.get_or_insert(err);
            }
        }
        first_err.map_or(Ok(()), Err)
    }
}

/// Build a runtime and block the current thread until the server exits.
pub fn start_blocking(config: ServeConfig) -> Result<(), ServerError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;
    runtime.block_on(run(config))
}

/// Run the server until ctrl-c or until one of its tasks ends.
pub async fn run(config: ServeConfig) -> Result<(), ServerError> {
    let server = Server::start(config).await?;
    let shutdown = server.shutdown_token();

    tokio::select! {
        _ = shutdown.cancelled() => {}
        signal = tokio::signal::ctrl_c() => match signal {
            Ok(()) => tracing::info!("received ctrl-c, shutting down"),
            Err(err) => tracing::warn!(error = %err, "ctrl-c handler failed, shutting down"),
        },
    }

    server.shutdown();
    server.wait().await
}

/// Follow the watch contract: reload on every signal, and re-watch from
/// scratch whenever the handle closes without us having shut down.
///
/// `watching` was established before the content was first loaded.
async fn reload_task(
    content: ContentStore,
    watching: WatchHandle,
    watch_config: WatchConfig,
    rewatch_delay: Duration,
    shutdown: CancellationToken,
) -> Result<(), ServerError> {
    let path = content.path().to_path_buf();
    let mut established = Some(watching);

    loop {
        let mut handle = match established.take() {
            Some(handle) => handle,
            None => match watch_with_config(shutdown.child_token(), &path, &watch_config).await {
                Ok(handle) => {
                    // The file may have been replaced while no watch was running.
                    reload(&content).await;
                    handle
                }
                Err(err) => {
                    match &err {
                        WatchError::NotFound { .. } => {
                            tracing::debug!(path = %path.display(), "file missing, waiting to re-watch")
                        }
                        _ => tracing::warn!(path = %path.display(), error = %err, "failed to watch file"),
                    }
                    if !pause(rewatch_delay, &shutdown).await {
                        break;
                    }
                    continue;
                }
            },
        };

        while handle.changed().await.is_some() {
            tracing::info!(path = %path.display(), "file modified, reloading");
            reload(&content).await;
        }

        if shutdown.is_cancelled() {
            break;
        }
        tracing::info!(path = %path.display(), "watch ended, re-establishing");
        if !pause(rewatch_delay, &shutdown).await {
            break;
        }
    }

    Ok(())
}

async fn reload(content: &ContentStore) {
    match content.reload().await {
        Ok(bytes) => tracing::info!(path = %content.path().display(), bytes, "file reloaded"),
        Err(err) => tracing::warn!(
            path = %content.path().display(),
            error = %err,
            "failed to reload file, keeping previous content",
        ),
    }
}

/// Sleep for `delay`; `false` if shutdown fired first.
async fn pause(delay: Duration, shutdown: &CancellationToken) -> bool {
    tokio::select! {
        _ = shutdown.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}

fn handle_join(
    task: &str,
    result: Result<Result<(), ServerError>, tokio::task::JoinError>,
) -> Result<(), ServerError> {
    match result {
        Ok(inner) => inner,
        Err(err) => Err(ServerError::Task(format!("{task} task join failure: {err}"))),
    }
}

pub fn init_tracing(format: LogFormat) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(false);
    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}
