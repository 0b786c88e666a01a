//! `promfile watch` — run the watch subsystem alone and report its signals.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use promfile_server::{init_tracing, LogFormat, DEFAULT_REWATCH_DELAY};
use promfile_watch::{watch_with_config, WatchConfig, WatchHandle};

#[derive(Args, Debug)]
pub struct WatchArgs {
    /// File to watch.
    pub path: PathBuf,

    /// How often symlinks leading to the file are checked, in milliseconds.
    #[arg(long, default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Pause before re-watching after the watch ended, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_REWATCH_DELAY.as_millis() as u64)]
    pub rewatch_delay_ms: u64,

    /// Exit when the watch ends instead of re-establishing it.
    #[arg(long)]
    pub once: bool,
}

impl WatchArgs {
    pub fn run(self) -> Result<()> {
        init_tracing(LogFormat::Text);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .context("failed to build tokio runtime")?;
        runtime.block_on(self.watch_until_interrupted())
    }

    async fn watch_until_interrupted(self) -> Result<()> {
        let cancel = CancellationToken::new();
        {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });
        }

        let config = WatchConfig {
            chain_poll_interval: Duration::from_millis(self.poll_interval_ms),
        };
        let mut handle = watch_with_config(cancel.clone(), &self.path, &config)
            .await
            .with_context(|| format!("failed to watch {}", self.path.display()))?;

        loop {
            while handle.changed().await.is_some() {
                println!("changed {}", self.path.display());
            }
            if cancel.is_cancelled() {
                return Ok(());
            }
            println!("ended {}", self.path.display());
            if self.once {
                return Ok(());
            }

            match self.rewatch(&cancel, &config).await {
                Some(next) => handle = next,
                None => return Ok(()),
            }
        }
    }

    fn rewatch_delay(&self) -> Duration {
        Duration::from_millis(self.rewatch_delay_ms)
    }

    /// Retry until the path can be watched again; `None` once interrupted.
    async fn rewatch(&self, cancel: &CancellationToken, config: &WatchConfig) -> Option<WatchHandle> {
        let delay = self.rewatch_delay();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
            match watch_with_config(cancel.clone(), &self.path, config).await {
                Ok(handle) => return Some(handle),
                Err(err) => {
                    tracing::debug!(path = %self.path.display(), error = %err, "re-watch failed, retrying")
                }
            }
        }
    }
}
