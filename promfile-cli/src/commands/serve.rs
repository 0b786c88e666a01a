//! `promfile serve` — HTTP endpoint backed by a watched file.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use promfile_server::{
    init_tracing, start_blocking, LogFormat, ServeConfig, DEFAULT_LISTEN, DEFAULT_REWATCH_DELAY,
};
use promfile_watch::WatchConfig;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// File whose content is served.
    #[arg(long, env = "PROMFILE_FILE")]
    pub file: PathBuf,

    /// Address the HTTP endpoint listens on.
    #[arg(long, env = "PROMFILE_LISTEN", default_value = DEFAULT_LISTEN)]
    pub listen: SocketAddr,

    /// How often symlinks leading to the file are checked, in milliseconds.
    #[arg(long, env = "PROMFILE_POLL_INTERVAL_MS", default_value_t = 1000)]
    pub poll_interval_ms: u64,

    /// Pause before re-watching after the watch ended, in milliseconds.
    #[arg(
        long,
        env = "PROMFILE_REWATCH_DELAY_MS",
        default_value_t = DEFAULT_REWATCH_DELAY.as_millis() as u64
    )]
    pub rewatch_delay_ms: u64,

    /// Log output format.
    #[arg(long, env = "PROMFILE_LOG_FORMAT", value_enum, default_value_t = LogFormatArg::Text)]
    pub log_format: LogFormatArg,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
pub enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(arg: LogFormatArg) -> Self {
        match arg {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl ServeArgs {
    pub fn run(self) -> Result<()> {
        init_tracing(self.log_format.into());

        let file = self.file.clone();
        start_blocking(self.into_config())
            .with_context(|| format!("failed to serve {}", file.display()))
    }

    fn into_config(self) -> ServeConfig {
        let mut config = ServeConfig::new(self.file, self.listen);
        config.watch = WatchConfig {
            chain_poll_interval: Duration::from_millis(self.poll_interval_ms),
        };
        config.rewatch_delay = Duration::from_millis(self.rewatch_delay_ms);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn args_map_onto_serve_config() {
        let args = ServeArgs {
            file: PathBuf::from("/etc/metrics/metrics.txt"),
            listen: "127.0.0.1:9100".parse().expect("addr"),
            poll_interval_ms: 250,
            rewatch_delay_ms: 2000,
            log_format: LogFormatArg::Json,
        };

        let config = args.into_config();
        assert_eq!(config.file, PathBuf::from("/etc/metrics/metrics.txt"));
        assert_eq!(config.listen.port(), 9100);
        assert_eq!(config.watch.chain_poll_interval, Duration::from_millis(250));
        assert_eq!(config.rewatch_delay, Duration::from_secs(2));
    }
}
