//! `promfile status` — query a running server.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use serde_json::Value;

#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Address of the running server.
    #[arg(long, env = "PROMFILE_ADDR", default_value = "127.0.0.1:8080")]
    pub addr: String,

    /// Request timeout in milliseconds.
    #[arg(long, default_value_t = 2000)]
    pub timeout_ms: u64,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let payload = match self.fetch() {
            Ok(response) => response
                .into_json::<Value>()
                .context("server returned invalid status JSON")?,
            Err(ureq::Error::Transport(err)) => serde_json::json!({
                "running": false,
                "addr": self.addr,
                "error": err.to_string(),
            }),
            Err(err) => return Err(err).context("failed to query server status"),
        };

        println!(
            "{}",
            serde_json::to_string_pretty(&payload).context("failed to render status JSON")?
        );
        Ok(())
    }

    fn fetch(&self) -> Result<ureq::Response, ureq::Error> {
        ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(self.timeout_ms))
            .build()
            .get(&format!("http://{}/status", self.addr))
            .call()
    }
}
