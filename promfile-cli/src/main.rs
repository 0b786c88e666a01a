//! promfile — serve a file over HTTP and keep it fresh as it changes on disk.
//!
//! # Usage
//!
//! ```text
//! promfile serve --file <path> [--listen 0.0.0.0:8080] [--poll-interval-ms 1000]
//! promfile watch <path> [--poll-interval-ms 1000]
//! promfile status [--addr 127.0.0.1:8080]
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{serve::ServeArgs, status::StatusArgs, watch::WatchArgs};

#[derive(Parser, Debug)]
#[command(
    name = "promfile",
    version,
    about = "Serve a file over HTTP, reloading it when it or its symlinks change",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve the file at /metrics until interrupted.
    Serve(ServeArgs),

    /// Print a line for every change signal on a file.
    Watch(WatchArgs),

    /// Query a running server's /status endpoint.
    Status(StatusArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Serve(args) => args.run(),
        Commands::Watch(args) => args.run(),
        Commands::Status(args) => args.run(),
    }
}
