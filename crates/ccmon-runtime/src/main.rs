//! ccmon: local session monitor daemon for CLI coding assistants.
//! Tracks sessions reported by hook scripts, reaps crashed ones, and streams
//! changes to dashboards over a WebSocket.

use clap::Parser;

mod api;
mod cli;
mod config;
mod daemon;
mod error;
mod notify;
mod push;
mod state;
mod sweeper;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let command = args
        .command
        .unwrap_or_else(|| cli::Command::Daemon(cli::DaemonOpts::from_env()));

    match command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("CCMON_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!(version = env!("CARGO_PKG_VERSION"), "ccmon daemon starting");
            daemon::run_daemon(opts).await?;
        }
    }

    Ok(())
}
