//! CLI definition using clap derive.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ccmon",
    about = "Session monitor daemon for CLI coding assistants"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the daemon (HTTP API + push channel + liveness sweeper)
    Daemon(DaemonOpts),
}

/// Daemon flags. Each one overrides the matching config file value.
#[derive(Parser, Debug, Default, Clone)]
pub struct DaemonOpts {
    /// Listen port on 127.0.0.1
    #[arg(long, env = "CCMON_PORT")]
    pub port: Option<u16>,

    /// Liveness sweep interval in milliseconds
    #[arg(long, env = "CCMON_CHECK_INTERVAL_MS")]
    pub check_interval_ms: Option<u64>,

    /// Config file (default: $HOME/.claude-monitor/config.json)
    #[arg(long, env = "CCMON_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log notifications instead of showing them
    #[arg(long)]
    pub no_notify: bool,
}

impl DaemonOpts {
    /// Options for a bare `ccmon` invocation: defaults plus env fallbacks.
    pub fn from_env() -> Self {
        Self::parse_from(["ccmon"])
    }
}
