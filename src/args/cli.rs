use std::path::PathBuf;

use clap::Parser;

/// Which side of a run this process plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run every task locally and print the summary.
    Standalone,
    /// Serve tasks to agents and aggregate their reports.
    Server,
    /// Fetch tasks from a coordinator and report back.
    Client,
}

#[derive(Debug, Parser, Clone)]
#[clap(
    version,
    about = "Distributed HTTP load generator - rate-controlled async workers, scheduled task windows, and a coordinator that fans tasks out to remote agents."
)]
pub struct DreqArgs {
    /// Configuration file (JSON with // comments, or TOML)
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Run as the coordinator (requires a `server` section)
    #[arg(short = 's', long = "server", conflicts_with = "client")]
    pub server: bool,

    /// Run as an agent (requires a `client` section)
    #[arg(short = 'c', long = "client")]
    pub client: bool,

    /// Enable debug logging
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Disable colored output
    #[arg(long = "no-color")]
    pub no_color: bool,
}

impl DreqArgs {
    #[must_use]
    pub const fn mode(&self) -> RunMode {
        if self.server {
            RunMode::Server
        } else if self.client {
            RunMode::Client
        } else {
            RunMode::Standalone
        }
    }
}
