//! tabletalk - conversational HTTP front-end over a database-querying agent.
//!
//! The agent's reasoning and tool execution live in an external tool-serving
//! subprocess; this binary does session bookkeeping and protocol
//! translation only.
//!
//! Architecture:
//! - `serve` runs the HTTP server: sessions in memory (optionally
//!   snapshotted to disk), one lazily-started tool-server subprocess
//! - Every other subcommand is a thin HTTP client against that server

mod agent;
mod cli;
mod config;
mod conversation;
mod models;
mod server;
mod store;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{execute, Cli};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    execute(cli).await
}
