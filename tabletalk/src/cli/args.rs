//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

const DEFAULT_URL: &str = "http://127.0.0.1:8000";

/// tabletalk - conversational front-end over a database-querying agent
#[derive(Parser, Debug)]
#[command(name = "tabletalk")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the HTTP server
    Serve {
        /// Host to bind (overrides TABLETALK_HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides TABLETALK_PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory for session snapshots (overrides TABLETALK_SESSION_DIR)
        #[arg(long)]
        session_dir: Option<PathBuf>,
    },

    /// Send a chat message to a running server
    Chat {
        /// Session ID to continue (a new session is created if omitted)
        #[arg(short, long)]
        session: Option<String>,

        /// Server base URL
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,

        /// Message to send
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },

    /// Manage sessions on a running server
    Sessions {
        /// Server base URL
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,

        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Check server health
    Health {
        /// Server base URL
        #[arg(long, default_value = DEFAULT_URL)]
        url: String,
    },
}

/// Session management subcommands
#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// List all sessions, most recently active first
    List,

    /// Show one session's summary
    Show {
        /// Session ID
        id: String,
    },

    /// Create a new empty session
    New,

    /// Delete a session
    Delete {
        /// Session ID
        id: String,
    },
}
