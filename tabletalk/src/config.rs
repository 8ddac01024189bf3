//! Environment configuration.
//!
//! Everything is optional and defaulted so the server can boot out of the
//! box; CLI flags override the environment where both are present.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Result};

/// Default bind address.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// Default listen port.
pub const DEFAULT_PORT: u16 = 8000;

/// Tables exposed to the agent when no override is configured.
pub const DEFAULT_TABLES: &[&str] = &[
    "prod.monitoring.provider_combined_audit",
    "local.analytics.market_level_anomalies_v3",
];

/// Tool names exposed to the agent. Always an explicit allow-list; the
/// tool server's full native set is never forwarded.
pub const DEFAULT_TOOLS: &[&str] = &["list_tables", "describe_table", "run_query"];

/// How long to wait for the tool server's ready handshake.
pub const STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the external tool-server subprocess.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Program to execute.
    pub program: String,
    /// Arguments to pass to the program.
    pub args: Vec<String>,
    /// Working directory (root of the external agent package).
    pub agent_root: Option<PathBuf>,
    /// Tool names exposed to the agent.
    pub tools: Vec<String>,
    /// Tables the agent may query.
    pub tables: Vec<String>,
    /// Handshake timeout.
    pub startup_timeout: Duration,
}

impl AgentConfig {
    /// Build agent configuration from the environment.
    ///
    /// - `TABLETALK_AGENT_CMD`: whitespace-split command line
    ///   (default `tabletalk-agent`).
    /// - `TABLETALK_AGENT_ROOT`: working directory for the subprocess.
    /// - `TABLETALK_TOOLS` / `TABLETALK_TABLES`: comma-separated overrides
    ///   of the default allow-lists.
    pub fn from_env() -> Result<Self> {
        let cmd = std::env::var("TABLETALK_AGENT_CMD")
            .unwrap_or_else(|_| "tabletalk-agent".to_string());
        let mut parts = cmd.split_whitespace().map(String::from);
        let Some(program) = parts.next() else {
            bail!("TABLETALK_AGENT_CMD is empty");
        };
        let args: Vec<String> = parts.collect();

        let agent_root = std::env::var("TABLETALK_AGENT_ROOT")
            .ok()
            .map(PathBuf::from);

        let tools = list_from_env("TABLETALK_TOOLS", DEFAULT_TOOLS);
        let tables = list_from_env("TABLETALK_TABLES", DEFAULT_TABLES);

        Ok(Self {
            program,
            args,
            agent_root,
            tools,
            tables,
            startup_timeout: STARTUP_TIMEOUT,
        })
    }
}

/// Server bind configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Host to bind.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Directory for session snapshots. `None` keeps sessions in memory.
    pub session_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Build server configuration from the environment, with explicit
    /// values (CLI flags) taking precedence.
    pub fn from_env(
        host: Option<String>,
        port: Option<u16>,
        session_dir: Option<PathBuf>,
    ) -> Result<Self> {
        let host = host
            .or_else(|| std::env::var("TABLETALK_HOST").ok())
            .unwrap_or_else(|| DEFAULT_HOST.to_string());

        let port = match port {
            Some(p) => p,
            None => match std::env::var("TABLETALK_PORT") {
                Ok(raw) => match raw.trim().parse() {
                    Ok(p) => p,
                    Err(_) => bail!("TABLETALK_PORT is not a valid port: {raw}"),
                },
                Err(_) => DEFAULT_PORT,
            },
        };

        let session_dir = session_dir.or_else(|| {
            std::env::var("TABLETALK_SESSION_DIR")
                .ok()
                .map(PathBuf::from)
        });

        Ok(Self {
            host,
            port,
            session_dir,
        })
    }
}

/// Read a comma-separated list from the environment, falling back to the
/// given defaults. Blank entries are dropped.
fn list_from_env(var: &str, defaults: &[&str]) -> Vec<String> {
    match std::env::var(var) {
        Ok(raw) => {
            let items: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
            if items.is_empty() {
                defaults.iter().map(ToString::to_string).collect()
            } else {
                items
            }
        }
        Err(_) => defaults.iter().map(ToString::to_string).collect(),
    }
}
