//! CLI command execution.
//!
//! Everything except `serve` is a thin HTTP client against a running
//! tabletalk server.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::config::{AgentConfig, ServerConfig};
use crate::server;

use super::args::{Cli, Commands, SessionCommands};

/// Dispatch the parsed CLI.
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Serve {
            host,
            port,
            session_dir,
        } => {
            let server_config = ServerConfig::from_env(host, port, session_dir)?;
            let agent_config = AgentConfig::from_env()?;
            server::run(server_config, agent_config).await
        }
        Commands::Chat {
            session,
            url,
            message,
        } => chat(&url, session, &message.join(" ")).await,
        Commands::Sessions { url, command } => match command {
            SessionCommands::List => list_sessions(&url).await,
            SessionCommands::Show { id } => show_session(&url, &id).await,
            SessionCommands::New => new_session(&url).await,
            SessionCommands::Delete { id } => delete_session(&url, &id).await,
        },
        Commands::Health { url } => health(&url).await,
    }
}

// === Client-side response mirrors ===

#[derive(Debug, Deserialize)]
struct ChatReply {
    session_id: String,
    response: String,
    tools: std::collections::HashMap<String, u64>,
    tokens: TokensReply,
    time_ms: f64,
}

#[derive(Debug, Deserialize)]
struct TokensReply {
    input_tokens: u64,
    output_tokens: u64,
    total_tokens: u64,
}

#[derive(Debug, Deserialize)]
struct SessionReply {
    session_id: String,
    created_at: String,
    updated_at: String,
    message_count: usize,
}

#[derive(Debug, Deserialize)]
struct SessionListReply {
    sessions: Vec<SessionReply>,
}

#[derive(Debug, Deserialize)]
struct HealthReply {
    status: String,
    agent_initialized: bool,
}

#[derive(Debug, Deserialize)]
struct CreatedReply {
    session_id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorReply {
    error: String,
}

/// Read the error body of a failed response, falling back to the status.
async fn describe_failure(resp: reqwest::Response) -> String {
    let status = resp.status();
    match resp.json::<ErrorReply>().await {
        Ok(body) => format!("{status}: {}", body.error),
        Err(_) => status.to_string(),
    }
}

async fn chat(url: &str, session: Option<String>, message: &str) -> Result<()> {
    if message.trim().is_empty() {
        bail!("message is required");
    }

    let body = serde_json::json!({
        "session_id": session,
        "message": message,
    });
    let resp = reqwest::Client::new()
        .post(format!("{url}/api/chat"))
        .json(&body)
        .send()
        .await
        .context("failed to reach server")?;

    if !resp.status().is_success() {
        bail!("chat failed - {}", describe_failure(resp).await);
    }

    let reply: ChatReply = resp.json().await.context("failed to parse chat response")?;
    println!("{}", reply.response);
    println!();
    if !reply.tools.is_empty() {
        let mut tools: Vec<(&String, &u64)> = reply.tools.iter().collect();
        tools.sort();
        let rendered: Vec<String> = tools
            .iter()
            .map(|(name, count)| format!("{name} x{count}"))
            .collect();
        println!("tools:   {}", rendered.join(", "));
    }
    println!(
        "tokens:  {} in / {} out / {} total",
        reply.tokens.input_tokens, reply.tokens.output_tokens, reply.tokens.total_tokens
    );
    println!("time:    {:.0} ms", reply.time_ms);
    println!("session: {}", reply.session_id);
    Ok(())
}

async fn list_sessions(url: &str) -> Result<()> {
    let resp = reqwest::Client::new()
        .get(format!("{url}/api/sessions"))
        .send()
        .await
        .context("failed to reach server")?;

    if !resp.status().is_success() {
        bail!("listing sessions failed - {}", describe_failure(resp).await);
    }

    let reply: SessionListReply = resp.json().await.context("failed to parse session list")?;
    if reply.sessions.is_empty() {
        println!("No sessions.");
        return Ok(());
    }
    for s in reply.sessions {
        println!(
            "{}  {:>3} message(s)  updated {}",
            s.session_id, s.message_count, s.updated_at
        );
    }
    Ok(())
}

async fn show_session(url: &str, id: &str) -> Result<()> {
    let resp = reqwest::Client::new()
        .get(format!("{url}/api/sessions/{id}"))
        .send()
        .await
        .context("failed to reach server")?;

    if !resp.status().is_success() {
        bail!("session lookup failed - {}", describe_failure(resp).await);
    }

    let s: SessionReply = resp.json().await.context("failed to parse session")?;
    println!("session:  {}", s.session_id);
    println!("created:  {}", s.created_at);
    println!("updated:  {}", s.updated_at);
    println!("messages: {}", s.message_count);
    Ok(())
}

async fn new_session(url: &str) -> Result<()> {
    let resp = reqwest::Client::new()
        .post(format!("{url}/api/sessions"))
        .send()
        .await
        .context("failed to reach server")?;

    if !resp.status().is_success() {
        bail!("session creation failed - {}", describe_failure(resp).await);
    }

    let created: CreatedReply = resp.json().await.context("failed to parse response")?;
    println!("{}", created.session_id);
    Ok(())
}

async fn delete_session(url: &str, id: &str) -> Result<()> {
    let resp = reqwest::Client::new()
        .delete(format!("{url}/api/sessions/{id}"))
        .send()
        .await
        .context("failed to reach server")?;

    if !resp.status().is_success() {
        bail!("session deletion failed - {}", describe_failure(resp).await);
    }

    println!("Deleted {id}");
    Ok(())
}

async fn health(url: &str) -> Result<()> {
    let resp = reqwest::Client::new()
        .get(format!("{url}/health"))
        .send()
        .await
        .context("failed to reach server")?;

    if !resp.status().is_success() {
        bail!("health check failed - {}", describe_failure(resp).await);
    }

    let reply: HealthReply = resp.json().await.context("failed to parse health response")?;
    println!("status:            {}", reply.status);
    println!("agent initialized: {}", reply.agent_initialized);
    Ok(())
}
