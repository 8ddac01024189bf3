//! Tool-server subprocess plumbing: spawn, handshake, line IO, teardown.

use std::process::Stdio;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::config::AgentConfig;

use super::protocol::{AgentEvent, HostMessage};

/// How long a graceful shutdown waits before killing the child.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// A live tool-server subprocess with serialized line-oriented stdio.
pub struct AgentProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl AgentProcess {
    /// Spawn the configured tool server and complete the handshake: send
    /// `initialize` with the tool/table allow-lists and wait for `ready`
    /// within the startup timeout. The child's stderr is drained to warn
    /// logs in the background.
    pub async fn spawn(config: &AgentConfig, server_name: &str) -> Result<Self> {
        let mut cmd = Command::new(&config.program);
        cmd.args(&config.args);
        if let Some(ref root) = config.agent_root {
            cmd.current_dir(root);
        }
        cmd.stdin(Stdio::piped());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn tool server: {}", config.program))?;

        let stdin = child.stdin.take().context("failed to capture stdin")?;
        let stdout = child.stdout.take().context("failed to capture stdout")?;
        let stderr = child.stderr.take().context("failed to capture stderr")?;

        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                warn!("[tool server stderr] {line}");
            }
        });

        let mut process = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        process
            .send(&HostMessage::Initialize {
                server_name: server_name.to_string(),
                tools: config.tools.clone(),
                tables: config.tables.clone(),
            })
            .await?;

        let event = timeout(config.startup_timeout, process.next_event())
            .await
            .context("timed out waiting for tool server handshake")??;

        match event {
            Some(AgentEvent::Ready { .. }) => Ok(process),
            Some(AgentEvent::Error { message }) => {
                bail!("tool server refused initialization: {message}")
            }
            Some(other) => bail!("unexpected handshake event: {other:?}"),
            None => bail!("tool server exited before completing the handshake"),
        }
    }

    /// Write one protocol message as a single line.
    pub async fn send(&mut self, message: &HostMessage) -> Result<()> {
        let mut line = serde_json::to_string(message).context("failed to encode message")?;
        line.push('\n');
        self.stdin
            .write_all(line.as_bytes())
            .await
            .context("failed to write to tool server")?;
        self.stdin
            .flush()
            .await
            .context("failed to flush tool server stdin")?;
        Ok(())
    }

    /// Read the next protocol event, skipping unparseable lines. `None`
    /// means the child closed its stdout.
    pub async fn next_event(&mut self) -> Result<Option<AgentEvent>> {
        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .context("failed to read from tool server")?;
            match line {
                None => return Ok(None),
                Some(line) => match AgentEvent::parse(&line) {
                    Some(event) => return Ok(Some(event)),
                    None => debug!("skipping non-protocol line: {line}"),
                },
            }
        }
    }

    /// Graceful teardown: ask the child to exit, then kill it if it
    /// overstays the grace period.
    pub async fn shutdown(&mut self) -> Result<()> {
        // Best effort - the child may already be gone.
        if let Err(e) = self.send(&HostMessage::Shutdown).await {
            debug!("shutdown message not delivered: {e:#}");
        }
        match timeout(SHUTDOWN_GRACE, self.child.wait()).await {
            Ok(status) => {
                status.context("failed to reap tool server")?;
                Ok(())
            }
            Err(_) => {
                self.child
                    .kill()
                    .await
                    .context("failed to kill tool server after grace period")?;
                Ok(())
            }
        }
    }
}
