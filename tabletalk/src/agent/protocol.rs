//! Wire protocol spoken with the tool-server subprocess.
//!
//! One JSON document per line in each direction. Incoming lines are
//! deserialized into a fixed event shape with named optional fields -
//! missing usage numbers count as zero, unknown lines are skipped -
//! rather than probed dynamically at each call site.

use serde::{Deserialize, Serialize};

use crate::models::{ChatMessage, TokenUsage};

/// Messages the host sends to the agent subprocess.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// First message after spawn: identifies the server and carries the
    /// explicit tool and table allow-lists.
    Initialize {
        server_name: String,
        tools: Vec<String>,
        tables: Vec<String>,
    },
    /// Execute one turn over the assembled conversation.
    Run { conversation: Vec<ChatMessage> },
    /// Ask the subprocess to exit cleanly.
    Shutdown,
}

/// Events the agent subprocess emits.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Handshake acknowledgement after `initialize`.
    Ready {
        #[serde(default)]
        server_name: Option<String>,
        #[serde(default)]
        tools: Vec<String>,
    },
    /// The agent invoked a named tool during the current run.
    ToolCall { name: String },
    /// One model response finished, with its token usage if reported.
    Response {
        #[serde(default)]
        usage: Option<TokenUsage>,
    },
    /// The run completed with the final output text.
    Result {
        #[serde(default)]
        output: Option<String>,
    },
    /// The run (or handshake) failed.
    Error { message: String },
}

impl AgentEvent {
    /// Parse one stdout line. Blank and unrecognized lines yield `None`;
    /// the reader skips them rather than failing the turn.
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        serde_json::from_str(line).ok()
    }
}
