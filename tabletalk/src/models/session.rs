//! Session model - one ongoing conversation's history and metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::message::{ChatMessage, MessageRole};
use super::turn::LastResponse;

/// A conversation session. Messages are append-only and strictly ordered;
/// the id is immutable once created; timestamps never move backwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Unique session identifier.
    pub id: String,
    /// When the session was created.
    pub created_at: DateTime<Utc>,
    /// When the session was last mutated.
    pub updated_at: DateTime<Utc>,
    /// Ordered conversation transcript.
    pub messages: Vec<ChatMessage>,
    /// Summary of the most recent assistant response, if any.
    pub last_response: Option<LastResponse>,
}

impl Session {
    /// Create an empty session with the given id.
    pub fn new(id: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            created_at: now,
            updated_at: now,
            messages: Vec::new(),
            last_response: None,
        }
    }

    /// Append one message, bumping `updated_at`. An assistant message
    /// carrying metadata replaces the stored `last_response` outright.
    pub fn push_message(
        &mut self,
        role: MessageRole,
        content: impl Into<String>,
        metadata: Option<LastResponse>,
    ) {
        self.messages.push(ChatMessage::new(role, content));
        if role == MessageRole::Assistant {
            if let Some(meta) = metadata {
                self.last_response = Some(meta);
            }
        }
        // Clamp so updated_at stays monotonic even if the clock steps back.
        self.updated_at = self.updated_at.max(Utc::now());
    }

    /// Build the list/detail summary for this session.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.id.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
            message_count: self.messages.len(),
            last_response_metadata: self.last_response.clone(),
        }
    }
}

/// Session summary exposed by the list and detail endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    pub last_response_metadata: Option<LastResponse>,
}
