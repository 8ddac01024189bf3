//! External agent integration.
//!
//! The database-querying agent itself lives in an external tool-serving
//! subprocess; this module owns its lifecycle and the line-oriented JSON
//! protocol spoken over its stdio. Nothing here reasons about tools or
//! queries - it is bookkeeping and protocol translation only.

mod executor;
mod lifecycle;
mod protocol;
mod runtime;

pub use lifecycle::{AgentHandle, AgentManager};

use thiserror::Error;

/// Errors from the agent subsystem. Callers branch on the kind: the
/// initialization-class variants map to 503 and leave the manager
/// retryable, execution failures map to 500.
#[derive(Debug, Error)]
pub enum AgentError {
    /// No live handle exists and initialization was not attempted.
    #[error("agent is not initialized")]
    NotReady,
    /// Subprocess start or handshake failed; the manager stays
    /// uninitialized and the next call retries.
    #[error("agent initialization failed: {0}")]
    Initialization(String),
    /// A turn failed after the agent was ready.
    #[error("agent execution failed: {0}")]
    Execution(String),
}

impl AgentError {
    /// Whether this is an initialization-class failure (as opposed to a
    /// failure of a turn against a ready agent).
    pub const fn is_initialization(&self) -> bool {
        matches!(self, Self::NotReady | Self::Initialization(_))
    }
}
