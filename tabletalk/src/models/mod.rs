//! Data models for tabletalk entities.

mod message;
mod session;
mod turn;

pub use message::{ChatMessage, MessageRole};
pub use session::{Session, SessionSummary};
pub use turn::{LastResponse, TokenUsage, TurnResult};
