//! Turn result model - everything extracted from one agent run.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Token usage totals for a turn. Fields the backend never reported stay
/// at zero rather than being treated as errors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl TokenUsage {
    /// Accumulate another usage record into this one.
    pub fn add(&mut self, other: Self) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}

/// Result of one request/response cycle against the agent.
#[derive(Debug, Clone)]
pub struct TurnResult {
    /// Final response text, trimmed. Empty if the run produced none.
    pub text: String,
    /// Tool name -> invocation count within this turn. Absent entries
    /// mean the tool was not called.
    pub tools: HashMap<String, u64>,
    /// Token usage summed across every model response in the run.
    pub usage: TokenUsage,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
}

impl TurnResult {
    /// Elapsed time in milliseconds for API responses.
    pub fn time_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }
}

/// Summary of the most recent assistant response, stored on the session.
/// Replaced wholesale each turn, never merged with the previous value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastResponse {
    /// Tool invocation counts for the turn.
    pub tools: HashMap<String, u64>,
    /// Token usage for the turn.
    pub tokens: TokenUsage,
    /// Wall-clock time for the turn in milliseconds.
    pub time_ms: f64,
}

impl LastResponse {
    /// Build the stored summary from a turn result.
    pub fn from_turn(turn: &TurnResult) -> Self {
        Self {
            tools: turn.tools.clone(),
            tokens: turn.usage,
            time_ms: turn.time_ms(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn usage_defaults_missing_fields_to_zero() {
        let usage: TokenUsage = serde_json::from_str(r#"{"input_tokens":5}"#).unwrap();
        assert_eq!(usage.input_tokens, 5);
        assert_eq!(usage.output_tokens, 0);
        assert_eq!(usage.total_tokens, 0);
    }

    #[test]
    fn usage_accumulates() {
        let mut total = TokenUsage::default();
        total.add(TokenUsage {
            input_tokens: 10,
            output_tokens: 4,
            total_tokens: 14,
        });
        total.add(TokenUsage {
            input_tokens: 2,
            output_tokens: 1,
            total_tokens: 3,
        });
        assert_eq!(total.input_tokens, 12);
        assert_eq!(total.output_tokens, 5);
        assert_eq!(total.total_tokens, 17);
    }
}
