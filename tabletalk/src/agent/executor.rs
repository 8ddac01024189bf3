//! Turn execution against a ready agent handle.

use std::collections::HashMap;
use std::time::Instant;

use anyhow::Context;

use crate::models::{ChatMessage, TokenUsage, TurnResult};

use super::lifecycle::AgentHandle;
use super::protocol::{AgentEvent, HostMessage};
use super::AgentError;

impl AgentHandle {
    /// Drive one request/response cycle: submit the assembled conversation,
    /// then read events until the run completes. Tool invocations are
    /// tallied per name, usage is summed across every model response
    /// (missing fields as zero), and the final text is trimmed - empty
    /// when the run produced none.
    ///
    /// The process lock serializes turns: at most one run is in flight
    /// against the shared subprocess at any time. The timer starts only
    /// after the lock is acquired, so time spent queued behind other
    /// turns is not billed to this one. A closed stream marks the handle
    /// defunct so the manager restarts the subprocess on the next request.
    pub async fn run_turn(&self, conversation: &[ChatMessage]) -> Result<TurnResult, AgentError> {
        let mut process = self.process.lock().await;
        let started = Instant::now();

        if let Err(e) = process
            .send(&HostMessage::Run {
                conversation: conversation.to_vec(),
            })
            .await
        {
            self.mark_defunct();
            return Err(AgentError::Execution(format!("{e:#}")));
        }

        let mut tools: HashMap<String, u64> = HashMap::new();
        let mut usage = TokenUsage::default();

        let text = loop {
            let event = process
                .next_event()
                .await
                .context("run aborted")
                .map_err(|e| AgentError::Execution(format!("{e:#}")))?;
            match event {
                Some(AgentEvent::ToolCall { name }) => {
                    *tools.entry(name).or_insert(0) += 1;
                }
                Some(AgentEvent::Response { usage: reported }) => {
                    if let Some(reported) = reported {
                        usage.add(reported);
                    }
                }
                Some(AgentEvent::Result { output }) => break output.unwrap_or_default(),
                Some(AgentEvent::Error { message }) => {
                    return Err(AgentError::Execution(message));
                }
                // A stray handshake replay carries no turn data.
                Some(AgentEvent::Ready { .. }) => {}
                None => {
                    self.mark_defunct();
                    return Err(AgentError::Execution(
                        "tool server closed the stream mid-turn".to_string(),
                    ));
                }
            }
        };
        drop(process);

        Ok(TurnResult {
            text: text.trim().to_string(),
            tools,
            usage,
            elapsed: started.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::agent::testing::{crash_config, stub_config};
    use crate::agent::AgentManager;

    #[tokio::test]
    async fn run_turn_extracts_text_tools_and_usage() {
        let dir = tempfile::tempdir().unwrap();
        let manager = AgentManager::new(stub_config(&dir.path().join("spawns")));
        let handle = manager.ensure_ready().await.unwrap();

        let turn = handle
            .run_turn(&[ChatMessage::user("Hello")])
            .await
            .unwrap();

        assert_eq!(turn.text, "stub reply");
        assert_eq!(turn.tools.get("run_query"), Some(&2));
        assert_eq!(turn.tools.get("list_tables"), Some(&1));
        assert_eq!(turn.tools.get("describe_table"), None);
        // 12 + 3 input tokens; the second response's missing fields are zero.
        assert_eq!(turn.usage.input_tokens, 15);
        assert_eq!(turn.usage.output_tokens, 7);
        assert_eq!(turn.usage.total_tokens, 19);
        assert!(turn.time_ms() > 0.0);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn consecutive_turns_reuse_the_same_subprocess() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("spawns");
        let manager = AgentManager::new(stub_config(&marker));
        let handle = manager.ensure_ready().await.unwrap();

        for _ in 0..3 {
            let turn = handle.run_turn(&[ChatMessage::user("hi")]).await.unwrap();
            assert_eq!(turn.text, "stub reply");
        }
        let spawns = std::fs::read_to_string(&marker).unwrap().lines().count();
        assert_eq!(spawns, 1);

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn queued_wait_is_not_billed_to_the_turn() {
        let dir = tempfile::tempdir().unwrap();
        let manager = AgentManager::new(stub_config(&dir.path().join("spawns")));
        let handle = manager.ensure_ready().await.unwrap();

        // Hold the process lock so the turn has to queue behind us.
        let guard = handle.process.lock().await;
        let contender = {
            let handle = Arc::clone(&handle);
            tokio::spawn(async move { handle.run_turn(&[ChatMessage::user("hi")]).await })
        };
        tokio::time::sleep(Duration::from_millis(300)).await;
        drop(guard);

        let turn = contender.await.unwrap().unwrap();
        // The 300ms spent queued must not show up in the turn's time.
        assert!(turn.time_ms() < 250.0, "queued wait billed: {}", turn.time_ms());

        manager.shutdown().await;
    }

    #[tokio::test]
    async fn mid_turn_exit_unreadies_the_agent_for_restart() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("spawns");
        let manager = AgentManager::new(crash_config(&marker));
        let handle = manager.ensure_ready().await.unwrap();

        let err = handle.run_turn(&[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, AgentError::Execution(_)));

        // The dead subprocess no longer counts as ready, and the next
        // ensure_ready starts a replacement instead of reusing it.
        assert!(!manager.is_ready().await);
        manager.ensure_ready().await.unwrap();
        let spawns = std::fs::read_to_string(&marker).unwrap().lines().count();
        assert_eq!(spawns, 2);

        manager.shutdown().await;
    }
}
