//! Session store - in-memory table of conversation sessions with optional
//! snapshot-to-disk persistence.
//!
//! When a snapshot directory is configured, every mutating call rewrites the
//! full session as one JSON document at `<dir>/<session_id>.json`, and the
//! store reloads all snapshots at startup. Snapshot failures are warnings,
//! never fatal to the serving path.

use std::collections::HashMap;
use std::path::PathBuf;

use thiserror::Error;
use tracing::warn;
use uuid::Uuid;

use crate::models::{ChatMessage, LastResponse, MessageRole, Session, SessionSummary};

/// Errors from session store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The session id is unknown.
    #[error("session {0} not found")]
    NotFound(String),
    /// The session id cannot be used as a snapshot filename.
    #[error("invalid session id: {0}")]
    InvalidId(String),
}

/// In-memory session table with optional file-per-session persistence.
///
/// The store itself is synchronous; the server wraps it in an async lock
/// and mutates it from one request context per operation.
pub struct SessionStore {
    sessions: HashMap<String, Session>,
    persist_dir: Option<PathBuf>,
}

impl SessionStore {
    /// Create a store. With a snapshot directory, the directory is created
    /// and any existing snapshots are loaded.
    pub fn new(persist_dir: Option<PathBuf>) -> Self {
        let mut store = Self {
            sessions: HashMap::new(),
            persist_dir,
        };
        if let Some(dir) = store.persist_dir.clone() {
            if let Err(e) = std::fs::create_dir_all(&dir) {
                warn!("failed to create session dir {}: {e}", dir.display());
            }
            store.load_all(&dir);
        }
        store
    }

    /// Allocate a new session with a fresh UUIDv7 id. Returns the id.
    pub fn create(&mut self) -> String {
        let id = Uuid::now_v7().to_string();
        self.insert_new(id.clone());
        id
    }

    /// Create a session preserving a caller-supplied id. Used when a chat
    /// request names a session that does not exist yet: the caller's id is
    /// kept rather than silently substituting a new one. Ids that could
    /// name a path outside the snapshot directory are rejected.
    pub fn create_with_id(&mut self, id: &str) -> Result<(), StoreError> {
        if !Self::id_is_safe(id) {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        self.insert_new(id.to_string());
        Ok(())
    }

    fn insert_new(&mut self, id: String) {
        let session = Session::new(id.clone());
        self.save_snapshot(&session);
        self.sessions.insert(id, session);
    }

    /// Look up a session by id.
    pub fn get(&self, id: &str) -> Option<&Session> {
        self.sessions.get(id)
    }

    /// Append a message to an existing session. Assistant messages may
    /// carry the turn summary, which replaces the stored `last_response`.
    pub fn append_message(
        &mut self,
        id: &str,
        role: MessageRole,
        content: impl Into<String>,
        metadata: Option<LastResponse>,
    ) -> Result<(), StoreError> {
        let session = self
            .sessions
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        session.push_message(role, content, metadata);
        let snapshot = session.clone();
        self.save_snapshot(&snapshot);
        Ok(())
    }

    /// Summaries of all sessions, most recently updated first. Ties are
    /// broken by id so repeated listings of unchanged data stay stable.
    pub fn list(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<&Session> = self.sessions.values().collect();
        sessions.sort_by(|a, b| {
            b.updated_at
                .cmp(&a.updated_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        sessions.iter().map(|s| s.summary()).collect()
    }

    /// Delete a session and its snapshot. Returns whether it existed.
    pub fn delete(&mut self, id: &str) -> bool {
        if self.sessions.remove(id).is_none() {
            return false;
        }
        if let Some(path) = self.snapshot_path(id) {
            if path.exists() {
                if let Err(e) = std::fs::remove_file(&path) {
                    warn!("failed to remove snapshot {}: {e}", path.display());
                }
            }
        }
        true
    }

    /// Stored messages for feeding the next turn. `None` means "no
    /// history" - either the session is unknown or it has no messages yet -
    /// so callers can distinguish a fresh conversation from a resumed one.
    pub fn conversation_for(&self, id: &str) -> Option<Vec<ChatMessage>> {
        let session = self.sessions.get(id)?;
        if session.messages.is_empty() {
            return None;
        }
        Some(session.messages.clone())
    }

    /// Drop every session and snapshot.
    pub fn clear_all(&mut self) {
        self.sessions.clear();
        if let Some(dir) = &self.persist_dir {
            if let Ok(entries) = std::fs::read_dir(dir) {
                for entry in entries.flatten() {
                    let path = entry.path();
                    if path.extension().is_some_and(|e| e == "json") {
                        if let Err(e) = std::fs::remove_file(&path) {
                            warn!("failed to remove snapshot {}: {e}", path.display());
                        }
                    }
                }
            }
        }
    }

    /// Number of sessions currently held.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// A safe id is non-empty and free of path separators and `..`, so
    /// `<dir>/<id>.json` always stays inside the snapshot directory.
    fn id_is_safe(id: &str) -> bool {
        !id.is_empty() && !id.contains(['/', '\\']) && !id.contains("..")
    }

    fn snapshot_path(&self, id: &str) -> Option<PathBuf> {
        self.persist_dir.as_ref().map(|dir| dir.join(format!("{id}.json")))
    }

    fn save_snapshot(&self, session: &Session) {
        let Some(path) = self.snapshot_path(&session.id) else {
            return;
        };
        let json = match serde_json::to_string_pretty(session) {
            Ok(json) => json,
            Err(e) => {
                warn!("failed to serialize session {}: {e}", session.id);
                return;
            }
        };
        if let Err(e) = std::fs::write(&path, json) {
            warn!("failed to write snapshot {}: {e}", path.display());
        }
    }

    fn load_all(&mut self, dir: &PathBuf) {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("failed to read session dir {}: {e}", dir.display());
                return;
            }
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    warn!("skipping unreadable snapshot {}: {e}", path.display());
                    continue;
                }
            };
            match serde_json::from_str::<Session>(&content) {
                Ok(session) => {
                    self.sessions.insert(session.id.clone(), session);
                }
                Err(e) => {
                    warn!("skipping corrupt snapshot {}: {e}", path.display());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TokenUsage;
    use std::collections::HashMap;

    fn sample_metadata() -> LastResponse {
        LastResponse {
            tools: HashMap::from([("run_query".to_string(), 2)]),
            tokens: TokenUsage {
                input_tokens: 100,
                output_tokens: 40,
                total_tokens: 140,
            },
            time_ms: 37.5,
        }
    }

    #[test]
    fn create_yields_distinct_ids_and_empty_sessions() {
        let mut store = SessionStore::new(None);
        let ids: Vec<String> = (0..10).map(|_| store.create()).collect();
        let unique: std::collections::HashSet<&String> = ids.iter().collect();
        assert_eq!(unique.len(), ids.len());
        for id in &ids {
            let session = store.get(id).unwrap();
            assert!(session.messages.is_empty());
            assert_eq!(session.created_at, session.updated_at);
        }
    }

    #[test]
    fn append_grows_by_one_and_keeps_order() {
        let mut store = SessionStore::new(None);
        let id = store.create();
        for i in 0..5 {
            store
                .append_message(&id, MessageRole::User, format!("msg {i}"), None)
                .unwrap();
            assert_eq!(store.get(&id).unwrap().messages.len(), i + 1);
        }
        let contents: Vec<&str> = store
            .get(&id)
            .unwrap()
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(contents, vec!["msg 0", "msg 1", "msg 2", "msg 3", "msg 4"]);
    }

    #[test]
    fn append_to_unknown_session_is_not_found() {
        let mut store = SessionStore::new(None);
        let err = store
            .append_message("missing", MessageRole::User, "hi", None)
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(id) if id == "missing"));
    }

    #[test]
    fn assistant_metadata_overwrites_exactly() {
        let mut store = SessionStore::new(None);
        let id = store.create();
        store
            .append_message(
                &id,
                MessageRole::Assistant,
                "first",
                Some(LastResponse {
                    tools: HashMap::from([("list_tables".to_string(), 1)]),
                    tokens: TokenUsage::default(),
                    time_ms: 5.0,
                }),
            )
            .unwrap();
        let meta = sample_metadata();
        store
            .append_message(&id, MessageRole::Assistant, "second", Some(meta.clone()))
            .unwrap();
        let summary = store.get(&id).unwrap().summary();
        assert_eq!(summary.last_response_metadata, Some(meta));
    }

    #[test]
    fn list_orders_most_recent_first() {
        let mut store = SessionStore::new(None);
        let a = store.create();
        let b = store.create();
        store
            .append_message(&a, MessageRole::User, "to a", None)
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        store
            .append_message(&b, MessageRole::User, "to b", None)
            .unwrap();
        let listed = store.list();
        assert_eq!(listed[0].session_id, b);
        assert_eq!(listed[1].session_id, a);
    }

    #[test]
    fn delete_reports_existence() {
        let mut store = SessionStore::new(None);
        assert!(!store.delete("missing"));
        let id = store.create();
        assert!(store.delete(&id));
        assert!(store.get(&id).is_none());
    }

    #[test]
    fn conversation_for_distinguishes_no_history() {
        let mut store = SessionStore::new(None);
        assert!(store.conversation_for("missing").is_none());
        let id = store.create();
        assert!(store.conversation_for(&id).is_none());
        store
            .append_message(&id, MessageRole::User, "hello", None)
            .unwrap();
        let items = store.conversation_for(&id).unwrap();
        assert_eq!(items, vec![ChatMessage::user("hello")]);
    }

    #[test]
    fn create_with_id_preserves_caller_id() {
        let mut store = SessionStore::new(None);
        store.create_with_id("caller-chosen").unwrap();
        assert!(store.get("caller-chosen").is_some());
    }

    #[test]
    fn path_escaping_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::new(Some(dir.path().join("sessions")));
        for id in ["../escaped", "..", "a/b", "nested\\up", ""] {
            let err = store.create_with_id(id).unwrap_err();
            assert!(matches!(err, StoreError::InvalidId(_)), "accepted {id:?}");
        }
        assert!(store.is_empty());
        // Nothing was written above the snapshot directory.
        assert!(!dir.path().join("escaped.json").exists());
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let id;
        let original;
        {
            let mut store = SessionStore::new(Some(dir.path().to_path_buf()));
            id = store.create();
            store
                .append_message(&id, MessageRole::User, "hello", None)
                .unwrap();
            store
                .append_message(
                    &id,
                    MessageRole::Assistant,
                    "hi there",
                    Some(sample_metadata()),
                )
                .unwrap();
            original = store.get(&id).unwrap().clone();
        }

        let reloaded = SessionStore::new(Some(dir.path().to_path_buf()));
        let session = reloaded.get(&id).unwrap();
        assert_eq!(session.id, original.id);
        assert_eq!(session.created_at, original.created_at);
        assert_eq!(session.updated_at, original.updated_at);
        assert_eq!(session.messages, original.messages);
        assert_eq!(session.last_response, original.last_response);
    }

    #[test]
    fn delete_removes_snapshot_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::new(Some(dir.path().to_path_buf()));
        let id = store.create();
        let path = dir.path().join(format!("{id}.json"));
        assert!(path.exists());
        assert!(store.delete(&id));
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_snapshot_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        {
            let mut store = SessionStore::new(Some(dir.path().to_path_buf()));
            store.create();
        }
        let store = SessionStore::new(Some(dir.path().to_path_buf()));
        // Only the valid snapshot is loaded.
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_all_drops_sessions_and_snapshots() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SessionStore::new(Some(dir.path().to_path_buf()));
        store.create();
        store.create();
        store.clear_all();
        assert!(store.is_empty());
        let remaining = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(remaining, 0);
    }
}
