//! Tool-server lifecycle management.
//!
//! At most one live tool-server handle exists per process. The manager is
//! constructed once at startup and injected into request handlers; it is
//! the only component allowed to start or stop the subprocess.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::config::AgentConfig;

use super::runtime::AgentProcess;
use super::AgentError;

/// The live binding to a ready tool server. Turns against it are
/// serialized behind the process lock: at most one in-flight run.
pub struct AgentHandle {
    pub(super) process: Mutex<AgentProcess>,
    server_name: String,
    defunct: AtomicBool,
}

impl AgentHandle {
    /// Name the subprocess was initialized under.
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// Flag the subprocess as gone. Set when a turn observes a closed
    /// stream; the manager replaces a defunct handle on the next request.
    pub(super) fn mark_defunct(&self) {
        self.defunct.store(true, Ordering::Release);
    }

    pub(super) fn is_defunct(&self) -> bool {
        self.defunct.load(Ordering::Acquire)
    }
}

impl fmt::Debug for AgentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentHandle")
            .field("server_name", &self.server_name)
            .field("defunct", &self.is_defunct())
            .finish_non_exhaustive()
    }
}

/// Owns the single tool-server handle and makes initialization idempotent
/// under concurrent callers.
///
/// State machine: uninitialized -> (ensure_ready ok) -> ready ->
/// (shutdown) -> uninitialized. A failed `ensure_ready` leaves the manager
/// uninitialized, so the next call retries from scratch.
pub struct AgentManager {
    config: AgentConfig,
    handle: RwLock<Option<Arc<AgentHandle>>>,
    init_lock: Mutex<()>,
}

impl AgentManager {
    /// Create an uninitialized manager for the given configuration.
    pub fn new(config: AgentConfig) -> Self {
        Self {
            config,
            handle: RwLock::new(None),
            init_lock: Mutex::new(()),
        }
    }

    /// Return the live handle, initializing the subprocess on first use.
    ///
    /// The init lock plus a re-check after acquiring it guarantees that
    /// concurrent first requests cannot race to spawn two subprocesses.
    pub async fn ensure_ready(&self) -> Result<Arc<AgentHandle>, AgentError> {
        if let Some(handle) = self.handle.read().await.clone() {
            if !handle.is_defunct() {
                return Ok(handle);
            }
        }

        let _guard = self.init_lock.lock().await;
        // Bind the clone first so the read guard is released before the
        // write below.
        let existing = self.handle.read().await.clone();
        if let Some(handle) = existing {
            if !handle.is_defunct() {
                return Ok(handle);
            }
            warn!("tool server {} exited, restarting", handle.server_name());
            *self.handle.write().await = None;
        }

        let server_name = format!("tabletalk-tools-{}", std::process::id());
        info!("starting tool server as {server_name}");

        let process = AgentProcess::spawn(&self.config, &server_name)
            .await
            .map_err(|e| AgentError::Initialization(format!("{e:#}")))?;

        let handle = Arc::new(AgentHandle {
            process: Mutex::new(process),
            server_name,
            defunct: AtomicBool::new(false),
        });
        *self.handle.write().await = Some(Arc::clone(&handle));
        info!("tool server ready");
        Ok(handle)
    }

    /// The live handle without initializing. `Err(NotReady)` when no
    /// subprocess has been started, or when the stored one is defunct.
    pub async fn current(&self) -> Result<Arc<AgentHandle>, AgentError> {
        match self.handle.read().await.clone() {
            Some(handle) if !handle.is_defunct() => Ok(handle),
            _ => Err(AgentError::NotReady),
        }
    }

    /// Externally observable readiness, for health reporting.
    pub async fn is_ready(&self) -> bool {
        self.current().await.is_ok()
    }

    /// Tear down the subprocess if one is live. Teardown failures are
    /// logged, never raised; the handle is cleared regardless so a later
    /// `ensure_ready` can retry cleanly.
    pub async fn shutdown(&self) {
        let Some(handle) = self.handle.write().await.take() else {
            return;
        };
        info!("stopping tool server {}", handle.server_name());
        let mut process = handle.process.lock().await;
        if let Err(e) = process.shutdown().await {
            warn!("tool server teardown failed: {e:#}");
        }
    }
}
