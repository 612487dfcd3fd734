//! Completer session — one engine process bound to one workspace.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, RwLock};
use tokio::time::{Instant, sleep, timeout};

use anvil_types::Diagnostic;

use crate::engine::{CompleterEngine, EngineLauncher};
use crate::error::{CompleterError, Result};
use crate::normalize;

/// Lifecycle state. `Ready` owns the engine handle — holding the handle is
/// the proof the engine exists, so there is no separate liveness flag to
/// keep in sync.
enum SessionState {
    Starting,
    Ready(Arc<dyn CompleterEngine>),
    Failed(String),
    Stopped,
}

/// One live completer session.
///
/// Created in `Starting`; a detached bring-up task drives it to `Ready`
/// (engine spawned and answering readiness polls) or `Failed` (engine
/// reported a startup failure). Readiness waits are caller-side polls with
/// their own timeouts — a timeout never moves the state, so a slow engine
/// can still come up for a later caller.
pub struct CompleterSession {
    workspace_root: PathBuf,
    state: RwLock<SessionState>,
    diagnostics: Arc<Mutex<HashMap<PathBuf, Vec<Diagnostic>>>>,
    poll_interval: Duration,
    parse_timeout: Duration,
}

impl CompleterSession {
    /// Create the session and kick off engine bring-up.
    pub(crate) fn start(
        workspace_root: PathBuf,
        launcher: Arc<dyn EngineLauncher>,
        poll_interval: Duration,
        parse_timeout: Duration,
    ) -> Arc<Self> {
        let session = Arc::new(Self {
            workspace_root,
            state: RwLock::new(SessionState::Starting),
            diagnostics: Arc::new(Mutex::new(HashMap::new())),
            poll_interval,
            parse_timeout,
        });
        tokio::spawn(Self::bring_up(Arc::clone(&session), launcher));
        session
    }

    /// Spawn the engine, then poll it until it answers ready.
    ///
    /// No deadline here: timeout policy belongs to `wait_until_ready`
    /// callers. If the session is stopped mid-bring-up, the fresh engine is
    /// torn down instead of installed.
    async fn bring_up(self: Arc<Self>, launcher: Arc<dyn EngineLauncher>) {
        let engine = match launcher.spawn(&self.workspace_root).await {
            Ok(engine) => engine,
            Err(e) => {
                let mut state = self.state.write().await;
                if !matches!(*state, SessionState::Stopped) {
                    tracing::warn!(
                        workspace = %self.workspace_root.display(),
                        "Completer engine failed to start: {e:#}"
                    );
                    *state = SessionState::Failed(format!("{e:#}"));
                }
                return;
            }
        };

        loop {
            if matches!(*self.state.read().await, SessionState::Stopped) {
                break;
            }
            if engine.is_ready().await {
                let mut state = self.state.write().await;
                if matches!(*state, SessionState::Starting) {
                    tracing::info!(
                        workspace = %self.workspace_root.display(),
                        "Completer session ready"
                    );
                    *state = SessionState::Ready(engine);
                    return;
                }
                // Stopped while we were polling.
                break;
            }
            sleep(self.poll_interval).await;
        }

        if let Err(e) = engine.terminate().await {
            tracing::debug!(
                workspace = %self.workspace_root.display(),
                "Terminating engine after stop: {e:#}"
            );
        }
    }

    #[must_use]
    pub fn workspace_root(&self) -> &Path {
        &self.workspace_root
    }

    pub(crate) async fn is_stopped(&self) -> bool {
        matches!(*self.state.read().await, SessionState::Stopped)
    }

    /// Block this caller (and nobody else) until the session is usable.
    ///
    /// `SessionNotReady` on timeout leaves the session `Starting`; callers
    /// may retry and observe a later `Ready`.
    pub async fn wait_until_ready(&self, wait_timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + wait_timeout;
        loop {
            match &*self.state.read().await {
                SessionState::Ready(_) => return Ok(()),
                SessionState::Failed(message) => {
                    return Err(CompleterError::EngineSpawnFailed {
                        message: message.clone(),
                    });
                }
                SessionState::Stopped => return Err(CompleterError::SessionNotReady),
                SessionState::Starting => {}
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(CompleterError::SessionNotReady);
            }
            sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    /// Forward one parse request and cache the normalized result.
    ///
    /// The engine call and the cache write run on a detached task: a caller
    /// that gives up (timeout, disconnect) cannot leave the cache stale, so
    /// re-parsing stays idempotent — last write wins per file.
    pub async fn send_parse_event(
        &self,
        filepath: &Path,
        contents: &str,
    ) -> Result<Vec<Diagnostic>> {
        let engine = match &*self.state.read().await {
            SessionState::Ready(engine) => Arc::clone(engine),
            SessionState::Failed(message) => {
                return Err(CompleterError::EngineSpawnFailed {
                    message: message.clone(),
                });
            }
            SessionState::Starting | SessionState::Stopped => {
                return Err(CompleterError::SessionNotReady);
            }
        };

        let file = filepath.to_path_buf();
        let text = contents.to_string();
        let cache = Arc::clone(&self.diagnostics);
        let task = tokio::spawn(async move {
            let raw = engine
                .send_parse(&file, &text)
                .await
                .map_err(|e| format!("{e:#}"))?;
            let normalized = normalize::normalize_all(&raw, engine.coordinate_base(), &file);
            cache.lock().await.insert(file, normalized.clone());
            Ok::<_, String>(normalized)
        });

        match timeout(self.parse_timeout, task).await {
            Ok(Ok(Ok(normalized))) => Ok(normalized),
            Ok(Ok(Err(message))) => Err(CompleterError::EngineRequestFailed { message }),
            Ok(Err(join_error)) => Err(CompleterError::EngineRequestFailed {
                message: join_error.to_string(),
            }),
            Err(_) => Err(CompleterError::EngineRequestFailed {
                message: format!(
                    "parse request timed out after {:?}",
                    self.parse_timeout
                ),
            }),
        }
    }

    /// Most recent normalized diagnostics for `filepath`, if any.
    pub async fn cached_diagnostics(&self, filepath: &Path) -> Option<Vec<Diagnostic>> {
        self.diagnostics.lock().await.get(filepath).cloned()
    }

    /// Stop the session from any state. Idempotent.
    ///
    /// Stopping mid-`Starting` leaves engine teardown to the bring-up task,
    /// which observes the state change on its next poll.
    pub async fn stop(&self) -> Result<()> {
        let previous = {
            let mut state = self.state.write().await;
            std::mem::replace(&mut *state, SessionState::Stopped)
        };
        match previous {
            SessionState::Ready(engine) => {
                engine
                    .terminate()
                    .await
                    .map_err(|e| CompleterError::EngineRequestFailed {
                        message: format!("{e:#}"),
                    })
            }
            SessionState::Starting | SessionState::Failed(_) | SessionState::Stopped => Ok(()),
        }
    }
}
