//! Session supervisor — the process-wide registry of completer sessions.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use crate::engine::EngineLauncher;
use crate::error::Result;
use crate::session::CompleterSession;

/// Registry enforcing at-most-one session per workspace root.
///
/// An explicit owned object handed to whoever aggregates diagnostics — not a
/// module-level singleton — so independent supervisors (tests, embedders)
/// cannot see each other's sessions.
pub struct SessionSupervisor {
    sessions: Mutex<HashMap<PathBuf, Arc<CompleterSession>>>,
    poll_interval: Duration,
    parse_timeout: Duration,
}

impl SessionSupervisor {
    #[must_use]
    pub fn new(poll_interval: Duration, parse_timeout: Duration) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            poll_interval,
            parse_timeout,
        }
    }

    /// Get the workspace's session, creating it if absent.
    ///
    /// The check-and-insert happens under one lock hold, so concurrent
    /// callers for the same root observe exactly one engine start and all
    /// receive the same session. A session someone stopped out-of-band is
    /// replaced by a fresh one; a `Failed` resident is returned as-is —
    /// replacing it is an explicit `stop` + re-create.
    pub async fn get_or_create(
        &self,
        workspace_root: &Path,
        launcher: &Arc<dyn EngineLauncher>,
    ) -> Arc<CompleterSession> {
        let mut sessions = self.sessions.lock().await;
        if let Some(existing) = sessions.get(workspace_root) {
            if !existing.is_stopped().await {
                return Arc::clone(existing);
            }
        }

        tracing::info!(
            workspace = %workspace_root.display(),
            "Creating completer session"
        );
        let session = CompleterSession::start(
            workspace_root.to_path_buf(),
            Arc::clone(launcher),
            self.poll_interval,
            self.parse_timeout,
        );
        sessions.insert(workspace_root.to_path_buf(), Arc::clone(&session));
        session
    }

    /// The workspace's current session, if one exists.
    pub async fn get(&self, workspace_root: &Path) -> Option<Arc<CompleterSession>> {
        self.sessions.lock().await.get(workspace_root).cloned()
    }

    /// Stop and deregister the workspace's session.
    ///
    /// A later `get_or_create` for the same root starts fresh. Unknown
    /// roots are a no-op.
    pub async fn stop(&self, workspace_root: &Path) -> Result<()> {
        let session = self.sessions.lock().await.remove(workspace_root);
        match session {
            Some(session) => session.stop().await,
            None => Ok(()),
        }
    }

    /// Stop every session, best-effort.
    ///
    /// Individual stop failures are logged and do not abort the remaining
    /// stops.
    pub async fn stop_all(&self) {
        let sessions: Vec<(PathBuf, Arc<CompleterSession>)> =
            self.sessions.lock().await.drain().collect();
        for (root, session) in sessions {
            tracing::info!(workspace = %root.display(), "Stopping completer session");
            if let Err(e) = session.stop().await {
                tracing::warn!(
                    workspace = %root.display(),
                    "Failed to stop completer session: {e}"
                );
            }
        }
    }

    /// Number of live registry entries.
    pub async fn session_count(&self) -> usize {
        self.sessions.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use anvil_config::CoordinateBase;
    use crate::engine::{CompleterEngine, RawDiagnostic};

    struct CountingEngine;

    #[async_trait]
    impl CompleterEngine for CountingEngine {
        async fn is_ready(&self) -> bool {
            true
        }

        async fn send_parse(
            &self,
            _filepath: &Path,
            _contents: &str,
        ) -> anyhow::Result<Vec<RawDiagnostic>> {
            Ok(vec![])
        }

        fn coordinate_base(&self) -> CoordinateBase {
            CoordinateBase::OneBased
        }

        async fn terminate(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    struct CountingLauncher {
        spawn_count: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EngineLauncher for CountingLauncher {
        async fn spawn(
            &self,
            _workspace_root: &Path,
        ) -> anyhow::Result<Arc<dyn CompleterEngine>> {
            self.spawn_count.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(CountingEngine))
        }
    }

    fn counting_launcher() -> (Arc<dyn EngineLauncher>, Arc<AtomicUsize>) {
        let spawn_count = Arc::new(AtomicUsize::new(0));
        let launcher = Arc::new(CountingLauncher {
            spawn_count: Arc::clone(&spawn_count),
        });
        (launcher, spawn_count)
    }

    fn supervisor() -> SessionSupervisor {
        SessionSupervisor::new(Duration::from_millis(10), Duration::from_millis(500))
    }

    #[tokio::test]
    async fn test_same_root_reuses_session() {
        let supervisor = supervisor();
        let (launcher, spawn_count) = counting_launcher();
        let root = Path::new("/ws/app");

        let first = supervisor.get_or_create(root, &launcher).await;
        let second = supervisor.get_or_create(root, &launcher).await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_concurrent_get_or_create_spawns_once() {
        let supervisor = Arc::new(supervisor());
        let (launcher, spawn_count) = counting_launcher();
        let root = PathBuf::from("/ws/app");

        let mut handles = Vec::new();
        for _ in 0..16 {
            let supervisor = Arc::clone(&supervisor);
            let launcher = Arc::clone(&launcher);
            let root = root.clone();
            handles.push(tokio::spawn(async move {
                supervisor.get_or_create(&root, &launcher).await
            }));
        }

        let mut sessions = Vec::new();
        for handle in handles {
            sessions.push(handle.await.unwrap());
        }

        assert_eq!(spawn_count.load(Ordering::SeqCst), 1);
        assert!(
            sessions
                .iter()
                .all(|session| Arc::ptr_eq(session, &sessions[0]))
        );
    }

    #[tokio::test]
    async fn test_distinct_roots_with_same_leaf_get_distinct_sessions() {
        let supervisor = supervisor();
        let (launcher, spawn_count) = counting_launcher();

        let first = supervisor
            .get_or_create(Path::new("/alpha/testy"), &launcher)
            .await;
        let second = supervisor
            .get_or_create(Path::new("/beta/testy"), &launcher)
            .await;

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(spawn_count.load(Ordering::SeqCst), 2);
        assert_eq!(supervisor.session_count().await, 2);
    }

    #[tokio::test]
    async fn test_stop_removes_and_recreate_spawns_fresh() {
        let supervisor = supervisor();
        let (launcher, spawn_count) = counting_launcher();
        let root = Path::new("/ws/app");

        let first = supervisor.get_or_create(root, &launcher).await;
        supervisor.stop(root).await.unwrap();
        assert_eq!(supervisor.session_count().await, 0);
        assert!(first.is_stopped().await);

        let second = supervisor.get_or_create(root, &launcher).await;
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(spawn_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_stop_unknown_root_is_noop() {
        let supervisor = supervisor();
        supervisor.stop(Path::new("/never/seen")).await.unwrap();
    }

    #[tokio::test]
    async fn test_stopped_resident_is_replaced() {
        let supervisor = supervisor();
        let (launcher, _) = counting_launcher();
        let root = Path::new("/ws/app");

        let first = supervisor.get_or_create(root, &launcher).await;
        // Stopped through the session handle, not the supervisor.
        first.stop().await.unwrap();

        let second = supervisor.get_or_create(root, &launcher).await;
        assert!(!Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn test_stop_all_drains_registry() {
        let supervisor = supervisor();
        let (launcher, _) = counting_launcher();

        let first = supervisor
            .get_or_create(Path::new("/ws/one"), &launcher)
            .await;
        let second = supervisor
            .get_or_create(Path::new("/ws/two"), &launcher)
            .await;

        supervisor.stop_all().await;
        assert_eq!(supervisor.session_count().await, 0);
        assert!(first.is_stopped().await);
        assert!(second.is_stopped().await);
    }
}
