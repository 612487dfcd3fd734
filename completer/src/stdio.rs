//! Stdio engine adapter — one child process speaking framed JSON.
//!
//! This is the default [`CompleterEngine`] implementation for engines that
//! read requests on stdin and answer on stdout. A writer task serializes all
//! outgoing frames; a reader task routes responses back to waiting callers
//! through a pending map of oneshot senders.

use std::collections::HashMap;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::{Child, Command};
use tokio::sync::{Mutex, mpsc, oneshot};

use anvil_config::{CoordinateBase, EngineConfig};

use crate::engine::{CompleterEngine, EngineLauncher, RawDiagnostic};
use crate::wire::{FrameReader, FrameWriter, Incoming, Notification, Request};

/// Ceiling on any single engine request; the session applies the configured
/// parse timeout on top of this.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// Readiness polls must come back fast or count as "not ready yet".
const STATUS_TIMEOUT_SECS: u64 = 5;

const TERMINATE_TIMEOUT_SECS: u64 = 2;

const WRITER_CHANNEL_CAPACITY: usize = 64;

enum WriterCommand {
    Send(serde_json::Value),
    Shutdown,
}

type PendingMap = Mutex<HashMap<u64, oneshot::Sender<Result<serde_json::Value, String>>>>;

#[derive(Debug, Deserialize)]
struct ParseResponse {
    #[serde(default)]
    diagnostics: Vec<RawDiagnostic>,
}

/// A running stdio engine process.
pub struct StdioEngine {
    name: String,
    coordinate_base: CoordinateBase,
    child: Mutex<Child>,
    writer_tx: mpsc::Sender<WriterCommand>,
    next_id: AtomicU64,
    pending: Arc<PendingMap>,
    #[allow(dead_code)]
    reader_handle: tokio::task::JoinHandle<()>,
    #[allow(dead_code)]
    writer_handle: tokio::task::JoinHandle<()>,
}

impl StdioEngine {
    /// Spawn the engine command bound to `workspace_root`.
    pub async fn start(name: &str, config: &EngineConfig, workspace_root: &Path) -> Result<Self> {
        let resolved = which::which(config.command())
            .with_context(|| format!("{} not found in PATH", config.command()))?;

        let mut child = Command::new(&resolved)
            .args(config.args())
            .current_dir(workspace_root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("spawning {}", config.command()))?;

        let stdin = child.stdin.take().context("no stdin from engine")?;
        let stdout = child.stdout.take().context("no stdout from engine")?;

        let (writer_tx, mut writer_rx) = mpsc::channel::<WriterCommand>(WRITER_CHANNEL_CAPACITY);
        let writer_name = name.to_string();
        let writer_handle = tokio::spawn(async move {
            let mut writer = FrameWriter::new(stdin);
            while let Some(command) = writer_rx.recv().await {
                match command {
                    WriterCommand::Send(frame) => {
                        if let Err(e) = writer.write_frame(&frame).await {
                            tracing::warn!(engine = %writer_name, "Engine write error: {e:#}");
                            break;
                        }
                    }
                    WriterCommand::Shutdown => break,
                }
            }
        });

        let pending: Arc<PendingMap> = Arc::new(Mutex::new(HashMap::new()));
        let reader_pending = Arc::clone(&pending);
        let reader_name = name.to_string();
        let reader_handle = tokio::spawn(async move {
            let mut reader = FrameReader::new(stdout);
            loop {
                match reader.read_frame().await {
                    Ok(Some(frame)) => {
                        Self::route_frame(&frame, &reader_pending, &reader_name).await;
                    }
                    Ok(None) => {
                        tracing::info!(engine = %reader_name, "Engine closed stdout");
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(engine = %reader_name, "Engine read error: {e:#}");
                        break;
                    }
                }
            }
            // Fail outstanding requests promptly instead of letting them
            // ride out their timeouts.
            reader_pending.lock().await.clear();
        });

        let engine = Self {
            name: name.to_string(),
            coordinate_base: config.coordinate_base(),
            child: Mutex::new(child),
            writer_tx,
            next_id: AtomicU64::new(1),
            pending,
            reader_handle,
            writer_handle,
        };

        engine
            .notify(
                "initialize",
                Some(serde_json::json!({ "workspace_root": workspace_root })),
            )
            .await?;

        Ok(engine)
    }

    /// Route one incoming frame to its waiting caller.
    async fn route_frame(frame: &serde_json::Value, pending: &PendingMap, engine: &str) {
        match Incoming::classify(frame) {
            Some(Incoming::Response { id, result }) => {
                let sender = pending.lock().await.remove(&id);
                match sender {
                    Some(tx) => {
                        let _ = tx.send(result);
                    }
                    None => {
                        tracing::debug!(engine = %engine, id, "Response for unknown request id");
                    }
                }
            }
            Some(Incoming::Notification { method }) => {
                // Readiness is polled, so notifications carry nothing we
                // cannot recover by asking again.
                tracing::trace!(engine = %engine, method = %method, "Ignoring engine notification");
            }
            None => {
                tracing::trace!(engine = %engine, "Ignoring malformed engine frame");
            }
        }
    }

    async fn request(
        &self,
        method: &'static str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let frame = serde_json::to_value(Request { id, method, params })
            .context("encoding engine request")?;
        if self
            .writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .is_err()
        {
            self.pending.lock().await.remove(&id);
            bail!("engine writer channel closed");
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Ok(result))) => Ok(result),
            Ok(Ok(Err(message))) => bail!("engine reported: {message}"),
            Ok(Err(_)) => {
                self.pending.lock().await.remove(&id);
                bail!("engine connection closed");
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                bail!("{method} request timed out");
            }
        }
    }

    async fn notify(&self, method: &'static str, params: Option<serde_json::Value>) -> Result<()> {
        let frame = serde_json::to_value(Notification { method, params })
            .context("encoding engine notification")?;
        self.writer_tx
            .send(WriterCommand::Send(frame))
            .await
            .map_err(|_| anyhow::anyhow!("engine writer channel closed"))
    }
}

#[async_trait]
impl CompleterEngine for StdioEngine {
    async fn is_ready(&self) -> bool {
        match self
            .request("status", None, Duration::from_secs(STATUS_TIMEOUT_SECS))
            .await
        {
            Ok(result) => result
                .get("ready")
                .and_then(serde_json::Value::as_bool)
                .unwrap_or(false),
            Err(e) => {
                tracing::trace!(engine = %self.name, "Status poll failed: {e:#}");
                false
            }
        }
    }

    async fn send_parse(
        &self,
        filepath: &Path,
        contents: &str,
    ) -> Result<Vec<RawDiagnostic>> {
        let params = serde_json::json!({
            "filepath": filepath,
            "contents": contents,
        });
        let result = self
            .request(
                "parse",
                Some(params),
                Duration::from_secs(REQUEST_TIMEOUT_SECS),
            )
            .await?;
        let response: ParseResponse =
            serde_json::from_value(result).context("decoding parse response")?;
        Ok(response.diagnostics)
    }

    fn coordinate_base(&self) -> CoordinateBase {
        self.coordinate_base
    }

    async fn terminate(&self) -> Result<()> {
        let _ = self.notify("exit", None).await;
        let _ = self.writer_tx.send(WriterCommand::Shutdown).await;

        let mut child = self.child.lock().await;
        let waited = tokio::time::timeout(
            Duration::from_secs(TERMINATE_TIMEOUT_SECS),
            child.wait(),
        )
        .await;

        if waited.is_err() {
            tracing::debug!(engine = %self.name, "Engine didn't exit in time, killing");
            child.kill().await.context("killing engine process")?;
        }
        Ok(())
    }
}

/// Launches [`StdioEngine`]s from a validated [`EngineConfig`].
pub struct StdioLauncher {
    name: String,
    config: EngineConfig,
}

impl StdioLauncher {
    #[must_use]
    pub fn new(name: String, config: EngineConfig) -> Self {
        Self { name, config }
    }
}

#[async_trait]
impl EngineLauncher for StdioLauncher {
    async fn spawn(&self, workspace_root: &Path) -> Result<Arc<dyn CompleterEngine>> {
        tracing::info!(
            engine = %self.name,
            workspace = %workspace_root.display(),
            "Spawning completer engine"
        );
        let engine = StdioEngine::start(&self.name, &self.config, workspace_root).await?;
        Ok(Arc::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine_config(command: &str) -> EngineConfig {
        serde_json::from_value(serde_json::json!({
            "command": command,
            "file_extensions": ["cs"],
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_spawn_missing_command_fails() {
        let launcher = StdioLauncher::new(
            "test".to_string(),
            engine_config("anvil-test-engine-that-does-not-exist"),
        );
        let result = launcher.spawn(Path::new("/tmp")).await;
        let err = format!("{:#}", result.err().unwrap());
        assert!(err.contains("not found in PATH"), "{err}");
    }

    #[tokio::test]
    async fn test_route_frame_resolves_pending_request() {
        let pending: PendingMap = Mutex::new(HashMap::new());
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(9, tx);

        let frame = serde_json::json!({ "id": 9, "result": { "ready": true } });
        StdioEngine::route_frame(&frame, &pending, "test").await;

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result["ready"], true);
        assert!(pending.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_route_frame_delivers_engine_errors() {
        let pending: PendingMap = Mutex::new(HashMap::new());
        let (tx, rx) = oneshot::channel();
        pending.lock().await.insert(2, tx);

        let frame = serde_json::json!({ "id": 2, "error": { "message": "bad request" } });
        StdioEngine::route_frame(&frame, &pending, "test").await;

        assert_eq!(rx.await.unwrap().unwrap_err(), "bad request");
    }

    #[tokio::test]
    async fn test_route_frame_ignores_unknown_id() {
        let pending: PendingMap = Mutex::new(HashMap::new());
        let frame = serde_json::json!({ "id": 404, "result": {} });
        StdioEngine::route_frame(&frame, &pending, "test").await;
    }

    #[tokio::test]
    async fn test_route_frame_ignores_notifications() {
        let pending: PendingMap = Mutex::new(HashMap::new());
        let (tx, mut rx) = oneshot::channel::<Result<serde_json::Value, String>>();
        pending.lock().await.insert(1, tx);

        let frame = serde_json::json!({ "method": "ready" });
        StdioEngine::route_frame(&frame, &pending, "test").await;

        // Pending entry untouched.
        assert!(rx.try_recv().is_err());
        assert_eq!(pending.lock().await.len(), 1);
    }

    #[test]
    fn test_parse_response_tolerates_missing_diagnostics() {
        let response: ParseResponse = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(response.diagnostics.is_empty());
    }
}
