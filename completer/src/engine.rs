//! Engine capability interface and engine-native diagnostic records.
//!
//! Each completer integration implements [`CompleterEngine`] plus an
//! [`EngineLauncher`] that binds a fresh engine to one workspace root. The
//! pair is selected once at configuration time (by file extension), never
//! re-dispatched per call.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

pub use anvil_config::CoordinateBase;

/// A diagnostic as the engine reported it, before normalization.
///
/// `line`/`column` are in the engine's native base. A missing `filepath`
/// means the diagnostic belongs to the file that was parsed; a missing end
/// position means the extent collapses to a point.
#[derive(Debug, Clone, Deserialize)]
pub struct RawDiagnostic {
    pub kind: String,
    pub text: String,
    #[serde(default)]
    pub filepath: Option<PathBuf>,
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub end_line: Option<u32>,
    #[serde(default)]
    pub end_column: Option<u32>,
    #[serde(default)]
    pub ranges: Vec<RawRange>,
}

/// An auxiliary span in the engine's native base.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRange {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// One live external diagnostic engine, bound to one workspace.
///
/// Implementations must be cancellation-tolerant: a dropped `send_parse`
/// future must not corrupt the connection for later calls.
#[async_trait]
pub trait CompleterEngine: Send + Sync {
    /// Whether the engine accepts parse requests yet.
    ///
    /// Polled during bring-up; must be cheap and safe to call repeatedly.
    async fn is_ready(&self) -> bool;

    /// Forward one parse request and return the engine's raw diagnostics.
    async fn send_parse(
        &self,
        filepath: &Path,
        contents: &str,
    ) -> anyhow::Result<Vec<RawDiagnostic>>;

    /// Which base this engine's native line/column numbers use.
    fn coordinate_base(&self) -> CoordinateBase;

    /// Tear the engine down. Best effort; repeated calls must be harmless.
    async fn terminate(&self) -> anyhow::Result<()>;
}

/// Factory binding a fresh engine process to a workspace root.
#[async_trait]
pub trait EngineLauncher: Send + Sync {
    async fn spawn(&self, workspace_root: &Path) -> anyhow::Result<Arc<dyn CompleterEngine>>;
}
