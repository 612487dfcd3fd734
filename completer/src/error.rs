//! Public error taxonomy for the completer core.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for completer operations.
pub type Result<T> = std::result::Result<T, CompleterError>;

/// Errors surfaced to the front end.
///
/// `SessionNotReady` is transient: parse forwarding is idempotent per file,
/// so callers may simply retry. `EngineSpawnFailed` sticks to the session —
/// requests against that workspace keep failing until it is explicitly
/// stopped and a fresh session created.
#[derive(Debug, Error)]
pub enum CompleterError {
    #[error("no workspace found for {}", path.display())]
    NoWorkspaceFound { path: PathBuf },

    #[error("no completer engine configured for {}", path.display())]
    NoCompleterForFile { path: PathBuf },

    #[error("completer session is not ready yet")]
    SessionNotReady,

    #[error("completer engine failed to start: {message}")]
    EngineSpawnFailed { message: String },

    #[error("completer engine request failed: {message}")]
    EngineRequestFailed { message: String },

    #[error("no diagnostic at the requested location")]
    NoDiagnosticAtLocation,
}
