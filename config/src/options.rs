//! Resolved option types and the TOML loader behind them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

const DEFAULT_MAX_DIAGNOSTICS: usize = 30;
const DEFAULT_READY_POLL_INTERVAL_MS: u64 = 100;
const DEFAULT_READY_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_PARSE_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineConfigError {
    #[error("engine command must not be empty")]
    EmptyCommand,
    #[error("file_extensions entries must not be empty")]
    EmptyExtension,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum OptionsError {
    #[error("ready_poll_interval_ms must be at least 1")]
    ZeroPollInterval,
}

/// Which base the engine's native line/column numbers use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum CoordinateBase {
    #[serde(rename = "zero")]
    ZeroBased,
    #[default]
    #[serde(rename = "one")]
    OneBased,
}

#[derive(Deserialize)]
struct RawEngineConfig {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    file_extensions: Vec<String>,
    #[serde(default)]
    root_markers: Vec<String>,
    #[serde(default)]
    coordinate_base: CoordinateBase,
}

/// Validated configuration for one completer engine integration.
///
/// Invariant: `command` is non-empty and every extension entry is non-empty
/// (enforced via `#[serde(try_from)]` at the deserialization boundary).
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawEngineConfig")]
pub struct EngineConfig {
    command: String,
    args: Vec<String>,
    file_extensions: Vec<String>,
    root_markers: Vec<String>,
    coordinate_base: CoordinateBase,
}

impl TryFrom<RawEngineConfig> for EngineConfig {
    type Error = EngineConfigError;

    fn try_from(raw: RawEngineConfig) -> Result<Self, Self::Error> {
        if raw.command.trim().is_empty() {
            return Err(EngineConfigError::EmptyCommand);
        }
        if raw.file_extensions.iter().any(|e| e.trim().is_empty()) {
            return Err(EngineConfigError::EmptyExtension);
        }
        Ok(Self {
            command: raw.command,
            args: raw.args,
            file_extensions: raw.file_extensions,
            root_markers: raw.root_markers,
            coordinate_base: raw.coordinate_base,
        })
    }
}

impl EngineConfig {
    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// File extensions this engine handles (e.g. `["cs"]`).
    #[must_use]
    pub fn file_extensions(&self) -> &[String] {
        &self.file_extensions
    }

    /// Glob patterns marking a workspace root (e.g. `["*.sln"]`).
    #[must_use]
    pub fn root_markers(&self) -> &[String] {
        &self.root_markers
    }

    #[must_use]
    pub fn coordinate_base(&self) -> CoordinateBase {
        self.coordinate_base
    }
}

#[derive(Deserialize)]
struct RawOptions {
    #[serde(default = "default_max_diagnostics")]
    max_diagnostics_to_display: usize,
    #[serde(default = "default_ready_poll_interval_ms")]
    ready_poll_interval_ms: u64,
    #[serde(default = "default_ready_timeout_ms")]
    ready_timeout_ms: u64,
    #[serde(default = "default_parse_timeout_ms")]
    parse_timeout_ms: u64,
    #[serde(default)]
    workspace_roots: Vec<PathBuf>,
    #[serde(default)]
    engines: HashMap<String, EngineConfig>,
}

fn default_max_diagnostics() -> usize {
    DEFAULT_MAX_DIAGNOSTICS
}

fn default_ready_poll_interval_ms() -> u64 {
    DEFAULT_READY_POLL_INTERVAL_MS
}

fn default_ready_timeout_ms() -> u64 {
    DEFAULT_READY_TIMEOUT_MS
}

fn default_parse_timeout_ms() -> u64 {
    DEFAULT_PARSE_TIMEOUT_MS
}

/// Resolved mediator options.
///
/// Durations are validated and converted from milliseconds at the parse
/// boundary; `max_diagnostics_to_display == 0` means no cap is applied.
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RawOptions")]
pub struct Options {
    max_diagnostics_to_display: usize,
    ready_poll_interval: Duration,
    ready_timeout: Duration,
    parse_timeout: Duration,
    workspace_roots: Vec<PathBuf>,
    engines: HashMap<String, EngineConfig>,
}

impl TryFrom<RawOptions> for Options {
    type Error = OptionsError;

    fn try_from(raw: RawOptions) -> Result<Self, Self::Error> {
        if raw.ready_poll_interval_ms == 0 {
            return Err(OptionsError::ZeroPollInterval);
        }
        Ok(Self {
            max_diagnostics_to_display: raw.max_diagnostics_to_display,
            ready_poll_interval: Duration::from_millis(raw.ready_poll_interval_ms),
            ready_timeout: Duration::from_millis(raw.ready_timeout_ms),
            parse_timeout: Duration::from_millis(raw.parse_timeout_ms),
            workspace_roots: raw.workspace_roots,
            engines: raw.engines,
        })
    }
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_diagnostics_to_display: DEFAULT_MAX_DIAGNOSTICS,
            ready_poll_interval: Duration::from_millis(DEFAULT_READY_POLL_INTERVAL_MS),
            ready_timeout: Duration::from_millis(DEFAULT_READY_TIMEOUT_MS),
            parse_timeout: Duration::from_millis(DEFAULT_PARSE_TIMEOUT_MS),
            workspace_roots: Vec::new(),
            engines: HashMap::new(),
        }
    }
}

impl Options {
    /// Load options from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let options = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), engines = options.engines.len(), "Loaded options");
        Ok(options)
    }

    /// Parse options from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Maximum diagnostics returned per parse request; 0 disables the cap.
    #[must_use]
    pub fn max_diagnostics_to_display(&self) -> usize {
        self.max_diagnostics_to_display
    }

    /// Interval between readiness polls.
    #[must_use]
    pub fn ready_poll_interval(&self) -> Duration {
        self.ready_poll_interval
    }

    /// How long a caller waits for a session to become ready.
    #[must_use]
    pub fn ready_timeout(&self) -> Duration {
        self.ready_timeout
    }

    /// How long a forwarded parse request may take.
    #[must_use]
    pub fn parse_timeout(&self) -> Duration {
        self.parse_timeout
    }

    /// Pre-registered workspace roots.
    #[must_use]
    pub fn workspace_roots(&self) -> &[PathBuf] {
        &self.workspace_roots
    }

    /// Configured engines, keyed by name.
    #[must_use]
    pub fn engines(&self) -> &HashMap<String, EngineConfig> {
        &self.engines
    }
}
