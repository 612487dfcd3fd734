//! Aggregator facade — the public API consumed by the front end.
//!
//! One request flows: resolve workspace → route to an engine by extension →
//! get-or-create the session → bounded readiness wait → forward the parse →
//! normalize → cap. Retries are caller policy; nothing here retries
//! internally.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;

use anvil_config::Options;
use anvil_types::Diagnostic;

use crate::cap;
use crate::engine::EngineLauncher;
use crate::error::{CompleterError, Result};
use crate::resolver::{WorkspaceResolver, normalize_lexically};
use crate::stdio::StdioLauncher;
use crate::supervisor::SessionSupervisor;

/// Build extension → engine name routing from config.
///
/// Engine names are walked in sorted order so overlapping claims resolve
/// deterministically; the first claimant wins and later ones are logged.
fn build_extension_map(options: &Options) -> HashMap<String, String> {
    let mut extension_map = HashMap::new();
    let mut engine_names: Vec<&String> = options.engines().keys().collect();
    engine_names.sort();
    for name in engine_names {
        for ext in options.engines()[name].file_extensions() {
            let ext = ext.to_ascii_lowercase();
            if let Some(existing) = extension_map.get(&ext) {
                tracing::warn!(
                    "Multiple completer engines configured for extension '{ext}': \
                     '{existing}' and '{name}'. Using '{existing}'."
                );
                continue;
            }
            extension_map.insert(ext, name.clone());
        }
    }
    extension_map
}

/// Find the cached entry for a 1-based position.
///
/// Extent containment wins; failing that, the entry on the same line with
/// the smallest column distance (engines habitually anchor a diagnostic
/// mid-line while editors query from anywhere on it).
fn diagnostic_at(cached: &[Diagnostic], line_num: u32, column_num: u32) -> Option<&Diagnostic> {
    if let Some(hit) = cached
        .iter()
        .find(|diag| diag.location_extent().contains(line_num, column_num))
    {
        return Some(hit);
    }
    cached
        .iter()
        .filter(|diag| diag.location().line_num() == line_num)
        .min_by_key(|diag| diag.location().column_num().abs_diff(column_num))
}

/// Mediates between the front end and per-workspace completer sessions.
pub struct DiagnosticsAggregator {
    options: Options,
    resolver: WorkspaceResolver,
    supervisor: Arc<SessionSupervisor>,
    launchers: HashMap<String, Arc<dyn EngineLauncher>>,
    extension_map: HashMap<String, String>,
}

impl DiagnosticsAggregator {
    /// Build an aggregator whose engines are stdio subprocesses.
    #[must_use]
    pub fn new(options: Options) -> Self {
        let launchers = options
            .engines()
            .iter()
            .map(|(name, config)| {
                let launcher: Arc<dyn EngineLauncher> =
                    Arc::new(StdioLauncher::new(name.clone(), config.clone()));
                (name.clone(), launcher)
            })
            .collect();
        Self::with_launchers(options, launchers)
    }

    /// Build an aggregator with caller-provided launchers.
    ///
    /// Launchers are keyed by engine name and must match `options.engines()`
    /// entries; configured engines without a launcher are logged and
    /// skipped, the same as engines that fail to start.
    #[must_use]
    pub fn with_launchers(
        options: Options,
        launchers: HashMap<String, Arc<dyn EngineLauncher>>,
    ) -> Self {
        for name in options.engines().keys() {
            if !launchers.contains_key(name) {
                tracing::warn!(engine = %name, "Configured engine has no launcher; skipping");
            }
        }

        let extension_map = build_extension_map(&options);
        let markers: Vec<String> = options
            .engines()
            .values()
            .flat_map(|engine| engine.root_markers().iter().cloned())
            .collect();
        let resolver = WorkspaceResolver::new(options.workspace_roots().to_vec(), &markers);
        let supervisor = Arc::new(SessionSupervisor::new(
            options.ready_poll_interval(),
            options.parse_timeout(),
        ));

        Self {
            options,
            resolver,
            supervisor,
            launchers,
            extension_map,
        }
    }

    fn launcher_for(&self, filepath: &Path) -> Result<&Arc<dyn EngineLauncher>> {
        let missing = || CompleterError::NoCompleterForFile {
            path: filepath.to_path_buf(),
        };
        let ext = filepath
            .extension()
            .and_then(OsStr::to_str)
            .map(str::to_ascii_lowercase)
            .ok_or_else(missing)?;
        let name = self.extension_map.get(&ext).ok_or_else(missing)?;
        self.launchers.get(name).ok_or_else(missing)
    }

    /// Handle one file-parse event and return its bounded diagnostics.
    ///
    /// Fails with `SessionNotReady` while the workspace's engine is still
    /// coming up; retrying is safe because re-parsing a file is idempotent.
    pub async fn report_diagnostics(
        &self,
        filepath: &Path,
        contents: &str,
    ) -> Result<Vec<Diagnostic>> {
        let file = normalize_lexically(filepath);
        let workspace_root = self.resolver.resolve(&file)?;
        let launcher = self.launcher_for(&file)?;

        let session = self.supervisor.get_or_create(&workspace_root, launcher).await;
        session
            .wait_until_ready(self.options.ready_timeout())
            .await?;

        let normalized = session.send_parse_event(&file, contents).await?;
        Ok(cap::apply(
            normalized,
            self.options.max_diagnostics_to_display(),
            &file,
        ))
    }

    /// Return the cached diagnostic covering a 1-based position.
    pub async fn detailed_diagnostic_at(
        &self,
        filepath: &Path,
        line_num: u32,
        column_num: u32,
    ) -> Result<Diagnostic> {
        let file = normalize_lexically(filepath);
        let workspace_root = self.resolver.resolve(&file)?;

        let session = self
            .supervisor
            .get(&workspace_root)
            .await
            .ok_or(CompleterError::NoDiagnosticAtLocation)?;
        let cached = session
            .cached_diagnostics(&file)
            .await
            .ok_or(CompleterError::NoDiagnosticAtLocation)?;

        diagnostic_at(&cached, line_num, column_num)
            .cloned()
            .ok_or(CompleterError::NoDiagnosticAtLocation)
    }

    /// Stop the workspace's session; the next parse event starts fresh.
    pub async fn stop_workspace(&self, workspace_root: &Path) -> Result<()> {
        self.supervisor
            .stop(&normalize_lexically(workspace_root))
            .await
    }

    /// Stop every session, best-effort. Used at shutdown.
    pub async fn stop_all(&self) {
        self.supervisor.stop_all().await;
    }

    /// The session registry backing this aggregator.
    #[must_use]
    pub fn supervisor(&self) -> &Arc<SessionSupervisor> {
        &self.supervisor
    }
}
