//! Workspace resolution — maps a file path to its owning workspace root.

use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{CompleterError, Result};

/// Fold `.` and `..` components without touching the filesystem.
///
/// Lexical only: symlinks are not resolved, so a workspace's identity is the
/// full path the front end handed us.
pub(crate) fn normalize_lexically(path: &Path) -> PathBuf {
    let mut parts = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                parts.pop();
            }
            Component::CurDir => {}
            other => parts.push(other),
        }
    }
    parts.iter().collect()
}

/// Resolves the nearest enclosing workspace root for a file path.
///
/// Roots come from two places: paths registered up front (configuration) and
/// roots discovered by walking a file's ancestor chain for marker entries
/// (e.g. `*.sln`). Discovered roots are registered, so later files under the
/// same root resolve without re-scanning. Identity is the full normalized
/// path — two roots with the same leaf directory name stay distinct.
pub struct WorkspaceResolver {
    roots: Mutex<Vec<PathBuf>>,
    markers: Option<GlobSet>,
}

impl WorkspaceResolver {
    /// Build a resolver from pre-registered roots and root-marker globs.
    ///
    /// Invalid marker patterns are logged and skipped — one bad pattern
    /// should not take out the rest.
    #[must_use]
    pub fn new(roots: Vec<PathBuf>, markers: &[String]) -> Self {
        let mut builder = GlobSetBuilder::new();
        let mut added = 0usize;
        for marker in markers {
            match Glob::new(marker) {
                Ok(glob) => {
                    builder.add(glob);
                    added += 1;
                }
                Err(e) => {
                    tracing::warn!(marker = %marker, "Skipping invalid root marker: {e}");
                }
            }
        }
        let markers = if added == 0 {
            None
        } else {
            match builder.build() {
                Ok(set) => Some(set),
                Err(e) => {
                    tracing::warn!("Root marker set failed to build: {e}");
                    None
                }
            }
        };

        let roots = roots
            .into_iter()
            .map(|root| normalize_lexically(&root))
            .collect();

        Self {
            roots: Mutex::new(roots),
            markers,
        }
    }

    /// Resolve the owning workspace root for `filepath`.
    ///
    /// Registered roots win by longest prefix; otherwise the nearest
    /// ancestor directory containing a marker entry becomes the root.
    pub fn resolve(&self, filepath: &Path) -> Result<PathBuf> {
        let file = normalize_lexically(filepath);

        if let Some(root) = self.registered_root_for(&file) {
            return Ok(root);
        }

        if let Some(root) = self.discover_root(&file) {
            self.register(root.clone());
            return Ok(root);
        }

        Err(CompleterError::NoWorkspaceFound {
            path: filepath.to_path_buf(),
        })
    }

    /// Register a root explicitly; later resolutions under it are exact.
    pub fn register(&self, root: PathBuf) {
        let root = normalize_lexically(&root);
        let mut roots = self.roots.lock().unwrap_or_else(PoisonError::into_inner);
        if !roots.contains(&root) {
            tracing::debug!(root = %root.display(), "Registered workspace root");
            roots.push(root);
        }
    }

    fn registered_root_for(&self, file: &Path) -> Option<PathBuf> {
        let roots = self.roots.lock().unwrap_or_else(PoisonError::into_inner);
        roots
            .iter()
            .filter(|root| file.starts_with(root))
            .max_by_key(|root| root.components().count())
            .cloned()
    }

    fn discover_root(&self, file: &Path) -> Option<PathBuf> {
        let markers = self.markers.as_ref()?;
        for dir in file.ancestors().skip(1) {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            for entry in entries.flatten() {
                if markers.is_match(Path::new(&entry.file_name())) {
                    return Some(dir.to_path_buf());
                }
            }
        }
        None
    }
}
