//! Coordinate normalization — engine-native records to the unified model.
//!
//! Pure functions: rebasing is the only numeric change, and `kind`/`text`
//! pass through untouched. Already 1-based input comes out unchanged, so
//! normalizing twice is a no-op.

use std::path::Path;

use anvil_config::CoordinateBase;
use anvil_types::{Diagnostic, DiagnosticKind, Location, Range};

use crate::engine::{RawDiagnostic, RawRange};

fn rebase(value: u32, base: CoordinateBase) -> u32 {
    match base {
        CoordinateBase::ZeroBased => value + 1,
        CoordinateBase::OneBased => value,
    }
}

fn rebase_range(raw: &RawRange, base: CoordinateBase, filepath: &Path) -> Range {
    Range::new(
        Location::new(filepath, rebase(raw.start_line, base), rebase(raw.start_column, base)),
        Location::new(filepath, rebase(raw.end_line, base), rebase(raw.end_column, base)),
    )
}

/// Convert one engine-native record into a unified [`Diagnostic`].
///
/// A record without an explicit file is attributed to `requested_file`; a
/// record without an end position gets a zero-width extent at its start.
/// Unknown kind labels fall back to `Warning`.
#[must_use]
pub fn normalize(raw: &RawDiagnostic, base: CoordinateBase, requested_file: &Path) -> Diagnostic {
    let filepath = raw.filepath.as_deref().unwrap_or(requested_file);
    let kind = DiagnosticKind::from_engine(&raw.kind).unwrap_or(DiagnosticKind::Warning);

    let location = Location::new(filepath, rebase(raw.line, base), rebase(raw.column, base));
    let location_extent = match (raw.end_line, raw.end_column) {
        (Some(end_line), Some(end_column)) => Range::new(
            location.clone(),
            Location::new(filepath, rebase(end_line, base), rebase(end_column, base)),
        ),
        _ => Range::collapsed(location.clone()),
    };
    let ranges = raw
        .ranges
        .iter()
        .map(|range| rebase_range(range, base, filepath))
        .collect();

    Diagnostic::new(kind, raw.text.clone(), location, location_extent, ranges)
}

/// Normalize a whole engine response, preserving order.
#[must_use]
pub fn normalize_all(
    raws: &[RawDiagnostic],
    base: CoordinateBase,
    requested_file: &Path,
) -> Vec<Diagnostic> {
    raws.iter()
        .map(|raw| normalize(raw, base, requested_file))
        .collect()
}
