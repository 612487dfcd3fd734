//! Bounded-result policy for diagnostic responses.
//!
//! When an engine reports more diagnostics than the configured maximum, the
//! response keeps the first `max_count` entries in engine order and appends
//! exactly one synthetic overflow entry, so truncation is detectable
//! programmatically and locatable deterministically.

use std::path::Path;

use anvil_types::{Diagnostic, DiagnosticKind, Location, Range};

/// Text of the overflow sentinel entry.
pub const MAX_DIAGNOSTICS_MESSAGE: &str = "Maximum number of diagnostics exceeded.";

/// Apply the diagnostics cap. `max_count == 0` means unlimited.
///
/// The sentinel is pinned to line 1, column 1 of the file the caller asked
/// about, with a zero-width extent and one identical range — it is never
/// counted against the cap itself.
#[must_use]
pub fn apply(entries: Vec<Diagnostic>, max_count: usize, requested_file: &Path) -> Vec<Diagnostic> {
    if max_count == 0 || entries.len() <= max_count {
        return entries;
    }

    let mut bounded = entries;
    bounded.truncate(max_count);
    bounded.push(overflow_sentinel(requested_file));
    bounded
}

fn overflow_sentinel(filepath: &Path) -> Diagnostic {
    let location = Location::new(filepath, 1, 1);
    let extent = Range::collapsed(location.clone());
    Diagnostic::new(
        DiagnosticKind::Error,
        MAX_DIAGNOSTICS_MESSAGE.to_string(),
        location,
        extent.clone(),
        vec![extent],
    )
}
