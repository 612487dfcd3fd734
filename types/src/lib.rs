//! Unified diagnostic model consumed by the front end.
//!
//! Every completer integration reports diagnostics in its own native shape;
//! `anvil-completer` converts them into these types at the boundary. All
//! coordinates here are 1-based line and column, regardless of what the
//! engine emitted.

mod diagnostic;

pub use diagnostic::{Diagnostic, DiagnosticKind, Location, Range};
