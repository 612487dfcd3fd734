//! Diagnostic records, locations, and extents.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// A 1-based position in a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Location {
    filepath: PathBuf,
    line_num: u32,
    column_num: u32,
}

impl Location {
    #[must_use]
    pub fn new(filepath: impl Into<PathBuf>, line_num: u32, column_num: u32) -> Self {
        Self {
            filepath: filepath.into(),
            line_num,
            column_num,
        }
    }

    #[must_use]
    pub fn filepath(&self) -> &Path {
        &self.filepath
    }

    /// 1-based line number.
    #[must_use]
    pub fn line_num(&self) -> u32 {
        self.line_num
    }

    /// 1-based column number.
    #[must_use]
    pub fn column_num(&self) -> u32 {
        self.column_num
    }
}

/// A contiguous extent between two positions in a file.
///
/// Invariant: `start` does not exceed `end` in document order. A zero-width
/// range (`start == end`) marks a point rather than a span.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Range {
    start: Location,
    end: Location,
}

impl Range {
    #[must_use]
    pub fn new(start: Location, end: Location) -> Self {
        Self { start, end }
    }

    /// A zero-width range at a single position.
    #[must_use]
    pub fn collapsed(at: Location) -> Self {
        Self {
            start: at.clone(),
            end: at,
        }
    }

    #[must_use]
    pub fn start(&self) -> &Location {
        &self.start
    }

    #[must_use]
    pub fn end(&self) -> &Location {
        &self.end
    }

    #[must_use]
    pub fn is_zero_width(&self) -> bool {
        self.start.line_num == self.end.line_num
            && self.start.column_num == self.end.column_num
    }

    /// Whether the 1-based position lies within this range.
    ///
    /// Both endpoints are inclusive; a zero-width range contains exactly its
    /// start position.
    #[must_use]
    pub fn contains(&self, line_num: u32, column_num: u32) -> bool {
        let point = (line_num, column_num);
        let start = (self.start.line_num, self.start.column_num);
        let end = (self.end.line_num, self.end.column_num);
        point >= start && point <= end
    }
}

/// Severity of a diagnostic.
///
/// Serialized in the client-facing uppercase form (`"ERROR"`, `"WARNING"`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiagnosticKind {
    Error,
    Warning,
    Information,
    Hint,
}

impl DiagnosticKind {
    /// Map an engine's severity label to a kind, case-insensitively.
    ///
    /// Returns `None` for labels outside the known set. Callers (boundary
    /// code) decide the fallback policy.
    #[must_use]
    pub fn from_engine(label: &str) -> Option<Self> {
        match label.to_ascii_lowercase().as_str() {
            "error" => Some(Self::Error),
            "warning" => Some(Self::Warning),
            "info" | "information" => Some(Self::Information),
            "hint" => Some(Self::Hint),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_error(self) -> bool {
        self == Self::Error
    }
}

/// A single normalized diagnostic.
///
/// Fields are private; construction goes through [`Diagnostic::new`] and
/// mutation is impossible afterwards. `location_extent` is the primary span;
/// `ranges` carries any auxiliary spans the engine reported (possibly empty).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    kind: DiagnosticKind,
    text: String,
    location: Location,
    location_extent: Range,
    ranges: Vec<Range>,
}

impl Diagnostic {
    #[must_use]
    pub fn new(
        kind: DiagnosticKind,
        text: String,
        location: Location,
        location_extent: Range,
        ranges: Vec<Range>,
    ) -> Self {
        Self {
            kind,
            text,
            location,
            location_extent,
            ranges,
        }
    }

    #[must_use]
    pub fn kind(&self) -> DiagnosticKind {
        self.kind
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn location(&self) -> &Location {
        &self.location
    }

    #[must_use]
    pub fn location_extent(&self) -> &Range {
        &self.location_extent
    }

    #[must_use]
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32, col: u32) -> Location {
        Location::new("/ws/main.cs", line, col)
    }

    #[test]
    fn test_contains_inclusive_endpoints() {
        let range = Range::new(loc(1, 1), loc(1, 6));
        assert!(range.contains(1, 1));
        assert!(range.contains(1, 3));
        assert!(range.contains(1, 6));
        assert!(!range.contains(1, 7));
        assert!(!range.contains(2, 1));
    }

    #[test]
    fn test_contains_multiline() {
        let range = Range::new(loc(2, 5), loc(4, 3));
        assert!(range.contains(2, 5));
        assert!(range.contains(3, 1));
        assert!(range.contains(3, 999));
        assert!(range.contains(4, 3));
        assert!(!range.contains(2, 4));
        assert!(!range.contains(4, 4));
    }

    #[test]
    fn test_zero_width_contains_only_its_point() {
        let range = Range::collapsed(loc(10, 12));
        assert!(range.is_zero_width());
        assert!(range.contains(10, 12));
        assert!(!range.contains(10, 11));
        assert!(!range.contains(10, 13));
    }

    #[test]
    fn test_kind_from_engine_case_insensitive() {
        assert_eq!(
            DiagnosticKind::from_engine("Error"),
            Some(DiagnosticKind::Error)
        );
        assert_eq!(
            DiagnosticKind::from_engine("WARNING"),
            Some(DiagnosticKind::Warning)
        );
        assert_eq!(
            DiagnosticKind::from_engine("info"),
            Some(DiagnosticKind::Information)
        );
        assert_eq!(
            DiagnosticKind::from_engine("Information"),
            Some(DiagnosticKind::Information)
        );
        assert_eq!(
            DiagnosticKind::from_engine("hint"),
            Some(DiagnosticKind::Hint)
        );
        assert_eq!(DiagnosticKind::from_engine("fatal"), None);
    }

    #[test]
    fn test_kind_is_error() {
        assert!(DiagnosticKind::Error.is_error());
        assert!(!DiagnosticKind::Warning.is_error());
    }

    #[test]
    fn test_serialized_shape() {
        let diag = Diagnostic::new(
            DiagnosticKind::Error,
            "Identifier expected".to_string(),
            loc(10, 12),
            Range::collapsed(loc(10, 12)),
            vec![],
        );
        let json = serde_json::to_value(&diag).unwrap();
        assert_eq!(json["kind"], "ERROR");
        assert_eq!(json["text"], "Identifier expected");
        assert_eq!(json["location"]["line_num"], 10);
        assert_eq!(json["location"]["column_num"], 12);
        assert_eq!(json["location_extent"]["start"]["line_num"], 10);
        assert_eq!(json["location_extent"]["end"]["column_num"], 12);
        assert!(json["ranges"].as_array().unwrap().is_empty());
    }
}
