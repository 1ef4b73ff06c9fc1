use serde::{Deserialize, Serialize};
use std::fmt;

use tower_lsp::lsp_types::{Position, Range};

/// A line/column position in a source file. Lines and columns are 1-based,
/// the way they are displayed to users.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl Location {
    pub fn new(line: u32, column: u32) -> Location {
        Location { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A region of a source file, carried by every AST node and report.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Span {
    pub file: String,
    pub start: Location,
    pub end: Location,
}

impl Span {
    pub fn new(file: &str, start: Location, end: Location) -> Span {
        Span {
            file: file.to_string(),
            start,
            end,
        }
    }

    /// A zero-width span at a single position.
    pub fn point(file: &str, line: u32, column: u32) -> Span {
        let loc = Location::new(line, column);
        Span {
            file: file.to_string(),
            start: loc,
            end: loc,
        }
    }

    /// The span used when nothing more precise is known, like the original's
    /// whole-file location for internal parse failures.
    pub fn file_start(file: &str) -> Span {
        Span::point(file, 1, 1)
    }

    /// Convert to an LSP range. LSP positions are 0-based.
    pub fn lsp_range(&self) -> Range {
        Range {
            start: Position {
                line: self.start.line.saturating_sub(1),
                character: self.start.column.saturating_sub(1),
            },
            end: Position {
                line: self.end.line.saturating_sub(1),
                character: self.end.column.saturating_sub(1),
            },
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.start)
    }
}
