//! Source locations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A point in the analyzed source: 1-based line, 0-based column.
///
/// Spans order by line, then column, which is the order diagnostics are
/// emitted in within a function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// The earlier of two spans.
    pub fn first(self, other: Span) -> Span {
        self.min(other)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spans_order_by_line_then_column() {
        assert!(Span::new(1, 9) < Span::new(2, 0));
        assert!(Span::new(3, 1) < Span::new(3, 4));
        assert_eq!(Span::new(5, 2).first(Span::new(4, 8)), Span::new(4, 8));
    }

    #[test]
    fn display_is_line_colon_column() {
        assert_eq!(Span::new(12, 4).to_string(), "12:4");
    }
}
