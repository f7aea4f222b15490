//! Syntax errors with source positions.

use std::fmt;

/// A parse failure: where it happened, what the grammar expected, and what
/// was found instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Byte offset into the query text.
    pub position: usize,
    /// 1-based line of `position`.
    pub line: usize,
    /// 1-based character column of `position`.
    pub column: usize,
    /// Description of the expected token(s).
    pub expected: String,
    /// Description of the token found at `position`.
    pub found: String,
}

impl SyntaxError {
    /// Creates an error at `position` in `input`, computing line and column.
    pub fn new(
        input: &str,
        position: usize,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        let position = position.min(input.len());
        let before = &input[..position];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let column = input[line_start..position].chars().count() + 1;
        Self {
            position,
            line,
            column,
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "expected {}, found {} at line {}, column {}",
            self.expected, self.found, self.line, self.column
        )
    }
}

impl std::error::Error for SyntaxError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_and_column() {
        let input = "SELECT a\nFROM t\nWHERE ?";
        let pos = input.find('?').unwrap();
        let err = SyntaxError::new(input, pos, "expression", "'?'");
        assert_eq!(err.line, 3);
        assert_eq!(err.column, 7);
        assert_eq!(
            err.to_string(),
            "expected expression, found '?' at line 3, column 7"
        );
    }

    #[test]
    fn test_position_clamped_to_input() {
        let err = SyntaxError::new("SELECT", 100, "column", "end of input");
        assert_eq!(err.position, 6);
        assert_eq!(err.column, 7);
    }
}
