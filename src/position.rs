use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Position in a text document (line and column numbers)
///
/// Lines are 1-indexed. Columns are 0-indexed and count characters of the
/// line's visible text (see [`crate::file::visible_text`]), so column `c`
/// addresses the `c`-th character, not a byte offset.
///
/// `(0, 0)` is the sentinel meaning "no position". It survives every
/// transformation unchanged and never addresses real content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Line number (1-indexed, 0 only for the sentinel)
    pub line: usize,
    /// Column number (0-indexed, in characters)
    pub column: usize,
}

impl Position {
    /// The reserved "no position" coordinate
    pub const SENTINEL: Position = Position { line: 0, column: 0 };

    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }

    pub fn is_sentinel(&self) -> bool {
        *self == Self::SENTINEL
    }

    /// Same column on a different line
    pub fn with_line(self, line: usize) -> Self {
        Self { line, ..self }
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Error raised when a coordinate token is malformed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The offending token text
    pub token: String,
    /// What was wrong with it
    pub reason: String,
}

impl ParseError {
    pub fn new(token: &str, reason: impl Into<String>) -> Self {
        Self {
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Invalid token '{}': {}", self.token, self.reason)
    }
}

impl std::error::Error for ParseError {}

/// Parse a non-negative decimal integer, digits only (no sign, no whitespace)
pub(crate) fn parse_number(text: &str, token: &str) -> Result<usize, ParseError> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::new(
            token,
            format!("'{}' is not a non-negative integer", text),
        ));
    }
    text.parse::<usize>()
        .map_err(|e| ParseError::new(token, e.to_string()))
}

impl FromStr for Position {
    type Err = ParseError;

    /// Parse a `line:column` token
    ///
    /// `0:0` yields the sentinel. Any other token on line 0 is rejected,
    /// since line numbers start at 1.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let (line, column) = token
            .split_once(':')
            .ok_or_else(|| ParseError::new(token, "expected 'line:column'"))?;

        let line = parse_number(line, token)?;
        let column = parse_number(column, token)?;
        let pos = Position { line, column };

        if line == 0 && !pos.is_sentinel() {
            return Err(ParseError::new(token, "line numbers start at 1"));
        }
        Ok(pos)
    }
}
