//! Positions in a document.
//!
//! A [`Position`] is a plain `(line, column)` value. Columns count Unicode scalar values
//! (`char`s) within the logical line. Positions carry no reference to the document they were
//! taken from; every API that accepts one clips it against the current document first.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Position coordinates (line and column numbers)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    /// Zero-based logical line index (offset by the document's first line).
    pub line: usize,
    /// Zero-based column in characters within the logical line.
    pub column: usize,
}

impl Position {
    /// Create a new logical position.
    pub const fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> Ordering {
        self.line
            .cmp(&other.line)
            .then_with(|| self.column.cmp(&other.column))
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Smaller of two positions.
pub fn min_pos(a: Position, b: Position) -> Position {
    if a <= b { a } else { b }
}

/// Larger of two positions.
pub fn max_pos(a: Position, b: Position) -> Position {
    if a >= b { a } else { b }
}

/// Direction hint used to disambiguate boundary positions.
///
/// `Before` sticks to the character preceding the position, `After` to the one following it.
/// Cursor motion uses the same type to say which way an atomic range should be escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Bias {
    /// Attach to the left (towards the document start).
    Before,
    /// Attach to the right (towards the document end).
    #[default]
    After,
}

impl Bias {
    /// `-1` for [`Bias::Before`], `1` for [`Bias::After`].
    pub fn dir(self) -> isize {
        match self {
            Bias::Before => -1,
            Bias::After => 1,
        }
    }

    /// The opposite direction.
    pub fn flip(self) -> Self {
        match self {
            Bias::Before => Bias::After,
            Bias::After => Bias::Before,
        }
    }
}
