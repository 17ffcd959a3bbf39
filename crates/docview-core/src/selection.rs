//! Selection model: ordered, non-overlapping ranges with a primary range.
//!
//! [`Selection`] values are immutable. Every mutation builds a new value through
//! [`normalize_selection`], which sorts the ranges and merges any that touch or overlap.

use crate::position::{Position, max_pos, min_pos};
use serde::{Deserialize, Serialize};

/// One selected range. `anchor` stays put while extending, `head` moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Range {
    /// Fixed end.
    pub anchor: Position,
    /// Moving end (where the cursor is drawn).
    pub head: Position,
}

impl Range {
    /// Create a range.
    pub const fn new(anchor: Position, head: Position) -> Self {
        Self { anchor, head }
    }

    /// Empty range at `pos`.
    pub const fn cursor(pos: Position) -> Self {
        Self {
            anchor: pos,
            head: pos,
        }
    }

    /// Start of the range in document order.
    pub fn from(&self) -> Position {
        min_pos(self.anchor, self.head)
    }

    /// End of the range in document order.
    pub fn to(&self) -> Position {
        max_pos(self.anchor, self.head)
    }

    /// Whether anchor and head coincide.
    pub fn empty(&self) -> bool {
        self.anchor == self.head
    }

    /// Whether the head lies before the anchor.
    pub fn inverted(&self) -> bool {
        self.head < self.anchor
    }
}

/// An ordered set of non-overlapping, non-touching ranges.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Selection {
    ranges: Vec<Range>,
    primary: usize,
}

impl Default for Selection {
    fn default() -> Self {
        Self::single(Range::default())
    }
}

impl Selection {
    /// A selection holding one range.
    pub fn single(range: Range) -> Self {
        Self {
            ranges: vec![range],
            primary: 0,
        }
    }

    /// A selection holding one cursor.
    pub fn cursor(pos: Position) -> Self {
        Self::single(Range::cursor(pos))
    }

    /// Build a selection from arbitrary ranges, normalizing them.
    pub fn new(ranges: Vec<Range>, primary: usize) -> Self {
        normalize_selection(ranges, primary)
    }

    /// Ranges, sorted by start.
    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    /// Index of the primary range.
    pub fn primary_index(&self) -> usize {
        self.primary
    }

    /// The primary range.
    pub fn primary(&self) -> Range {
        self.ranges[self.primary]
    }

    /// Whether any range is non-empty.
    pub fn something_selected(&self) -> bool {
        self.ranges.iter().any(|r| !r.empty())
    }

    /// Index of the range containing `pos`, if any. Empty ranges contain their own position.
    pub fn contains(&self, pos: Position, end: Option<Position>) -> Option<usize> {
        let end = end.unwrap_or(pos);
        self.ranges
            .iter()
            .position(|r| r.from() <= end && r.to() >= pos)
    }

    /// Map every range through `f`, renormalizing the result.
    pub fn map(&self, mut f: impl FnMut(&Range) -> Range) -> Self {
        let ranges = self.ranges.iter().map(&mut f).collect();
        normalize_selection(ranges, self.primary)
    }
}

/// Sort `ranges` by start and merge touching or overlapping neighbours.
///
/// A merged range keeps the orientation of its inverted source range, so an extend drag that
/// runs into another caret keeps its direction. The primary index follows its range through
/// the sort and any merge.
pub fn normalize_selection(ranges: Vec<Range>, primary: usize) -> Selection {
    if ranges.is_empty() {
        return Selection::default();
    }
    let primary = primary.min(ranges.len() - 1);

    let mut indexed: Vec<(usize, Range)> = ranges.into_iter().enumerate().collect();
    indexed.sort_by(|a, b| a.1.from().cmp(&b.1.from()).then(a.0.cmp(&b.0)));
    let primary_sorted = indexed
        .iter()
        .position(|(i, _)| *i == primary)
        .unwrap_or(0);

    let mut merged: Vec<Range> = Vec::with_capacity(indexed.len());
    let mut primary_index = 0;
    for (i, (_, cur)) in indexed.into_iter().enumerate() {
        if let Some(prev) = merged.last_mut()
            && prev.to() >= cur.from()
        {
            let from = min_pos(prev.from(), cur.from());
            let to = max_pos(prev.to(), cur.to());
            let inv = if prev.empty() {
                cur.from() == cur.head
            } else {
                prev.from() == prev.head
            };
            *prev = if inv {
                Range::new(to, from)
            } else {
                Range::new(from, to)
            };
        } else {
            merged.push(cur);
        }
        if i == primary_sorted {
            primary_index = merged.len() - 1;
        }
    }

    Selection {
        ranges: merged,
        primary: primary_index,
    }
}

/// Extend `range` so its head moves to `head`.
///
/// Without `extend` the result is a fresh range from `other` (or `head`) to `head`. With
/// `extend` the anchor is kept, unless a second fixed point `other` is given (word or line
/// selection), in which case the anchor becomes whichever end keeps the whole unit selected.
pub fn extend_range(range: Range, head: Position, other: Option<Position>, extend: bool) -> Range {
    if !extend {
        return Range::new(other.unwrap_or(head), head);
    }
    let mut anchor = range.anchor;
    let mut head = head;
    if let Some(other) = other {
        let pos_before = head < anchor;
        if pos_before != (other < anchor) {
            anchor = head;
            head = other;
        } else if pos_before != (head < other) {
            head = other;
        }
    }
    Range::new(anchor, head)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(line: usize, column: usize) -> Position {
        Position::new(line, column)
    }

    #[test]
    fn test_sorts_and_tracks_primary() {
        let sel = normalize_selection(
            vec![
                Range::cursor(p(3, 0)),
                Range::cursor(p(1, 0)),
                Range::cursor(p(2, 0)),
            ],
            0,
        );
        assert_eq!(sel.ranges().len(), 3);
        assert_eq!(sel.primary().head, p(3, 0));
        assert_eq!(sel.ranges()[0].head, p(1, 0));
    }

    #[test]
    fn test_touching_ranges_merge() {
        let sel = normalize_selection(
            vec![Range::new(p(0, 0), p(0, 3)), Range::new(p(0, 3), p(0, 5))],
            1,
        );
        assert_eq!(sel.ranges(), &[Range::new(p(0, 0), p(0, 5))]);
        assert_eq!(sel.primary_index(), 0);
    }

    #[test]
    fn test_merge_keeps_inverted_orientation() {
        let sel = normalize_selection(
            vec![Range::new(p(0, 4), p(0, 1)), Range::new(p(0, 3), p(0, 6))],
            0,
        );
        assert_eq!(sel.ranges(), &[Range::new(p(0, 6), p(0, 1))]);
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let once = normalize_selection(
            vec![
                Range::new(p(2, 0), p(1, 0)),
                Range::new(p(1, 5), p(3, 0)),
                Range::cursor(p(5, 5)),
                Range::cursor(p(5, 5)),
            ],
            3,
        );
        let twice = normalize_selection(once.ranges().to_vec(), once.primary_index());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_extend_range() {
        let r = Range::new(p(0, 2), p(0, 4));
        assert_eq!(extend_range(r, p(0, 8), None, true), Range::new(p(0, 2), p(0, 8)));
        assert_eq!(extend_range(r, p(0, 8), None, false), Range::cursor(p(0, 8)));
        // Word selection dragged backwards onto an earlier word keeps the original anchor.
        let word = Range::new(p(0, 5), p(0, 9));
        assert_eq!(
            extend_range(word, p(0, 1), Some(p(0, 3)), true),
            Range::new(p(0, 5), p(0, 1))
        );
    }
}
