//! Change records and the position arithmetic that carries positions across them.

use crate::position::Position;
use crate::selection::{Range, Selection, normalize_selection};
use crate::text::char_len;
use serde::{Deserialize, Serialize};

/// A replacement of `[from, to)` with `text` (one entry per resulting line).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Change {
    /// Start of the replaced range.
    pub from: Position,
    /// End of the replaced range.
    pub to: Position,
    /// Inserted text split into lines. Never empty: an insertion of nothing is `[""]`.
    pub text: Vec<String>,
    /// Origin tag, e.g. `"+input"`, `"*compose"`, `"undo"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// Text that was replaced, filled in when the change is applied.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed: Option<Vec<String>>,
    /// Whole-document replacement: markers do not survive it.
    #[serde(skip)]
    pub(crate) full: bool,
}

impl Change {
    /// Create a change.
    pub fn new(from: Position, to: Position, text: Vec<String>, origin: Option<&str>) -> Self {
        let text = if text.is_empty() {
            vec![String::new()]
        } else {
            text
        };
        Self {
            from,
            to,
            text,
            origin: origin.map(str::to_string),
            removed: None,
            full: false,
        }
    }

    /// Whether applying the change would do nothing.
    pub fn is_noop(&self) -> bool {
        self.from == self.to && self.text.len() == 1 && self.text[0].is_empty()
    }

    /// Position just after the inserted text, once the change is applied.
    pub fn end(&self) -> Position {
        change_end(self)
    }
}

/// Position just after the inserted text of `change`.
pub fn change_end(change: &Change) -> Position {
    let last = change.text.last().map(|t| char_len(t)).unwrap_or(0);
    let column = if change.text.len() == 1 {
        last + change.from.column
    } else {
        last
    };
    Position::new(change.from.line + change.text.len().max(1) - 1, column)
}

/// Carry `pos` across `change`.
///
/// Positions before the change are untouched, positions inside the replaced range move to the
/// end of the inserted text, and positions after it shift by the line and column delta.
pub fn adjust_for_change(pos: Position, change: &Change) -> Position {
    if pos < change.from {
        return pos;
    }
    if pos <= change.to {
        return change_end(change);
    }
    let line = pos.line + change.text.len() - (change.to.line - change.from.line) - 1;
    let mut column = pos.column;
    if pos.line == change.to.line {
        column = column + change_end(change).column - change.to.column;
    }
    Position::new(line, column)
}

/// Selection after applying `change` to a document currently selecting `sel`.
pub fn compute_sel_after_change(sel: &Selection, change: &Change) -> Selection {
    let ranges = sel
        .ranges()
        .iter()
        .map(|r| {
            Range::new(
                adjust_for_change(r.anchor, change),
                adjust_for_change(r.head, change),
            )
        })
        .collect();
    normalize_selection(ranges, sel.primary_index())
}

/// Where the selection goes after replacing each selected range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SelectAfter {
    /// Select the inserted text, keeping each range's orientation.
    Around,
    /// Cursor at the start of the inserted text.
    Start,
    /// Cursor after the inserted text.
    #[default]
    End,
}

fn offset_pos(pos: Position, old: Position, new: Position) -> Position {
    if pos.line == old.line {
        Position::new(new.line, pos.column + new.column - old.column)
    } else {
        Position::new(new.line + (pos.line - old.line), pos.column)
    }
}

/// Selection covering (or starting) the text inserted by `changes`, one per range of `sel`.
///
/// `changes` must be sorted and correspond one to one with the ranges of `sel`. Returns `None`
/// for [`SelectAfter::End`], where the ordinary carry-forward already lands after the text.
pub fn compute_replaced_sel(
    sel: &Selection,
    changes: &[Change],
    hint: SelectAfter,
    first_line: usize,
) -> Option<Selection> {
    if hint == SelectAfter::End {
        return None;
    }
    let mut out = Vec::with_capacity(changes.len());
    let mut old_prev = Position::new(first_line, 0);
    let mut new_prev = old_prev;
    for (i, change) in changes.iter().enumerate() {
        let from = offset_pos(change.from, old_prev, new_prev);
        let to = offset_pos(change_end(change), old_prev, new_prev);
        old_prev = change.to;
        new_prev = to;
        if hint == SelectAfter::Around {
            let inv = sel.ranges().get(i).is_some_and(Range::inverted);
            out.push(if inv {
                Range::new(to, from)
            } else {
                Range::new(from, to)
            });
        } else {
            out.push(Range::cursor(from));
        }
    }
    Some(normalize_selection(out, sel.primary_index()))
}

/// Whether `origin` names an edit that merges with recent edits of the same origin.
pub(crate) fn origin_merges_in_window(origin: Option<&str>) -> bool {
    origin.is_some_and(|o| o.starts_with('+'))
}

/// Whether `origin` names an edit that always merges with the previous edit of the same origin.
pub(crate) fn origin_always_merges(origin: Option<&str>) -> bool {
    origin.is_some_and(|o| o.starts_with('*'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(line: usize, column: usize) -> Position {
        Position::new(line, column)
    }

    fn change(from: Position, to: Position, text: &[&str]) -> Change {
        Change::new(from, to, text.iter().map(|s| s.to_string()).collect(), None)
    }

    #[test]
    fn test_newline_shifts_following_positions() {
        let c = change(p(0, 2), p(0, 2), &["", ""]);
        assert_eq!(change_end(&c), p(1, 0));
        assert_eq!(adjust_for_change(p(0, 5), &c), p(1, 3));
        assert_eq!(adjust_for_change(p(0, 1), &c), p(0, 1));
        assert_eq!(adjust_for_change(p(0, 2), &c), p(1, 0));
    }

    #[test]
    fn test_multiline_delete() {
        let c = change(p(1, 2), p(3, 1), &["xy"]);
        assert_eq!(change_end(&c), p(1, 4));
        assert_eq!(adjust_for_change(p(3, 5), &c), p(1, 8));
        assert_eq!(adjust_for_change(p(6, 0), &c), p(4, 0));
        assert_eq!(adjust_for_change(p(2, 0), &c), p(1, 4));
    }

    #[test]
    fn test_sel_after_change_collapses_replaced_range() {
        let sel = Selection::single(Range::new(p(0, 1), p(0, 2)));
        let c = change(p(0, 1), p(0, 2), &["X"]);
        let after = compute_sel_after_change(&sel, &c);
        assert_eq!(after.primary(), Range::cursor(p(0, 2)));
    }

    #[test]
    fn test_replaced_sel_around_and_start() {
        let sel = Selection::new(
            vec![Range::new(p(0, 0), p(0, 1)), Range::new(p(0, 4), p(0, 3))],
            0,
        );
        let changes = vec![
            change(p(0, 0), p(0, 1), &["abc"]),
            change(p(0, 3), p(0, 4), &["de"]),
        ];
        let around = compute_replaced_sel(&sel, &changes, SelectAfter::Around, 0).unwrap();
        assert_eq!(around.ranges()[0], Range::new(p(0, 0), p(0, 3)));
        assert_eq!(around.ranges()[1], Range::new(p(0, 7), p(0, 5)));
        let start = compute_replaced_sel(&sel, &changes, SelectAfter::Start, 0).unwrap();
        assert_eq!(start.ranges()[1], Range::cursor(p(0, 5)));
        assert!(compute_replaced_sel(&sel, &changes, SelectAfter::End, 0).is_none());
    }

    #[test]
    fn test_origin_prefixes() {
        assert!(origin_merges_in_window(Some("+input")));
        assert!(!origin_merges_in_window(Some("paste")));
        assert!(origin_always_merges(Some("*compose")));
        assert!(!origin_always_merges(None));
    }
}
