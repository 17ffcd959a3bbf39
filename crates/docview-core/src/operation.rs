//! Per-operation bookkeeping.
//!
//! An [`Operation`] lives from the outermost mutating call of an editor to the end of its
//! reconcile. While it is open, model mutations only accumulate here; the host is touched once,
//! when the operation ends.

use crate::change::Change;
use crate::doc::{Doc, DocEffects};
use crate::line_tree::LineId;
use crate::marks::MarkerId;
use crate::position::Position;
use rustc_hash::FxHashSet;

/// Lines whose rendering is stale.
#[derive(Debug, Default)]
pub struct DirtyLines {
    lines: FxHashSet<LineId>,
}

impl DirtyLines {
    /// Empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark one line.
    pub fn mark(&mut self, line: LineId) {
        self.lines.insert(line);
    }

    /// Mark several lines.
    pub fn mark_all(&mut self, lines: impl IntoIterator<Item = LineId>) {
        self.lines.extend(lines);
    }

    /// Whether `line` is marked.
    pub fn contains(&self, line: LineId) -> bool {
        self.lines.contains(&line)
    }

    /// Whether nothing is marked.
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Consume the marked lines.
    pub fn take(&mut self) -> FxHashSet<LineId> {
        std::mem::take(&mut self.lines)
    }

/// Line numbers of the marked lines still in `doc`, sorted and unique.
    pub fn line_numbers(&self, doc: &Doc) -> Vec<usize> {
        let mut out: Vec<usize> = self
            .lines
            .iter()
            .filter_map(|id| doc.line_number(*id))
            .collect();
        out.sort_unstable();
        out.dedup();
        out
    }
}

/// Where an operation wants the viewport to end up.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScrollTarget {
    /// Scroll to an absolute offset.
    Top(f64),
    /// Bring `pos` into view with `margin` pixels of slack.
    Position {
        /// Position to reveal.
        pos: Position,
        /// Extra space kept above and below.
        margin: f64,
    },
}

/// The record of one open operation.
#[derive(Debug, Default)]
pub struct Operation {
    /// Operation id, shared with the history entries it records.
    pub id: u64,
    /// The rendered views changed during reconcile.
    pub view_changed: bool,
    /// Scroll the primary cursor into view.
    pub scroll_to_cursor: bool,
    /// Explicit scroll request; wins over `scroll_to_cursor`.
    pub scroll_target: Option<ScrollTarget>,
    /// The input adapter should re-read the selection.
    pub reset_input: bool,
    /// Lines to re-render.
    pub dirty: DirtyLines,
    /// Lines removed from the document.
    pub deleted: Vec<LineId>,
    /// Applied changes, in order.
    pub changes: Vec<Change>,
    /// The selection changed.
    pub selection_changed: bool,
    /// Lines were inserted, removed or folded.
    pub structure_changed: bool,
    /// Every view must be rebuilt.
    pub full_rebuild: bool,
    /// Highlighting must resume.
    pub highlight_rewound: bool,
    /// Markers cleared during the operation.
    pub cleared_markers: Vec<MarkerId>,
    pub(crate) propagate: Vec<Change>,
    pub(crate) phase: PhaseState,
}

/// Values carried from one reconcile phase to the next.
#[derive(Debug, Default)]
pub(crate) struct PhaseState {
    pub(crate) scroll_top: f64,
    pub(crate) new_scroll_top: Option<f64>,
    pub(crate) view_from: usize,
    pub(crate) view_to: usize,
    pub(crate) window_moved: bool,
    pub(crate) built: Vec<LineId>,
}

impl Operation {
    /// A fresh operation.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Fold drained document effects into the operation.
    pub fn absorb(&mut self, effects: DocEffects) {
        if !effects.changes.is_empty() {
            self.reset_input = true;
        }
        self.changes.extend(effects.changes);
        self.propagate.extend(effects.propagate);
        self.dirty.mark_all(effects.touched);
        self.dirty.mark_all(effects.deleted.iter().copied());
        self.deleted.extend(effects.deleted);
        self.structure_changed |= effects.structure_changed;
        self.selection_changed |= effects.selection_changed;
        self.scroll_to_cursor |= effects.scroll_to_cursor;
        self.highlight_rewound |= effects.highlight_rewound;
        self.cleared_markers.extend(effects.cleared_markers);
    }

    /// Numbers of the lines touched so far.
    pub fn touched_line_numbers(&self, doc: &Doc) -> Vec<usize> {
        self.dirty.line_numbers(doc)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorConfig;

    #[test]
    fn test_dirty_lines_dedupe() {
        let doc = Doc::new("a\nb\nc", EditorConfig::default());
        let ids = doc.tree().line_ids(0, 3);
        let mut dirty = DirtyLines::new();
        dirty.mark(ids[2]);
        dirty.mark(ids[0]);
        dirty.mark(ids[2]);
        assert!(dirty.contains(ids[0]));
        assert!(!dirty.contains(ids[1]));
        assert_eq!(dirty.line_numbers(&doc), vec![0, 2]);
        let taken = dirty.take();
        assert_eq!(taken.len(), 2);
        assert!(dirty.is_empty());
    }

    #[test]
    fn test_absorb_collects_effects() {
        let mut doc = Doc::new("abc\ndef", EditorConfig::default());
        doc.replace_range("X", Position::new(1, 1), None, Some("+input"));
        let mut op = Operation::new(7);
        op.absorb(doc.take_effects());
        assert_eq!(op.changes.len(), 1);
        assert!(op.reset_input);
        assert_eq!(op.touched_line_numbers(&doc), vec![1]);
    }
}
