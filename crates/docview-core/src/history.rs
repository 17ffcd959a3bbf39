//! Undo history.
//!
//! Two stacks, `done` and `undone`, hold alternating selection entries and change groups. A
//! change group stores the *inverse* of the edits it records, so replaying it undoes them; the
//! replay itself records the inverse of the inverse onto the other stack.
//!
//! Consecutive edits merge into one group when they come from the same operation, or when they
//! share an origin tag: `+`-prefixed origins merge while they arrive within the event delay,
//! `*`-prefixed origins always merge.

use crate::change::{Change, change_end, origin_always_merges, origin_merges_in_window};
use crate::doc::DocId;
use crate::marks::MarkedSpan;
use crate::position::Position;
use crate::selection::Selection;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// One recorded (inverse) change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryChange {
    /// Start of the range to replace when replaying.
    pub from: Position,
    /// End of the range to replace when replaying.
    pub to: Position,
    /// Text to put back.
    pub text: Vec<String>,
    /// Marked spans of the replaced lines at recording time, per document.
    #[serde(skip)]
    pub(crate) spans: Vec<(DocId, Vec<Vec<MarkedSpan>>)>,
}

impl HistoryChange {
    pub(crate) fn spans_for(&self, doc: DocId) -> Option<&Vec<Vec<MarkedSpan>>> {
        self.spans.iter().find(|(id, _)| *id == doc).map(|(_, s)| s)
    }

    pub(crate) fn to_change(&self, origin: &str) -> Change {
        Change::new(self.from, self.to, self.text.clone(), Some(origin))
    }
}

/// Entry of an undo stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryEvent {
    /// A selection to restore.
    Selection(Selection),
    /// A group of inverse changes.
    Changes {
        /// Inverse changes, in the order they were made.
        changes: Vec<HistoryChange>,
        /// Generation of the document before the group was applied.
        generation: u64,
    },
}

impl HistoryEvent {
    fn is_selection(&self) -> bool {
        matches!(self, HistoryEvent::Selection(_))
    }
}

/// Serializable copy of both stacks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistorySnapshot {
    /// Undo stack, oldest first.
    pub done: Vec<HistoryEvent>,
    /// Redo stack, oldest first.
    pub undone: Vec<HistoryEvent>,
}

/// Number of available undo and redo steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HistorySize {
    /// Change groups that can be undone.
    pub undo: usize,
    /// Change groups that can be redone.
    pub redo: usize,
}

/// Direction of a history replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Replay {
    /// Undo.
    Undo,
    /// Redo.
    Redo,
}

impl Replay {
    /// Origin tag given to replayed changes.
    pub fn origin(self) -> &'static str {
        match self {
            Replay::Undo => "undo",
            Replay::Redo => "redo",
        }
    }
}

/// What a replay step asks the document to do.
#[derive(Debug)]
pub(crate) enum ReplayStep {
    Nothing,
    Selection(Selection),
    Changes {
        changes: Vec<HistoryChange>,
        restore: Option<Selection>,
    },
}

/// Undo history of one document (or of a group of linked documents sharing it).
#[derive(Debug, Clone)]
pub struct History {
    done: Vec<HistoryEvent>,
    undone: Vec<HistoryEvent>,
    undo_depth: usize,
    event_delay_ms: u64,
    generation: u64,
    max_generation: u64,
    last_mod_time: u64,
    last_sel_time: u64,
    last_op: Option<u64>,
    last_sel_op: Option<u64>,
    last_origin: Option<String>,
    last_sel_origin: Option<String>,
}

impl History {
    /// Create an empty history.
    pub fn new(undo_depth: usize, event_delay_ms: u64) -> Self {
        Self {
            done: Vec::new(),
            undone: Vec::new(),
            undo_depth,
            event_delay_ms,
            generation: 1,
            max_generation: 1,
            last_mod_time: 0,
            last_sel_time: 0,
            last_op: None,
            last_sel_op: None,
            last_origin: None,
            last_sel_origin: None,
        }
    }

    /// Fresh, empty history that continues the generation count of `self`.
    pub fn cleared(&self) -> Self {
        let mut next = Self::new(self.undo_depth, self.event_delay_ms);
        next.generation = self.max_generation;
        next.max_generation = self.max_generation;
        next
    }

    /// Current generation. Every recorded edit bumps it; undo restores the old value.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Undo stack, oldest first.
    pub fn done(&self) -> &[HistoryEvent] {
        &self.done
    }

    /// Redo stack, oldest first.
    pub fn undone(&self) -> &[HistoryEvent] {
        &self.undone
    }

    /// Number of undo and redo steps.
    pub fn size(&self) -> HistorySize {
        let count = |events: &[HistoryEvent]| events.iter().filter(|e| !e.is_selection()).count();
        HistorySize {
            undo: count(&self.done),
            redo: count(&self.undone),
        }
    }

    /// Set the maximum number of change groups.
    pub fn set_undo_depth(&mut self, depth: usize) {
        self.undo_depth = depth;
        self.evict();
    }

    /// Set the merge window of `+`-prefixed origins.
    pub fn set_event_delay(&mut self, ms: u64) {
        self.event_delay_ms = ms;
    }

    /// Stop the next edit from merging into the current group and return the generation.
    pub fn change_generation(&mut self, force_split: bool) -> u64 {
        if force_split {
            self.last_op = None;
            self.last_sel_op = None;
            self.last_origin = None;
        }
        self.generation
    }

    /// Copy of both stacks.
    pub fn snapshot(&self) -> HistorySnapshot {
        HistorySnapshot {
            done: self.done.clone(),
            undone: self.undone.clone(),
        }
    }

    /// Replace both stacks.
    pub fn restore(&mut self, snapshot: HistorySnapshot) {
        let mut next = self.cleared();
        next.done = snapshot.done;
        next.undone = snapshot.undone;
        *self = next;
    }

    fn last_change_event(&mut self, force: bool) -> Option<&mut Vec<HistoryChange>> {
        if force {
            clear_selection_events(&mut self.done);
        } else if self.done.last().is_some_and(HistoryEvent::is_selection) {
            let len = self.done.len();
            if len > 1 && !self.done[len - 2].is_selection() {
                self.done.pop();
            } else {
                return None;
            }
        }
        match self.done.last_mut() {
            Some(HistoryEvent::Changes { changes, .. }) => Some(changes),
            _ => None,
        }
    }

    /// Record `change`, whose inverse is `inverse`, made while `sel_before` was selected.
    pub(crate) fn add_change(
        &mut self,
        change: &Change,
        inverse: HistoryChange,
        sel_before: &Selection,
        sel_after: Selection,
        op_id: u64,
        now: u64,
    ) {
        self.undone.clear();
        let origin = change.origin.as_deref();
        let same_op = self.last_op == Some(op_id);
        let same_origin = origin.is_some()
            && self.last_origin.as_deref() == origin
            && ((origin_merges_in_window(origin)
                && now.saturating_sub(self.last_mod_time) < self.event_delay_ms)
                || origin_always_merges(origin));

        if (same_op || same_origin)
            && let Some(cur) = self.last_change_event(same_op)
        {
            let simple_insert = change.from == change.to
                && cur.last().is_some_and(|last| last.to == change.from);
            match cur.last_mut() {
                Some(last) if simple_insert => last.to = change_end(change),
                _ => cur.push(inverse),
            }
            trace!(op_id, "merged change into current history event");
        } else {
            if !self.done.last().is_some_and(HistoryEvent::is_selection) {
                push_selection(&mut self.done, sel_before.clone());
            }
            self.done.push(HistoryEvent::Changes {
                changes: vec![inverse],
                generation: self.generation,
            });
            self.evict();
        }
        self.done.push(HistoryEvent::Selection(sel_after));
        self.max_generation += 1;
        self.generation = self.max_generation;
        self.last_mod_time = now;
        self.last_sel_time = now;
        self.last_op = Some(op_id);
        self.last_sel_op = Some(op_id);
        self.last_origin = change.origin.clone();
        self.last_sel_origin = change.origin.clone();
    }

    fn evict(&mut self) {
        while self.size().undo > self.undo_depth {
            let Some(first_change) = self.done.iter().position(|e| !e.is_selection()) else {
                break;
            };
            self.done.drain(..=first_change);
        }
    }

    fn selection_event_can_be_merged(&self, origin: &str, sel: &Selection, now: u64) -> bool {
        if origin.starts_with('*') {
            return true;
        }
        if !origin.starts_with('+') {
            return false;
        }
        let Some(HistoryEvent::Selection(prev)) = self.done.last() else {
            return false;
        };
        prev.ranges().len() == sel.ranges().len()
            && prev.something_selected() == sel.something_selected()
            && now.saturating_sub(self.last_sel_time) <= self.event_delay_ms
    }

    /// Record a selection change.
    pub(crate) fn add_selection(
        &mut self,
        sel: Selection,
        op_id: u64,
        origin: Option<&str>,
        now: u64,
        clear_redo: bool,
    ) {
        let merge = self.last_sel_op == Some(op_id)
            || origin.is_some_and(|o| {
                self.last_sel_origin.as_deref() == Some(o)
                    && ((self.last_mod_time == self.last_sel_time
                        && self.last_origin.as_deref() == Some(o))
                        || self.selection_event_can_be_merged(o, &sel, now))
            });
        match self.done.last_mut() {
            Some(HistoryEvent::Selection(top)) if merge => *top = sel,
            _ => push_selection(&mut self.done, sel),
        }
        self.last_sel_time = now;
        self.last_sel_origin = origin.map(str::to_string);
        self.last_sel_op = Some(op_id);
        if clear_redo {
            clear_selection_events(&mut self.undone);
        }
    }

    /// Replace the top selection entry (or push one).
    pub(crate) fn replace_top_selection(&mut self, sel: Selection) -> bool {
        match self.done.last_mut() {
            Some(HistoryEvent::Selection(top)) => {
                *top = sel;
                true
            }
            _ => false,
        }
    }

    /// Pop the next replay step off the source stack of `dir`.
    pub(crate) fn begin_replay(
        &mut self,
        dir: Replay,
        current: &Selection,
        allow_selection_only: bool,
    ) -> ReplayStep {
        let (source, dest) = match dir {
            Replay::Undo => (&mut self.done, &mut self.undone),
            Replay::Redo => (&mut self.undone, &mut self.done),
        };
        let available = source.iter().any(|e| match e {
            HistoryEvent::Selection(s) => allow_selection_only && s != current,
            HistoryEvent::Changes { .. } => !allow_selection_only,
        });
        if !available {
            return ReplayStep::Nothing;
        }
        self.last_origin = None;
        self.last_sel_origin = None;

        let mut sel_after = current.clone();
        let (changes, generation) = loop {
            match source.pop() {
                Some(HistoryEvent::Selection(sel)) => {
                    push_selection(dest, sel.clone());
                    if allow_selection_only && sel != *current {
                        return ReplayStep::Selection(sel);
                    }
                    sel_after = sel;
                }
                Some(HistoryEvent::Changes {
                    changes,
                    generation,
                }) => break (changes, generation),
                None => return ReplayStep::Nothing,
            }
        };

        push_selection(dest, sel_after);
        dest.push(HistoryEvent::Changes {
            changes: Vec::new(),
            generation: self.generation,
        });
        self.generation = if generation != 0 {
            generation
        } else {
            self.max_generation += 1;
            self.max_generation
        };
        let restore = match source.last() {
            Some(HistoryEvent::Selection(sel)) => Some(sel.clone()),
            _ => None,
        };
        ReplayStep::Changes { changes, restore }
    }

    /// Record the inverse of a replayed change on the destination stack.
    pub(crate) fn push_replay_inverse(&mut self, dir: Replay, inverse: HistoryChange) {
        let dest = match dir {
            Replay::Undo => &mut self.undone,
            Replay::Redo => &mut self.done,
        };
        if let Some(HistoryEvent::Changes { changes, .. }) = dest.last_mut() {
            changes.push(inverse);
        }
    }

    /// Shift recorded positions across a change made in a linked document.
    ///
    /// Entries that overlap the change cannot be replayed any more; they are dropped together
    /// with everything older than them.
    pub fn rebase(&mut self, change: &Change) {
        let from = change.from.line;
        let to = change.to.line;
        let diff = change.text.len() as isize - (to - from) as isize - 1;
        rebase_array(&mut self.done, from, to, diff);
        rebase_array(&mut self.undone, from, to, diff);
    }
}

fn shift_line(line: usize, diff: isize) -> usize {
    (line as isize + diff).max(0) as usize
}

fn rebase_sel_single(pos: Position, from: usize, to: usize, diff: isize) -> Position {
    if to < pos.line {
        Position::new(shift_line(pos.line, diff), pos.column)
    } else if from < pos.line {
        Position::new(from, 0)
    } else {
        pos
    }
}

fn rebase_array(array: &mut Vec<HistoryEvent>, from: usize, to: usize, diff: isize) {
    let mut i = 0;
    while i < array.len() {
        let ok = match &mut array[i] {
            HistoryEvent::Selection(sel) => {
                *sel = sel.map(|r| {
                    crate::selection::Range::new(
                        rebase_sel_single(r.anchor, from, to, diff),
                        rebase_sel_single(r.head, from, to, diff),
                    )
                });
                true
            }
            HistoryEvent::Changes { changes, .. } => {
                let mut ok = true;
                for cur in changes.iter_mut() {
                    if to < cur.from.line {
                        cur.from.line = shift_line(cur.from.line, diff);
                        cur.to.line = shift_line(cur.to.line, diff);
                    } else if from <= cur.to.line {
                        ok = false;
                        break;
                    }
                }
                ok
            }
        };
        if ok {
            i += 1;
        } else {
            array.drain(..=i);
            i = 0;
        }
    }
}

/// Pop trailing selection entries.
fn clear_selection_events(array: &mut Vec<HistoryEvent>) {
    while array.last().is_some_and(HistoryEvent::is_selection) {
        array.pop();
    }
}

/// Push `sel` unless it equals the selection already on top.
fn push_selection(dest: &mut Vec<HistoryEvent>, sel: Selection) {
    if let Some(HistoryEvent::Selection(top)) = dest.last()
        && *top == sel
    {
        return;
    }
    dest.push(HistoryEvent::Selection(sel));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::Range;

    fn p(line: usize, column: usize) -> Position {
        Position::new(line, column)
    }

    fn insert(at: Position, text: &str, origin: &str) -> (Change, HistoryChange) {
        let change = Change::new(at, at, vec![text.to_string()], Some(origin));
        let inverse = HistoryChange {
            from: at,
            to: change_end(&change),
            text: vec![String::new()],
            spans: Vec::new(),
        };
        (change, inverse)
    }

    #[test]
    fn test_input_merges_within_delay() {
        let mut hist = History::new(200, 1000);
        let sel = Selection::cursor(p(0, 0));
        let (c1, i1) = insert(p(0, 0), "a", "+input");
        hist.add_change(&c1, i1, &sel, Selection::cursor(p(0, 1)), 1, 100);
        let (c2, i2) = insert(p(0, 1), "b", "+input");
        hist.add_change(&c2, i2, &sel, Selection::cursor(p(0, 2)), 2, 300);
        assert_eq!(hist.size().undo, 1);

        let (c3, i3) = insert(p(0, 2), "c", "+input");
        hist.add_change(&c3, i3, &sel, Selection::cursor(p(0, 3)), 3, 5000);
        assert_eq!(hist.size().undo, 2);
    }

    #[test]
    fn test_simple_insertions_extend_last_change() {
        let mut hist = History::new(200, 1000);
        let sel = Selection::cursor(p(0, 0));
        let (c1, i1) = insert(p(0, 0), "a", "*compose");
        hist.add_change(&c1, i1, &sel, Selection::cursor(p(0, 1)), 1, 0);
        let (c2, i2) = insert(p(0, 1), "b", "*compose");
        hist.add_change(&c2, i2, &sel, Selection::cursor(p(0, 2)), 2, 99_999);
        let Some(HistoryEvent::Changes { changes, .. }) =
            hist.done().iter().find(|e| !e.is_selection())
        else {
            panic!("expected a change event");
        };
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].to, p(0, 2));
    }

    #[test]
    fn test_events_interleave_with_selections() {
        let mut hist = History::new(200, 1000);
        let sel = Selection::cursor(p(0, 0));
        let (c1, i1) = insert(p(0, 0), "a", "paste");
        hist.add_change(&c1, i1, &sel, Selection::cursor(p(0, 1)), 1, 0);
        let (c2, i2) = insert(p(0, 1), "b", "paste");
        hist.add_change(&c2, i2, &sel, Selection::cursor(p(0, 2)), 2, 0);
        let kinds: Vec<bool> = hist.done().iter().map(HistoryEvent::is_selection).collect();
        assert_eq!(kinds, vec![true, false, true, false, true]);
    }

    #[test]
    fn test_undo_depth_evicts_oldest_group() {
        let mut hist = History::new(2, 0);
        let sel = Selection::cursor(p(0, 0));
        for i in 0..4 {
            let (c, inv) = insert(p(0, i), "x", "paste");
            hist.add_change(&c, inv, &sel, Selection::cursor(p(0, i + 1)), i as u64, 0);
        }
        assert_eq!(hist.size().undo, 2);
        assert!(hist.done()[0].is_selection());
    }

    #[test]
    fn test_selection_events_merge_by_op() {
        let mut hist = History::new(200, 1000);
        hist.add_selection(Selection::cursor(p(0, 1)), 7, None, 0, true);
        hist.add_selection(Selection::cursor(p(0, 2)), 7, None, 0, true);
        assert_eq!(hist.done().len(), 1);
        hist.add_selection(Selection::cursor(p(0, 3)), 8, None, 0, true);
        assert_eq!(hist.done().len(), 2);
    }

    #[test]
    fn test_rebase_shifts_and_truncates() {
        let mut hist = History::new(200, 0);
        let sel = Selection::single(Range::cursor(p(5, 1)));
        let (c, inv) = insert(p(5, 0), "x", "paste");
        hist.add_change(&c, inv, &sel, Selection::cursor(p(5, 1)), 1, 0);

        // Two lines inserted above: everything moves down.
        let above = Change::new(p(1, 0), p(1, 0), vec!["".into(), "".into(), "".into()], None);
        hist.rebase(&above);
        let Some(HistoryEvent::Changes { changes, .. }) = hist.done().get(1) else {
            panic!("expected a change event");
        };
        assert_eq!(changes[0].from, p(7, 0));

        // An edit touching the recorded line drops the event.
        let over = Change::new(p(7, 0), p(7, 1), vec!["y".into()], None);
        hist.rebase(&over);
        assert_eq!(hist.size().undo, 0);
    }
}
