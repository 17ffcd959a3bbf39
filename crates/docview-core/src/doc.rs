//! The document: line tree, selection, markers and history behind one change pipeline.
//!
//! Every edit flows through the same steps: clip to the document, refuse if the document is in
//! the `cant_edit` state, split around read-only markers, record the inverse in history, stretch
//! marked spans over the edit, restructure the line tree, carry the selection forward, rewind the
//! highlight frontier and register the touched lines for the next render pass.
//!
//! Side effects that the view layer cares about are collected in [`DocEffects`] and drained by
//! the owning editor at the end of its operation.

use crate::change::{
    Change, SelectAfter, change_end, compute_replaced_sel, compute_sel_after_change,
};
use crate::clock::{Clock, SystemClock};
use crate::config::EditorConfig;
use crate::error::{DocError, Result};
use crate::history::{History, HistoryChange, HistorySize, HistorySnapshot, Replay, ReplayStep};
use crate::line_tree::{Line, LineId, LineTree};
use crate::marks::{MarkOptions, MarkedSpan, MarkerId, MarkerKind, MarkerRange, MarkerStore, span_for};
use crate::mode::Mode;
use crate::position::{Bias, Position};
use crate::selection::{Range, Selection, extend_range, normalize_selection};
use crate::text::{char_len, prefix_chars, slice_chars, split_lines, suffix_chars};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

static NEXT_DOC_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_OP_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a fresh operation id.
pub(crate) fn next_op_id() -> u64 {
    NEXT_OP_ID.fetch_add(1, Ordering::Relaxed)
}

/// Identifier of a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocId(pub u64);

/// Options for selection updates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionOptions {
    /// Direction used to escape atomic ranges. Defaults to the direction of motion.
    pub bias: Option<Bias>,
    /// Origin tag for history merging, e.g. `"+move"` or `"*mouse"`.
    pub origin: Option<String>,
    /// Scroll the primary cursor into view.
    pub scroll: bool,
    /// Drop redo-able selection events.
    pub clear_redo: bool,
}

impl Default for SelectionOptions {
    fn default() -> Self {
        Self {
            bias: None,
            origin: None,
            scroll: true,
            clear_redo: true,
        }
    }
}

impl SelectionOptions {
    /// Options with an origin tag.
    pub fn origin(origin: &str) -> Self {
        Self {
            origin: Some(origin.to_string()),
            ..Self::default()
        }
    }

    /// Options with a bias.
    pub fn bias(bias: Bias) -> Self {
        Self {
            bias: Some(bias),
            ..Self::default()
        }
    }

    fn no_scroll() -> Self {
        Self {
            scroll: false,
            ..Self::default()
        }
    }
}

/// Which end of the primary range [`Doc::get_cursor`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorSide {
    /// The moving end.
    #[default]
    Head,
    /// The fixed end.
    Anchor,
    /// The start in document order.
    From,
    /// The end in document order.
    To,
}

/// Effects of model mutations, collected until the owning editor drains them.
#[derive(Debug, Default)]
pub struct DocEffects {
    /// Changes applied to this document, in order, with `removed` filled in.
    pub changes: Vec<Change>,
    /// Changes originating here that linked documents must replay.
    pub propagate: Vec<Change>,
    /// Lines whose content or decoration changed.
    pub touched: Vec<LineId>,
    /// Lines removed from the tree.
    pub deleted: Vec<LineId>,
    /// The line structure or folding changed.
    pub structure_changed: bool,
    /// The selection changed.
    pub selection_changed: bool,
    /// The primary cursor should be scrolled into view.
    pub scroll_to_cursor: bool,
    /// The highlight frontier moved back.
    pub highlight_rewound: bool,
    /// Markers cleared since the last drain.
    pub cleared_markers: Vec<MarkerId>,
}

impl DocEffects {
    /// Whether nothing happened.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
            && self.propagate.is_empty()
            && self.touched.is_empty()
            && self.deleted.is_empty()
            && !self.structure_changed
            && !self.selection_changed
            && !self.scroll_to_cursor
            && !self.highlight_rewound
            && self.cleared_markers.is_empty()
    }
}

/// A text document.
pub struct Doc {
    id: DocId,
    tree: LineTree,
    sel: Selection,
    markers: MarkerStore,
    history: Rc<RefCell<History>>,
    clean_generation: u64,
    cant_edit: bool,
    extend: bool,
    config: EditorConfig,
    clock: Rc<dyn Clock>,
    mode: Option<Rc<dyn Mode>>,
    pub(crate) highlight_frontier: usize,
    pub(crate) mode_frontier: usize,
    cur_op: Option<u64>,
    op_depth: usize,
    effects: DocEffects,
}

impl std::fmt::Debug for Doc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Doc")
            .field("id", &self.id)
            .field("lines", &self.tree.size())
            .field("sel", &self.sel)
            .field("cant_edit", &self.cant_edit)
            .finish_non_exhaustive()
    }
}

impl Doc {
    /// Create a document holding `text` with the system clock.
    pub fn new(text: &str, config: EditorConfig) -> Self {
        Self::with_clock(text, config, Rc::new(SystemClock))
    }

    /// Create a document reading time from `clock`.
    pub fn with_clock(text: &str, config: EditorConfig, clock: Rc<dyn Clock>) -> Self {
        let height = config.default_line_height;
        let lines = split_lines(text)
            .into_iter()
            .map(|t| Line::new(t, height))
            .collect();
        let first = config.first_line_number;
        let history = History::new(config.undo_depth, config.history_event_delay_ms);
        Self {
            id: DocId(NEXT_DOC_ID.fetch_add(1, Ordering::Relaxed)),
            tree: LineTree::new(lines, first),
            sel: Selection::cursor(Position::new(first, 0)),
            markers: MarkerStore::new(),
            clean_generation: history.generation(),
            history: Rc::new(RefCell::new(history)),
            cant_edit: false,
            extend: false,
            config,
            clock,
            mode: None,
            highlight_frontier: first,
            mode_frontier: first,
            cur_op: None,
            op_depth: 0,
            effects: DocEffects::default(),
        }
    }

    /// Document id.
    pub fn id(&self) -> DocId {
        self.id
    }

    /// Configuration.
    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    /// The line tree.
    pub fn tree(&self) -> &LineTree {
        &self.tree
    }

    pub(crate) fn tree_mut(&mut self) -> &mut LineTree {
        &mut self.tree
    }

    /// The marker store.
    pub fn markers(&self) -> &MarkerStore {
        &self.markers
    }

    /// The clock used for history coalescing.
    pub fn clock(&self) -> &Rc<dyn Clock> {
        &self.clock
    }

    /// Whether edits are refused because no cursor position outside atomic ranges exists.
    pub fn cant_edit(&self) -> bool {
        self.cant_edit
    }

    /// Active mode, if any.
    pub fn mode(&self) -> Option<&Rc<dyn Mode>> {
        self.mode.as_ref()
    }

    /// Change the mode, dropping all cached tokenizer output.
    pub fn set_mode(&mut self, mode: Option<Rc<dyn Mode>>) {
        self.begin_op();
        self.mode = mode;
        let first = self.first_line();
        let ids = self.tree.line_ids(first, first + self.tree.size());
        for id in &ids {
            if let Some(line) = self.tree.line_mut(*id) {
                line.state_after = None;
                line.style_runs = None;
            }
        }
        self.highlight_frontier = first;
        self.mode_frontier = first;
        self.effects.touched.extend(ids);
        self.effects.highlight_rewound = true;
        self.end_op();
    }

    pub(crate) fn set_config(&mut self, config: EditorConfig) {
        {
            let mut hist = self.history.borrow_mut();
            hist.set_undo_depth(config.undo_depth);
            hist.set_event_delay(config.history_event_delay_ms);
        }
        self.config = config;
    }

    /// Drain collected side effects.
    pub fn take_effects(&mut self) -> DocEffects {
        std::mem::take(&mut self.effects)
    }

    pub(crate) fn effects_mut(&mut self) -> &mut DocEffects {
        &mut self.effects
    }

    /// Open an operation scope. Nested scopes share the outermost id.
    pub fn begin_op(&mut self) {
        if self.op_depth == 0 {
            self.cur_op = Some(next_op_id());
        }
        self.op_depth += 1;
    }

    /// Close an operation scope.
    pub fn end_op(&mut self) {
        self.op_depth = self.op_depth.saturating_sub(1);
        if self.op_depth == 0 {
            self.cur_op = None;
        }
    }

    /// Id of the open operation, if any.
    pub fn current_op(&self) -> Option<u64> {
        self.cur_op
    }

    fn op_id(&self) -> u64 {
        self.cur_op.unwrap_or_else(next_op_id)
    }

    // --- lines -------------------------------------------------------------------------

    /// Number of the first line.
    pub fn first_line(&self) -> usize {
        self.tree.first()
    }

    /// Number of the last line.
    pub fn last_line(&self) -> usize {
        self.tree.last()
    }

    /// Number of lines.
    pub fn line_count(&self) -> usize {
        self.tree.size()
    }

    /// Handle of line `n`.
    pub fn get_line_handle(&self, n: usize) -> Result<LineId> {
        self.tree.get_line(n)
    }

    /// Text of line `n`.
    pub fn get_line_text(&self, n: usize) -> Option<&str> {
        let id = self.tree.get_line(n).ok()?;
        self.tree.line(id).map(Line::text)
    }

    /// Number of the line `id` refers to.
    pub fn line_number(&self, id: LineId) -> Option<usize> {
        self.tree.line_number(id)
    }

    fn line_len(&self, n: usize) -> usize {
        self.tree
            .get_line(n)
            .ok()
            .and_then(|id| self.tree.line(id))
            .map(Line::len)
            .unwrap_or(0)
    }

    /// Call `f` with every line in `[from, to)`.
    pub fn iter_lines(&self, from: usize, to: usize, mut f: impl FnMut(usize, &Line)) {
        let from = from.max(self.first_line());
        for (i, id) in self.tree.line_ids(from, to).into_iter().enumerate() {
            if let Some(line) = self.tree.line(id) {
                f(from + i, line);
            }
        }
    }

    /// Clip `pos` to the document.
    pub fn clip_pos(&self, pos: Position) -> Position {
        if pos.line < self.first_line() {
            return Position::new(self.first_line(), 0);
        }
        let last = self.last_line();
        if pos.line > last {
            return Position::new(last, self.line_len(last));
        }
        Position::new(pos.line, pos.column.min(self.line_len(pos.line)))
    }

    /// Position of char offset `index`, counting one char per line break.
    pub fn pos_from_index(&self, mut index: usize) -> Position {
        let mut line_no = self.first_line();
        for id in self.tree.line_ids(self.first_line(), self.first_line() + self.line_count()) {
            let size = self.tree.line(id).map(Line::len).unwrap_or(0) + 1;
            if size > index {
                return self.clip_pos(Position::new(line_no, index));
            }
            index -= size;
            line_no += 1;
        }
        self.clip_pos(Position::new(line_no, 0))
    }

    /// Char offset of `pos`, counting one char per line break.
    pub fn index_from_pos(&self, pos: Position) -> usize {
        let pos = self.clip_pos(pos);
        let mut index = pos.column;
        for id in self.tree.line_ids(self.first_line(), pos.line) {
            index += self.tree.line(id).map(Line::len).unwrap_or(0) + 1;
        }
        index
    }

    /// Lines of text between two clipped positions.
    pub fn get_between(&self, from: Position, to: Position) -> Vec<String> {
        let mut out = Vec::new();
        let ids = self.tree.line_ids(from.line, to.line + 1);
        for (i, id) in ids.into_iter().enumerate() {
            let n = from.line + i;
            let text = self.tree.line(id).map(Line::text).unwrap_or("");
            let piece = if n == from.line && n == to.line {
                slice_chars(text, from.column, to.column)
            } else if n == from.line {
                suffix_chars(text, from.column)
            } else if n == to.line {
                prefix_chars(text, to.column)
            } else {
                text
            };
            out.push(piece.to_string());
        }
        if out.is_empty() {
            out.push(String::new());
        }
        out
    }

    /// Text between `from` and `to`, lines joined with `separator` (default `"\n"`).
    pub fn get_range(&self, from: Position, to: Position, separator: Option<&str>) -> String {
        let (a, b) = (self.clip_pos(from), self.clip_pos(to));
        let (from, to) = if a <= b { (a, b) } else { (b, a) };
        self.get_between(from, to).join(separator.unwrap_or("\n"))
    }

    /// Whole document text.
    pub fn get_value(&self, separator: Option<&str>) -> String {
        let mut out = String::new();
        let sep = separator.unwrap_or("\n");
        self.iter_lines(self.first_line(), self.first_line() + self.line_count(), |n, line| {
            if n > self.first_line() {
                out.push_str(sep);
            }
            out.push_str(line.text());
        });
        out
    }

    /// Replace the whole document. Markers do not survive; the cursor goes to the start.
    pub fn set_value(&mut self, text: &str) {
        self.begin_op();
        let top = Position::new(self.first_line(), 0);
        let last = self.last_line();
        let mut change = Change::new(
            top,
            Position::new(last, self.line_len(last)),
            split_lines(text),
            Some("setValue"),
        );
        change.full = true;
        self.make_change(change, true);
        self.set_selection(Selection::cursor(top), SelectionOptions::no_scroll());
        self.end_op();
    }

    // --- height ------------------------------------------------------------------------

    /// Vertical offset of the top of the visual line containing line `n`.
    pub fn height_at_line(&self, n: usize) -> f64 {
        let n = n.clamp(self.first_line(), self.last_line());
        match self.tree.get_line(n) {
            Ok(id) => {
                let vis = self.markers.visual_line(&self.tree, id);
                self.tree.height_at_line(vis)
            }
            Err(_) => 0.0,
        }
    }

    /// Line covering vertical offset `h`, clamped to the document.
    pub fn line_at_height(&self, h: f64) -> usize {
        if h < 0.0 {
            return self.first_line();
        }
        self.tree.line_at_height(h).min(self.last_line())
    }

    /// Total document height.
    pub fn height(&self) -> f64 {
        self.tree.height()
    }

    pub(crate) fn update_line_height(&mut self, id: LineId, height: f64) {
        self.tree.update_line_height(id, height);
    }

    /// Whether line `id` is folded away entirely.
    pub fn line_is_hidden(&self, id: LineId) -> bool {
        self.markers.line_is_hidden(&self.tree, id)
    }

    // --- changes -----------------------------------------------------------------------

    /// Replace `[from, to)` with `text`. `to` defaults to `from`.
    pub fn replace_range(&mut self, text: &str, from: Position, to: Option<Position>, origin: Option<&str>) {
        let from = self.clip_pos(from);
        let to = to.map(|t| self.clip_pos(t)).unwrap_or(from);
        let (from, to) = if to < from { (to, from) } else { (from, to) };
        self.begin_op();
        self.make_change(Change::new(from, to, split_lines(text), origin), false);
        self.end_op();
    }

    /// Replace every selected range with `text`.
    pub fn replace_selection(&mut self, text: &str, select: SelectAfter, origin: Option<&str>) {
        let n = self.sel.ranges().len();
        let texts = vec![text.to_string(); n];
        self.replace_selections(&texts, select, origin);
    }

    /// Replace selected range `i` with `texts[i]`.
    pub fn replace_selections(&mut self, texts: &[String], select: SelectAfter, origin: Option<&str>) {
        if texts.is_empty() {
            return;
        }
        self.begin_op();
        let sel = self.sel.clone();
        let changes: Vec<Change> = sel
            .ranges()
            .iter()
            .enumerate()
            .map(|(i, r)| {
                let text = &texts[i.min(texts.len() - 1)];
                Change::new(r.from(), r.to(), split_lines(text), origin)
            })
            .collect();
        let new_sel = compute_replaced_sel(&sel, &changes, select, self.first_line());
        for change in changes.into_iter().rev() {
            self.make_change(change, false);
        }
        if let Some(new_sel) = new_sel {
            self.set_selection_replace_history(new_sel);
        } else {
            self.effects.scroll_to_cursor = true;
        }
        self.end_op();
    }

    pub(crate) fn make_change(&mut self, change: Change, ignore_read_only: bool) {
        if self.cant_edit {
            debug!(doc = self.id.0, "edit refused while no valid cursor position exists");
            return;
        }
        let split = if ignore_read_only {
            None
        } else {
            self.markers
                .remove_read_only_ranges(&self.tree, change.from, change.to)
        };
        match split {
            Some(parts) => {
                for (i, (from, to)) in parts.into_iter().enumerate().rev() {
                    let text = if i > 0 {
                        vec![String::new()]
                    } else {
                        change.text.clone()
                    };
                    let mut piece = Change::new(from, to, text, change.origin.as_deref());
                    piece.full = change.full;
                    self.make_change_inner(piece);
                }
            }
            None => self.make_change_inner(change),
        }
    }

    fn make_change_inner(&mut self, change: Change) {
        if change.is_noop() {
            return;
        }
        let sel_after = compute_sel_after_change(&self.sel, &change);
        let inverse = self.history_change_from_change(&change);
        let op = self.op_id();
        let now = self.clock.now_ms();
        self.history
            .borrow_mut()
            .add_change(&change, inverse, &self.sel, sel_after.clone(), op, now);
        let spans = self.markers.stretch_spans_over_change(&self.tree, &change);
        self.effects.propagate.push(change.clone());
        self.make_change_single_doc(change, Some(sel_after), spans);
    }

    /// Apply a change that originated in a linked document.
    pub(crate) fn apply_linked_change(&mut self, change: &Change) {
        self.begin_op();
        let mut change = change.clone();
        change.removed = None;
        let spans = self.markers.stretch_spans_over_change(&self.tree, &change);
        self.make_change_single_doc(change, None, spans);
        self.end_op();
    }

    fn history_change_from_change(&self, change: &Change) -> HistoryChange {
        let text = self.get_between(change.from, change.to);
        let mut spans = Vec::new();
        let local = self.local_spans(change.from.line, change.to.line + 1);
        if let Some(local) = local {
            spans.push((self.id, local));
        }
        HistoryChange {
            from: change.from,
            to: change_end(change),
            text,
            spans,
        }
    }

    fn local_spans(&self, from: usize, to: usize) -> Option<Vec<Vec<MarkedSpan>>> {
        let mut out = Vec::new();
        let mut any = false;
        for id in self.tree.line_ids(from, to) {
            let spans = self
                .tree
                .line(id)
                .map(|l| l.marked_spans.clone())
                .unwrap_or_default();
            any |= !spans.is_empty();
            out.push(spans);
        }
        any.then_some(out)
    }

    fn make_change_single_doc(
        &mut self,
        mut change: Change,
        sel_after: Option<Selection>,
        spans: Option<Vec<Vec<MarkedSpan>>>,
    ) {
        if change.from.line > self.last_line() {
            return;
        }
        if change.to.line > self.last_line() {
            change.to = self.clip_pos(change.to);
        }
        change.from = self.clip_pos(change.from);
        change.removed = Some(self.get_between(change.from, change.to));
        let sel_after = sel_after.unwrap_or_else(|| compute_sel_after_change(&self.sel, &change));
        trace!(
            doc = self.id.0,
            from = %change.from,
            to = %change.to,
            lines = change.text.len(),
            "applying change"
        );

        let old_size = self.tree.size();
        self.update_doc(&change, spans);

        let from_line = change.from.line;
        self.highlight_frontier = self.highlight_frontier.min(from_line);
        self.mode_frontier = self.mode_frontier.min(from_line);
        self.effects.highlight_rewound = true;
        let end_line = from_line + change.text.len();
        self.effects
            .touched
            .extend(self.tree.line_ids(from_line, end_line));
        if self.tree.size() != old_size || self.markers.saw_collapsed() {
            self.effects.structure_changed = true;
        }
        self.effects.changes.push(change);

        self.set_selection_no_undo(sel_after, SelectionOptions::no_scroll());
        if self.cant_edit
            && self
                .try_skip_atomic(Position::new(self.first_line(), 0), None, 1, false)
                .is_some()
        {
            self.cant_edit = false;
        }
    }

    fn update_doc(&mut self, change: &Change, spans: Option<Vec<Vec<MarkedSpan>>>) {
        let spans_for = |n: usize| -> Vec<MarkedSpan> {
            spans
                .as_ref()
                .and_then(|s| s.get(n))
                .cloned()
                .unwrap_or_default()
        };
        let from = change.from;
        let to = change.to;
        let text = &change.text;
        let Ok(first_id) = self.tree.get_line(from.line) else {
            return;
        };
        let Ok(last_id) = self.tree.get_line(to.line) else {
            return;
        };
        let last_text = text.last().cloned().unwrap_or_default();
        let last_spans = spans_for(text.len() - 1);
        let nlines = to.line - from.line;
        let lines_for = |start: usize, end: usize| -> Vec<(String, Vec<MarkedSpan>)> {
            (start..end).map(|i| (text[i].clone(), spans_for(i))).collect()
        };
        let first_text = self.tree.line(first_id).map(|l| l.text().to_string()).unwrap_or_default();
        let last_line_text = self.tree.line(last_id).map(|l| l.text().to_string()).unwrap_or_default();

        if change.full {
            let old_size = self.tree.size();
            let first = self.first_line();
            self.insert_lines(first, lines_for(0, text.len()));
            self.remove_lines(first + text.len(), old_size);
        } else if from.column == 0 && to.column == 0 && last_text.is_empty() {
            // Whole-line update: the last line keeps its identity.
            let added = lines_for(0, text.len() - 1);
            self.update_line(last_id, last_line_text, last_spans);
            if nlines > 0 {
                self.remove_lines(from.line, nlines);
            }
            if !added.is_empty() {
                self.insert_lines(from.line, added);
            }
        } else if first_id == last_id {
            if text.len() == 1 {
                let new_text = format!(
                    "{}{}{}",
                    prefix_chars(&first_text, from.column),
                    last_text,
                    suffix_chars(&first_text, to.column)
                );
                self.update_line(first_id, new_text, last_spans);
            } else {
                let mut added = lines_for(1, text.len() - 1);
                added.push((
                    format!("{}{}", last_text, suffix_chars(&first_text, to.column)),
                    last_spans,
                ));
                let head = format!("{}{}", prefix_chars(&first_text, from.column), text[0]);
                self.update_line(first_id, head, spans_for(0));
                self.insert_lines(from.line + 1, added);
            }
        } else if text.len() == 1 {
            let joined = format!(
                "{}{}{}",
                prefix_chars(&first_text, from.column),
                text[0],
                suffix_chars(&last_line_text, to.column)
            );
            self.update_line(first_id, joined, spans_for(0));
            self.remove_lines(from.line + 1, nlines);
        } else {
            let head = format!("{}{}", prefix_chars(&first_text, from.column), text[0]);
            let tail = format!("{}{}", last_text, suffix_chars(&last_line_text, to.column));
            self.update_line(first_id, head, spans_for(0));
            self.update_line(last_id, tail, last_spans);
            let added = lines_for(1, text.len() - 1);
            if nlines > 1 {
                self.remove_lines(from.line + 1, nlines - 1);
            }
            self.insert_lines(from.line + 1, added);
        }
    }

    fn attach_spans(&mut self, id: LineId, spans: Vec<MarkedSpan>) {
        let old = match self.tree.line_mut(id) {
            Some(line) => std::mem::replace(&mut line.marked_spans, spans.clone()),
            None => return,
        };
        for span in old {
            self.markers.detach_line(span.marker, id);
        }
        for span in spans {
            self.markers.attach_line(span.marker, id);
        }
    }

    fn refresh_hidden_height(&mut self, id: LineId) {
        let hidden = self.markers.line_is_hidden(&self.tree, id);
        let current = self.tree.line(id).map(Line::height).unwrap_or(0.0);
        if hidden {
            self.tree.update_line_height(id, 0.0);
        } else if current == 0.0 {
            self.tree
                .update_line_height(id, self.config.default_line_height);
        }
    }

    fn update_line(&mut self, id: LineId, text: String, spans: Vec<MarkedSpan>) {
        if let Some(line) = self.tree.line_mut(id) {
            line.set_text(text);
        }
        self.attach_spans(id, spans);
        self.refresh_hidden_height(id);
    }

    fn insert_lines(&mut self, at: usize, lines: Vec<(String, Vec<MarkedSpan>)>) {
        let height = self.config.default_line_height;
        let (texts, spans): (Vec<String>, Vec<Vec<MarkedSpan>>) = lines.into_iter().unzip();
        let ids = self
            .tree
            .insert(at, texts.into_iter().map(|t| Line::new(t, height)).collect());
        for (id, spans) in ids.iter().zip(spans) {
            self.attach_spans(*id, spans);
        }
        for id in ids {
            self.refresh_hidden_height(id);
        }
    }

    fn remove_lines(&mut self, at: usize, n: usize) {
        for (id, line) in self.tree.remove(at, n) {
            for span in &line.marked_spans {
                self.markers.detach_line(span.marker, id);
            }
            self.effects.deleted.push(id);
        }
    }

    // --- selection ---------------------------------------------------------------------

    /// Current selection.
    pub fn selection(&self) -> &Selection {
        &self.sel
    }

    /// Ranges of the current selection.
    pub fn list_selections(&self) -> &[Range] {
        self.sel.ranges()
    }

    /// Whether any range is non-empty.
    pub fn something_selected(&self) -> bool {
        self.sel.something_selected()
    }

    /// One end of the primary range.
    pub fn get_cursor(&self, side: CursorSide) -> Position {
        let range = self.sel.primary();
        match side {
            CursorSide::Head => range.head,
            CursorSide::Anchor => range.anchor,
            CursorSide::From => range.from(),
            CursorSide::To => range.to(),
        }
    }

    /// Text of every selected range, joined by `separator` (default `"\n"`).
    pub fn get_selection(&self, separator: Option<&str>) -> String {
        self.get_selections(separator).join(separator.unwrap_or("\n"))
    }

    /// Text of each selected range.
    pub fn get_selections(&self, separator: Option<&str>) -> Vec<String> {
        self.sel
            .ranges()
            .iter()
            .map(|r| self.get_range(r.from(), r.to(), separator))
            .collect()
    }

    /// Whether shift-style extension is sticky.
    pub fn get_extending(&self) -> bool {
        self.extend
    }

    /// Make extension sticky (or not).
    pub fn set_extending(&mut self, extend: bool) {
        self.extend = extend;
    }

    /// Select from `anchor` to `head` (a cursor when `head` is `None`).
    pub fn set_selection(&mut self, sel: Selection, options: SelectionOptions) {
        self.begin_op();
        let sel = self.clip_selection(sel);
        let origin = options.origin.clone();
        let clear_redo = options.clear_redo;
        self.set_selection_no_undo(sel, options);
        let op = self.op_id();
        let now = self.clock.now_ms();
        self.history
            .borrow_mut()
            .add_selection(self.sel.clone(), op, origin.as_deref(), now, clear_redo);
        self.end_op();
    }

    /// Select a single range.
    pub fn set_simple_selection(&mut self, anchor: Position, head: Option<Position>, options: SelectionOptions) {
        let range = Range::new(anchor, head.unwrap_or(anchor));
        self.set_selection(Selection::single(range), options);
    }

    /// Place a single cursor.
    pub fn set_cursor(&mut self, pos: Position, options: SelectionOptions) {
        self.set_simple_selection(pos, None, options);
    }

    /// Replace the selection with `ranges`, `primary` naming the primary one.
    pub fn set_selections(&mut self, ranges: Vec<Range>, primary: usize, options: SelectionOptions) {
        if ranges.is_empty() {
            return;
        }
        self.set_selection(normalize_selection(ranges, primary), options);
    }

    /// Add a range and make it primary.
    pub fn add_selection(&mut self, anchor: Position, head: Option<Position>, options: SelectionOptions) {
        let mut ranges = self.sel.ranges().to_vec();
        ranges.push(Range::new(self.clip_pos(anchor), self.clip_pos(head.unwrap_or(anchor))));
        let primary = ranges.len() - 1;
        self.set_selection(normalize_selection(ranges, primary), options);
    }

    /// Move the primary head to `head`, keeping the anchor when extending.
    pub fn extend_selection(&mut self, head: Position, other: Option<Position>, options: SelectionOptions) {
        let range = extend_range(
            self.sel.primary(),
            self.clip_pos(head),
            other.map(|o| self.clip_pos(o)),
            self.extend,
        );
        self.set_selection(Selection::single(range), options);
    }

    /// Extend every range to the head computed by `f`.
    pub fn extend_selections_by(&mut self, mut f: impl FnMut(&Range) -> Position, options: SelectionOptions) {
        let extend = self.extend;
        let ranges: Vec<Range> = self
            .sel
            .ranges()
            .iter()
            .map(|r| extend_range(*r, self.clip_pos(f(r)), None, extend))
            .collect();
        self.set_selection(normalize_selection(ranges, self.sel.primary_index()), options);
    }

    fn clip_selection(&self, sel: Selection) -> Selection {
        let clipped = sel
            .ranges()
            .iter()
            .map(|r| Range::new(self.clip_pos(r.anchor), self.clip_pos(r.head)))
            .collect();
        normalize_selection(clipped, sel.primary_index())
    }

    fn set_selection_replace_history(&mut self, sel: Selection) {
        let replaced = self.history.borrow_mut().replace_top_selection(sel.clone());
        if replaced {
            self.set_selection_no_undo(sel, SelectionOptions::default());
        } else {
            self.set_selection(sel, SelectionOptions::default());
        }
    }

    fn set_selection_no_undo(&mut self, sel: Selection, options: SelectionOptions) {
        let dir = match options.bias {
            Some(bias) => bias.dir(),
            None if sel.primary().head < self.sel.primary().head => -1,
            None => 1,
        };
        let sel = self.skip_atomic_in_selection(sel, dir, true);
        self.set_selection_inner(sel);
        if options.scroll {
            self.effects.scroll_to_cursor = true;
        }
    }

    fn set_selection_inner(&mut self, sel: Selection) {
        if sel == self.sel {
            return;
        }
        self.sel = sel;
        self.effects.selection_changed = true;
    }

    /// Re-run atomic skipping on the current selection.
    fn recheck_selection(&mut self) {
        let sel = self.sel.clone();
        let sel = self.skip_atomic_in_selection(sel, 1, false);
        self.set_selection_inner(sel);
    }

    fn skip_atomic_in_selection(&mut self, sel: Selection, dir: isize, may_clear: bool) -> Selection {
        if !self.markers.iter().any(|m| m.atomic() || m.options().clear_on_enter) {
            return sel;
        }
        let cur = self.sel.clone();
        let same_shape = sel.ranges().len() == cur.ranges().len();
        let mut out: Option<Vec<Range>> = None;
        for (i, range) in sel.ranges().iter().enumerate() {
            let old = same_shape.then(|| cur.ranges()[i]);
            let anchor = self.skip_atomic(range.anchor, old.map(|o| o.anchor), dir, may_clear);
            let head = if range.head == range.anchor {
                anchor
            } else {
                self.skip_atomic(range.head, old.map(|o| o.head), dir, may_clear)
            };
            if out.is_some() || anchor != range.anchor || head != range.head {
                out.get_or_insert_with(|| sel.ranges()[..i].to_vec())
                    .push(Range::new(anchor, head));
            }
        }
        match out {
            Some(ranges) => normalize_selection(ranges, sel.primary_index()),
            None => sel,
        }
    }

    /// Push `pos` out of any atomic range, in direction `dir` first.
    ///
    /// When no position outside atomic ranges can be reached in either direction the document
    /// enters the `cant_edit` state and the cursor is parked at the document start.
    fn skip_atomic(&mut self, pos: Position, old: Option<Position>, dir: isize, may_clear: bool) -> Position {
        if let Some(found) = self.try_skip_atomic(pos, old, dir, may_clear) {
            return found;
        }
        warn!(
            doc = self.id.0,
            pos = %pos,
            "no cursor position outside atomic ranges; refusing edits until one is cleared"
        );
        self.cant_edit = true;
        Position::new(self.first_line(), 0)
    }

    fn try_skip_atomic(&mut self, pos: Position, old: Option<Position>, dir: isize, may_clear: bool) -> Option<Position> {
        self.skip_atomic_inner(pos, old, dir, may_clear, 0)
            .or_else(|| {
                (!may_clear)
                    .then(|| self.skip_atomic_inner(pos, old, dir, true, 0))
                    .flatten()
            })
            .or_else(|| self.skip_atomic_inner(pos, old, -dir, may_clear, 0))
            .or_else(|| {
                (!may_clear)
                    .then(|| self.skip_atomic_inner(pos, old, -dir, true, 0))
                    .flatten()
            })
    }

    fn move_pos(&self, pos: Position, dir: isize) -> Option<Position> {
        if dir < 0 && pos.column == 0 {
            (pos.line > self.first_line())
                .then(|| Position::new(pos.line - 1, self.line_len(pos.line - 1)))
        } else if dir > 0 && pos.column >= self.line_len(pos.line) {
            (pos.line < self.last_line()).then(|| Position::new(pos.line + 1, 0))
        } else if dir < 0 {
            Some(Position::new(pos.line, pos.column - 1))
        } else {
            Some(Position::new(pos.line, pos.column + 1))
        }
    }

    fn skip_atomic_inner(
        &mut self,
        pos: Position,
        old: Option<Position>,
        dir: isize,
        may_clear: bool,
        depth: usize,
    ) -> Option<Position> {
        if depth > 256 {
            return None;
        }
        let Ok(line) = self.tree.get_line(pos.line) else {
            return Some(pos);
        };
        let spans = self
            .tree
            .line(line)
            .map(|l| l.marked_spans.clone())
            .unwrap_or_default();
        for sp in spans {
            let Some(marker) = self.markers.get(sp.marker) else {
                continue;
            };
            let prevent_left = marker.options().inclusive_left;
            let prevent_right = marker.options().inclusive_right;
            let inside = sp.from.is_none_or(|f| if prevent_left { f <= pos.column } else { f < pos.column })
                && sp.to.is_none_or(|t| if prevent_right { t >= pos.column } else { t > pos.column });
            if !inside {
                continue;
            }
            let id = marker.id();
            let atomic = marker.atomic();
            if may_clear && marker.options().clear_on_enter {
                // A cleared marker no longer constrains the cursor.
                if let Err(err) = self.clear_marker(id) {
                    trace!(marker = id.0, %err, "clear-on-enter marker already gone");
                }
                continue;
            }
            if !atomic {
                continue;
            }
            if let Some(old) = old {
                let side = if dir < 0 { Bias::After } else { Bias::Before };
                let mut near = self.markers.find_side(&self.tree, id, side);
                if (dir < 0 && prevent_right) || (dir > 0 && prevent_left) {
                    near = near.and_then(|n| self.move_pos(n, -dir));
                }
                if let Some(near) = near
                    && near.line == pos.line
                    && near != old
                    && (if dir < 0 { near < old } else { near > old })
                {
                    return self.skip_atomic_inner(near, Some(pos), dir, may_clear, depth + 1);
                }
            }
            let side = if dir < 0 { Bias::Before } else { Bias::After };
            let mut far = self.markers.find_side(&self.tree, id, side);
            if (dir < 0 && prevent_left) || (dir > 0 && prevent_right) {
                far = far.and_then(|f| self.move_pos(f, dir));
            }
            return far.and_then(|f| self.skip_atomic_inner(f, Some(pos), dir, may_clear, depth + 1));
        }
        Some(pos)
    }

    // --- markers -----------------------------------------------------------------------

    /// Mark `[from, to)`.
    ///
    /// Fails with [`DocError::InvalidOverlap`] when a collapsed range would partially overlap
    /// another collapsed range.
    pub fn mark_text(&mut self, from: Position, to: Position, options: MarkOptions) -> Result<MarkerId> {
        let from = self.clip_pos(from);
        let to = self.clip_pos(to);
        self.mark_inner(from, to, options, MarkerKind::Range)
    }

    /// Put a bookmark at `pos`, clipped to the document.
    pub fn set_bookmark(&mut self, pos: Position, insert_left: bool) -> Result<MarkerId> {
        let pos = self.clip_pos(pos);
        self.mark_inner(pos, pos, MarkOptions::default(), MarkerKind::Bookmark { insert_left })
    }

    fn mark_inner(&mut self, from: Position, to: Position, options: MarkOptions, kind: MarkerKind) -> Result<MarkerId> {
        let is_bookmark = matches!(kind, MarkerKind::Bookmark { .. });
        if from > to || (from == to && !is_bookmark && options.clear_when_empty) {
            return Ok(self.markers.create(kind, options));
        }
        if options.collapsed
            && (self
                .markers
                .conflicting_collapsed_range(&self.tree, from.line, from, to, &options)
                || (from.line != to.line
                    && self
                        .markers
                        .conflicting_collapsed_range(&self.tree, to.line, from, to, &options)))
        {
            return Err(DocError::InvalidOverlap);
        }

        self.begin_op();
        if options.add_to_history {
            let op = self.op_id();
            let now = self.clock.now_ms();
            let mut hist = self.history.borrow_mut();
            hist.change_generation(true);
            hist.add_selection(self.sel.clone(), op, Some("markText"), now, true);
        }
        let collapsed = options.collapsed;
        let read_only = options.read_only;
        let atomic = options.atomic || collapsed;
        let id = self.markers.create(kind, options);

        let ids = self.tree.line_ids(from.line, to.line + 1);
        for (i, line) in ids.iter().enumerate() {
            let n = from.line + i;
            let span = MarkedSpan::new(
                id,
                (n == from.line).then_some(from.column),
                (n == to.line).then_some(to.column),
            );
            if let Some(l) = self.tree.line_mut(*line) {
                l.marked_spans.push(span);
            }
            self.markers.attach_line(id, *line);
            if collapsed && n != from.line {
                self.tree.update_line_height(*line, 0.0);
            }
        }
        if collapsed {
            for line in &ids {
                if self.markers.line_is_hidden(&self.tree, *line) {
                    self.tree.update_line_height(*line, 0.0);
                }
            }
            self.effects.structure_changed = true;
        }
        if read_only {
            let size = self.history.borrow().size();
            if size.undo > 0 || size.redo > 0 {
                self.clear_history();
            }
        }
        self.effects.touched.extend(ids);
        if atomic {
            self.recheck_selection();
        }
        self.end_op();
        Ok(id)
    }

    /// Remove a marker and its spans.
    pub fn clear_marker(&mut self, id: MarkerId) -> Result<()> {
        let marker = self.markers.get(id).cloned().ok_or(DocError::UnknownMarker(id.0))?;
        self.begin_op();
        for &line in marker.lines() {
            let span = match self.tree.line_mut(line) {
                Some(l) => {
                    let span = span_for(&l.marked_spans, id).copied();
                    l.marked_spans.retain(|s| s.marker != id);
                    span
                }
                None => None,
            };
            self.effects.touched.push(line);
            if let Some(span) = span
                && span.from.is_none()
                && marker.collapsed()
                && !self.markers.line_is_hidden(&self.tree, line)
            {
                self.tree
                    .update_line_height(line, self.config.default_line_height);
            }
        }
        self.markers.remove(id);
        if marker.collapsed() {
            self.effects.structure_changed = true;
        }
        self.effects.cleared_markers.push(id);
        if marker.atomic() && self.cant_edit {
            self.cant_edit = false;
            self.recheck_selection();
        }
        self.end_op();
        Ok(())
    }

    /// Current extent of a marker.
    pub fn find_marker(&self, id: MarkerId) -> Option<MarkerRange> {
        self.markers.find(&self.tree, id)
    }

    /// Markers overlapping `[from, to]`.
    pub fn find_marks(&self, from: Position, to: Position) -> Vec<MarkerId> {
        self.markers
            .find_marks(&self.tree, self.clip_pos(from), self.clip_pos(to))
    }

    /// Markers touching `pos`.
    pub fn find_marks_at(&self, pos: Position) -> Vec<MarkerId> {
        self.markers.find_marks_at(&self.tree, self.clip_pos(pos))
    }

    /// All markers still attached to the document, in document order.
    pub fn all_marks(&self) -> Vec<MarkerId> {
        let mut found: Vec<(MarkerRange, MarkerId)> = self
            .markers
            .iter()
            .filter_map(|m| self.find_marker(m.id()).map(|r| (r, m.id())))
            .collect();
        found.sort_by(|a, b| a.0.from.cmp(&b.0.from).then(a.1.cmp(&b.1)));
        found.into_iter().map(|(_, id)| id).collect()
    }

    // --- history -----------------------------------------------------------------------

    /// Undo the last change group.
    pub fn undo(&mut self) {
        self.make_change_from_history(Replay::Undo, false);
    }

    /// Redo the last undone change group.
    pub fn redo(&mut self) {
        self.make_change_from_history(Replay::Redo, false);
    }

    /// Undo one selection step, or the next change group if none differs.
    pub fn undo_selection(&mut self) {
        self.make_change_from_history(Replay::Undo, true);
    }

    /// Redo one selection step, or the next change group if none differs.
    pub fn redo_selection(&mut self) {
        self.make_change_from_history(Replay::Redo, true);
    }

    fn make_change_from_history(&mut self, dir: Replay, allow_selection_only: bool) {
        self.begin_op();
        let step = self
            .history
            .borrow_mut()
            .begin_replay(dir, &self.sel, allow_selection_only);
        match step {
            ReplayStep::Nothing => {}
            ReplayStep::Selection(sel) => {
                let options = SelectionOptions {
                    clear_redo: false,
                    ..SelectionOptions::default()
                };
                self.set_selection(sel, options);
            }
            ReplayStep::Changes { changes, restore } => {
                for (i, recorded) in changes.iter().enumerate().rev() {
                    let mut change = recorded.to_change(dir.origin());
                    change.from = self.clip_pos(change.from);
                    change.to = self.clip_pos(change.to);
                    let inverse = self.history_change_from_change(&change);
                    self.history.borrow_mut().push_replay_inverse(dir, inverse);
                    let after = if i > 0 { None } else { restore.clone() };
                    let spans = self
                        .markers
                        .merge_old_spans(&self.tree, &change, recorded.spans_for(self.id));
                    self.effects.propagate.push(change.clone());
                    self.make_change_single_doc(change, after, spans);
                    if i == 0 {
                        self.effects.scroll_to_cursor = true;
                    }
                }
            }
        }
        self.end_op();
    }

    /// Number of undo and redo steps.
    pub fn history_size(&self) -> HistorySize {
        self.history.borrow().size()
    }

    /// Forget all history.
    pub fn clear_history(&mut self) {
        let next = self.history.borrow().cleared();
        *self.history.borrow_mut() = next;
    }

    /// Current generation; with `force_split` the next edit starts a new undo step.
    pub fn change_generation(&mut self, force_split: bool) -> u64 {
        self.history.borrow_mut().change_generation(force_split)
    }

    /// Whether the document is unchanged since `generation` (default: since `mark_clean`).
    pub fn is_clean(&self, generation: Option<u64>) -> bool {
        self.history.borrow().generation() == generation.unwrap_or(self.clean_generation)
    }

    /// Mark the current state as clean.
    pub fn mark_clean(&mut self) {
        self.clean_generation = self.change_generation(true);
    }

    /// Copy of the undo and redo stacks.
    pub fn get_history(&self) -> HistorySnapshot {
        self.history.borrow().snapshot()
    }

    /// Replace the undo and redo stacks.
    pub fn set_history(&mut self, snapshot: HistorySnapshot) {
        self.history.borrow_mut().restore(snapshot);
    }

    /// History as JSON.
    pub fn get_history_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.get_history())?)
    }

    /// Replace history from JSON produced by [`Doc::get_history_json`].
    pub fn set_history_json(&mut self, json: &str) -> Result<()> {
        let snapshot: HistorySnapshot = serde_json::from_str(json)?;
        self.set_history(snapshot);
        Ok(())
    }

    pub(crate) fn history_rc(&self) -> &Rc<RefCell<History>> {
        &self.history
    }

    pub(crate) fn set_history_rc(&mut self, history: Rc<RefCell<History>>) {
        self.history = history;
    }

    /// Text length of line `n` in chars.
    pub fn line_length(&self, n: usize) -> usize {
        self.line_len(n)
    }

    /// Length of the whole document in chars, counting one per line break.
    pub fn char_count(&self) -> usize {
        let mut total = 0;
        self.iter_lines(self.first_line(), self.first_line() + self.line_count(), |_, line| {
            total += line.len() + 1;
        });
        total.saturating_sub(1)
    }

    /// Width of `text` in chars.
    pub fn text_width(text: &str) -> usize {
        char_len(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn p(line: usize, column: usize) -> Position {
        Position::new(line, column)
    }

    fn doc(text: &str) -> Doc {
        Doc::with_clock(text, EditorConfig::default(), Rc::new(ManualClock::new(1_000)))
    }

    #[test]
    fn test_four_change_shapes() {
        let mut d = doc("abc\ndef\nghi");
        d.replace_range("X", p(0, 1), Some(p(0, 2)), None);
        assert_eq!(d.get_value(None), "aXc\ndef\nghi");
        d.replace_range("1\n2", p(1, 1), Some(p(1, 2)), None);
        assert_eq!(d.get_value(None), "aXc\nd1\n2f\nghi");
        d.replace_range("-", p(0, 1), Some(p(2, 1)), None);
        assert_eq!(d.get_value(None), "a-f\nghi");
        d.replace_range("p\nq\nr", p(0, 2), Some(p(1, 1)), None);
        assert_eq!(d.get_value(None), "a-p\nq\nrhi");
        assert!(d.tree().verify().is_ok());
    }

    #[test]
    fn test_clips_out_of_range_edits() {
        let mut d = doc("abc");
        d.replace_range("!", p(5, 9), None, None);
        assert_eq!(d.get_value(None), "abc!");
        assert_eq!(d.clip_pos(p(0, 99)), p(0, 4));
    }

    #[test]
    fn test_index_conversion() {
        let d = doc("ab\ncde\nf");
        assert_eq!(d.index_from_pos(p(1, 2)), 5);
        assert_eq!(d.pos_from_index(5), p(1, 2));
        assert_eq!(d.pos_from_index(100), p(2, 1));
        assert_eq!(d.char_count(), 8);
    }

    #[test]
    fn test_replace_selection_and_undo() {
        let mut d = doc("abc\ndef");
        d.set_simple_selection(p(0, 1), Some(p(0, 2)), SelectionOptions::default());
        d.replace_selection("X", SelectAfter::End, Some("+input"));
        assert_eq!(d.get_value(None), "aXc\ndef");
        assert_eq!(d.selection().primary(), Range::cursor(p(0, 2)));
        d.undo();
        assert_eq!(d.get_value(None), "abc\ndef");
        assert_eq!(d.selection().primary(), Range::new(p(0, 1), p(0, 2)));
        d.redo();
        assert_eq!(d.get_value(None), "aXc\ndef");
    }

    #[test]
    fn test_atomic_fold_pushes_cursor_out() {
        let mut d = doc("abcdef");
        d.mark_text(p(0, 0), p(0, 3), MarkOptions::fold()).unwrap();
        d.set_cursor(p(0, 1), SelectionOptions::default());
        assert_eq!(d.get_cursor(CursorSide::Head), p(0, 3));
    }

    #[test]
    fn test_overlapping_folds_are_rejected() {
        let mut d = doc("abcdefgh");
        d.mark_text(p(0, 1), p(0, 4), MarkOptions::fold()).unwrap();
        let err = d.mark_text(p(0, 3), p(0, 6), MarkOptions::fold());
        assert!(matches!(err, Err(DocError::InvalidOverlap)));
        assert!(d.mark_text(p(0, 0), p(0, 6), MarkOptions::fold()).is_ok());
    }

    #[test]
    fn test_read_only_range_blocks_edits_inside() {
        let mut d = doc("abcdefgh");
        let opts = MarkOptions {
            read_only: true,
            ..MarkOptions::default()
        };
        d.mark_text(p(0, 2), p(0, 5), opts).unwrap();
        d.replace_range("", p(0, 0), Some(p(0, 8)), None);
        assert_eq!(d.get_value(None), "cde");
        d.replace_range("X", p(0, 1), None, None);
        assert_eq!(d.get_value(None), "cde");
    }

    #[test]
    fn test_marker_follows_edits() {
        let mut d = doc("hello world");
        let id = d.mark_text(p(0, 6), p(0, 11), MarkOptions::default()).unwrap();
        d.replace_range("big ", p(0, 6), None, None);
        let range = d.find_marker(id).unwrap();
        assert_eq!((range.from, range.to), (p(0, 10), p(0, 15)));
        d.replace_range("\n", p(0, 0), None, None);
        let range = d.find_marker(id).unwrap();
        assert_eq!((range.from, range.to), (p(1, 10), p(1, 15)));
    }

    #[test]
    fn test_undo_restores_deleted_marker() {
        let mut d = doc("one two three");
        let id = d.mark_text(p(0, 4), p(0, 7), MarkOptions::default()).unwrap();
        d.replace_range("", p(0, 3), Some(p(0, 8)), None);
        assert!(d.find_marker(id).is_none());
        d.undo();
        let range = d.find_marker(id).unwrap();
        assert_eq!((range.from, range.to), (p(0, 4), p(0, 7)));
    }

    #[test]
    fn test_bookmark_insert_left() {
        let mut d = doc("abc");
        let right = d.set_bookmark(p(0, 1), false).unwrap();
        let left = d.set_bookmark(p(0, 1), true).unwrap();
        d.replace_range("XY", p(0, 1), None, None);
        assert_eq!(d.find_marker(right).unwrap().from, p(0, 1));
        assert_eq!(d.find_marker(left).unwrap().from, p(0, 3));
    }

    #[test]
    fn test_clear_on_enter_marker_is_cleared_by_cursor() {
        let mut d = doc("abcdef");
        let opts = MarkOptions {
            clear_on_enter: true,
            ..MarkOptions::default()
        };
        let id = d.mark_text(p(0, 1), p(0, 4), opts).unwrap();
        d.set_cursor(p(0, 2), SelectionOptions::default());
        assert_eq!(d.get_cursor(CursorSide::Head), p(0, 2));
        assert_eq!(d.find_marker(id), None);
        assert!(d.all_marks().is_empty());
        assert!(!d.cant_edit());
    }

    #[test]
    fn test_bookmark_out_of_range_is_clipped_and_attached() {
        let mut d = doc("abc\nde");
        let id = d.set_bookmark(p(9, 9), false).unwrap();
        let range = d.find_marker(id).unwrap();
        assert_eq!((range.from, range.to), (p(1, 2), p(1, 2)));
        assert_eq!(d.find_marks_at(p(1, 2)), vec![id]);
    }

    #[test]
    fn test_clean_tracking() {
        let mut d = doc("abc");
        assert!(d.is_clean(None));
        d.replace_range("x", p(0, 0), None, None);
        assert!(!d.is_clean(None));
        d.undo();
        assert!(d.is_clean(None));
        d.replace_range("y", p(0, 0), None, None);
        d.mark_clean();
        assert!(d.is_clean(None));
    }

    #[test]
    fn test_history_json_round_trip() {
        let mut d = doc("abc");
        d.replace_range("x", p(0, 0), None, Some("paste"));
        let json = d.get_history_json().unwrap();
        let mut other = doc("xabc");
        other.set_history_json(&json).unwrap();
        other.undo();
        assert_eq!(other.get_value(None), "abc");
        assert!(other.set_history_json("not json").is_err());
    }

    #[test]
    fn test_set_value_resets_cursor_and_markers() {
        let mut d = doc("abc\ndef");
        let id = d.mark_text(p(0, 0), p(1, 1), MarkOptions::default()).unwrap();
        d.set_cursor(p(1, 2), SelectionOptions::default());
        d.set_value("new\ntext\nhere");
        assert_eq!(d.line_count(), 3);
        assert_eq!(d.get_cursor(CursorSide::Head), p(0, 0));
        assert!(d.find_marker(id).is_none());
    }
}
