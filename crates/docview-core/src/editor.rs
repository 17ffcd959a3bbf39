//! An editor: one document bound to one rendering host.
//!
//! # Operations
//!
//! Every mutation runs inside an operation. The outermost [`Editor::operation`] call opens one;
//! nested calls reuse it. While it is open the document changes immediately but the host is not
//! touched. When the outermost call returns, the operation is reconciled in four phases:
//!
//! 1. read the viewport and decide the scroll position and rendered window
//! 2. write the view patches
//! 3. read the heights of rebuilt views and store them in the line tree
//! 4. write the selection and scroll position
//!
//! then events fire. A [`crate::Session`] runs each phase across all editors whose operations
//! end together, so reads and writes of different editors never interleave.
//!
//! # Example
//!
//! ```rust
//! use docview_core::{Editor, EditorConfig, HeadlessHost, Position};
//!
//! let mut editor = Editor::new("abc\ndef", EditorConfig::default(), Box::new(HeadlessHost::new(400.0, 160.0)));
//! editor.operation(|ed| {
//!     ed.with_doc(|doc| doc.replace_range("X", Position::new(0, 1), Some(Position::new(0, 2)), None));
//! });
//! assert_eq!(editor.doc().get_value(None), "aXc\ndef");
//! ```

use crate::change::Change;
use crate::clock::Clock;
use crate::config::EditorConfig;
use crate::display::{Display, LineView, Segment, SegmentKind, build_line_view};
use crate::doc::{Doc, SelectionOptions};
use crate::error::Result;
use crate::events::{EditorEvent, EventCallback};
use crate::highlight::{Token, WorkerStatus, highlight_worker, line_tokens, mode_at, state_before};
use crate::host::{CharBox, RenderHost};
use crate::line_tree::Line;
use crate::measure::{CoordMode, MeasureCache, MeasureStats, coords_char_in_view, cursor_box};
use crate::operation::{Operation, PhaseState, ScrollTarget};
use crate::position::{Bias, Position};
use crate::selection::{Range, Selection};
use crate::text::{char_len, count_column};
use std::rc::Rc;
use tracing::debug;

/// How [`Editor::indent_line`] computes the new indentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndentHow {
    /// Ask the mode's indenter; falls back to `Prev` without one.
    Smart,
    /// Copy the indentation of the previous line.
    Prev,
    /// Add one indent unit.
    Add,
    /// Remove one indent unit.
    Subtract,
    /// Indent to an absolute column.
    Column(usize),
}

/// Counters of editor activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EditorStats {
    /// Operations opened.
    pub operations: usize,
    /// Reconcile passes run.
    pub reconciles: usize,
    /// Patches sent to the host.
    pub patches: usize,
    /// Highlight slices run.
    pub highlight_slices: usize,
}

/// A document with its rendered view.
pub struct Editor {
    doc: Doc,
    display: Display,
    measure: MeasureCache,
    host: Box<dyn RenderHost>,
    op: Option<Operation>,
    depth: usize,
    subscribers: Vec<EventCallback>,
    stats: EditorStats,
    highlight_due: Option<u64>,
    scroll_top: f64,
    rendered: bool,
    text_height: Option<f64>,
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("doc", &self.doc)
            .field("view_from", &self.display.view_from())
            .field("view_to", &self.display.view_to())
            .field("depth", &self.depth)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

impl Editor {
    /// Create an editor over `text` rendering into `host`.
    pub fn new(text: &str, config: EditorConfig, host: Box<dyn RenderHost>) -> Self {
        Self::from_doc(Doc::new(text, config), host)
    }

    /// Create an editor whose document reads time from `clock`.
    pub fn with_clock(text: &str, config: EditorConfig, clock: Rc<dyn Clock>, host: Box<dyn RenderHost>) -> Self {
        Self::from_doc(Doc::with_clock(text, config, clock), host)
    }

    /// Wrap an existing document and render it once.
    pub fn from_doc(doc: Doc, host: Box<dyn RenderHost>) -> Self {
        let mut editor = Self::unrendered(doc, host);
        editor.operation(|ed| {
            if let Some(op) = ed.op.as_mut() {
                op.full_rebuild = true;
            }
        });
        editor
    }

    /// An editor that has not been reconciled yet.
    pub(crate) fn unrendered(doc: Doc, host: Box<dyn RenderHost>) -> Self {
        Self {
            doc,
            display: Display::new(),
            measure: MeasureCache::new(),
            host,
            op: None,
            depth: 0,
            subscribers: Vec::new(),
            stats: EditorStats::default(),
            highlight_due: None,
            scroll_top: 0.0,
            rendered: false,
            text_height: None,
        }
    }

    /// The document.
    pub fn doc(&self) -> &Doc {
        &self.doc
    }

    pub(crate) fn doc_mut(&mut self) -> &mut Doc {
        &mut self.doc
    }

    /// The rendered window.
    pub fn display(&self) -> &Display {
        &self.display
    }

    /// The host.
    pub fn host(&self) -> &dyn RenderHost {
        self.host.as_ref()
    }

    /// Activity counters.
    pub fn stats(&self) -> EditorStats {
        self.stats
    }

    /// Measurement cache counters.
    pub fn measure_stats(&self) -> MeasureStats {
        self.measure.stats()
    }

    /// Scroll offset after the last reconcile.
    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    /// Register a callback for [`EditorEvent`]s.
    pub fn subscribe<F>(&mut self, callback: F)
    where
        F: FnMut(&EditorEvent) + 'static,
    {
        self.subscribers.push(Box::new(callback));
    }

    // --- operations ----------------------------------------------------------------------

    /// Run `f` inside an operation; reconcile when the outermost one returns.
    pub fn operation<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.start_operation();
        let result = f(self);
        if self.close_operation() {
            end_operations(&mut [self]);
        }
        result
    }

    /// Run `f` on the document inside an operation.
    pub fn with_doc<R>(&mut self, f: impl FnOnce(&mut Doc) -> R) -> R {
        self.operation(|ed| f(&mut ed.doc))
    }

    /// The open operation, if any.
    pub fn current_operation(&self) -> Option<&Operation> {
        self.op.as_ref()
    }

    pub(crate) fn start_operation(&mut self) {
        if self.depth == 0 {
            self.doc.begin_op();
            let id = self.doc.current_op().unwrap_or_default();
            self.op = Some(Operation::new(id));
            self.stats.operations += 1;
        }
        self.depth += 1;
    }

    /// Close one level; true when the outermost level closed and a reconcile is due.
    pub(crate) fn close_operation(&mut self) -> bool {
        if self.depth == 0 {
            return false;
        }
        self.depth -= 1;
        self.sync_effects();
        if self.depth > 0 {
            return false;
        }
        self.doc.end_op();
        true
    }

    fn sync_effects(&mut self) {
        let effects = self.doc.take_effects();
        match self.op.as_mut() {
            Some(op) => op.absorb(effects),
            None if !effects.is_empty() => {
                debug!(doc = self.doc.id().0, "document effects outside an operation dropped");
            }
            None => {}
        }
    }

    /// Changes recorded here that linked documents still have to replay.
    pub(crate) fn take_propagated(&mut self) -> Vec<Change> {
        let mut out = self
            .op
            .as_mut()
            .map(|op| std::mem::take(&mut op.propagate))
            .unwrap_or_default();
        out.append(&mut self.doc.effects_mut().propagate);
        out
    }

    /// Phase 1: read the viewport, settle the scroll position and the rendered window.
    pub(crate) fn phase_read_viewport(&mut self) {
        let Some(op) = self.op.as_mut() else {
            return;
        };
        let vp = self.host.viewport();
        let doc = &self.doc;
        let mut top = vp.scroll_top;
        let target = op.scroll_target.or_else(|| {
            op.scroll_to_cursor.then(|| ScrollTarget::Position {
                pos: doc.selection().primary().head,
                margin: 0.0,
            })
        });
        match target {
            Some(ScrollTarget::Top(t)) => top = t,
            Some(ScrollTarget::Position { pos, margin }) => {
                let pos = doc.clip_pos(pos);
                let vis = doc.markers().visual_line_no(doc.tree(), pos.line);
                let line_top = doc.height_at_line(vis);
                let line_height = doc
                    .get_line_handle(vis)
                    .ok()
                    .and_then(|id| doc.tree().line(id))
                    .map(Line::height)
                    .unwrap_or(doc.config().default_line_height);
                if line_top - margin < top {
                    top = line_top - margin;
                } else if line_top + line_height + margin > top + vp.height {
                    top = line_top + line_height + margin - vp.height;
                }
            }
            None => {}
        }
        let max_top = (doc.height() - vp.height).max(0.0);
        top = top.clamp(0.0, max_top);

        let margin = doc.config().viewport_margin;
        let first = doc.first_line();
        let end = first + doc.line_count();
        let first_visible = doc.line_at_height(top);
        let last_visible = doc.line_at_height(top + vp.height);
        let from = doc
            .markers()
            .visual_line_no(doc.tree(), first_visible.saturating_sub(margin).max(first));
        let to = (last_visible + 1 + margin).min(end);
        op.phase = PhaseState {
            scroll_top: top,
            new_scroll_top: (top != vp.scroll_top).then_some(top),
            view_from: from,
            view_to: to.max(from),
            window_moved: false,
            built: Vec::new(),
        };
    }

    /// Phase 2: rebuild stale views and send the patches.
    pub(crate) fn phase_write_views(&mut self) {
        let Some(op) = self.op.as_mut() else {
            return;
        };
        let dirty = op.dirty.take();
        for id in dirty.iter().chain(op.deleted.iter()) {
            self.measure.clear_line(*id);
        }
        let old_window = (self.display.view_from(), self.display.view_to());
        let rebuild_all = op.full_rebuild || !self.rendered;
        let (patches, built) = self.display.update(
            &self.doc,
            op.phase.view_from,
            op.phase.view_to,
            &dirty,
            rebuild_all,
        );
        for id in &built {
            self.measure.clear_line(*id);
            if let Some(view) = self.display.views().iter().find(|v| v.line == *id) {
                for rest in &view.rest {
                    self.measure.clear_line(*rest);
                }
            }
        }
        op.phase.window_moved =
            !self.rendered || (self.display.view_from(), self.display.view_to()) != old_window;
        if !patches.is_empty() {
            self.host.apply_patches(&patches);
            self.stats.patches += patches.len();
            op.view_changed = true;
        }
        op.phase.built = built;
        self.rendered = true;
    }

    /// Phase 3: measure rebuilt views and store their heights.
    pub(crate) fn phase_read_heights(&mut self) {
        let Some(op) = self.op.as_mut() else {
            return;
        };
        for id in &op.phase.built {
            let Some(view) = self.display.views().iter().find(|v| v.line == *id) else {
                continue;
            };
            let height = self.host.measure_height(view);
            let current = self.doc.tree().line(*id).map(Line::height);
            if current != Some(height) {
                self.doc.update_line_height(*id, height);
            }
        }
    }

    /// Phase 4: show the selection and apply the scroll position.
    pub(crate) fn phase_write_selection(&mut self) {
        let Some(op) = self.op.as_mut() else {
            return;
        };
        if op.selection_changed || op.view_changed || !op.changes.is_empty() {
            self.host.show_selection(self.doc.selection());
        }
        if let Some(top) = op.phase.new_scroll_top {
            self.host.set_scroll_top(top);
        }
        self.scroll_top = op.phase.scroll_top;
    }

    /// Close the operation: fire events and schedule highlighting.
    pub(crate) fn phase_finish(&mut self) {
        let Some(op) = self.op.take() else {
            return;
        };
        self.stats.reconciles += 1;
        let cursor_moved = op.selection_changed || !op.changes.is_empty();
        let updated = op.view_changed || op.phase.new_scroll_top.is_some();
        let changed = !op.changes.is_empty();
        debug!(
            op = op.id,
            changes = op.changes.len(),
            from = self.display.view_from(),
            to = self.display.view_to(),
            "operation reconciled"
        );

        let mut events = Vec::new();
        if changed {
            events.push(EditorEvent::Changes(op.changes));
        }
        if cursor_moved {
            events.push(EditorEvent::CursorActivity);
        }
        events.extend(op.cleared_markers.into_iter().map(EditorEvent::MarkerCleared));
        if op.phase.window_moved {
            events.push(EditorEvent::ViewportChange {
                from: self.display.view_from(),
                to: self.display.view_to(),
            });
        }
        if updated {
            events.push(EditorEvent::Update);
        }

        if self.doc.mode().is_some() && self.doc.highlight_frontier < self.display.view_to() {
            let config = self.doc.config();
            let delay = if changed {
                config.edit_work_delay_ms
            } else {
                config.work_delay_ms
            };
            let due = self.doc.clock().now_ms() + delay;
            self.highlight_due = Some(self.highlight_due.map_or(due, |d| d.min(due)));
        }

        for event in &events {
            for callback in &mut self.subscribers {
                callback(event);
            }
        }
    }

    // --- configuration -------------------------------------------------------------------

    /// Replace the configuration. Geometry changes drop cached measurements and rebuild views.
    pub fn set_config(&mut self, config: EditorConfig) {
        self.operation(|ed| {
            let old = ed.doc.config().clone();
            let geometry = old.tab_size != config.tab_size
                || old.default_line_height != config.default_line_height;
            ed.doc.set_config(config);
            if geometry {
                ed.measure.clear();
                ed.text_height = None;
                if let Some(op) = ed.op.as_mut() {
                    op.full_rebuild = true;
                }
            }
        });
    }

    // --- scrolling -----------------------------------------------------------------------

    /// Scroll to vertical offset `top`.
    pub fn scroll_to(&mut self, top: f64) {
        self.operation(|ed| {
            if let Some(op) = ed.op.as_mut() {
                op.scroll_target = Some(ScrollTarget::Top(top));
            }
        });
    }

    /// Scroll so that `pos` (default: the primary cursor) is visible with `margin` pixels around it.
    pub fn scroll_into_view(&mut self, pos: Option<Position>, margin: f64) {
        self.operation(|ed| {
            let pos = pos.unwrap_or_else(|| ed.doc.selection().primary().head);
            if let Some(op) = ed.op.as_mut() {
                op.scroll_target = Some(ScrollTarget::Position { pos, margin });
            }
        });
    }

    // --- measurement ---------------------------------------------------------------------

    /// View to measure line `line_no` against: the rendered one when the display is current,
    /// otherwise a fresh one.
    fn measure_view(&mut self, line_no: usize) -> Option<LineView> {
        let vis = self.doc.markers().visual_line_no(self.doc.tree(), line_no);
        if self.op.is_none()
            && let Some(view) = self.display.view_for(vis)
        {
            return Some(view.clone());
        }
        self.sync_effects();
        let view = build_line_view(&self.doc, vis)?;
        if let Some(op) = self.op.as_ref() {
            for id in std::iter::once(view.line).chain(view.rest.iter().copied()) {
                if op.dirty.contains(id) {
                    self.measure.clear_line(id);
                }
            }
        }
        Some(view)
    }

    fn to_mode(&self, mut b: CharBox, line_no: usize, mode: CoordMode) -> CharBox {
        let top = self.doc.height_at_line(line_no);
        b.top += top;
        b.bottom += top;
        if mode == CoordMode::Page {
            let (ox, oy) = self.host.page_origin();
            b.left += ox;
            b.right += ox;
            b.top += oy - self.scroll_top;
            b.bottom += oy - self.scroll_top;
        }
        b
    }

    fn from_page(&self, x: f64, y: f64, mode: CoordMode) -> (f64, f64) {
        match mode {
            CoordMode::Local => (x, y),
            CoordMode::Page => {
                let (ox, oy) = self.host.page_origin();
                (x - ox, y - oy + self.scroll_top)
            }
        }
    }

    /// Box of the char at `pos`.
    pub fn char_coords(&mut self, pos: Position, mode: CoordMode) -> CharBox {
        let pos = self.doc.clip_pos(pos);
        let Some(view) = self.measure_view(pos.line) else {
            return CharBox::default();
        };
        let Ok(id) = self.doc.get_line_handle(pos.line) else {
            return CharBox::default();
        };
        let b = self
            .measure
            .measure_char(self.host.as_mut(), &view, id, pos.line, pos.column);
        self.to_mode(b, pos.line, mode)
    }

    /// Zero-width cursor box at `pos`; `bias` picks the char the cursor attaches to.
    pub fn cursor_coords(&mut self, pos: Position, bias: Bias, mode: CoordMode) -> CharBox {
        let pos = self.doc.clip_pos(pos);
        let Some(view) = self.measure_view(pos.line) else {
            return CharBox::default();
        };
        let Ok(id) = self.doc.get_line_handle(pos.line) else {
            return CharBox::default();
        };
        let b = cursor_box(
            &mut self.measure,
            self.host.as_mut(),
            &view,
            id,
            pos.line,
            pos.column,
            bias,
        );
        self.to_mode(b, pos.line, mode)
    }

    /// Document position closest to the point `(x, y)`.
    pub fn coords_char(&mut self, x: f64, y: f64, mode: CoordMode) -> Position {
        let (x, y) = self.from_page(x, y, mode);
        let first = self.doc.first_line();
        if y < 0.0 {
            return Position::new(first, 0);
        }
        if y >= self.doc.height() {
            let last = self.doc.last_line();
            return Position::new(last, self.doc.line_length(last));
        }
        let line = self.doc.line_at_height(y);
        let Some(view) = self.measure_view(line) else {
            return Position::new(line, 0);
        };
        let pos = coords_char_in_view(&mut self.measure, self.host.as_mut(), &view, x);
        self.doc.clip_pos(pos)
    }

    /// Line at vertical offset `y`.
    pub fn line_at_height(&self, y: f64, mode: CoordMode) -> usize {
        let (_, y) = self.from_page(0.0, y, mode);
        self.doc.line_at_height(y)
    }

    /// Vertical offset of the top of line `n`.
    pub fn height_at_line(&self, n: usize, mode: CoordMode) -> f64 {
        let top = self.doc.height_at_line(n);
        match mode {
            CoordMode::Local => top,
            CoordMode::Page => top + self.host.page_origin().1 - self.scroll_top,
        }
    }

    /// Height of one line of plain text, as rendered by the host.
    pub fn default_text_height(&mut self) -> f64 {
        if let Some(h) = self.text_height {
            return h;
        }
        let Ok(line) = self.doc.get_line_handle(self.doc.first_line()) else {
            return self.doc.config().default_line_height;
        };
        let probe = LineView {
            line,
            line_no: usize::MAX,
            rest: Vec::new(),
            end_line_no: usize::MAX,
            segments: vec![Segment {
                line_no: usize::MAX,
                from: 0,
                to: 1,
                text: "x".to_string(),
                style: None,
                classes: Vec::new(),
                kind: SegmentKind::Text,
            }],
        };
        let h = self.host.measure_height(&probe);
        self.text_height = Some(h);
        h
    }

    // --- tokens and indentation ----------------------------------------------------------

    /// The token ending at or after `pos`, or an empty token at `pos` when there is none.
    pub fn get_token_at(&mut self, pos: Position, precise: bool) -> Result<Token> {
        let pos = self.doc.clip_pos(pos);
        let tokens = line_tokens(&mut self.doc, pos.line, precise)?;
        Ok(tokens
            .into_iter()
            .find(|t| t.start < pos.column && t.end >= pos.column)
            .unwrap_or(Token {
                start: pos.column,
                end: pos.column,
                text: String::new(),
                style: None,
            }))
    }

    /// Every token of line `n`.
    pub fn get_line_tokens(&mut self, n: usize, precise: bool) -> Result<Vec<Token>> {
        line_tokens(&mut self.doc, n, precise)
    }

    /// Name of the innermost mode at `pos`, if a mode is set.
    pub fn get_mode_at(&mut self, pos: Position) -> Result<Option<String>> {
        let pos = self.doc.clip_pos(pos);
        mode_at(&mut self.doc, pos.line, pos.column)
    }

    /// Re-indent line `n`. Returns whether the line changed.
    pub fn indent_line(&mut self, n: usize, how: IndentHow) -> Result<bool> {
        let n = self.doc.clip_pos(Position::new(n, 0)).line;
        let mut how = how;
        let mut smart = None;
        if how == IndentHow::Smart {
            let has_indenter = self
                .doc
                .mode()
                .is_some_and(|m| m.indenter().is_some());
            if has_indenter {
                if let Some(state) = state_before(&mut self.doc, n, false)? {
                    let text = self.doc.get_line_text(n).unwrap_or_default().to_string();
                    let after = text.trim_start_matches([' ', '\t', '\u{a0}']);
                    smart = self
                        .doc
                        .mode()
                        .and_then(|m| m.indenter().and_then(|i| i.indent(&state, after)));
                }
            }
            if smart.is_none() {
                how = IndentHow::Prev;
            }
        }

        let config = self.doc.config().clone();
        let tab = config.tab_size;
        let text = self.doc.get_line_text(n).unwrap_or_default().to_string();
        let space: String = text
            .chars()
            .take_while(|c| matches!(c, ' ' | '\t' | '\u{a0}'))
            .collect();
        let cur = count_column(&space, None, tab);
        let target = match how {
            IndentHow::Smart => smart.unwrap_or(cur),
            IndentHow::Prev => {
                if n > self.doc.first_line() {
                    let prev = self.doc.get_line_text(n - 1).unwrap_or_default();
                    let prev_space: String = prev
                        .chars()
                        .take_while(|c| matches!(c, ' ' | '\t' | '\u{a0}'))
                        .collect();
                    count_column(&prev_space, None, tab)
                } else {
                    0
                }
            }
            IndentHow::Add => cur + config.indent_unit,
            IndentHow::Subtract => cur.saturating_sub(config.indent_unit),
            IndentHow::Column(c) => c,
        };

        let mut indent = String::new();
        let mut pos = 0;
        if config.indent_with_tabs && tab > 0 {
            for _ in 0..target / tab {
                indent.push('\t');
                pos += tab;
            }
        }
        indent.extend(std::iter::repeat_n(' ', target - pos));

        let space_len = char_len(&space);
        let indent_len = char_len(&indent);
        let changed = indent != space;
        self.operation(|ed| {
            if changed {
                ed.doc.replace_range(
                    &indent,
                    Position::new(n, 0),
                    Some(Position::new(n, space_len)),
                    Some("+input"),
                );
                return;
            }
            let sel = ed.doc.selection().clone();
            let mut moved = false;
            let ranges: Vec<Range> = sel
                .ranges()
                .iter()
                .map(|r| {
                    if r.empty() && r.head.line == n && r.head.column < space_len {
                        moved = true;
                        Range::cursor(Position::new(n, indent_len))
                    } else {
                        *r
                    }
                })
                .collect();
            if moved {
                ed.doc
                    .set_selection(Selection::new(ranges, sel.primary_index()), SelectionOptions::default());
            }
        });
        Ok(changed)
    }

    // --- highlighting --------------------------------------------------------------------

    /// Time at which the next highlight slice should run.
    pub fn highlight_due(&self) -> Option<u64> {
        self.highlight_due
    }

    /// Drop the scheduled highlight slice.
    pub fn cancel_highlight(&mut self) {
        self.highlight_due = None;
    }

    /// Run one highlight slice over the rendered window and re-render lines whose styles changed.
    pub fn run_highlight_slice(&mut self) -> Result<WorkerStatus> {
        self.highlight_due = None;
        let from = self.display.view_from();
        let to = self.display.view_to();
        let budget = self.doc.config().work_time_ms;
        let step = highlight_worker(&mut self.doc, from, to, budget)?;
        self.stats.highlight_slices += 1;
        if !step.changed.is_empty() {
            self.operation(|ed| {
                if let Some(op) = ed.op.as_mut() {
                    op.dirty.mark_all(step.changed);
                }
            });
        }
        if step.status == WorkerStatus::Yield {
            let due = self.doc.clock().now_ms() + self.doc.config().work_delay_ms;
            self.highlight_due = Some(due);
        }
        Ok(step.status)
    }
}

/// Reconcile the operations of `editors` phase by phase.
///
/// All viewport reads happen before any patch is written, and all height reads before any
/// selection or scroll write.
pub(crate) fn end_operations(editors: &mut [&mut Editor]) {
    for ed in editors.iter_mut() {
        ed.phase_read_viewport();
    }
    for ed in editors.iter_mut() {
        ed.phase_write_views();
    }
    for ed in editors.iter_mut() {
        ed.phase_read_heights();
    }
    for ed in editors.iter_mut() {
        ed.phase_write_selection();
    }
    for ed in editors.iter_mut() {
        ed.phase_finish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::host::HeadlessHost;
    use std::cell::RefCell;

    fn p(line: usize, column: usize) -> Position {
        Position::new(line, column)
    }

    fn editor(text: &str) -> Editor {
        Editor::with_clock(
            text,
            EditorConfig::default(),
            Rc::new(ManualClock::new(0)),
            Box::new(HeadlessHost::new(400.0, 160.0)),
        )
    }

    #[test]
    fn test_initial_render() {
        let ed = editor("a\nb\nc");
        assert_eq!(ed.display().views().len(), 3);
        assert_eq!(ed.stats().reconciles, 1);
    }

    #[test]
    fn test_nested_operations_reconcile_once() {
        let mut ed = editor("abc");
        ed.operation(|ed| {
            ed.with_doc(|doc| doc.replace_range("x", p(0, 0), None, None));
            ed.with_doc(|doc| doc.replace_range("y", p(0, 0), None, None));
        });
        assert_eq!(ed.stats().reconciles, 2);
        assert_eq!(ed.doc().get_value(None), "yxabc");
    }

    #[test]
    fn test_events_after_reconcile() {
        let mut ed = editor("abc");
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        ed.subscribe(move |e| sink.borrow_mut().push(e.clone()));
        ed.with_doc(|doc| doc.replace_range("x", p(0, 1), None, Some("+input")));
        let seen = seen.borrow();
        assert!(matches!(&seen[0], EditorEvent::Changes(c) if c.len() == 1));
        assert!(seen.contains(&EditorEvent::CursorActivity));
        assert!(seen.contains(&EditorEvent::Update));
    }

    #[test]
    fn test_scroll_to_cursor_moves_window() {
        let text = vec!["line"; 100].join("\n");
        let mut ed = editor(&text);
        ed.with_doc(|doc| doc.set_cursor(p(60, 0), SelectionOptions::default()));
        // Line 60 spans 960..976; viewport is 160 high.
        assert_eq!(ed.scroll_top(), 976.0 - 160.0);
        assert!(ed.display().view_from() <= 60 && ed.display().view_to() > 60);
    }

    #[test]
    fn test_char_coords_and_back() {
        let mut ed = editor("abc\ndefg");
        let b = ed.char_coords(p(1, 2), CoordMode::Local);
        assert_eq!((b.left, b.right, b.top), (16.0, 24.0, 16.0));
        assert_eq!(ed.coords_char(17.0, 20.0, CoordMode::Local), p(1, 2));
        assert_eq!(ed.coords_char(5.0, -3.0, CoordMode::Local), p(0, 0));
        assert_eq!(ed.coords_char(5.0, 1000.0, CoordMode::Local), p(1, 4));
    }

    #[test]
    fn test_edit_patches_only_touched_line() {
        let mut ed = editor("a\nb\nc");
        ed.with_doc(|doc| doc.replace_range("x", p(1, 0), None, None));
        let updates = ed
            .display()
            .views()
            .iter()
            .filter(|v| v.line_no == 1)
            .count();
        assert_eq!(updates, 1);
        assert_eq!(ed.stats().patches, 3 + 1 + 1);
    }

    #[test]
    fn test_indent_prev_and_add() {
        let mut ed = editor("    a\nb");
        assert!(ed.indent_line(1, IndentHow::Smart).unwrap());
        assert_eq!(ed.doc().get_line_text(1), Some("    b"));
        assert!(ed.indent_line(1, IndentHow::Add).unwrap());
        assert_eq!(ed.doc().get_line_text(1), Some("      b"));
        assert!(!ed.indent_line(1, IndentHow::Column(6)).unwrap());
    }
}
