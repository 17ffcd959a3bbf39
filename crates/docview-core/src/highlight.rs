//! Incremental syntax highlighting.
//!
//! Each line caches the tokenizer state after it and its style runs. The document's
//! `highlight_frontier` is the first line whose cached output may be stale; edits move it back
//! and the background worker moves it forward, one time-boxed slice at a time.

use crate::doc::Doc;
use crate::error::{DocError, Result};
use crate::line_tree::{Line, LineId};
use crate::mode::{Mode, ModeState, StringStream, inner_mode};
use crate::text::{byte_offset, count_column};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::trace;

/// A run of equally styled text ending (exclusive) at char column `end`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleRun {
    /// End column of the run.
    pub end: usize,
    /// Style name, `None` for unstyled text.
    pub style: Option<String>,
}

/// Style runs of one line, in column order.
pub type StyleRuns = Vec<StyleRun>;

/// A token reported by [`crate::Editor::get_token_at`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// Start column.
    pub start: usize,
    /// End column.
    pub end: usize,
    /// Token text.
    pub text: String,
    /// Style name.
    pub style: Option<String>,
}

/// Outcome of one worker slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerStatus {
    /// Time budget ran out; schedule another slice.
    Yield,
    /// Highlighting has caught up with the view.
    Done,
}

/// Result of one worker slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerStep {
    /// Whether more work remains.
    pub status: WorkerStatus,
    /// Lines inside the view whose styles changed.
    pub changed: Vec<LineId>,
}

/// Lines beyond the view end the worker still processes.
const WORK_PAST_VIEW: usize = 500;

/// How far back a state search looks before guessing.
const STATE_SEARCH_LIMIT: usize = 100;

/// Call `mode.token` until it advances the stream.
fn read_token(mode: &dyn Mode, stream: &mut StringStream<'_>, state: &mut ModeState) -> Result<Option<String>> {
    for _ in 0..10 {
        let style = mode.token(stream, state);
        if stream.pos > stream.start {
            return Ok(style);
        }
    }
    Err(DocError::StalledTokenizer {
        mode: mode.name().to_string(),
    })
}

/// Advance `state` over a line without collecting styles.
pub(crate) fn process_line(mode: &dyn Mode, text: &str, state: &mut ModeState, tab_size: usize) -> Result<()> {
    if text.is_empty() {
        mode.blank_line(state);
        return Ok(());
    }
    let mut stream = StringStream::new(text, tab_size);
    while !stream.eol() {
        read_token(mode, &mut stream, state)?;
        stream.start = stream.pos;
    }
    Ok(())
}

/// Tokenize `text`, calling `f(end_column, style)` once per run of equal style.
///
/// Columns past `max_len` are not tokenized and reported as one unstyled run.
pub fn run_mode(
    mode: &dyn Mode,
    text: &str,
    state: &mut ModeState,
    tab_size: usize,
    max_len: usize,
    mut f: impl FnMut(usize, Option<&str>),
) -> Result<()> {
    if text.is_empty() {
        mode.blank_line(state);
        return Ok(());
    }
    let mut stream = StringStream::new(text, tab_size);
    let mut cur_start = 0usize;
    let mut cur_col = 0usize;
    let mut cur_style: Option<String> = None;
    let mut flatten = true;
    while !stream.eol() {
        let style = if stream.pos > max_len {
            flatten = false;
            stream.pos = text.len();
            None
        } else {
            read_token(mode, &mut stream, state)?
        };
        if !flatten || cur_style != style {
            if cur_start < stream.start {
                cur_col += text[cur_start..stream.start].chars().count();
                f(cur_col, cur_style.as_deref());
                cur_start = stream.start;
            }
            cur_style = style;
        }
        stream.start = stream.pos;
    }
    if cur_start < stream.pos {
        cur_col += text[cur_start..stream.pos].chars().count();
        f(cur_col, cur_style.as_deref());
    }
    Ok(())
}

/// Style runs of `text`, with adjacent runs of equal style merged.
pub fn highlight_line(
    mode: &dyn Mode,
    text: &str,
    state: &mut ModeState,
    tab_size: usize,
    max_len: usize,
) -> Result<StyleRuns> {
    let mut runs: StyleRuns = Vec::new();
    run_mode(mode, text, state, tab_size, max_len, |end, style| match runs.last_mut() {
        Some(last) if last.style.as_deref() == style => last.end = end,
        _ => runs.push(StyleRun {
            end,
            style: style.map(str::to_string),
        }),
    })?;
    Ok(runs)
}

fn line_text(doc: &Doc, id: LineId) -> String {
    doc.tree().line(id).map(|l| l.text().to_string()).unwrap_or_default()
}

/// Line to start tokenizing from to obtain the state before line `n`.
fn find_start_line(doc: &Doc, n: usize, precise: bool) -> usize {
    let first = doc.first_line();
    let lim = if precise {
        first
    } else {
        n.saturating_sub(STATE_SEARCH_LIMIT).max(first)
    };
    let tab_size = doc.config().tab_size;
    let mut best: Option<(usize, usize)> = None;
    let mut search = n;
    while search > lim {
        let Ok(id) = doc.get_line_handle(search - 1) else {
            break;
        };
        let Some(line) = doc.tree().line(id) else {
            break;
        };
        if line.state_after.is_some() && search <= doc.mode_frontier {
            return search;
        }
        let indented = count_column(line.text(), None, tab_size);
        if best.is_none_or(|(_, ind)| ind > indented) {
            best = Some((search - 1, indented));
        }
        search -= 1;
    }
    if search <= first {
        return first;
    }
    best.map(|(line, _)| line).unwrap_or(first)
}

/// Tokenizer state before line `n`, tokenizing forward from the nearest saved state.
pub fn state_before(doc: &mut Doc, n: usize, precise: bool) -> Result<Option<ModeState>> {
    let Some(mode) = doc.mode().cloned() else {
        return Ok(None);
    };
    let start = find_start_line(doc, n, precise);
    let saved = if start > doc.first_line() {
        doc.get_line_handle(start - 1)
            .ok()
            .and_then(|id| doc.tree().line(id))
            .and_then(|l| l.state_after.as_ref())
            .map(|s| mode.copy_state(s))
    } else {
        None
    };
    let mut state = saved.unwrap_or_else(|| mode.start_state());
    let tab_size = doc.config().tab_size;
    let max_len = doc.config().max_highlight_length;
    let ids = doc.tree().line_ids(start, n);
    for (i, id) in ids.into_iter().enumerate() {
        let text = line_text(doc, id);
        if text.chars().count() <= max_len {
            process_line(mode.as_ref(), &text, &mut state, tab_size)?;
        }
        let line_no = start + i;
        let keep = line_no + 1 == n || line_no % 5 == 0;
        if let Some(line) = doc.tree_mut().line_mut(id) {
            line.state_after = keep.then(|| mode.copy_state(&state));
        }
    }
    if precise {
        doc.mode_frontier = n;
    }
    Ok(Some(state))
}

fn highlight_one(mode: &Rc<dyn Mode>, doc: &mut Doc, id: LineId, state: &mut ModeState) -> Result<StyleRuns> {
    let text = line_text(doc, id);
    let tab_size = doc.config().tab_size;
    let max_len = doc.config().max_highlight_length;
    if text.chars().count() > max_len {
        let runs = vec![StyleRun {
            end: text.chars().count(),
            style: None,
        }];
        return Ok(runs);
    }
    highlight_line(mode.as_ref(), &text, state, tab_size, max_len)
}

/// Style runs of line `n`, computing and caching them when missing.
pub fn line_styles(doc: &mut Doc, n: usize) -> Result<Option<StyleRuns>> {
    let Some(mode) = doc.mode().cloned() else {
        return Ok(None);
    };
    let id = doc.get_line_handle(n)?;
    if let Some(runs) = doc.tree().line(id).and_then(Line::style_runs) {
        return Ok(Some(runs.clone()));
    }
    let Some(mut state) = state_before(doc, n, false)? else {
        return Ok(None);
    };
    let runs = highlight_one(&mode, doc, id, &mut state)?;
    if let Some(line) = doc.tree_mut().line_mut(id) {
        line.state_after = Some(state);
        line.style_runs = Some(runs.clone());
    }
    if n == doc.highlight_frontier {
        doc.highlight_frontier += 1;
        doc.mode_frontier = doc.mode_frontier.max(doc.highlight_frontier);
    }
    Ok(Some(runs))
}

/// Run one time-boxed slice of background highlighting over `[view_from, view_to)`.
///
/// Lines before the view only advance the state; lines inside it are restyled and reported in
/// [`WorkerStep::changed`] when their runs differ from the cached ones.
pub fn highlight_worker(doc: &mut Doc, view_from: usize, view_to: usize, budget_ms: u64) -> Result<WorkerStep> {
    let done = WorkerStep {
        status: WorkerStatus::Done,
        changed: Vec::new(),
    };
    let Some(mode) = doc.mode().cloned() else {
        return Ok(done);
    };
    let start = doc.highlight_frontier;
    if start >= view_to {
        return Ok(done);
    }
    let deadline = doc.clock().now_ms() + budget_ms;
    let Some(mut state) = state_before(doc, start, true)? else {
        return Ok(done);
    };
    let end = (doc.first_line() + doc.line_count()).min(view_to + WORK_PAST_VIEW);
    let tab_size = doc.config().tab_size;
    let max_len = doc.config().max_highlight_length;
    let mut changed = Vec::new();
    let mut line_no = start;
    let mut status = WorkerStatus::Done;
    for id in doc.tree().line_ids(start, end) {
        if line_no >= view_from {
            let old = doc.tree().line(id).and_then(|l| l.style_runs.clone());
            let runs = highlight_one(&mode, doc, id, &mut state)?;
            if old.as_ref() != Some(&runs) {
                changed.push(id);
            }
            if let Some(line) = doc.tree_mut().line_mut(id) {
                line.style_runs = Some(runs);
                line.state_after = Some(mode.copy_state(&state));
            }
        } else {
            let text = line_text(doc, id);
            if text.chars().count() <= max_len {
                process_line(mode.as_ref(), &text, &mut state, tab_size)?;
            }
            if let Some(line) = doc.tree_mut().line_mut(id) {
                line.state_after = (line_no % 5 == 0).then(|| mode.copy_state(&state));
            }
        }
        line_no += 1;
        if doc.clock().now_ms() > deadline {
            status = WorkerStatus::Yield;
            break;
        }
    }
    if line_no < view_to.min(end) {
        status = WorkerStatus::Yield;
    }
    doc.highlight_frontier = line_no;
    doc.mode_frontier = doc.mode_frontier.max(line_no);
    trace!(
        from = start,
        to = line_no,
        changed = changed.len(),
        ?status,
        "highlight slice"
    );
    Ok(WorkerStep { status, changed })
}

/// Every token of line `n`, unmerged, with char columns.
///
/// `precise` tokenizes from the last known-good state instead of guessing a start line.
pub fn line_tokens(doc: &mut Doc, n: usize, precise: bool) -> Result<Vec<Token>> {
    let Some(mode) = doc.mode().cloned() else {
        return Ok(Vec::new());
    };
    let id = doc.get_line_handle(n)?;
    let Some(mut state) = state_before(doc, n, precise)? else {
        return Ok(Vec::new());
    };
    let text = line_text(doc, id);
    let mut tokens = Vec::new();
    if text.is_empty() {
        return Ok(tokens);
    }
    let mut stream = StringStream::new(&text, doc.config().tab_size);
    let mut col = 0;
    while !stream.eol() {
        let style = read_token(mode.as_ref(), &mut stream, &mut state)?;
        let current = stream.current();
        let len = current.chars().count();
        tokens.push(Token {
            start: col,
            end: col + len,
            text: current.to_string(),
            style,
        });
        col += len;
        stream.start = stream.pos;
    }
    Ok(tokens)
}

/// Name of the innermost mode active at char column `column` of line `n`.
pub fn mode_at(doc: &mut Doc, n: usize, column: usize) -> Result<Option<String>> {
    let Some(mode) = doc.mode().cloned() else {
        return Ok(None);
    };
    let id = doc.get_line_handle(n)?;
    let Some(mut state) = state_before(doc, n, false)? else {
        return Ok(None);
    };
    let text = line_text(doc, id);
    let target = byte_offset(&text, column);
    let mut stream = StringStream::new(&text, doc.config().tab_size);
    while stream.pos < target && !stream.eol() {
        read_token(mode.as_ref(), &mut stream, &mut state)?;
        stream.start = stream.pos;
    }
    Ok(Some(mode_name_at(mode.as_ref(), &state)))
}

/// Name of the innermost mode active at the end of the state `state`.
pub fn mode_name_at(mode: &dyn Mode, state: &ModeState) -> String {
    inner_mode(mode, state).0.name().to_string()
}
