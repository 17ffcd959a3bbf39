//! Rendered line views and the patches that keep a host in sync with them.
//!
//! A [`LineView`] renders one visual line: a logical line plus any lines joined to it by
//! collapsed markers. The [`Display`] holds the views for the rendered window and turns each
//! reconcile into a minimal list of [`RenderPatch`]es.

use crate::doc::Doc;
use crate::line_tree::LineId;
use crate::marks::MarkedSpan;
use crate::selection::Selection;
use crate::text::{char_len, slice_chars};
use rustc_hash::FxHashSet;

/// What a segment renders.
#[derive(Debug, Clone, PartialEq)]
pub enum SegmentKind {
    /// Text of the document.
    Text,
    /// Placeholder standing in for collapsed content.
    Placeholder,
}

/// A styled piece of a line view.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    /// Logical line the text comes from.
    pub line_no: usize,
    /// Start column in that line.
    pub from: usize,
    /// End column in that line. Placeholders have `from == to`.
    pub to: usize,
    /// Rendered text.
    pub text: String,
    /// Tokenizer style.
    pub style: Option<String>,
    /// Classes of marked ranges covering the piece.
    pub classes: Vec<String>,
    /// Kind of segment.
    pub kind: SegmentKind,
}

/// One rendered visual line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineView {
    /// First logical line.
    pub line: LineId,
    /// Its number when the view was built.
    pub line_no: usize,
    /// Further logical lines joined in by collapsed ranges.
    pub rest: Vec<LineId>,
    /// Number of the last logical line in the view.
    pub end_line_no: usize,
    /// Rendered pieces, in order.
    pub segments: Vec<Segment>,
}

impl LineView {
    /// Whether logical line `line_no` is part of this view.
    pub fn covers(&self, line_no: usize) -> bool {
        line_no >= self.line_no && line_no <= self.end_line_no
    }
}

/// A change a host applies to its rendered lines.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderPatch {
    /// Drop the view of `line`.
    Remove {
        /// View to remove.
        line: LineId,
    },
    /// Insert `view` at position `index` of the rendered list.
    Insert {
        /// Position in the rendered list.
        index: usize,
        /// The new view.
        view: LineView,
    },
    /// Replace the view at position `index`.
    Update {
        /// Position in the rendered list.
        index: usize,
        /// The new view.
        view: LineView,
    },
    /// The rendered window now covers lines `[from, to)` and starts at `top`.
    Window {
        /// First rendered line.
        from: usize,
        /// End of the rendered lines.
        to: usize,
        /// Vertical offset of the first rendered line.
        top: f64,
    },
    /// Show `selection`.
    Selection {
        /// The model selection.
        selection: Selection,
    },
    /// Scroll to vertical offset `top`.
    ScrollTo {
        /// New scroll offset.
        top: f64,
    },
}

fn class_spans<'a>(doc: &'a Doc, spans: &'a [MarkedSpan]) -> impl Iterator<Item = (&'a MarkedSpan, &'a str)> + 'a {
    spans.iter().filter_map(|span| {
        let marker = doc.markers().get(span.marker)?;
        if marker.collapsed() {
            return None;
        }
        marker
            .options()
            .class_name
            .as_deref()
            .map(|class| (span, class))
    })
}

/// Push the segments of `[from, to)` of line `line_no`, split at style and class boundaries.
fn push_text(doc: &Doc, line: LineId, line_no: usize, from: usize, to: usize, out: &mut Vec<Segment>) {
    let Some(l) = doc.tree().line(line) else {
        return;
    };
    if from >= to {
        return;
    }
    let mut cuts = vec![from, to];
    if let Some(runs) = l.style_runs() {
        cuts.extend(runs.iter().map(|r| r.end).filter(|&e| e > from && e < to));
    }
    for (span, _) in class_spans(doc, l.marked_spans()) {
        cuts.extend(span.from.filter(|&c| c > from && c < to));
        cuts.extend(span.to.filter(|&c| c > from && c < to));
    }
    cuts.sort_unstable();
    cuts.dedup();
    for pair in cuts.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let style = l
            .style_runs()
            .and_then(|runs| runs.iter().find(|r| r.end > a))
            .and_then(|r| r.style.clone());
        let classes = class_spans(doc, l.marked_spans())
            .filter(|(span, _)| span.from.is_none_or(|f| f <= a) && span.to.is_none_or(|t| t >= b))
            .map(|(_, class)| class.to_string())
            .collect();
        out.push(Segment {
            line_no,
            from: a,
            to: b,
            text: slice_chars(l.text(), a, b).to_string(),
            style,
            classes,
            kind: SegmentKind::Text,
        });
    }
}

/// Collapsed marker on `line` starting at or after `column`, with its start column.
fn next_collapsed(doc: &Doc, line: LineId, column: usize) -> Option<(usize, crate::marks::MarkerId)> {
    let l = doc.tree().line(line)?;
    l.marked_spans()
        .iter()
        .filter_map(|span| {
            let marker = doc.markers().get(span.marker)?;
            if !marker.collapsed() {
                return None;
            }
            let from = span.from?;
            (from >= column).then_some((from, span.marker, span.to))
        })
        // Outermost first: earliest start, then the span reaching furthest.
        .min_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| b.2.is_none().cmp(&a.2.is_none()))
                .then_with(|| b.2.cmp(&a.2))
        })
        .map(|(from, id, _)| (from, id))
}

/// Build the view of the visual line starting at logical line `line_no`.
pub fn build_line_view(doc: &Doc, line_no: usize) -> Option<LineView> {
    let first_id = doc.get_line_handle(line_no).ok()?;
    let mut view = LineView {
        line: first_id,
        line_no,
        rest: Vec::new(),
        end_line_no: line_no,
        segments: Vec::new(),
    };
    let mut cur_id = first_id;
    let mut cur_no = line_no;
    let mut column = 0;
    loop {
        let len = doc.tree().line(cur_id).map(|l| l.len()).unwrap_or(0);
        let Some((start, marker)) = next_collapsed(doc, cur_id, column) else {
            push_text(doc, cur_id, cur_no, column, len, &mut view.segments);
            break;
        };
        push_text(doc, cur_id, cur_no, column, start, &mut view.segments);
        if let Some(placeholder) = doc
            .markers()
            .get(marker)
            .and_then(|m| m.options().replaced_with.clone())
        {
            view.segments.push(Segment {
                line_no: cur_no,
                from: start,
                to: start,
                text: placeholder,
                style: None,
                classes: Vec::new(),
                kind: SegmentKind::Placeholder,
            });
        }
        let Some(range) = doc.find_marker(marker) else {
            break;
        };
        if range.to.line == cur_no && range.to.column <= start {
            push_text(doc, cur_id, cur_no, start, len, &mut view.segments);
            break;
        }
        if range.to.line != cur_no {
            for n in cur_no + 1..=range.to.line {
                if let Ok(id) = doc.get_line_handle(n) {
                    view.rest.push(id);
                }
            }
            cur_no = range.to.line;
            cur_id = doc.get_line_handle(cur_no).ok()?;
        }
        column = range.to.column;
    }
    view.end_line_no = cur_no;
    Some(view)
}

/// Rendered window and its views.
#[derive(Debug, Default)]
pub struct Display {
    view_from: usize,
    view_to: usize,
    views: Vec<LineView>,
}

impl Display {
    /// Empty display.
    pub fn new() -> Self {
        Self::default()
    }

    /// First rendered line.
    pub fn view_from(&self) -> usize {
        self.view_from
    }

    /// End of the rendered lines.
    pub fn view_to(&self) -> usize {
        self.view_to
    }

    /// Rendered views, top to bottom.
    pub fn views(&self) -> &[LineView] {
        &self.views
    }

    /// View covering logical line `line_no`, if rendered.
    pub fn view_for(&self, line_no: usize) -> Option<&LineView> {
        self.views.iter().find(|v| v.covers(line_no))
    }

    /// Re-render `[from, to)`, rebuilding views of `dirty` lines (or all, with `rebuild_all`).
    ///
    /// Returns the patches describing the difference and the views that were (re)built.
    pub fn update(
        &mut self,
        doc: &Doc,
        from: usize,
        to: usize,
        dirty: &FxHashSet<LineId>,
        rebuild_all: bool,
    ) -> (Vec<RenderPatch>, Vec<LineId>) {
        let mut old: Vec<Option<LineView>> = std::mem::take(&mut self.views).into_iter().map(Some).collect();
        let mut next: Vec<LineView> = Vec::new();
        let mut kept: FxHashSet<LineId> = FxHashSet::default();
        let mut built = Vec::new();
        let mut inserts: Vec<RenderPatch> = Vec::new();

        let mut n = from;
        while n < to {
            let id = match doc.get_line_handle(n) {
                Ok(id) => id,
                Err(_) => break,
            };
            let reusable = old
                .iter()
                .position(|v| v.as_ref().is_some_and(|v| v.line == id));
            let needs_build = rebuild_all
                || reusable.is_none()
                || old[reusable.unwrap_or(0)]
                    .as_ref()
                    .is_some_and(|v| dirty.contains(&v.line) || v.rest.iter().any(|r| dirty.contains(r)));
            let index = next.len();
            let view = match reusable {
                Some(i) if !needs_build => {
                    let mut view = old[i].take().unwrap_or_else(|| LineView {
                        line: id,
                        line_no: n,
                        rest: Vec::new(),
                        end_line_no: n,
                        segments: Vec::new(),
                    });
                    let shift = n as isize - view.line_no as isize;
                    view.line_no = n;
                    view.end_line_no = (view.end_line_no as isize + shift) as usize;
                    for seg in &mut view.segments {
                        seg.line_no = (seg.line_no as isize + shift) as usize;
                    }
                    kept.insert(id);
                    view
                }
                _ => {
                    let Some(view) = build_line_view(doc, n) else {
                        break;
                    };
                    match reusable.and_then(|i| old[i].take()) {
                        Some(prev) if prev == view => {
                            kept.insert(id);
                        }
                        Some(_) => {
                            kept.insert(id);
                            built.push(id);
                            inserts.push(RenderPatch::Update {
                                index,
                                view: view.clone(),
                            });
                        }
                        None => {
                            built.push(id);
                            inserts.push(RenderPatch::Insert {
                                index,
                                view: view.clone(),
                            });
                        }
                    }
                    view
                }
            };
            n = view.end_line_no + 1;
            next.push(view);
        }

        let mut patches: Vec<RenderPatch> = old
            .into_iter()
            .flatten()
            .filter(|v| !kept.contains(&v.line))
            .map(|v| RenderPatch::Remove { line: v.line })
            .collect();
        patches.extend(inserts);
        let window_changed = self.view_from != from || self.view_to != n;
        self.view_from = from;
        self.view_to = n;
        self.views = next;
        if window_changed {
            patches.push(RenderPatch::Window {
                from,
                to: n,
                top: doc.height_at_line(from),
            });
        }
        (patches, built)
    }

    /// Forget all views.
    pub fn clear(&mut self) {
        self.views.clear();
        self.view_from = 0;
        self.view_to = 0;
    }
}

/// Char length of the text rendered for line `line_no` in `view`.
pub fn rendered_len(view: &LineView, line_no: usize) -> usize {
    view.segments
        .iter()
        .filter(|s| s.line_no == line_no && s.kind == SegmentKind::Text)
        .map(|s| char_len(&s.text))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorConfig;
    use crate::marks::MarkOptions;
    use crate::position::Position;

    fn p(line: usize, column: usize) -> Position {
        Position::new(line, column)
    }

    #[test]
    fn test_fold_joins_lines_into_one_view() {
        let mut doc = Doc::new("fn a() {\n  body\n}\nnext", EditorConfig::default());
        let opts = MarkOptions {
            replaced_with: Some("...".into()),
            ..MarkOptions::fold()
        };
        doc.mark_text(p(0, 8), p(2, 0), opts).unwrap();
        let view = build_line_view(&doc, 0).unwrap();
        assert_eq!(view.end_line_no, 2);
        assert_eq!(view.rest.len(), 2);
        let texts: Vec<&str> = view.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["fn a() {", "...", "}"]);
    }

    #[test]
    fn test_class_marks_split_segments() {
        let mut doc = Doc::new("hello world", EditorConfig::default());
        let opts = MarkOptions {
            class_name: Some("hl".into()),
            ..MarkOptions::default()
        };
        doc.mark_text(p(0, 6), p(0, 11), opts).unwrap();
        let view = build_line_view(&doc, 0).unwrap();
        assert_eq!(view.segments.len(), 2);
        assert_eq!(view.segments[1].classes, vec!["hl".to_string()]);
        assert!(view.segments[0].classes.is_empty());
    }

    #[test]
    fn test_update_reuses_clean_views() {
        let mut doc = Doc::new("a\nb\nc\nd", EditorConfig::default());
        let mut display = Display::new();
        let none = FxHashSet::default();
        let (patches, built) = display.update(&doc, 0, 4, &none, false);
        assert_eq!(built.len(), 4);
        assert_eq!(patches.iter().filter(|p| matches!(p, RenderPatch::Insert { .. })).count(), 4);

        doc.replace_range("X", p(1, 0), None, None);
        let mut dirty = FxHashSet::default();
        dirty.insert(doc.get_line_handle(1).unwrap());
        let (patches, built) = display.update(&doc, 0, 4, &dirty, false);
        assert_eq!(built.len(), 1);
        assert_eq!(patches.len(), 1);
        assert!(matches!(&patches[0], RenderPatch::Update { index: 1, .. }));

        let (patches, _) = display.update(&doc, 1, 3, &none, false);
        let removed = patches.iter().filter(|p| matches!(p, RenderPatch::Remove { .. })).count();
        assert_eq!(removed, 2);
        assert_eq!(display.views().len(), 2);
    }
}
