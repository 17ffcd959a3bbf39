//! Marked-range index.
//!
//! A [`Marker`] is created by `mark_text` or `set_bookmark` and lives in the document's
//! [`MarkerStore`]. Its extent is not stored on the marker: each line it touches carries a
//! [`MarkedSpan`] with the columns the marker covers on that line (`None` meaning "continues
//! past this edge of the line"). The marker only keeps weak [`LineId`] handles to those lines,
//! so deleting lines never has to reach into the marker; stale handles are skipped on lookup.

use crate::change::Change;
use crate::line_tree::{LineId, LineTree};
use crate::position::{Bias, Position};
use crate::text::char_len;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_MARKER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifier of a marker. Ids increase with creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerId(pub u64);

impl MarkerId {
    fn next() -> Self {
        Self(NEXT_MARKER_ID.fetch_add(1, AtomicOrdering::Relaxed))
    }
}

/// Behaviour flags of a marked range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarkOptions {
    /// Style class applied to the covered text.
    pub class_name: Option<String>,
    /// Hide the covered text from layout.
    pub collapsed: bool,
    /// The cursor may not rest strictly inside the range.
    pub atomic: bool,
    /// Edits inside the range are dropped.
    pub read_only: bool,
    /// Text inserted exactly at the start joins the range.
    pub inclusive_left: bool,
    /// Text inserted exactly at the end joins the range.
    pub inclusive_right: bool,
    /// A cursor entering the range clears the marker.
    pub clear_on_enter: bool,
    /// Drop the marker once its range becomes empty.
    pub clear_when_empty: bool,
    /// Placeholder rendered in place of collapsed content.
    pub replaced_with: Option<String>,
    /// Record a history step for the marking.
    pub add_to_history: bool,
}

impl Default for MarkOptions {
    fn default() -> Self {
        Self {
            class_name: None,
            collapsed: false,
            atomic: false,
            read_only: false,
            inclusive_left: false,
            inclusive_right: false,
            clear_on_enter: false,
            clear_when_empty: true,
            replaced_with: None,
            add_to_history: false,
        }
    }
}

impl MarkOptions {
    /// A collapsed, atomic fold.
    pub fn fold() -> Self {
        Self {
            collapsed: true,
            atomic: true,
            ..Self::default()
        }
    }

    fn extra_left(&self) -> isize {
        if self.inclusive_left { -1 } else { 0 }
    }

    fn extra_right(&self) -> isize {
        if self.inclusive_right { 1 } else { 0 }
    }
}

/// Kind of marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MarkerKind {
    /// A marked range of text.
    Range,
    /// A zero-width position marker.
    Bookmark {
        /// Text inserted exactly at the bookmark goes to its left.
        insert_left: bool,
    },
}

/// A marked range or bookmark.
#[derive(Debug, Clone)]
pub struct Marker {
    id: MarkerId,
    kind: MarkerKind,
    options: MarkOptions,
    lines: Vec<LineId>,
}

impl Marker {
    /// Marker id.
    pub fn id(&self) -> MarkerId {
        self.id
    }

    /// Marker kind.
    pub fn kind(&self) -> MarkerKind {
        self.kind
    }

    /// Behaviour flags.
    pub fn options(&self) -> &MarkOptions {
        &self.options
    }

    /// Whether this is a bookmark.
    pub fn is_bookmark(&self) -> bool {
        matches!(self.kind, MarkerKind::Bookmark { .. })
    }

    /// Whether the marker hides its text.
    pub fn collapsed(&self) -> bool {
        self.options.collapsed
    }

    /// Whether the cursor is kept out of the marker.
    pub fn atomic(&self) -> bool {
        self.options.atomic
    }

    /// Handles of the lines the marker currently touches.
    pub fn lines(&self) -> &[LineId] {
        &self.lines
    }

    fn insert_left(&self) -> bool {
        matches!(self.kind, MarkerKind::Bookmark { insert_left: true })
    }

    fn has_widget(&self) -> bool {
        self.options.replaced_with.is_some()
    }
}

/// The part of a marker that lies on one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkedSpan {
    /// Owning marker.
    pub marker: MarkerId,
    /// Start column, or `None` when the marker starts on an earlier line.
    pub from: Option<usize>,
    /// End column, or `None` when the marker ends on a later line.
    pub to: Option<usize>,
}

impl MarkedSpan {
    /// Create a span.
    pub fn new(marker: MarkerId, from: Option<usize>, to: Option<usize>) -> Self {
        Self { marker, from, to }
    }
}

/// Resolved extent of a marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRange {
    /// Start position.
    pub from: Position,
    /// End position.
    pub to: Position,
}

/// Span of `marker` in `spans`, if any.
pub fn span_for(spans: &[MarkedSpan], marker: MarkerId) -> Option<&MarkedSpan> {
    spans.iter().find(|s| s.marker == marker)
}

fn line_spans(tree: &LineTree, line: LineId) -> &[MarkedSpan] {
    tree.line(line).map(|l| l.marked_spans.as_slice()).unwrap_or(&[])
}

/// All markers of one document.
#[derive(Debug, Default)]
pub struct MarkerStore {
    markers: FxHashMap<MarkerId, Marker>,
    saw_collapsed: bool,
    saw_read_only: bool,
}

impl MarkerStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new marker.
    pub(crate) fn create(&mut self, kind: MarkerKind, mut options: MarkOptions) -> MarkerId {
        if options.collapsed {
            options.atomic = true;
            self.saw_collapsed = true;
        }
        if options.read_only {
            self.saw_read_only = true;
        }
        if matches!(kind, MarkerKind::Bookmark { .. }) {
            options.clear_when_empty = false;
        }
        let id = MarkerId::next();
        self.markers.insert(
            id,
            Marker {
                id,
                kind,
                options,
                lines: Vec::new(),
            },
        );
        id
    }

    /// Drop a marker from the store.
    pub(crate) fn remove(&mut self, id: MarkerId) -> Option<Marker> {
        self.markers.remove(&id)
    }

    /// Look up a marker.
    pub fn get(&self, id: MarkerId) -> Option<&Marker> {
        self.markers.get(&id)
    }

    /// Iterate over all markers, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.values()
    }

    /// Number of markers.
    pub fn len(&self) -> usize {
        self.markers.len()
    }

    /// Whether the store holds no markers.
    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Whether any collapsed marker was ever created.
    pub fn saw_collapsed(&self) -> bool {
        self.saw_collapsed
    }

    /// Whether any read-only marker was ever created.
    pub fn saw_read_only(&self) -> bool {
        self.saw_read_only
    }

    pub(crate) fn attach_line(&mut self, id: MarkerId, line: LineId) {
        if let Some(marker) = self.markers.get_mut(&id)
            && !marker.lines.contains(&line)
        {
            marker.lines.push(line);
        }
    }

    pub(crate) fn detach_line(&mut self, id: MarkerId, line: LineId) {
        if let Some(marker) = self.markers.get_mut(&id) {
            marker.lines.retain(|&l| l != line);
        }
    }

    /// Current extent of a marker. Bookmarks have `from == to`.
    ///
    /// Returns `None` for unknown markers and for markers whose lines were all deleted.
    pub fn find(&self, tree: &LineTree, id: MarkerId) -> Option<MarkerRange> {
        let marker = self.get(id)?;
        let mut from = None;
        let mut to = None;
        for &line in &marker.lines {
            let Some(span) = span_for(line_spans(tree, line), id) else {
                continue;
            };
            let Some(no) = tree.line_number(line) else {
                continue;
            };
            if let Some(f) = span.from {
                from = Some(Position::new(no, f));
            }
            if let Some(t) = span.to {
                to = Some(Position::new(no, t));
            }
        }
        Some(MarkerRange {
            from: from?,
            to: to?,
        })
    }

    /// Line holding the start (`Before`) or end (`After`) of a marker.
    pub fn find_line(&self, tree: &LineTree, id: MarkerId, side: Bias) -> Option<LineId> {
        let marker = self.get(id)?;
        marker.lines.iter().copied().find(|&line| {
            span_for(line_spans(tree, line), id).is_some_and(|span| match side {
                Bias::Before => span.from.is_some(),
                Bias::After => span.to.is_some(),
            })
        })
    }

    /// Start or end position of a marker.
    pub fn find_side(&self, tree: &LineTree, id: MarkerId, side: Bias) -> Option<Position> {
        let range = self.find(tree, id)?;
        Some(match side {
            Bias::Before => range.from,
            Bias::After => range.to,
        })
    }

    fn spans_before(&self, old: &[MarkedSpan], start_ch: usize, is_insert: bool) -> Vec<MarkedSpan> {
        let mut out = Vec::new();
        for span in old {
            let Some(marker) = self.get(span.marker) else {
                continue;
            };
            let starts_before = match span.from {
                None => true,
                Some(f) if marker.options.inclusive_left => f <= start_ch,
                Some(f) => f < start_ch,
            };
            let bookmark_stays = span.from == Some(start_ch)
                && marker.is_bookmark()
                && (!is_insert || !marker.insert_left());
            if starts_before || bookmark_stays {
                let ends_after = match span.to {
                    None => true,
                    Some(t) if marker.options.inclusive_right => t >= start_ch,
                    Some(t) => t > start_ch,
                };
                out.push(MarkedSpan::new(
                    span.marker,
                    span.from,
                    if ends_after { None } else { span.to },
                ));
            }
        }
        out
    }

    fn spans_after(&self, old: &[MarkedSpan], end_ch: usize, is_insert: bool) -> Vec<MarkedSpan> {
        let mut out = Vec::new();
        for span in old {
            let Some(marker) = self.get(span.marker) else {
                continue;
            };
            let ends_after = match span.to {
                None => true,
                Some(t) if marker.options.inclusive_right => t >= end_ch,
                Some(t) => t > end_ch,
            };
            let bookmark_moves = span.from == Some(end_ch)
                && marker.is_bookmark()
                && (!is_insert || marker.insert_left());
            if ends_after || bookmark_moves {
                let starts_before = match span.from {
                    None => true,
                    Some(f) if marker.options.inclusive_left => f <= end_ch,
                    Some(f) => f < end_ch,
                };
                out.push(MarkedSpan::new(
                    span.marker,
                    if starts_before {
                        None
                    } else {
                        span.from.map(|f| f - end_ch)
                    },
                    span.to.map(|t| t.saturating_sub(end_ch)),
                ));
            }
        }
        out
    }

    fn clear_empty_spans(&self, spans: Vec<MarkedSpan>) -> Vec<MarkedSpan> {
        spans
            .into_iter()
            .filter(|span| {
                let empty = span.from.is_some() && span.from == span.to;
                let clears = self
                    .get(span.marker)
                    .is_none_or(|m| m.options.clear_when_empty);
                !(empty && clears)
            })
            .collect()
    }

    /// Spans for each line that results from applying `change`.
    ///
    /// Spans touching the edit boundary grow or shrink according to their inclusive flags,
    /// spans of one marker on both sides of the edit are joined, and spans entirely inside
    /// the replaced text disappear. Returns `None` when no line involved carries spans.
    pub(crate) fn stretch_spans_over_change(
        &self,
        tree: &LineTree,
        change: &Change,
    ) -> Option<Vec<Vec<MarkedSpan>>> {
        if change.full {
            return None;
        }
        let old_first = tree
            .get_line(change.from.line)
            .map(|l| line_spans(tree, l))
            .unwrap_or(&[]);
        let old_last = tree
            .get_line(change.to.line)
            .map(|l| line_spans(tree, l))
            .unwrap_or(&[]);
        if old_first.is_empty() && old_last.is_empty() {
            return None;
        }

        let start_ch = change.from.column;
        let end_ch = change.to.column;
        let is_insert = change.from == change.to;
        let mut first = self.spans_before(old_first, start_ch, is_insert);
        let mut last = self.spans_after(old_last, end_ch, is_insert);

        let same_line = change.text.len() == 1;
        let offset = change.text.last().map(|t| char_len(t)).unwrap_or(0)
            + if same_line { start_ch } else { 0 };

        for span in first.iter_mut() {
            if span.to.is_none() {
                match span_for(&last, span.marker) {
                    None => span.to = Some(start_ch),
                    Some(found) if same_line => span.to = found.to.map(|t| t + offset),
                    Some(_) => {}
                }
            }
        }
        let mut joined = Vec::new();
        for span in last.iter_mut() {
            if let Some(t) = span.to.as_mut() {
                *t += offset;
            }
            match span.from {
                None => {
                    if span_for(&first, span.marker).is_none() {
                        span.from = Some(offset);
                        if same_line {
                            joined.push(*span);
                        }
                    }
                }
                Some(f) => {
                    span.from = Some(f + offset);
                    if same_line {
                        joined.push(*span);
                    }
                }
            }
        }
        first.extend(joined);

        let first = self.clear_empty_spans(first);
        let last = self.clear_empty_spans(last);

        if same_line {
            return Some(vec![first]);
        }
        let gap = change.text.len() - 2;
        let gap_spans: Vec<MarkedSpan> = if gap > 0 {
            first
                .iter()
                .filter(|s| s.to.is_none())
                .map(|s| MarkedSpan::new(s.marker, None, None))
                .collect()
        } else {
            Vec::new()
        };
        let mut out = Vec::with_capacity(change.text.len());
        out.push(first);
        out.extend(std::iter::repeat_n(gap_spans, gap));
        out.push(last);
        Some(out)
    }

    /// Drop spans of markers that no longer exist.
    pub(crate) fn remove_cleared_spans(&self, spans: &[MarkedSpan]) -> Vec<MarkedSpan> {
        spans
            .iter()
            .filter(|s| self.markers.contains_key(&s.marker))
            .copied()
            .collect()
    }

    /// Combine spans recorded in history with the spans stretched over the change.
    ///
    /// Recorded spans win; stretched spans are added for markers the record does not mention.
    pub(crate) fn merge_old_spans(
        &self,
        tree: &LineTree,
        change: &Change,
        recorded: Option<&Vec<Vec<MarkedSpan>>>,
    ) -> Option<Vec<Vec<MarkedSpan>>> {
        let stretched = self.stretch_spans_over_change(tree, change);
        let Some(recorded) = recorded else {
            return stretched;
        };
        let mut old: Vec<Vec<MarkedSpan>> = (0..change.text.len())
            .map(|i| {
                recorded
                    .get(i)
                    .map(|s| self.remove_cleared_spans(s))
                    .unwrap_or_default()
            })
            .collect();
        let Some(stretched) = stretched else {
            return Some(old);
        };
        for (old_cur, stretch_cur) in old.iter_mut().zip(stretched) {
            if old_cur.is_empty() {
                *old_cur = stretch_cur;
                continue;
            }
            for span in stretch_cur {
                if span_for(old_cur, span.marker).is_none() {
                    old_cur.push(span);
                }
            }
        }
        Some(old)
    }

    /// Whether marking `[from, to)` collapsed with `options` would partially overlap an
    /// existing collapsed marker on line `line_no`.
    pub(crate) fn conflicting_collapsed_range(
        &self,
        tree: &LineTree,
        line_no: usize,
        from: Position,
        to: Position,
        options: &MarkOptions,
    ) -> bool {
        let Ok(line) = tree.get_line(line_no) else {
            return false;
        };
        for span in line_spans(tree, line) {
            let Some(marker) = self.get(span.marker) else {
                continue;
            };
            if !marker.collapsed() {
                continue;
            }
            let Some(found) = self.find(tree, marker.id) else {
                continue;
            };
            let from_cmp = cmp_with_tiebreak(
                found.from.cmp(&from),
                marker.options.extra_left() - options.extra_left(),
            );
            let to_cmp = cmp_with_tiebreak(
                found.to.cmp(&to),
                marker.options.extra_right() - options.extra_right(),
            );
            if (from_cmp >= 0 && to_cmp <= 0) || (from_cmp <= 0 && to_cmp >= 0) {
                continue;
            }
            let touching = marker.options.inclusive_right && options.inclusive_left;
            let overlaps_start = if touching {
                found.to >= from
            } else {
                found.to > from
            };
            let overlaps_end = if touching {
                found.from <= to
            } else {
                found.from < to
            };
            if (from_cmp <= 0 && overlaps_start) || (from_cmp >= 0 && overlaps_end) {
                return true;
            }
        }
        false
    }

    /// Collapsed marker that continues through the start (`start == true`) or end of `line`.
    ///
    /// When several qualify, the outermost one wins.
    pub fn collapsed_span_at_side(&self, tree: &LineTree, line: LineId, start: bool) -> Option<MarkerId> {
        if !self.saw_collapsed {
            return None;
        }
        let mut found: Option<MarkerId> = None;
        for span in line_spans(tree, line) {
            let Some(marker) = self.get(span.marker) else {
                continue;
            };
            let open = if start { span.from } else { span.to };
            if marker.collapsed()
                && open.is_none()
                && found.is_none_or(|f| {
                    self.compare_collapsed_markers(tree, f, marker.id) == Ordering::Less
                })
            {
                found = Some(marker.id);
            }
        }
        found
    }

    /// Order collapsed markers so that the enclosing marker compares greater.
    pub fn compare_collapsed_markers(&self, tree: &LineTree, a: MarkerId, b: MarkerId) -> Ordering {
        let (Some(ma), Some(mb)) = (self.get(a), self.get(b)) else {
            return Ordering::Equal;
        };
        let len_diff = ma.lines.len().cmp(&mb.lines.len());
        if len_diff != Ordering::Equal {
            return len_diff;
        }
        let (Some(pa), Some(pb)) = (self.find(tree, a), self.find(tree, b)) else {
            return b.cmp(&a);
        };
        let from_cmp = cmp_with_tiebreak(
            pa.from.cmp(&pb.from),
            ma.options.extra_left() - mb.options.extra_left(),
        );
        if from_cmp != 0 {
            return if from_cmp < 0 {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }
        let to_cmp = cmp_with_tiebreak(
            pa.to.cmp(&pb.to),
            ma.options.extra_right() - mb.options.extra_right(),
        );
        if to_cmp != 0 {
            return if to_cmp < 0 {
                Ordering::Less
            } else {
                Ordering::Greater
            };
        }
        b.cmp(&a)
    }

    /// First logical line of the visual line containing `line`.
    pub fn visual_line(&self, tree: &LineTree, mut line: LineId) -> LineId {
        while let Some(merged) = self.collapsed_span_at_side(tree, line, true) {
            match self.find_line(tree, merged, Bias::Before) {
                Some(start) if start != line => line = start,
                _ => break,
            }
        }
        line
    }

    /// Last logical line of the visual line containing `line`.
    pub fn visual_line_end(&self, tree: &LineTree, mut line: LineId) -> LineId {
        while let Some(merged) = self.collapsed_span_at_side(tree, line, false) {
            match self.find_line(tree, merged, Bias::After) {
                Some(end) if end != line => line = end,
                _ => break,
            }
        }
        line
    }

    /// Number of the first line of the visual line containing line `n`.
    pub fn visual_line_no(&self, tree: &LineTree, n: usize) -> usize {
        let Ok(line) = tree.get_line(n) else {
            return n;
        };
        let vis = self.visual_line(tree, line);
        if vis == line {
            return n;
        }
        tree.line_number(vis).unwrap_or(n)
    }

    /// Number of the first line after the visual line containing line `n`.
    pub fn visual_line_end_no(&self, tree: &LineTree, n: usize) -> usize {
        let Ok(line) = tree.get_line(n) else {
            return n;
        };
        if !self.line_is_hidden(tree, line) {
            return n;
        }
        let end = self.visual_line_end(tree, line);
        tree.line_number(end).map(|e| e + 1).unwrap_or(n)
    }

    /// Whether `line` is entirely covered by collapsed content and takes no room in layout.
    pub fn line_is_hidden(&self, tree: &LineTree, line: LineId) -> bool {
        if !self.saw_collapsed {
            return false;
        }
        for span in line_spans(tree, line) {
            let Some(marker) = self.get(span.marker) else {
                continue;
            };
            if !marker.collapsed() {
                continue;
            }
            if span.from.is_none() {
                return true;
            }
            if marker.has_widget() {
                continue;
            }
            if span.from == Some(0)
                && marker.options.inclusive_left
                && self.line_is_hidden_inner(tree, line, span, 0)
            {
                return true;
            }
        }
        false
    }

    fn line_is_hidden_inner(&self, tree: &LineTree, line: LineId, span: &MarkedSpan, depth: usize) -> bool {
        if depth > 64 {
            return false;
        }
        let Some(marker) = self.get(span.marker) else {
            return false;
        };
        let Some(to) = span.to else {
            let Some(end_line) = self.find_line(tree, marker.id, Bias::After) else {
                return false;
            };
            let Some(end_span) = span_for(line_spans(tree, end_line), marker.id).copied() else {
                return false;
            };
            return self.line_is_hidden_inner(tree, end_line, &end_span, depth + 1);
        };
        let line_len = tree.line(line).map(|l| l.len()).unwrap_or(0);
        if marker.options.inclusive_right && to == line_len {
            return true;
        }
        for sp in line_spans(tree, line) {
            let Some(other) = self.get(sp.marker) else {
                continue;
            };
            if other.collapsed()
                && !other.has_widget()
                && sp.from == Some(to)
                && (sp.to.is_none() || sp.to != span.from)
                && (other.options.inclusive_left || marker.options.inclusive_right)
                && self.line_is_hidden_inner(tree, line, sp, depth + 1)
            {
                return true;
            }
        }
        false
    }

    /// Split `[from, to)` around the read-only markers touching it.
    ///
    /// Returns `None` when no read-only marker is involved. Otherwise returns the editable
    /// pieces in document order (possibly none).
    pub(crate) fn remove_read_only_ranges(
        &self,
        tree: &LineTree,
        from: Position,
        to: Position,
    ) -> Option<Vec<(Position, Position)>> {
        if !self.saw_read_only {
            return None;
        }
        let mut markers: Vec<MarkerId> = Vec::new();
        for line in tree.line_ids(from.line, to.line + 1) {
            for span in line_spans(tree, line) {
                if self.get(span.marker).is_some_and(|m| m.options.read_only)
                    && !markers.contains(&span.marker)
                {
                    markers.push(span.marker);
                }
            }
        }
        if markers.is_empty() {
            return None;
        }
        let mut parts = vec![(from, to)];
        for id in markers {
            let (Some(marker), Some(m)) = (self.get(id), self.find(tree, id)) else {
                continue;
            };
            let mut j = 0;
            while j < parts.len() {
                let (p_from, p_to) = parts[j];
                if p_to < m.from || p_from > m.to {
                    j += 1;
                    continue;
                }
                let mut replacement = Vec::with_capacity(2);
                if p_from < m.from || (!marker.options.inclusive_left && p_from == m.from) {
                    replacement.push((p_from, m.from));
                }
                if p_to > m.to || (!marker.options.inclusive_right && p_to == m.to) {
                    replacement.push((m.to, p_to));
                }
                let added = replacement.len();
                parts.splice(j..j + 1, replacement);
                j += added;
            }
        }
        Some(parts)
    }

    /// Markers with a span inside `[from, to]`, in line order.
    pub fn find_marks(&self, tree: &LineTree, from: Position, to: Position) -> Vec<MarkerId> {
        let mut found = Vec::new();
        for (i, line) in tree.line_ids(from.line, to.line + 1).into_iter().enumerate() {
            let line_no = from.line + i;
            for span in line_spans(tree, line) {
                let before_start = line_no == from.line && span.to.is_some_and(|t| from.column >= t);
                let continued = span.from.is_none() && line_no != from.line;
                let after_end = line_no == to.line && span.from.is_some_and(|f| f >= to.column);
                if !(before_start || continued || after_end) && !found.contains(&span.marker) {
                    found.push(span.marker);
                }
            }
        }
        found
    }

    /// Markers covering `pos` (inclusive of both ends).
    pub fn find_marks_at(&self, tree: &LineTree, pos: Position) -> Vec<MarkerId> {
        let Ok(line) = tree.get_line(pos.line) else {
            return Vec::new();
        };
        line_spans(tree, line)
            .iter()
            .filter(|s| s.from.is_none_or(|f| f <= pos.column) && s.to.is_none_or(|t| t >= pos.column))
            .map(|s| s.marker)
            .collect()
    }
}

fn cmp_with_tiebreak(ord: Ordering, tiebreak: isize) -> isize {
    match ord {
        Ordering::Less => -1,
        Ordering::Greater => 1,
        Ordering::Equal => tiebreak,
    }
}
