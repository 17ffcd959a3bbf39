//! Cached geometry of rendered lines.
//!
//! Char boxes are cached per line and column. Entries of a line are dropped when the line is
//! redrawn or deleted; the whole cache is dropped when geometry settings change.

use crate::bidi::{BidiSpan, bidi_ordering, span_at};
use crate::display::{LineView, SegmentKind};
use crate::host::{CharBox, RenderHost};
use crate::line_tree::LineId;
use crate::position::{Bias, Position};
use rustc_hash::FxHashMap;
use tracing::trace;

/// Coordinate system of measurement results and queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoordMode {
    /// Relative to the top-left corner of the document.
    #[default]
    Local,
    /// Relative to the page: the host's origin applied, minus the scroll offset.
    Page,
}

/// Cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MeasureStats {
    /// Lookups answered from the cache.
    pub hits: usize,
    /// Lookups that asked the host.
    pub misses: usize,
    /// Measurements retried because the host returned a bogus box.
    pub retries: usize,
}

/// Per-line char box cache.
#[derive(Debug, Default)]
pub struct MeasureCache {
    lines: FxHashMap<LineId, FxHashMap<(usize, usize), CharBox>>,
    stats: MeasureStats,
}

impl MeasureCache {
    /// Empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop everything.
    pub fn clear(&mut self) {
        self.lines.clear();
    }

    /// Drop entries of `line`.
    pub fn clear_line(&mut self, line: LineId) {
        self.lines.remove(&line);
    }

    /// Counters.
    pub fn stats(&self) -> MeasureStats {
        self.stats
    }

    /// Box of the char at `column` of line `line_no` in `view`.
    ///
    /// An all-zero box from the host is treated as garbage: the previous char is measured
    /// instead and its right edge is used.
    pub fn measure_char(
        &mut self,
        host: &mut dyn RenderHost,
        view: &LineView,
        line: LineId,
        line_no: usize,
        column: usize,
    ) -> CharBox {
        if let Some(found) = self
            .lines
            .get(&line)
            .and_then(|m| m.get(&(line_no, column)))
        {
            self.stats.hits += 1;
            return *found;
        }
        self.stats.misses += 1;
        let mut col = column;
        let mut collapse_right = false;
        let measured = loop {
            let mut b = host.measure_char(view, line_no, col);
            if !b.is_bogus() || col == 0 {
                if collapse_right {
                    b.left = b.right;
                }
                break b;
            }
            trace!(line_no, column = col, "bogus char box, measuring previous char");
            self.stats.retries += 1;
            col -= 1;
            collapse_right = true;
        };
        self.lines
            .entry(line)
            .or_default()
            .insert((line_no, column), measured);
        measured
    }
}

fn text_len_in_view(view: &LineView, line_no: usize) -> usize {
    view.segments
        .iter()
        .filter(|s| s.line_no == line_no && s.kind == SegmentKind::Text)
        .map(|s| s.to)
        .max()
        .unwrap_or(0)
}

/// Whether `col` of line `line_no` sits in a right-to-left run of its segment.
fn is_rtl_at(view: &LineView, line_no: usize, col: usize) -> bool {
    let Some(seg) = view.segments.iter().find(|s| {
        s.line_no == line_no && s.kind == SegmentKind::Text && s.from <= col && col < s.to
    }) else {
        return false;
    };
    bidi_ordering(&seg.text)
        .and_then(|order| span_at(&order, col - seg.from).map(|i| order[i].is_rtl()))
        .unwrap_or(false)
}

/// Cursor box for `column` of line `line_no`: a zero-width box at the cursor position.
///
/// `bias` decides which neighbouring char the cursor attaches to at a boundary.
pub fn cursor_box(
    cache: &mut MeasureCache,
    host: &mut dyn RenderHost,
    view: &LineView,
    line: LineId,
    line_no: usize,
    column: usize,
    bias: Bias,
) -> CharBox {
    let len = text_len_in_view(view, line_no);
    if len == 0 {
        let mut b = cache.measure_char(host, view, line, line_no, 0);
        b.right = b.left;
        return b;
    }
    let (col, mut right) = if column >= len {
        (len - 1, true)
    } else if column == 0 || bias == Bias::After {
        (column, false)
    } else {
        (column - 1, true)
    };
    if is_rtl_at(view, line_no, col) {
        right = !right;
    }
    let mut b = cache.measure_char(host, view, line, line_no, col);
    if right {
        b.left = b.right;
    } else {
        b.right = b.left;
    }
    b
}

/// First index in `[lo, hi)` for which `pred` holds, assuming it is monotone; `hi` if none.
fn find_first(mut lo: usize, mut hi: usize, mut pred: impl FnMut(usize) -> bool) -> usize {
    while lo < hi {
        let mid = lo + (hi - lo) / 2;
        if pred(mid) {
            hi = mid;
        } else {
            lo = mid + 1;
        }
    }
    lo
}

/// Position in `view` closest to horizontal offset `x`.
///
/// Text segments are laid out left to right and each is ordered on its own, so the search
/// visits the bidi runs of every segment in visual order and binary searches each run in its
/// own direction.
pub fn coords_char_in_view(
    cache: &mut MeasureCache,
    host: &mut dyn RenderHost,
    view: &LineView,
    x: f64,
) -> Position {
    let texts: Vec<_> = view
        .segments
        .iter()
        .filter(|s| s.kind == SegmentKind::Text)
        .collect();
    let Some(&last) = texts.last() else {
        return Position::new(view.end_line_no, 0);
    };
    let line_id_of = |line_no: usize| -> LineId {
        if line_no == view.line_no {
            view.line
        } else {
            view.rest
                .get(line_no.saturating_sub(view.line_no + 1))
                .copied()
                .unwrap_or(view.line)
        }
    };
    let mut measure = |line_no: usize, col: usize| {
        cache.measure_char(host, view, line_id_of(line_no), line_no, col)
    };

    let runs: Vec<(usize, usize, BidiSpan)> = texts
        .iter()
        .flat_map(|seg| {
            let order = bidi_ordering(&seg.text).unwrap_or_else(|| {
                vec![BidiSpan {
                    from: 0,
                    to: seg.to - seg.from,
                    level: 0,
                }]
            });
            order
                .into_iter()
                .map(move |span| (seg.line_no, seg.from, span))
        })
        .collect();

    for (i, &(line_no, from, span)) in runs.iter().enumerate() {
        let a = from + span.from;
        let b = from + span.to;
        if a >= b {
            continue;
        }
        let first_box = measure(line_no, if span.is_rtl() { b - 1 } else { a });
        let last_box = measure(line_no, if span.is_rtl() { a } else { b - 1 });
        let is_last = i + 1 == runs.len();
        if x >= last_box.right && !is_last {
            continue;
        }
        if x < first_box.left {
            return Position::new(line_no, if span.is_rtl() { b } else { a });
        }
        let col = if span.is_rtl() {
            let c = find_first(a, b, |c| measure(line_no, c).left < x);
            let c = c.min(b - 1);
            let bx = measure(line_no, c);
            if x < (bx.left + bx.right) / 2.0 { c + 1 } else { c }
        } else {
            let c = find_first(a, b, |c| measure(line_no, c).right > x);
            if c >= b {
                b
            } else {
                let bx = measure(line_no, c);
                if x > (bx.left + bx.right) / 2.0 { c + 1 } else { c }
            }
        };
        return Position::new(line_no, col);
    }
    Position::new(last.line_no, last.to.max(text_len_in_view(view, last.line_no)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorConfig;
    use crate::display::build_line_view;
    use crate::doc::Doc;
    use crate::host::HeadlessHost;

    fn setup(text: &str) -> (Doc, LineView, HeadlessHost, MeasureCache) {
        let doc = Doc::new(text, EditorConfig::default());
        let view = build_line_view(&doc, 0).unwrap();
        (doc, view, HeadlessHost::new(400.0, 160.0), MeasureCache::new())
    }

    #[test]
    fn test_cache_hits() {
        let (_doc, view, mut host, mut cache) = setup("abcdef");
        let a = cache.measure_char(&mut host, &view, view.line, 0, 2);
        let b = cache.measure_char(&mut host, &view, view.line, 0, 2);
        assert_eq!(a, b);
        assert_eq!(cache.stats().hits, 1);
        assert_eq!(cache.stats().misses, 1);
        cache.clear_line(view.line);
        cache.measure_char(&mut host, &view, view.line, 0, 2);
        assert_eq!(cache.stats().misses, 2);
    }

    #[test]
    fn test_bogus_box_retries_previous_char() {
        let (_doc, view, mut host, mut cache) = setup("abcdef");
        host.inject_bogus(0, 3);
        let b = cache.measure_char(&mut host, &view, view.line, 0, 3);
        assert_eq!(cache.stats().retries, 1);
        assert_eq!((b.left, b.right), (24.0, 24.0));
    }

    #[test]
    fn test_cursor_bias() {
        let (_doc, view, mut host, mut cache) = setup("abcdef");
        let after = cursor_box(&mut cache, &mut host, &view, view.line, 0, 2, Bias::After);
        let before = cursor_box(&mut cache, &mut host, &view, view.line, 0, 2, Bias::Before);
        assert_eq!(after.left, 16.0);
        assert_eq!(before.left, 16.0);
        let end = cursor_box(&mut cache, &mut host, &view, view.line, 0, 6, Bias::After);
        assert_eq!(end.left, 48.0);
    }

    #[test]
    fn test_coords_char_ltr() {
        let (_doc, view, mut host, mut cache) = setup("abcdef");
        assert_eq!(coords_char_in_view(&mut cache, &mut host, &view, 0.0), Position::new(0, 0));
        assert_eq!(coords_char_in_view(&mut cache, &mut host, &view, 13.0), Position::new(0, 2));
        assert_eq!(coords_char_in_view(&mut cache, &mut host, &view, 10.0), Position::new(0, 1));
        assert_eq!(coords_char_in_view(&mut cache, &mut host, &view, 500.0), Position::new(0, 6));
    }

    #[test]
    fn test_coords_char_rtl_run() {
        // "ab " then three Hebrew letters laid out right to left in cells 3..6.
        let (_doc, view, mut host, mut cache) = setup("ab \u{5d0}\u{5d1}\u{5d2}");
        // Cell 5 (x 40..48) shows column 3, the first Hebrew letter.
        let pos = coords_char_in_view(&mut cache, &mut host, &view, 46.0);
        assert_eq!(pos, Position::new(0, 3));
        let pos = coords_char_in_view(&mut cache, &mut host, &view, 42.0);
        assert_eq!(pos, Position::new(0, 4));
    }

    #[test]
    fn test_coords_char_rtl_around_same_line_fold() {
        use crate::marks::MarkOptions;

        // Two Hebrew letters, a folded "XY", two more Hebrew letters. Each visible segment is
        // ordered on its own: columns 1, 0 in cells 0..2 and columns 5, 4 in cells 2..4.
        let mut doc = Doc::new("\u{5d0}\u{5d1}XY\u{5d2}\u{5d3}", EditorConfig::default());
        doc.mark_text(Position::new(0, 2), Position::new(0, 4), MarkOptions::fold())
            .unwrap();
        let view = build_line_view(&doc, 0).unwrap();
        let mut host = HeadlessHost::new(400.0, 160.0);
        let mut cache = MeasureCache::new();

        // Cell 3 (x 24..32) shows column 4.
        let pos = coords_char_in_view(&mut cache, &mut host, &view, 30.0);
        assert_eq!(pos, Position::new(0, 4));
        let pos = coords_char_in_view(&mut cache, &mut host, &view, 26.0);
        assert_eq!(pos, Position::new(0, 5));
        // Cell 0 shows column 1.
        let pos = coords_char_in_view(&mut cache, &mut host, &view, 6.0);
        assert_eq!(pos, Position::new(0, 1));

        let b = cursor_box(&mut cache, &mut host, &view, view.line, 0, 4, Bias::After);
        assert_eq!((b.left, b.right), (32.0, 32.0));
    }
}
