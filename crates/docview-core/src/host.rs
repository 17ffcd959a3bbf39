//! The rendering seam.
//!
//! The engine never touches a real rendering surface. It talks to a [`RenderHost`], which
//! reports the viewport, applies [`RenderPatch`]es and measures rendered lines. Reads and
//! writes are issued in separate phases so a host backed by a layout engine is never forced
//! into a synchronous relayout between them.

use crate::bidi::{bidi_ordering, visual_index};
use crate::display::{LineView, RenderPatch, SegmentKind};
use crate::selection::Selection;
use rustc_hash::{FxHashMap, FxHashSet};
use std::cell::RefCell;
use std::rc::Rc;
use unicode_width::UnicodeWidthChar;

/// A measured character box in line-local coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CharBox {
    /// Left edge.
    pub left: f64,
    /// Right edge.
    pub right: f64,
    /// Top edge.
    pub top: f64,
    /// Bottom edge.
    pub bottom: f64,
}

impl CharBox {
    /// Whether the box is the all-zero rectangle some layout engines return for invisible text.
    pub fn is_bogus(&self) -> bool {
        self.left == 0.0 && self.right == 0.0 && self.top == 0.0 && self.bottom == 0.0
    }
}

/// Scroll position and size of the visible area.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ViewportRect {
    /// Vertical scroll offset.
    pub scroll_top: f64,
    /// Visible height.
    pub height: f64,
    /// Visible width.
    pub width: f64,
}

/// A rendering surface.
pub trait RenderHost {
    /// Read the current viewport.
    fn viewport(&mut self) -> ViewportRect;

    /// Apply view patches.
    fn apply_patches(&mut self, patches: &[RenderPatch]);

    /// Rendered height of `view`.
    fn measure_height(&mut self, view: &LineView) -> f64;

    /// Box of the char at `column` of logical line `line_no` inside `view`.
    ///
    /// Columns at or past the end of the rendered text yield a zero-width box at the line end.
    fn measure_char(&mut self, view: &LineView, line_no: usize, column: usize) -> CharBox;

    /// Scroll to vertical offset `top`.
    fn set_scroll_top(&mut self, top: f64);

    /// Show the model selection.
    fn show_selection(&mut self, selection: &Selection);

    /// Page coordinates of the document origin.
    fn page_origin(&self) -> (f64, f64) {
        (0.0, 0.0)
    }
}

/// Counters of host calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostStats {
    /// Viewport and height reads.
    pub reads: usize,
    /// Patch, scroll and selection writes.
    pub writes: usize,
    /// Char measurements.
    pub char_measures: usize,
}

/// A host without a screen: fixed-width cells, fixed line heights and a record of every patch.
///
/// Used by tests and benches. Lines are laid out in visual order, so right-to-left runs
/// produce decreasing x positions for increasing columns.
#[derive(Debug)]
pub struct HeadlessHost {
    /// Width of one cell.
    pub char_width: f64,
    /// Height of one line.
    pub line_height: f64,
    /// Columns per tab stop.
    pub tab_size: usize,
    /// Viewport size and scroll position.
    pub viewport: ViewportRect,
    /// Page coordinates of the document origin.
    pub origin: (f64, f64),
    /// Heights of specific logical lines, overriding `line_height`.
    pub line_heights: FxHashMap<usize, f64>,
    views: Vec<LineView>,
    patches: Vec<RenderPatch>,
    selection: Option<Selection>,
    stats: HostStats,
    bogus_once: FxHashSet<(usize, usize)>,
    log: Option<(String, Rc<RefCell<Vec<String>>>)>,
}

impl HeadlessHost {
    /// A host showing `height` pixels.
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            char_width: 8.0,
            line_height: 16.0,
            tab_size: 4,
            viewport: ViewportRect {
                scroll_top: 0.0,
                height,
                width,
            },
            origin: (0.0, 0.0),
            line_heights: FxHashMap::default(),
            views: Vec::new(),
            patches: Vec::new(),
            selection: None,
            stats: HostStats::default(),
            bogus_once: FxHashSet::default(),
            log: None,
        }
    }

    /// Record every read and write as `"read:<name>"` / `"write:<name>"` in `log`.
    pub fn with_log(mut self, name: &str, log: Rc<RefCell<Vec<String>>>) -> Self {
        self.log = Some((name.to_string(), log));
        self
    }

    /// Make the next measurement of `(line_no, column)` return an all-zero box.
    pub fn inject_bogus(&mut self, line_no: usize, column: usize) {
        self.bogus_once.insert((line_no, column));
    }

    /// Currently rendered views.
    pub fn views(&self) -> &[LineView] {
        &self.views
    }

    /// Every patch applied so far.
    pub fn patches(&self) -> &[RenderPatch] {
        &self.patches
    }

    /// Forget recorded patches.
    pub fn clear_patches(&mut self) {
        self.patches.clear();
    }

    /// Last selection shown.
    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Call counters.
    pub fn stats(&self) -> HostStats {
        self.stats
    }

    fn note(&self, kind: &str) {
        if let Some((name, log)) = &self.log {
            log.borrow_mut().push(format!("{kind}:{name}"));
        }
    }

    fn cell_width(&self, ch: char, x: f64) -> f64 {
        if ch == '\t' {
            let tab = self.char_width * self.tab_size.max(1) as f64;
            tab - (x % tab)
        } else {
            self.char_width * ch.width().unwrap_or(0).max(1) as f64
        }
    }
}

impl RenderHost for HeadlessHost {
    fn viewport(&mut self) -> ViewportRect {
        self.stats.reads += 1;
        self.note("read");
        self.viewport
    }

    fn apply_patches(&mut self, patches: &[RenderPatch]) {
        self.stats.writes += 1;
        self.note("write");
        for patch in patches {
            match patch {
                RenderPatch::Remove { line } => self.views.retain(|v| v.line != *line),
                RenderPatch::Insert { index, view } => {
                    let index = (*index).min(self.views.len());
                    self.views.insert(index, view.clone());
                }
                RenderPatch::Update { index, view } => {
                    if let Some(slot) = self.views.get_mut(*index) {
                        *slot = view.clone();
                    }
                }
                RenderPatch::Window { .. } | RenderPatch::Selection { .. } | RenderPatch::ScrollTo { .. } => {}
            }
        }
        self.patches.extend_from_slice(patches);
    }

    fn measure_height(&mut self, view: &LineView) -> f64 {
        self.stats.reads += 1;
        self.note("read");
        self.line_heights
            .get(&view.line_no)
            .copied()
            .unwrap_or(self.line_height)
    }

    fn measure_char(&mut self, view: &LineView, line_no: usize, column: usize) -> CharBox {
        self.stats.char_measures += 1;
        if self.bogus_once.remove(&(line_no, column)) {
            return CharBox::default();
        }
        let bottom = self
            .line_heights
            .get(&view.line_no)
            .copied()
            .unwrap_or(self.line_height);
        let mut x = 0.0;
        let mut end_of_line = None;
        for seg in &view.segments {
            let chars: Vec<char> = seg.text.chars().collect();
            if seg.kind == SegmentKind::Placeholder || seg.line_no != line_no {
                x += chars.iter().fold(0.0, |acc, &c| acc + self.cell_width(c, x + acc));
                continue;
            }
            let order = bidi_ordering(&seg.text);
            let mut lefts = vec![0.0; chars.len()];
            let mut widths = vec![0.0; chars.len()];
            let mut visual: Vec<usize> = (0..chars.len()).collect();
            if let Some(order) = &order {
                for i in 0..chars.len() {
                    visual[visual_index(order, i)] = i;
                }
            }
            let mut cx = x;
            for &logical in &visual {
                let w = self.cell_width(chars[logical], cx);
                lefts[logical] = cx;
                widths[logical] = w;
                cx += w;
            }
            if column >= seg.from && column < seg.to {
                let i = column - seg.from;
                return CharBox {
                    left: lefts[i],
                    right: lefts[i] + widths[i],
                    top: 0.0,
                    bottom,
                };
            }
            x = cx;
            if column >= seg.to {
                end_of_line = Some(x);
            } else if end_of_line.is_none() {
                end_of_line = Some(lefts.first().copied().unwrap_or(x));
            }
        }
        let at = end_of_line.unwrap_or(x);
        CharBox {
            left: at,
            right: at,
            top: 0.0,
            bottom,
        }
    }

    fn set_scroll_top(&mut self, top: f64) {
        self.stats.writes += 1;
        self.note("write");
        self.viewport.scroll_top = top.max(0.0);
        self.patches.push(RenderPatch::ScrollTo { top });
    }

    fn show_selection(&mut self, selection: &Selection) {
        self.stats.writes += 1;
        self.note("write");
        self.selection = Some(selection.clone());
        self.patches.push(RenderPatch::Selection {
            selection: selection.clone(),
        });
    }

    fn page_origin(&self) -> (f64, f64) {
        self.origin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EditorConfig;
    use crate::display::build_line_view;
    use crate::doc::Doc;

    #[test]
    fn test_ltr_boxes() {
        let doc = Doc::new("abc", EditorConfig::default());
        let view = build_line_view(&doc, 0).unwrap();
        let mut host = HeadlessHost::new(400.0, 160.0);
        let b = host.measure_char(&view, 0, 1);
        assert_eq!((b.left, b.right), (8.0, 16.0));
        let end = host.measure_char(&view, 0, 3);
        assert_eq!((end.left, end.right), (24.0, 24.0));
    }

    #[test]
    fn test_rtl_boxes_run_backwards() {
        let doc = Doc::new("ab \u{5d0}\u{5d1}", EditorConfig::default());
        let view = build_line_view(&doc, 0).unwrap();
        let mut host = HeadlessHost::new(400.0, 160.0);
        let first = host.measure_char(&view, 0, 3);
        let second = host.measure_char(&view, 0, 4);
        assert!(first.left > second.left);
        assert_eq!(second.left, 24.0);
    }

    #[test]
    fn test_bogus_injection_is_one_shot() {
        let doc = Doc::new("abc", EditorConfig::default());
        let view = build_line_view(&doc, 0).unwrap();
        let mut host = HeadlessHost::new(400.0, 160.0);
        host.inject_bogus(0, 2);
        assert!(host.measure_char(&view, 0, 2).is_bogus());
        assert!(!host.measure_char(&view, 0, 2).is_bogus());
    }
}
