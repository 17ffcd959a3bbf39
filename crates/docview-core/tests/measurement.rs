use docview_core::{
    Bias, CoordMode, Editor, EditorConfig, EditorEvent, HeadlessHost, ManualClock, MarkOptions,
    Position, SelectionOptions,
};
use std::cell::RefCell;
use std::rc::Rc;

fn p(line: usize, column: usize) -> Position {
    Position::new(line, column)
}

fn numbered(n: usize) -> String {
    (0..n).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n")
}

fn editor_with(text: &str, host: HeadlessHost) -> Editor {
    Editor::with_clock(text, EditorConfig::default(), Rc::new(ManualClock::new(0)), Box::new(host))
}

#[test]
fn test_bogus_measurement_is_retried() {
    let mut host = HeadlessHost::new(400.0, 160.0);
    host.inject_bogus(0, 3);
    let mut ed = editor_with("abcdef", host);

    let b = ed.char_coords(p(0, 3), CoordMode::Local);
    assert_eq!((b.left, b.right), (24.0, 24.0));
    assert_eq!(ed.measure_stats().retries, 1);

    let again = ed.char_coords(p(0, 3), CoordMode::Local);
    assert_eq!(again, b);
    assert_eq!(ed.measure_stats().hits, 1);
}

#[test]
fn test_page_coordinates_follow_scroll() {
    let mut host = HeadlessHost::new(400.0, 160.0);
    host.origin = (100.0, 50.0);
    let mut ed = editor_with(&numbered(100), host);
    ed.scroll_to(160.0);
    assert_eq!(ed.scroll_top(), 160.0);

    let local = ed.char_coords(p(20, 1), CoordMode::Local);
    assert_eq!((local.left, local.top), (8.0, 320.0));
    let page = ed.char_coords(p(20, 1), CoordMode::Page);
    assert_eq!((page.left, page.top), (108.0, 210.0));

    assert_eq!(ed.coords_char(125.0, 215.0, CoordMode::Page), p(20, 3));
    assert_eq!(ed.line_at_height(215.0, CoordMode::Page), 20);
    assert_eq!(ed.height_at_line(20, CoordMode::Page), 210.0);
}

#[test]
fn test_cursor_coords_at_line_end() {
    let mut ed = editor_with("abc\nde", HeadlessHost::new(400.0, 160.0));
    let end = ed.cursor_coords(p(0, 3), Bias::Before, CoordMode::Local);
    assert_eq!((end.left, end.right), (24.0, 24.0));
    let start = ed.cursor_coords(p(1, 0), Bias::After, CoordMode::Local);
    assert_eq!((start.left, start.top), (0.0, 16.0));
}

#[test]
fn test_line_heights_come_from_host() {
    let mut host = HeadlessHost::new(400.0, 160.0);
    host.line_heights.insert(1, 40.0);
    let ed = editor_with("a\nb\nc", host);
    assert_eq!(ed.doc().height(), 16.0 + 40.0 + 16.0);
    assert_eq!(ed.height_at_line(2, CoordMode::Local), 56.0);
    assert_eq!(ed.line_at_height(30.0, CoordMode::Local), 1);
}

#[test]
fn test_default_text_height_is_cached() {
    let mut ed = editor_with("abc", HeadlessHost::new(400.0, 160.0));
    assert_eq!(ed.default_text_height(), 16.0);
    assert_eq!(ed.default_text_height(), 16.0);
}

#[test]
fn test_editing_fold_head_remeasures_joined_line() {
    let mut ed = editor_with("aaaa\nbbbbbb", HeadlessHost::new(400.0, 160.0));
    ed.with_doc(|d| d.mark_text(p(0, 2), p(1, 2), MarkOptions::fold()))
        .unwrap();
    let before = ed.char_coords(p(1, 3), CoordMode::Local);
    assert_eq!((before.left, before.right), (24.0, 32.0));

    ed.with_doc(|d| d.replace_range("XXXX", p(0, 0), None, None));
    let after = ed.char_coords(p(1, 3), CoordMode::Local);

    let mut fresh = editor_with("XXXXaaaa\nbbbbbb", HeadlessHost::new(400.0, 160.0));
    fresh
        .with_doc(|d| d.mark_text(p(0, 6), p(1, 2), MarkOptions::fold()))
        .unwrap();
    assert_eq!(after, fresh.char_coords(p(1, 3), CoordMode::Local));
    assert_eq!((after.left, after.right), (56.0, 64.0));
}

#[test]
fn test_fold_hides_lines_from_layout() {
    let mut ed = editor_with(&numbered(10), HeadlessHost::new(400.0, 400.0));
    ed.with_doc(|d| d.mark_text(p(2, 2), p(5, 1), MarkOptions::fold()))
        .unwrap();

    assert_eq!(ed.doc().height(), 16.0 * 7.0);
    assert_eq!(ed.height_at_line(6, CoordMode::Local), 16.0 * 3.0);
    assert_eq!(ed.display().views().len(), 7);
    ed.with_doc(|d| d.set_cursor(p(3, 0), SelectionOptions::default()));
    assert!(ed.doc().get_cursor(Default::default()) != p(3, 0));
}

#[test]
fn test_viewport_event_on_scroll() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let mut ed = editor_with(&numbered(200), HeadlessHost::new(400.0, 160.0));
    let sink = seen.clone();
    ed.subscribe(move |e| sink.borrow_mut().push(e.clone()));
    ed.scroll_to(1_600.0);

    let seen = seen.borrow();
    let window = seen.iter().find_map(|e| match e {
        EditorEvent::ViewportChange { from, to } => Some((*from, *to)),
        _ => None,
    });
    // Lines 100..=110 are visible; ten lines of margin on each side.
    assert_eq!(window, Some((90, 121)));
    assert!(seen.contains(&EditorEvent::Update));
}
