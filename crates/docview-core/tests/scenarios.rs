use docview_core::change::adjust_for_change;
use docview_core::{
    Change, CursorSide, Doc, Editor, EditorConfig, HeadlessHost, ManualClock, MarkOptions,
    Position, Range, SelectAfter, SelectionOptions,
};
use std::cell::RefCell;
use std::rc::Rc;

fn p(line: usize, column: usize) -> Position {
    Position::new(line, column)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn editor(text: &str, clock: &Rc<ManualClock>) -> Editor {
    Editor::with_clock(
        text,
        EditorConfig::default(),
        clock.clone(),
        Box::new(HeadlessHost::new(400.0, 160.0)),
    )
}

#[test]
fn test_type_over_selection_then_undo() {
    let clock = Rc::new(ManualClock::new(1_000));
    let mut ed = editor("abc\ndef", &clock);
    ed.with_doc(|d| d.set_simple_selection(p(0, 1), Some(p(0, 2)), SelectionOptions::default()));
    ed.with_doc(|d| d.replace_selection("X", SelectAfter::End, Some("+input")));

    assert_eq!(ed.doc().get_value(None), "aXc\ndef");
    assert_eq!(ed.doc().selection().primary(), Range::cursor(p(0, 2)));

    ed.with_doc(Doc::undo);
    assert_eq!(ed.doc().get_value(None), "abc\ndef");
    assert_eq!(ed.doc().selection().primary(), Range::new(p(0, 1), p(0, 2)));
}

#[test]
fn test_cursor_leaves_atomic_fold_to_the_right() {
    let clock = Rc::new(ManualClock::new(0));
    let mut ed = editor("abcdef", &clock);
    ed.with_doc(|d| d.mark_text(p(0, 0), p(0, 3), MarkOptions::fold()))
        .unwrap();
    ed.with_doc(|d| d.set_cursor(p(0, 1), SelectionOptions::default()));
    assert_eq!(ed.doc().get_cursor(CursorSide::Head), p(0, 3));
}

#[test]
fn test_newline_splits_line_and_moves_positions() {
    let mut doc = Doc::with_clock("abcdef", EditorConfig::default(), Rc::new(ManualClock::new(0)));
    let bookmark = doc.set_bookmark(p(0, 5), false).unwrap();
    doc.replace_range("\n", p(0, 2), None, None);

    assert_eq!(doc.line_count(), 2);
    assert_eq!(doc.get_line_text(0), Some("ab"));
    assert_eq!(doc.get_line_text(1), Some("cdef"));
    assert_eq!(doc.find_marker(bookmark).map(|r| r.from), Some(p(1, 3)));

    let change = Change::new(p(0, 2), p(0, 2), vec![String::new(), String::new()], None);
    assert_eq!(adjust_for_change(p(0, 5), &change), p(1, 3));
}

#[test]
fn test_fifty_edits_reconcile_once() {
    init_tracing();
    let clock = Rc::new(ManualClock::new(0));
    let log = Rc::new(RefCell::new(Vec::new()));
    let host = HeadlessHost::new(400.0, 160.0).with_log("a", log.clone());
    let mut ed = Editor::with_clock("hello", EditorConfig::default(), clock, Box::new(host));
    log.borrow_mut().clear();
    let before = ed.stats().reconciles;

    ed.operation(|ed| {
        for i in 0..50 {
            ed.with_doc(|d| d.replace_range("x", p(0, i), None, Some("+input")));
        }
    });

    assert_eq!(ed.stats().reconciles, before + 1);
    assert_eq!(ed.doc().line_length(0), 55);
    let mut kinds: Vec<String> = log
        .borrow()
        .iter()
        .map(|e| e.split(':').next().unwrap_or_default().to_string())
        .collect();
    kinds.dedup();
    assert_eq!(kinds, vec!["read", "write", "read", "write"]);
}

#[test]
fn test_input_coalescing_by_time() {
    let clock = Rc::new(ManualClock::new(10_000));
    let mut ed = editor("", &clock);
    ed.with_doc(|d| d.replace_range("a", p(0, 0), None, Some("+input")));
    clock.advance(200);
    ed.with_doc(|d| d.replace_range("b", p(0, 1), None, Some("+input")));
    assert_eq!(ed.doc().history_size().undo, 1);

    clock.advance(5_000);
    ed.with_doc(|d| d.replace_range("c", p(0, 2), None, Some("+input")));
    assert_eq!(ed.doc().history_size().undo, 2);

    ed.with_doc(Doc::undo);
    assert_eq!(ed.doc().get_value(None), "ab");
    ed.with_doc(Doc::undo);
    assert_eq!(ed.doc().get_value(None), "");
}

#[test]
fn test_edits_in_one_operation_are_one_step() {
    let clock = Rc::new(ManualClock::new(0));
    let mut ed = editor("abc", &clock);
    ed.operation(|ed| {
        ed.with_doc(|d| d.replace_range("1", p(0, 0), None, None));
        clock.advance(60_000);
        ed.with_doc(|d| d.replace_range("2", p(0, 4), None, None));
    });
    assert_eq!(ed.doc().get_value(None), "1abc2");
    assert_eq!(ed.doc().history_size().undo, 1);
    ed.with_doc(Doc::undo);
    assert_eq!(ed.doc().get_value(None), "abc");
}

#[test]
fn test_atomic_deadlock_blocks_edits_until_cleared() {
    init_tracing();
    let clock = Rc::new(ManualClock::new(0));
    let mut ed = editor("abc", &clock);
    let options = MarkOptions {
        atomic: true,
        inclusive_left: true,
        inclusive_right: true,
        ..MarkOptions::default()
    };
    let marker = ed
        .with_doc(|d| d.mark_text(p(0, 0), p(0, 3), options))
        .unwrap();
    ed.with_doc(|d| d.set_cursor(p(0, 2), SelectionOptions::default()));

    assert!(ed.doc().cant_edit());
    assert_eq!(ed.doc().get_cursor(CursorSide::Head), p(0, 0));
    ed.with_doc(|d| d.replace_range("x", p(0, 1), None, None));
    assert_eq!(ed.doc().get_value(None), "abc");

    ed.with_doc(|d| d.clear_marker(marker)).unwrap();
    assert!(!ed.doc().cant_edit());
    ed.with_doc(|d| d.replace_range("x", p(0, 1), None, None));
    assert_eq!(ed.doc().get_value(None), "axbc");
}

#[test]
fn test_history_json_restores_undo() {
    let clock = Rc::new(ManualClock::new(0));
    let mut ed = editor("one", &clock);
    ed.with_doc(|d| d.replace_range("two", p(0, 0), Some(p(0, 3)), None));
    let json = ed.doc().get_history_json().unwrap();

    let mut other = editor("two", &clock);
    other.with_doc(|d| d.set_history_json(&json)).unwrap();
    assert_eq!(other.doc().history_size().undo, 1);
    other.with_doc(Doc::undo);
    assert_eq!(other.doc().get_value(None), "one");
}
