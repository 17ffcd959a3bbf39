use docview_core::{
    Doc, Editor, EditorConfig, EditorId, HeadlessHost, ManualClock, Mode, ModeState, Position,
    Session, StringStream,
};
use std::cell::RefCell;
use std::rc::Rc;

fn p(line: usize, column: usize) -> Position {
    Position::new(line, column)
}

fn editor(text: &str, clock: &Rc<ManualClock>) -> Editor {
    Editor::with_clock(
        text,
        EditorConfig::default(),
        clock.clone(),
        Box::new(HeadlessHost::new(400.0, 160.0)),
    )
}

fn text(session: &Session, id: EditorId) -> String {
    session.editor(id).unwrap().doc().get_value(None)
}

fn edit(session: &mut Session, id: EditorId, text: &str, from: Position, to: Option<Position>) {
    session
        .with_editor(id, |ed| ed.with_doc(|d| d.replace_range(text, from, to, Some("+input"))))
        .unwrap();
}

#[test]
fn test_phases_do_not_interleave_across_editors() {
    let clock = Rc::new(ManualClock::new(0));
    let log = Rc::new(RefCell::new(Vec::new()));
    let mut session = Session::new();
    let a = session.register(Editor::with_clock(
        "first",
        EditorConfig::default(),
        clock.clone(),
        Box::new(HeadlessHost::new(400.0, 160.0).with_log("a", log.clone())),
    ));
    let b = session.register(Editor::with_clock(
        "second",
        EditorConfig::default(),
        clock.clone(),
        Box::new(HeadlessHost::new(400.0, 160.0).with_log("b", log.clone())),
    ));
    log.borrow_mut().clear();

    session.batch(|s| {
        edit(s, a, "1", p(0, 0), None);
        edit(s, b, "2", p(0, 0), None);
        edit(s, a, "3", p(0, 0), None);
    });

    // Group the log into runs of reads and writes; each run must cover both editors.
    let log = log.borrow();
    let mut runs: Vec<(String, Vec<String>)> = Vec::new();
    for entry in log.iter() {
        let (kind, name) = entry.split_once(':').unwrap();
        match runs.last_mut() {
            Some((k, names)) if k == kind => names.push(name.to_string()),
            _ => runs.push((kind.to_string(), vec![name.to_string()])),
        }
    }
    let kinds: Vec<&str> = runs.iter().map(|(k, _)| k.as_str()).collect();
    assert_eq!(kinds, vec!["read", "write", "read", "write"]);
    for (_, names) in &runs {
        assert!(names.iter().any(|n| n == "a") && names.iter().any(|n| n == "b"));
    }
    assert_eq!(text(&session, a), "31first");
    assert_eq!(session.editor(a).unwrap().stats().reconciles, 2);
}

#[test]
fn test_linked_docs_with_separate_histories() {
    let clock = Rc::new(ManualClock::new(0));
    let mut session = Session::new();
    let a = session.register(editor("one\ntwo", &clock));
    let b = session.register(editor("something else", &clock));
    session.link_docs(a, b, false).unwrap();
    assert_eq!(text(&session, b), "one\ntwo");
    assert_eq!(session.editor(b).unwrap().doc().history_size().undo, 0);
    assert_eq!(session.linked(a), vec![b]);

    edit(&mut session, a, "O", p(0, 0), Some(p(0, 1)));
    assert_eq!(text(&session, b), "One\ntwo");
    assert_eq!(session.editor(b).unwrap().doc().history_size().undo, 0);

    clock.advance(10_000);
    edit(&mut session, b, "!", p(1, 3), None);
    assert_eq!(text(&session, a), "One\ntwo!");

    session.with_editor(b, |ed| ed.with_doc(Doc::undo)).unwrap();
    assert_eq!(text(&session, a), "One\ntwo");
    assert_eq!(text(&session, b), "One\ntwo");

    session.with_editor(a, |ed| ed.with_doc(Doc::undo)).unwrap();
    assert_eq!(text(&session, a), "one\ntwo");
    assert_eq!(text(&session, b), "one\ntwo");
}

#[test]
fn test_rebase_shifts_history_over_foreign_edit() {
    let clock = Rc::new(ManualClock::new(0));
    let mut session = Session::new();
    let a = session.register(editor("abc\ndef", &clock));
    let b = session.register(editor("", &clock));
    session.link_docs(a, b, false).unwrap();

    edit(&mut session, a, "X", p(1, 1), None);
    clock.advance(10_000);
    edit(&mut session, b, "new\n", p(0, 0), None);
    assert_eq!(text(&session, a), "new\nabc\ndXef");

    session.with_editor(a, |ed| ed.with_doc(Doc::undo)).unwrap();
    assert_eq!(text(&session, a), "new\nabc\ndef");
    assert_eq!(text(&session, b), "new\nabc\ndef");
}

#[test]
fn test_shared_history_undo_from_either_side() {
    let clock = Rc::new(ManualClock::new(0));
    let mut session = Session::new();
    let a = session.register(editor("shared", &clock));
    let b = session.register(editor("", &clock));
    session.link_docs(a, b, true).unwrap();

    edit(&mut session, a, "!", p(0, 6), None);
    assert_eq!(session.editor(b).unwrap().doc().history_size().undo, 1);

    session.with_editor(b, |ed| ed.with_doc(Doc::undo)).unwrap();
    assert_eq!(text(&session, a), "shared");
    assert_eq!(session.editor(a).unwrap().doc().history_size().redo, 1);

    assert!(session.unlink(a, b).unwrap());
    clock.advance(10_000);
    edit(&mut session, a, "?", p(0, 0), None);
    assert_eq!(text(&session, b), "shared");
    assert_eq!(session.editor(b).unwrap().doc().history_size().undo, 0);
    assert_eq!(session.editor(a).unwrap().doc().history_size().undo, 1);
}

#[test]
fn test_unregister_drops_links() {
    let clock = Rc::new(ManualClock::new(0));
    let mut session = Session::new();
    let a = session.register(editor("x", &clock));
    let b = session.register(editor("y", &clock));
    session.link_docs(a, b, true).unwrap();
    let removed = session.unregister(b).unwrap();
    assert_eq!(removed.doc().get_value(None), "x");
    assert!(session.linked(a).is_empty());
    edit(&mut session, a, "z", p(0, 1), None);
    assert_eq!(text(&session, a), "xz");
    assert_eq!(session.len(), 1);
}

#[derive(Debug)]
struct Words;

impl Mode for Words {
    fn name(&self) -> &str {
        "words"
    }

    fn start_state(&self) -> ModeState {
        ModeState::new(())
    }

    fn token(&self, stream: &mut StringStream<'_>, _state: &mut ModeState) -> Option<String> {
        if stream.eat_while(char::is_alphabetic) {
            return Some("word".into());
        }
        stream.next();
        None
    }
}

#[test]
fn test_highlight_runs_from_session_queue() {
    let clock = Rc::new(ManualClock::new(0));
    let mut session = Session::new();
    let id = session.register(editor("alpha beta\ngamma", &clock));
    assert_eq!(session.next_task_due(), None);

    session
        .with_editor(id, |ed| ed.with_doc(|d| d.set_mode(Some(Rc::new(Words)))))
        .unwrap();
    let due = session.next_task_due().unwrap();
    assert_eq!(due, EditorConfig::default().work_delay_ms);
    assert_eq!(session.run_pending().unwrap(), 0);

    clock.set(due);
    assert_eq!(session.run_pending().unwrap(), 1);
    assert_eq!(session.next_task_due(), None);

    let ed = session.editor(id).unwrap();
    assert_eq!(ed.stats().highlight_slices, 1);
    let line = ed.doc().get_line_handle(1).unwrap();
    let runs = ed.doc().tree().line(line).unwrap().style_runs().unwrap();
    assert_eq!(runs[0].style.as_deref(), Some("word"));
}

#[test]
fn test_cancelled_highlight_is_not_run() {
    let clock = Rc::new(ManualClock::new(0));
    let mut session = Session::new();
    let id = session.register(editor("abc", &clock));
    session
        .with_editor(id, |ed| ed.with_doc(|d| d.set_mode(Some(Rc::new(Words)))))
        .unwrap();
    session.cancel_tasks(id).unwrap();
    clock.set(1_000);
    assert_eq!(session.next_task_due(), None);
    assert_eq!(session.run_pending().unwrap(), 0);
}
