use docview_core::{
    CursorSide, Doc, EditorConfig, ManualClock, MarkOptions, Position, Range, SelectionOptions,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ropey::Rope;
use std::rc::Rc;

const INSERTS: &[&str] = &["", "x", "hello", "\n", "a\nb", "\n\n", "é漢", "line\nbreak\n"];

fn doc(text: &str) -> Doc {
    Doc::with_clock(text, EditorConfig::default(), Rc::new(ManualClock::new(0)))
}

fn random_pos(rng: &mut StdRng, doc: &Doc) -> Position {
    let line = rng.gen_range(0..doc.line_count());
    let column = rng.gen_range(0..=doc.line_length(line));
    Position::new(line, column)
}

fn random_range(rng: &mut StdRng, doc: &Doc) -> (Position, Position) {
    let a = random_pos(rng, doc);
    let b = random_pos(rng, doc);
    if a <= b { (a, b) } else { (b, a) }
}

#[test]
fn test_random_edits_match_rope() {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let initial = "fn main() {\n    println!(\"hi\");\n}\n";
    let mut doc = doc(initial);
    let mut rope = Rope::from_str(initial);

    for _ in 0..400 {
        let (from, to) = random_range(&mut rng, &doc);
        let text = INSERTS[rng.gen_range(0..INSERTS.len())];
        let a = doc.index_from_pos(from);
        let b = doc.index_from_pos(to);

        doc.replace_range(text, from, Some(to), None);
        rope.remove(a..b);
        rope.insert(a, text);

        assert_eq!(doc.line_count(), rope.len_lines());
        assert_eq!(doc.tree().size(), doc.last_line() - doc.first_line() + 1);
        assert_eq!(doc.tree().verify(), Ok(()));
    }

    assert_eq!(doc.get_value(None), rope.to_string());
    for (i, line) in rope.lines().enumerate() {
        let line = line.to_string();
        assert_eq!(doc.get_line_text(i), Some(line.trim_end_matches('\n')));
    }
}

#[test]
fn test_undo_everything_restores_text() {
    let mut rng = StdRng::seed_from_u64(42);
    let initial = "alpha\nbeta\ngamma";
    let mut doc = doc(initial);

    for _ in 0..60 {
        let (from, to) = random_range(&mut rng, &doc);
        let text = INSERTS[rng.gen_range(0..INSERTS.len())];
        doc.replace_range(text, from, Some(to), None);
    }
    let edited = doc.get_value(None);

    while doc.history_size().undo > 0 {
        doc.undo();
    }
    assert_eq!(doc.get_value(None), initial);
    assert_eq!(doc.tree().verify(), Ok(()));

    while doc.history_size().redo > 0 {
        doc.redo();
    }
    assert_eq!(doc.get_value(None), edited);
}

#[test]
fn test_selections_never_overlap() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut doc = doc(&vec!["0123456789"; 8].join("\n"));

    for _ in 0..200 {
        let count = rng.gen_range(1..6);
        let ranges: Vec<Range> = (0..count)
            .map(|_| {
                let (a, b) = random_range(&mut rng, &doc);
                if rng.gen_bool(0.5) { Range::new(a, b) } else { Range::new(b, a) }
            })
            .collect();
        let primary = rng.gen_range(0..count);
        doc.set_selections(ranges, primary, SelectionOptions::default());

        let sel = doc.selection();
        assert!(sel.primary_index() < sel.ranges().len());
        for pair in sel.ranges().windows(2) {
            assert!(pair[0].to() < pair[1].from(), "overlap in {:?}", sel.ranges());
        }
    }
}

#[test]
fn test_cursor_never_rests_inside_atomic_range() {
    let mut rng = StdRng::seed_from_u64(99);
    let mut doc = doc("abcdefgh\nijklmnop\nqrstuvwx");
    let marker = doc
        .mark_text(Position::new(1, 2), Position::new(1, 6), MarkOptions::fold())
        .unwrap();
    let span = doc.find_marker(marker).unwrap();

    for _ in 0..200 {
        let pos = random_pos(&mut rng, &doc);
        doc.set_cursor(pos, SelectionOptions::default());
        let head = doc.get_cursor(CursorSide::Head);
        assert!(
            !(span.from < head && head < span.to),
            "cursor {head:?} inside {span:?} after placing at {pos:?}"
        );
    }
    assert!(!doc.cant_edit());
}
