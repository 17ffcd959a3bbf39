//! `docview-highlight-simple` - Simple (regex-based) modes for `docview-core`.
//!
//! This crate is intended for lightweight formats (JSON/INI/etc.) where a hand-written
//! tokenizer is unnecessary. A [`RegexHighlighter`] is a [`Mode`]: install it with
//! `Doc::set_mode` and the background highlighter drives it line by line.

use docview_core::{Indenter, Mode, ModeState, StringStream};
use regex::Regex;

/// A single regex highlighting rule.
#[derive(Debug, Clone)]
pub struct RegexRule {
    regex: Regex,
    style: String,
    capture_group: Option<usize>,
}

impl RegexRule {
    /// Style every match of `pattern` with `style`.
    pub fn new(pattern: &str, style: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            style: style.to_string(),
            capture_group: None,
        })
    }

    /// Highlight only a capture group of each match.
    ///
    /// Example (INI key):
    /// - pattern: `^\\s*([^=\\s]+)\\s*=`
    /// - capture_group: `1` (the key)
    pub fn with_capture_group(mut self, group: usize) -> Self {
        self.capture_group = Some(group);
        self
    }

    /// Style name given to matches.
    pub fn style(&self) -> &str {
        &self.style
    }

    /// Byte range of the first non-empty match starting at or after `pos`.
    ///
    /// Matches are taken from a scan of the whole line so anchors keep their meaning.
    fn find(&self, line: &str, pos: usize) -> Option<(usize, usize)> {
        match self.capture_group {
            Some(group) => self
                .regex
                .captures_iter(line)
                .filter_map(|caps| caps.get(group))
                .map(|m| (m.start(), m.end()))
                .find(|&(start, end)| start >= pos && start < end),
            None => self
                .regex
                .find_iter(line)
                .map(|m| (m.start(), m.end()))
                .find(|&(start, end)| start >= pos && start < end),
        }
    }
}

/// Tokenizer state: bracket nesting depth outside styled tokens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Depth(usize);

/// A simple regex-based mode.
///
/// Designed for simple formats (JSON/INI/etc.). It is *not* intended to be a full parser.
/// Rules are tried at every position; the earliest match wins, and among matches starting at
/// the same offset the first rule wins.
#[derive(Debug, Clone)]
pub struct RegexHighlighter {
    name: String,
    rules: Vec<RegexRule>,
    indent_unit: Option<usize>,
}

impl RegexHighlighter {
    /// A mode called `name` applying `rules`.
    pub fn new(name: &str, rules: Vec<RegexRule>) -> Self {
        Self {
            name: name.to_string(),
            rules,
            indent_unit: None,
        }
    }

    /// Offer smart indentation of `unit` columns per open bracket.
    pub fn with_indent_unit(mut self, unit: usize) -> Self {
        self.indent_unit = Some(unit);
        self
    }

    /// The rules, in priority order.
    pub fn rules(&self) -> &[RegexRule] {
        &self.rules
    }

    fn next_match(&self, line: &str, pos: usize) -> Option<(usize, usize, &str)> {
        let mut best: Option<(usize, usize, &str)> = None;
        for rule in &self.rules {
            let Some((start, end)) = rule.find(line, pos) else {
                continue;
            };
            if best.is_none_or(|(s, _, _)| start < s) {
                best = Some((start, end, rule.style()));
            }
        }
        best
    }

    /// A small default JSON grammar (strings, numbers, booleans, null).
    pub fn json_default(styles: SimpleJsonStyles) -> Result<Self, regex::Error> {
        Ok(Self::new(
            "json",
            vec![
                // JSON string (single-line, handles escapes)
                RegexRule::new(r#""(?:\\.|[^"\\])*""#, styles.string)?,
                // JSON number
                RegexRule::new(r#"-?(?:0|[1-9]\d*)(?:\.\d+)?(?:[eE][+-]?\d+)?"#, styles.number)?,
                // JSON boolean / null
                RegexRule::new(r#"\b(?:true|false)\b"#, styles.boolean)?,
                RegexRule::new(r#"\bnull\b"#, styles.null)?,
            ],
        )
        .with_indent_unit(2))
    }

    /// A small default INI grammar (section, key, comment).
    pub fn ini_default(styles: SimpleIniStyles) -> Result<Self, regex::Error> {
        Ok(Self::new(
            "ini",
            vec![
                // Section header: [section]
                RegexRule::new(r#"^\s*\[([^\]]+)\]\s*$"#, styles.section)?.with_capture_group(1),
                // Key: key = value
                RegexRule::new(r#"^\s*([^=\s]+)\s*="#, styles.key)?.with_capture_group(1),
                // Comment: ;... or #...
                RegexRule::new(r#"^\s*[;#].*$"#, styles.comment)?,
            ],
        ))
    }
}

fn advance_to(stream: &mut StringStream<'_>, end: usize) {
    while stream.pos() < end && stream.next().is_some() {}
}

fn track_brackets(text: &str, depth: &mut Depth) {
    for ch in text.chars() {
        match ch {
            '{' | '[' => depth.0 += 1,
            '}' | ']' => depth.0 = depth.0.saturating_sub(1),
            _ => {}
        }
    }
}

impl Mode for RegexHighlighter {
    fn name(&self) -> &str {
        &self.name
    }

    fn start_state(&self) -> ModeState {
        ModeState::new(Depth::default())
    }

    fn token(&self, stream: &mut StringStream<'_>, state: &mut ModeState) -> Option<String> {
        let line = stream.string();
        let pos = stream.pos();
        match self.next_match(line, pos) {
            Some((start, end, style)) if start == pos => {
                advance_to(stream, end);
                Some(style.to_string())
            }
            found => {
                let gap_end = found.map_or(line.len(), |(start, _, _)| start);
                advance_to(stream, gap_end);
                if let Some(depth) = state.downcast_mut::<Depth>() {
                    track_brackets(&line[pos..stream.pos()], depth);
                }
                None
            }
        }
    }

    fn indenter(&self) -> Option<&dyn Indenter> {
        self.indent_unit.map(|_| self as &dyn Indenter)
    }
}

impl Indenter for RegexHighlighter {
    fn indent(&self, state: &ModeState, text_after: &str) -> Option<usize> {
        let unit = self.indent_unit?;
        let depth = state.downcast_ref::<Depth>()?.0;
        let closing = text_after.starts_with(['}', ']']);
        Some(depth.saturating_sub(usize::from(closing)) * unit)
    }
}

/// Style names of [`RegexHighlighter::json_default`].
#[derive(Debug, Clone, Copy)]
pub struct SimpleJsonStyles {
    pub string: &'static str,
    pub number: &'static str,
    pub boolean: &'static str,
    pub null: &'static str,
}

impl Default for SimpleJsonStyles {
    fn default() -> Self {
        Self {
            string: SIMPLE_STYLE_STRING,
            number: SIMPLE_STYLE_NUMBER,
            boolean: SIMPLE_STYLE_BOOLEAN,
            null: SIMPLE_STYLE_NULL,
        }
    }
}

/// Style names of [`RegexHighlighter::ini_default`].
#[derive(Debug, Clone, Copy)]
pub struct SimpleIniStyles {
    pub section: &'static str,
    pub key: &'static str,
    pub comment: &'static str,
}

impl Default for SimpleIniStyles {
    fn default() -> Self {
        Self {
            section: SIMPLE_STYLE_SECTION,
            key: SIMPLE_STYLE_KEY,
            comment: SIMPLE_STYLE_COMMENT,
        }
    }
}

/// Default style names for `RegexHighlighter`-based grammars.
///
/// These are only names. The host's theme is expected to map them to actual colors.
pub const SIMPLE_STYLE_STRING: &str = "string";
pub const SIMPLE_STYLE_NUMBER: &str = "number";
pub const SIMPLE_STYLE_BOOLEAN: &str = "atom";
pub const SIMPLE_STYLE_NULL: &str = "null";
pub const SIMPLE_STYLE_SECTION: &str = "header";
pub const SIMPLE_STYLE_KEY: &str = "property";
pub const SIMPLE_STYLE_COMMENT: &str = "comment";

#[cfg(test)]
mod tests {
    use super::*;
    use docview_core::highlight::highlight_line;
    use docview_core::{Editor, EditorConfig, HeadlessHost, IndentHow, ManualClock, Position, StyleRun};
    use std::rc::Rc;

    fn runs(mode: &RegexHighlighter, text: &str) -> Vec<StyleRun> {
        let mut state = mode.start_state();
        highlight_line(mode, text, &mut state, 4, 10_000).unwrap()
    }

    fn styled(runs: &[StyleRun]) -> Vec<(usize, &str)> {
        runs.iter()
            .filter_map(|r| r.style.as_deref().map(|s| (r.end, s)))
            .collect()
    }

    #[test]
    fn test_regex_highlighter_json_strings() {
        let mode = RegexHighlighter::json_default(SimpleJsonStyles::default()).unwrap();
        let text = r#"{ "key": "值", "n": 12, "ok": true, "x": null }"#;
        let runs = runs(&mode, text);

        let styles = styled(&runs);
        assert_eq!(styles.iter().filter(|(_, s)| *s == SIMPLE_STYLE_STRING).count(), 5);
        assert!(styles.contains(&(21, SIMPLE_STYLE_NUMBER)));
        assert!(styles.iter().any(|(_, s)| *s == SIMPLE_STYLE_BOOLEAN));
        assert!(styles.iter().any(|(_, s)| *s == SIMPLE_STYLE_NULL));
        assert_eq!(runs.last().map(|r| r.end), Some(text.chars().count()));
    }

    #[test]
    fn test_regex_highlighter_ini_capture_groups() {
        let mode = RegexHighlighter::ini_default(SimpleIniStyles::default()).unwrap();
        assert_eq!(
            styled(&runs(&mode, "[core]")),
            vec![(5, SIMPLE_STYLE_SECTION)]
        );
        assert_eq!(
            styled(&runs(&mode, "name = docview")),
            vec![(4, SIMPLE_STYLE_KEY)]
        );
        assert_eq!(
            styled(&runs(&mode, ";comment")),
            vec![(8, SIMPLE_STYLE_COMMENT)]
        );
    }

    #[test]
    fn test_brackets_inside_strings_do_not_nest() {
        let mode = RegexHighlighter::json_default(SimpleJsonStyles::default()).unwrap();
        let mut state = mode.start_state();
        highlight_line(&mode, r#"{ "a": "{[", "b": ["#, &mut state, 4, 10_000).unwrap();
        assert_eq!(state.downcast_ref::<Depth>(), Some(&Depth(2)));
        assert_eq!(mode.indent(&state, "1"), Some(4));
        assert_eq!(mode.indent(&state, "]"), Some(2));
    }

    #[test]
    fn test_smart_indent_through_editor() {
        let text = "{\n\"a\": [\n1,\n]\n}";
        let mut ed = Editor::with_clock(
            text,
            EditorConfig::default(),
            Rc::new(ManualClock::new(0)),
            Box::new(HeadlessHost::new(400.0, 160.0)),
        );
        let mode = RegexHighlighter::json_default(SimpleJsonStyles::default()).unwrap();
        ed.with_doc(|d| d.set_mode(Some(Rc::new(mode))));

        for line in 1..5 {
            ed.indent_line(line, IndentHow::Smart).unwrap();
        }
        assert_eq!(ed.doc().get_value(None), "{\n  \"a\": [\n    1,\n  ]\n}");
        let token = ed.get_token_at(Position::new(1, 4), true).unwrap();
        assert_eq!(token.style.as_deref(), Some(SIMPLE_STYLE_STRING));
        assert_eq!(token.text, "\"a\"");
    }
}
