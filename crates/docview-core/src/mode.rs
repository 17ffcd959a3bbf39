//! Tokenizer plug-in contract.
//!
//! A [`Mode`] turns one line of text at a time into styled tokens, threading an opaque
//! [`ModeState`] from line to line. Optional capabilities are exposed through
//! [`Mode::indenter`] and [`Mode::nested`] instead of being probed for at runtime.

use crate::text::count_column;
use regex::Regex;
use std::any::Any;
use std::fmt::Debug;

trait StateValue: Any + Debug {
    fn clone_box(&self) -> Box<dyn StateValue>;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<T: Any + Debug + Clone> StateValue for T {
    fn clone_box(&self) -> Box<dyn StateValue> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Opaque, copyable tokenizer state.
#[derive(Debug)]
pub struct ModeState(Box<dyn StateValue>);

impl ModeState {
    /// Wrap a mode-specific state value.
    pub fn new<T: Any + Debug + Clone>(value: T) -> Self {
        Self(Box::new(value))
    }

    /// Borrow the wrapped value if it has type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref()
    }

    /// Mutably borrow the wrapped value if it has type `T`.
    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.0.as_any_mut().downcast_mut()
    }
}

impl Clone for ModeState {
    fn clone(&self) -> Self {
        Self(self.0.clone_box())
    }
}

/// A tokenizer.
pub trait Mode: Debug {
    /// Name used in diagnostics.
    fn name(&self) -> &str;

    /// State at the start of the document.
    fn start_state(&self) -> ModeState;

    /// Consume at least one character from `stream` and return the token's style.
    fn token(&self, stream: &mut StringStream<'_>, state: &mut ModeState) -> Option<String>;

    /// Copy `state`.
    fn copy_state(&self, state: &ModeState) -> ModeState {
        state.clone()
    }

    /// Called for empty lines, which produce no tokens.
    fn blank_line(&self, _state: &mut ModeState) {}

    /// Indentation capability.
    fn indenter(&self) -> Option<&dyn Indenter> {
        None
    }

    /// Nested-mode capability.
    fn nested(&self) -> Option<&dyn NestedModeProvider> {
        None
    }
}

/// Computes smart indentation.
pub trait Indenter {
    /// Indentation in columns for a line starting with `text_after`, or `None` to decline.
    fn indent(&self, state: &ModeState, text_after: &str) -> Option<usize>;
}

/// A mode that delegates part of the text to another mode.
pub trait NestedModeProvider {
    /// The mode and state active at `state`, if an inner mode is active.
    fn inner_mode<'a>(&'a self, state: &'a ModeState) -> Option<(&'a dyn Mode, &'a ModeState)>;
}

/// Resolve the innermost mode active at `state`.
pub fn inner_mode<'a>(mode: &'a dyn Mode, state: &'a ModeState) -> (&'a dyn Mode, &'a ModeState) {
    let mut cur = (mode, state);
    for _ in 0..32 {
        let Some(nested) = cur.0.nested() else {
            break;
        };
        match nested.inner_mode(cur.1) {
            Some(next) if !std::ptr::addr_eq(next.0, cur.0) => cur = next,
            _ => break,
        }
    }
    cur
}

/// Cursor over one line of text, handed to [`Mode::token`].
///
/// `pos` and `start` are byte offsets; `start..pos` is the token being read.
#[derive(Debug, Clone)]
pub struct StringStream<'a> {
    text: &'a str,
    pub(crate) pos: usize,
    pub(crate) start: usize,
    tab_size: usize,
    last_column_pos: usize,
    last_column_value: usize,
}

impl<'a> StringStream<'a> {
    /// Stream over `text`.
    pub fn new(text: &'a str, tab_size: usize) -> Self {
        Self {
            text,
            pos: 0,
            start: 0,
            tab_size,
            last_column_pos: 0,
            last_column_value: 0,
        }
    }

    /// The whole line.
    pub fn string(&self) -> &'a str {
        self.text
    }

    /// Byte offset of the read position.
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Byte offset of the current token start.
    pub fn start(&self) -> usize {
        self.start
    }

    /// At end of line.
    pub fn eol(&self) -> bool {
        self.pos >= self.text.len()
    }

    /// At start of line.
    pub fn sol(&self) -> bool {
        self.pos == 0
    }

    /// Next char without consuming it.
    pub fn peek(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    /// Consume the next char.
    #[allow(clippy::should_implement_trait)]
    pub fn next(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    /// Consume the next char if it is `ch`.
    pub fn eat(&mut self, ch: char) -> Option<char> {
        self.eat_if(|c| c == ch)
    }

    /// Consume the next char if it satisfies `pred`.
    pub fn eat_if(&mut self, pred: impl Fn(char) -> bool) -> Option<char> {
        match self.peek() {
            Some(c) if pred(c) => {
                self.pos += c.len_utf8();
                Some(c)
            }
            _ => None,
        }
    }

    /// Consume chars while `pred` holds. Returns whether anything was consumed.
    pub fn eat_while(&mut self, pred: impl Fn(char) -> bool) -> bool {
        let start = self.pos;
        while self.eat_if(&pred).is_some() {}
        self.pos > start
    }

    /// Consume whitespace. Returns whether anything was consumed.
    pub fn eat_space(&mut self) -> bool {
        self.eat_while(char::is_whitespace)
    }

    /// Move to the end of the line.
    pub fn skip_to_end(&mut self) {
        self.pos = self.text.len();
    }

    /// Move up to (not past) the next `ch`. Returns false when `ch` does not occur.
    pub fn skip_to(&mut self, ch: char) -> bool {
        match self.text[self.pos..].find(ch) {
            Some(found) => {
                self.pos += found;
                true
            }
            None => false,
        }
    }

    /// Un-consume `n` chars.
    pub fn back_up(&mut self, n: usize) {
        for _ in 0..n {
            let Some(ch) = self.text[..self.pos].chars().next_back() else {
                break;
            };
            self.pos -= ch.len_utf8();
        }
    }

    /// Visual column of the token start.
    pub fn column(&mut self) -> usize {
        if self.last_column_pos < self.start {
            let prefix = &self.text[self.last_column_pos..self.start];
            let mut col = self.last_column_value;
            for ch in prefix.chars() {
                col = if ch == '\t' {
                    col + self.tab_size - col % self.tab_size
                } else {
                    col + 1
                };
            }
            self.last_column_value = col;
        } else if self.last_column_pos > self.start {
            let chars = self.text[..self.start].chars().count();
            self.last_column_value = count_column(self.text, Some(chars), self.tab_size);
        }
        self.last_column_pos = self.start;
        self.last_column_value
    }

    /// Visual width of the line's leading whitespace.
    pub fn indentation(&self) -> usize {
        let ws = self.text.len() - self.text.trim_start_matches([' ', '\t']).len();
        count_column(self.text, Some(ws), self.tab_size)
    }

    /// Match `pattern` at the read position, consuming it when `consume` is set.
    pub fn match_str(&mut self, pattern: &str, consume: bool, case_insensitive: bool) -> bool {
        let rest = &self.text[self.pos..];
        let matched = if case_insensitive {
            rest.get(..pattern.len())
                .is_some_and(|s| s.eq_ignore_ascii_case(pattern))
        } else {
            rest.starts_with(pattern)
        };
        if matched && consume {
            self.pos += pattern.len();
        }
        matched
    }

    /// Match `regex` anchored at the read position, consuming it when `consume` is set.
    pub fn match_regex(&mut self, regex: &Regex, consume: bool) -> Option<&'a str> {
        let rest = &self.text[self.pos..];
        let m = regex.find(rest).filter(|m| m.start() == 0)?;
        if m.end() > 0 && consume {
            self.pos += m.end();
        }
        Some(m.as_str())
    }

    /// Text of the current token.
    pub fn current(&self) -> &'a str {
        &self.text[self.start..self.pos]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_basics() {
        let mut s = StringStream::new("  let x = 10;", 4);
        assert!(s.sol());
        assert!(s.eat_space());
        s.start = s.pos;
        assert!(s.match_str("let", true, false));
        assert_eq!(s.current(), "let");
        assert_eq!(s.column(), 2);
        assert_eq!(s.indentation(), 2);
        s.start = s.pos;
        assert!(s.skip_to('1'));
        s.start = s.pos;
        let digits = Regex::new(r"\d+").unwrap();
        assert_eq!(s.match_regex(&digits, true), Some("10"));
        s.back_up(1);
        assert_eq!(s.peek(), Some('0'));
        s.skip_to_end();
        assert!(s.eol());
    }

    #[test]
    fn test_tab_columns() {
        let mut s = StringStream::new("\tab\tc", 4);
        s.pos = 4;
        s.start = 4;
        assert_eq!(s.column(), 8);
        s.start = 1;
        assert_eq!(s.column(), 4);
    }

    #[test]
    fn test_mode_state_downcast() {
        let mut state = ModeState::new(3u32);
        *state.downcast_mut::<u32>().unwrap() += 1;
        let copy = state.clone();
        assert_eq!(copy.downcast_ref::<u32>(), Some(&4));
        assert!(copy.downcast_ref::<String>().is_none());
    }
}
