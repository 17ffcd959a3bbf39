//! Small text helpers shared by the change engine, the tokenizer stream and measurement.

use unicode_segmentation::UnicodeSegmentation;

/// Split text into lines, treating `\r\n`, `\r` and `\n` as separators.
///
/// N separators produce N+1 lines, so a trailing newline yields a trailing empty line.
pub fn split_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut rest = text;
    while let Some(idx) = rest.find(['\r', '\n']) {
        lines.push(rest[..idx].to_string());
        let skip = if rest[idx..].starts_with("\r\n") { 2 } else { 1 };
        rest = &rest[idx + skip..];
    }
    lines.push(rest.to_string());
    lines
}

/// Number of `char`s in `text`.
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// Byte offset of char column `column`, clamped to the end of `text`.
pub fn byte_offset(text: &str, column: usize) -> usize {
    text.char_indices()
        .nth(column)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}

/// Substring by char columns `[from, to)`, clamped to the text.
pub fn slice_chars(text: &str, from: usize, to: usize) -> &str {
    let start = byte_offset(text, from);
    let end = byte_offset(text, to.max(from));
    &text[start..end]
}

/// Text before char column `column`.
pub fn prefix_chars(text: &str, column: usize) -> &str {
    &text[..byte_offset(text, column)]
}

/// Text from char column `column` to the end.
pub fn suffix_chars(text: &str, column: usize) -> &str {
    &text[byte_offset(text, column)..]
}

/// Visual column of char column `end` in `text`, expanding tabs to `tab_size` stops.
pub fn count_column(text: &str, end: Option<usize>, tab_size: usize) -> usize {
    let tab_size = tab_size.max(1);
    let mut n = 0;
    for (i, ch) in text.chars().enumerate() {
        if end.is_some_and(|end| i >= end) {
            break;
        }
        if ch == '\t' {
            n += tab_size - (n % tab_size);
        } else {
            n += 1;
        }
    }
    n
}

/// Whether the char at `column` continues the grapheme cluster started before it.
///
/// Cursor positions and measurement windows are never placed on such columns.
pub fn is_extending_column(text: &str, column: usize) -> bool {
    if column == 0 {
        return false;
    }
    let byte = byte_offset(text, column);
    if byte >= text.len() {
        return false;
    }
    !text
        .grapheme_indices(true)
        .any(|(start, _)| start == byte)
}

/// Move `column` past extending chars in direction `dir` (`1` or `-1`).
pub fn skip_extending_chars(text: &str, mut column: usize, dir: isize) -> usize {
    let len = char_len(text);
    while column > 0 && column < len && is_extending_column(text, column) {
        if dir < 0 {
            column -= 1;
        } else {
            column += 1;
        }
    }
    column
}

/// Whether `ch` is a word character for word-wise selection.
pub fn is_word_char(ch: char) -> bool {
    ch.is_alphanumeric() || ch == '_'
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_lines_mixed_separators() {
        assert_eq!(split_lines("a\nb\r\nc\rd"), vec!["a", "b", "c", "d"]);
        assert_eq!(split_lines(""), vec![""]);
        assert_eq!(split_lines("x\n"), vec!["x", ""]);
    }

    #[test]
    fn test_char_slicing() {
        let text = "héllo";
        assert_eq!(slice_chars(text, 1, 3), "él");
        assert_eq!(prefix_chars(text, 2), "hé");
        assert_eq!(suffix_chars(text, 4), "o");
        assert_eq!(slice_chars(text, 3, 100), "lo");
    }

    #[test]
    fn test_count_column_expands_tabs() {
        assert_eq!(count_column("\tab", None, 4), 6);
        assert_eq!(count_column("a\tb", Some(2), 4), 4);
    }

    #[test]
    fn test_extending_chars() {
        // 'e' followed by a combining acute accent
        let text = "ae\u{301}b";
        assert!(is_extending_column(text, 2));
        assert!(!is_extending_column(text, 1));
        assert_eq!(skip_extending_chars(text, 2, 1), 3);
        assert_eq!(skip_extending_chars(text, 2, -1), 1);
    }
}
