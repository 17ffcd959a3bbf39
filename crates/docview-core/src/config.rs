//! Editor configuration.

use serde::{Deserialize, Serialize};

/// Tunables for history coalescing, viewport rendering and background highlighting.
///
/// Every field has a default, so a partial JSON object is a valid configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    /// Maximum number of undo steps (change groups) kept in history.
    pub undo_depth: usize,
    /// Time window within which `+`-prefixed edits of the same origin merge into one undo step.
    pub history_event_delay_ms: u64,
    /// Number of lines rendered above and below the visible window.
    pub viewport_margin: usize,
    /// Time budget of one highlight tick.
    pub work_time_ms: u64,
    /// Delay before the next highlight tick when a tick ran out of budget.
    pub work_delay_ms: u64,
    /// Delay before highlighting resumes after an edit.
    pub edit_work_delay_ms: u64,
    /// Lines longer than this (in chars) are not tokenized.
    pub max_highlight_length: usize,
    /// Width of a tab stop in columns.
    pub tab_size: usize,
    /// Columns added or removed by one indentation step.
    pub indent_unit: usize,
    /// Indent with tabs where possible.
    pub indent_with_tabs: bool,
    /// Height given to lines that have not been measured yet.
    pub default_line_height: f64,
    /// Number of the first line.
    pub first_line_number: usize,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            undo_depth: 200,
            history_event_delay_ms: 1250,
            viewport_margin: 10,
            work_time_ms: 100,
            work_delay_ms: 100,
            edit_work_delay_ms: 400,
            max_highlight_length: 10_000,
            tab_size: 4,
            indent_unit: 2,
            indent_with_tabs: false,
            default_line_height: 16.0,
            first_line_number: 0,
        }
    }
}

impl EditorConfig {
    /// Parse a configuration from JSON, filling in defaults for missing keys.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = EditorConfig::from_json(r#"{"undo_depth": 5, "tab_size": 8}"#).unwrap();
        assert_eq!(config.undo_depth, 5);
        assert_eq!(config.tab_size, 8);
        assert_eq!(config.history_event_delay_ms, 1250);
        assert_eq!(config.default_line_height, 16.0);
    }
}
