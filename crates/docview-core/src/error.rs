//! Error type shared by the document, history and view layers.
//!
//! Most anomalies that interactive use can produce (out-of-range positions, cursors landing in
//! atomic ranges, garbage measurements) are absorbed where they happen. Only contract violations
//! and direct lookups that cannot be meaningfully clipped surface as [`DocError`].

use thiserror::Error;

/// Errors produced by `docview-core`.
#[derive(Debug, Error)]
pub enum DocError {
    /// A line index outside `[first, first + size)` was dereferenced.
    #[error("line {line} is out of range (first line {first}, {size} lines)")]
    OutOfRange {
        /// The requested line number.
        line: usize,
        /// The document's first line number.
        first: usize,
        /// The number of lines in the document.
        size: usize,
    },

    /// A collapsed marker would partially overlap an existing collapsed marker.
    #[error("inserting collapsed marker partially overlapping an existing one")]
    InvalidOverlap,

    /// A mode's `token` implementation failed to advance the stream.
    #[error("mode '{mode}' failed to advance stream")]
    StalledTokenizer {
        /// Name of the offending mode.
        mode: String,
    },

    /// A marker handle does not refer to a live marker.
    #[error("unknown marker {0}")]
    UnknownMarker(u64),

    /// An editor handle is not registered with the session.
    #[error("unknown editor {0}")]
    UnknownEditor(u64),

    /// The two editors are already linked.
    #[error("editors {0} and {1} are already linked")]
    AlreadyLinked(u64, u64),

    /// A serialized history could not be parsed.
    #[error("invalid history: {0}")]
    InvalidHistory(#[from] serde_json::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, DocError>;
