#![warn(missing_docs)]
//! Docview Core - Document/View Engine for Code Editors
//!
//! # Overview
//!
//! `docview-core` holds a text document as a balanced tree of lines and keeps a rendering host
//! in sync with it. The host is abstract: it receives per-line view patches, answers geometry
//! queries, and reports heights back. A headless host is included for tests and tools.
//!
//! # Core Features
//!
//! - **Line Tree**: O(log n) line lookup by number and by vertical offset
//! - **Change Pipeline**: read-only and atomic ranges, marker adjustment, change filters
//! - **Undo History**: grouped events, selection events, generations, linked-doc rebasing
//! - **Marked Ranges**: styling, collapsed (folded) ranges, bookmarks
//! - **Batched Reconciliation**: mutations are grouped into operations and the host is
//!   touched once per operation, in strictly separated read and write phases
//! - **Incremental Highlighting**: mode-driven tokenizing with cached states, run in slices
//!
//! # Architecture Layers
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │  Session (editor groups, linked docs)       │  ← Coordination
//! ├─────────────────────────────────────────────┤
//! │  Editor (operations, reconcile, queries)    │  ← Public API
//! ├─────────────────────────────────────────────┤
//! │  Display + Measurement                      │  ← Rendering Data
//! ├─────────────────────────────────────────────┤
//! │  Highlighting (modes, style runs)           │  ← Visual Enhancement
//! ├─────────────────────────────────────────────┤
//! │  Doc (changes, selection, marks, history)   │  ← Model
//! ├─────────────────────────────────────────────┤
//! │  Line Tree                                  │  ← Line Storage
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust
//! use docview_core::{EditorEvent, Editor, EditorConfig, HeadlessHost, Position, Session};
//!
//! let mut session = Session::new();
//! let host = HeadlessHost::new(400.0, 160.0);
//! let id = session.register(Editor::new("fn main() {}\n", EditorConfig::default(), Box::new(host)));
//!
//! session
//!     .with_editor(id, |ed| {
//!         ed.subscribe(|event| {
//!             if let EditorEvent::Changes(changes) = event {
//!                 println!("{} change(s)", changes.len());
//!             }
//!         });
//!         ed.with_doc(|doc| doc.replace_range("// hi\n", Position::new(0, 0), None, None));
//!     })
//!     .unwrap();
//!
//! assert_eq!(session.editor(id).unwrap().doc().line_count(), 3);
//! ```
//!
//! # Module Description
//!
//! - [`line_tree`] - Balanced tree of lines with height aggregation
//! - [`doc`] - Document model: change pipeline, selection, markers, undo
//! - [`history`] - Undo/redo event store
//! - [`marks`] - Marked ranges and collapsed spans
//! - [`highlight`] - Mode-driven tokenizing and the background worker
//! - [`display`] - Line views and render patches
//! - [`measure`] - Char box cache and coordinate queries
//! - [`editor`] - Operations and reconciliation
//! - [`session`] - Editor groups and linked documents

pub mod bidi;
pub mod change;
pub mod clock;
pub mod config;
pub mod display;
pub mod doc;
pub mod editor;
pub mod error;
pub mod events;
pub mod highlight;
pub mod history;
pub mod host;
pub mod line_tree;
pub mod marks;
pub mod measure;
pub mod mode;
pub mod operation;
pub mod position;
pub mod selection;
pub mod session;
mod text;

pub use bidi::{BidiSpan, bidi_ordering};
pub use change::{Change, SelectAfter};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::EditorConfig;
pub use display::{Display, LineView, RenderPatch, Segment, SegmentKind};
pub use doc::{CursorSide, Doc, DocEffects, DocId, SelectionOptions};
pub use editor::{Editor, EditorStats, IndentHow};
pub use error::{DocError, Result};
pub use events::{EditorEvent, EventCallback};
pub use highlight::{StyleRun, StyleRuns, Token, WorkerStatus, WorkerStep};
pub use history::{History, HistoryEvent, HistorySize, HistorySnapshot};
pub use host::{CharBox, HeadlessHost, HostStats, RenderHost, ViewportRect};
pub use line_tree::{Line, LineId, LineTree};
pub use marks::{MarkOptions, MarkedSpan, Marker, MarkerId, MarkerKind, MarkerRange};
pub use measure::{CoordMode, MeasureStats};
pub use mode::{Indenter, Mode, ModeState, NestedModeProvider, StringStream};
pub use operation::{Operation, ScrollTarget};
pub use position::{Bias, Position};
pub use selection::{Range, Selection};
pub use session::{EditorId, Session};
