//! Notifications delivered once an operation has been reconciled.

use crate::change::Change;
use crate::marks::MarkerId;

/// An event fired at the end of an operation, after the host is up to date.
#[derive(Debug, Clone, PartialEq)]
pub enum EditorEvent {
    /// The document changed; changes in the order they were applied.
    Changes(Vec<Change>),
    /// The selection moved or the text under it changed.
    CursorActivity,
    /// The rendered window moved to `[from, to)`.
    ViewportChange {
        /// First rendered line.
        from: usize,
        /// End of the rendered lines.
        to: usize,
    },
    /// A marker was cleared, explicitly or by the cursor entering it.
    MarkerCleared(MarkerId),
    /// The host was updated.
    Update,
}

/// Callback receiving editor events.
pub type EventCallback = Box<dyn FnMut(&EditorEvent)>;
