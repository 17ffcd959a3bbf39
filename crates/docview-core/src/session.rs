//! Editors that share a page.
//!
//! A [`Session`] owns a set of editors and coordinates them:
//!
//! - operations opened through [`Session::with_editor`] or inside [`Session::batch`] stay open
//!   until the outermost batch ends, and are then reconciled together, phase by phase
//! - edits to a document are replayed in every document linked to it, and histories that are
//!   not shared are rebased over the foreign edit
//! - background highlight slices of all editors are driven from one queue

use crate::change::Change;
use crate::editor::{Editor, end_operations};
use crate::error::{DocError, Result};
use crate::highlight::WorkerStatus;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use tracing::debug;

/// Opaque identifier of an editor registered in a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EditorId(u64);

impl EditorId {
    /// Get the underlying numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Link {
    a: EditorId,
    b: EditorId,
    shared_history: bool,
}

impl Link {
    fn other(&self, id: EditorId) -> Option<EditorId> {
        if self.a == id {
            Some(self.b)
        } else if self.b == id {
            Some(self.a)
        } else {
            None
        }
    }

    fn joins(&self, x: EditorId, y: EditorId) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }
}

/// A group of editors reconciled together.
#[derive(Default)]
pub struct Session {
    next_id: u64,
    editors: BTreeMap<EditorId, Editor>,
    links: Vec<Link>,
    group_depth: usize,
    pending: Vec<EditorId>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("editor_count", &self.editors.len())
            .field("link_count", &self.links.len())
            .field("group_depth", &self.group_depth)
            .field("pending", &self.pending)
            .finish()
    }
}

impl Session {
    /// Create an empty session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered editors.
    pub fn len(&self) -> usize {
        self.editors.len()
    }

    /// Returns `true` if no editor is registered.
    pub fn is_empty(&self) -> bool {
        self.editors.is_empty()
    }

    /// Take ownership of `editor`.
    pub fn register(&mut self, editor: Editor) -> EditorId {
        let id = EditorId(self.next_id);
        self.next_id = self.next_id.saturating_add(1);
        self.editors.insert(id, editor);
        id
    }

    /// Remove an editor, dropping its links. A held operation is reconciled first.
    pub fn unregister(&mut self, id: EditorId) -> Result<Editor> {
        let Some(mut editor) = self.editors.remove(&id) else {
            return Err(DocError::UnknownEditor(id.0));
        };
        let linked: Vec<EditorId> = self.links.iter().filter_map(|l| l.other(id)).collect();
        for other in linked {
            self.split_link(id, other, &mut editor);
        }
        if let Some(i) = self.pending.iter().position(|p| *p == id) {
            self.pending.remove(i);
            if editor.close_operation() {
                end_operations(&mut [&mut editor]);
            }
        }
        Ok(editor)
    }

    /// Borrow an editor.
    pub fn editor(&self, id: EditorId) -> Result<&Editor> {
        self.editors
            .get(&id)
            .ok_or(DocError::UnknownEditor(id.0))
    }

    /// Ids of all editors, in registration order.
    pub fn editor_ids(&self) -> Vec<EditorId> {
        self.editors.keys().copied().collect()
    }

    /// Editors directly linked to `id`.
    pub fn linked(&self, id: EditorId) -> Vec<EditorId> {
        self.links.iter().filter_map(|l| l.other(id)).collect()
    }

    /// Run `f` with every operation opened inside it held until `f` returns.
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Self) -> R) -> R {
        self.group_depth += 1;
        let result = f(self);
        self.group_depth -= 1;
        if self.group_depth == 0 {
            self.flush();
        }
        result
    }

    /// Run `f` on editor `id` inside an operation and replay its edits in linked documents.
    pub fn with_editor<R>(&mut self, id: EditorId, f: impl FnOnce(&mut Editor) -> R) -> Result<R> {
        self.batch(|s| {
            let editor = s.hold(id)?;
            let result = f(editor);
            let changes = editor.take_propagated();
            if !changes.is_empty() {
                s.propagate_from(id, &changes)?;
            }
            Ok(result)
        })
    }

    /// Open (once per batch) an operation on `id`.
    fn hold(&mut self, id: EditorId) -> Result<&mut Editor> {
        let editor = self
            .editors
            .get_mut(&id)
            .ok_or(DocError::UnknownEditor(id.0))?;
        if !self.pending.contains(&id) {
            editor.start_operation();
            self.pending.push(id);
        }
        Ok(editor)
    }

    /// Close every held operation and reconcile them together.
    fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.pending);
        let mut ready: Vec<&mut Editor> = self
            .editors
            .iter_mut()
            .filter(|(id, _)| pending.contains(id))
            .filter_map(|(_, ed)| ed.close_operation().then_some(ed))
            .collect();
        debug!(editors = ready.len(), "reconciling batch");
        end_operations(&mut ready);
    }

    /// Editors reachable from `origin` through links, excluding `origin`.
    fn reachable(&self, origin: EditorId) -> Vec<EditorId> {
        let mut seen = vec![origin];
        let mut queue = VecDeque::from([origin]);
        while let Some(cur) = queue.pop_front() {
            for next in self.links.iter().filter_map(|l| l.other(cur)) {
                if !seen.contains(&next) {
                    seen.push(next);
                    queue.push_back(next);
                }
            }
        }
        seen.remove(0);
        seen
    }

    /// Replay `changes` made in `origin` in every linked document.
    fn propagate_from(&mut self, origin: EditorId, changes: &[Change]) -> Result<()> {
        let targets = self.reachable(origin);
        if targets.is_empty() {
            return Ok(());
        }
        let mut histories = vec![self.editor(origin)?.doc().history_rc().clone()];
        for id in targets {
            let editor = self.hold(id)?;
            for change in changes {
                editor.doc_mut().apply_linked_change(change);
            }
            let history = editor.doc().history_rc().clone();
            if !histories.iter().any(|h| Rc::ptr_eq(h, &history)) {
                for change in changes {
                    history.borrow_mut().rebase(change);
                }
                histories.push(history);
            }
            debug!(from = origin.0, to = id.0, changes = changes.len(), "propagated to linked doc");
        }
        Ok(())
    }

    /// Link the documents of `a` and `b`: `b` takes `a`'s text, and edits flow both ways.
    ///
    /// With `shared_history`, both use `a`'s history; otherwise `b` starts with an empty one.
    pub fn link_docs(&mut self, a: EditorId, b: EditorId, shared_history: bool) -> Result<()> {
        if a == b || self.links.iter().any(|l| l.joins(a, b)) {
            return Err(DocError::AlreadyLinked(a.0, b.0));
        }
        let (text, history) = {
            let src = self.editor(a)?.doc();
            (src.get_value(None), src.history_rc().clone())
        };
        self.editor(b)?;
        self.with_editor(b, |ed| {
            let doc = ed.doc_mut();
            doc.set_value(&text);
            doc.clear_history();
            if shared_history {
                doc.set_history_rc(history);
            }
        })?;
        self.links.push(Link {
            a,
            b,
            shared_history,
        });
        Ok(())
    }

    /// Break the link between `a` and `b`. A shared history is split into two copies.
    ///
    /// Returns whether a link existed.
    pub fn unlink(&mut self, a: EditorId, b: EditorId) -> Result<bool> {
        self.editor(a)?;
        let Some(mut editor) = self.editors.remove(&b) else {
            return Err(DocError::UnknownEditor(b.0));
        };
        let existed = self.split_link(a, b, &mut editor);
        self.editors.insert(b, editor);
        Ok(existed)
    }

    fn split_link(&mut self, a: EditorId, b: EditorId, b_editor: &mut Editor) -> bool {
        let Some(i) = self.links.iter().position(|l| l.joins(a, b)) else {
            return false;
        };
        let link = self.links.remove(i);
        if link.shared_history {
            let copy = b_editor.doc().history_rc().borrow().clone();
            b_editor
                .doc_mut()
                .set_history_rc(Rc::new(RefCell::new(copy)));
        }
        true
    }

    // --- background work -----------------------------------------------------------------

    /// Earliest time any editor wants a highlight slice.
    pub fn next_task_due(&self) -> Option<u64> {
        self.editors.values().filter_map(Editor::highlight_due).min()
    }

    /// Run every highlight slice that is due, earliest first. Returns the number of slices run.
    pub fn run_pending(&mut self) -> Result<usize> {
        let mut due: Vec<(u64, EditorId)> = self
            .editors
            .iter()
            .filter_map(|(id, ed)| {
                let at = ed.highlight_due()?;
                (at <= ed.doc().clock().now_ms()).then_some((at, *id))
            })
            .collect();
        due.sort_unstable();
        let mut ran = 0;
        self.batch(|s| -> Result<()> {
            for (_, id) in due {
                let status = s.with_editor(id, |ed| ed.run_highlight_slice())??;
                ran += 1;
                if status == WorkerStatus::Yield {
                    debug!(editor = id.0, "highlight slice yielded");
                }
            }
            Ok(())
        })?;
        Ok(ran)
    }

    /// Drop the scheduled highlight slice of `id`.
    pub fn cancel_tasks(&mut self, id: EditorId) -> Result<()> {
        self.editors
            .get_mut(&id)
            .ok_or(DocError::UnknownEditor(id.0))?
            .cancel_highlight();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::EditorConfig;
    use crate::host::HeadlessHost;
    use crate::position::Position;

    fn editor(text: &str) -> Editor {
        Editor::with_clock(
            text,
            EditorConfig::default(),
            Rc::new(ManualClock::new(0)),
            Box::new(HeadlessHost::new(400.0, 160.0)),
        )
    }

    #[test]
    fn test_batch_reconciles_once_per_editor() {
        let mut session = Session::new();
        let a = session.register(editor("one"));
        let b = session.register(editor("two"));
        session.batch(|s| {
            for _ in 0..3 {
                s.with_editor(a, |ed| ed.with_doc(|d| d.replace_range("x", Position::new(0, 0), None, None)))
                    .unwrap();
                s.with_editor(b, |ed| ed.with_doc(|d| d.replace_range("y", Position::new(0, 0), None, None)))
                    .unwrap();
            }
        });
        assert_eq!(session.editor(a).unwrap().stats().reconciles, 2);
        assert_eq!(session.editor(b).unwrap().stats().reconciles, 2);
        assert_eq!(session.editor(a).unwrap().doc().get_value(None), "xxxone");
    }

    #[test]
    fn test_unknown_editor() {
        let mut session = Session::new();
        let a = session.register(editor("x"));
        session.unregister(a).unwrap();
        assert!(matches!(session.editor(a), Err(DocError::UnknownEditor(_))));
    }

    #[test]
    fn test_link_twice_fails() {
        let mut session = Session::new();
        let a = session.register(editor("x"));
        let b = session.register(editor("y"));
        session.link_docs(a, b, false).unwrap();
        assert!(matches!(session.link_docs(b, a, true), Err(DocError::AlreadyLinked(..))));
        assert_eq!(session.editor(b).unwrap().doc().get_value(None), "x");
        assert!(session.unlink(a, b).unwrap());
        assert!(!session.unlink(a, b).unwrap());
    }
}
