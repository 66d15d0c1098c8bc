//! Undo/redo history.
//!
//! Entries store the edits that revert a change (relative to the document
//! right after it) and the selection to restore. Unrecorded content changes
//! invalidate those coordinates, so the session clears history instead of
//! trying to rebase it.

use std::collections::VecDeque;

use modelsync_protocol::TextEdit;

use crate::document::{ChangeSet, Selection};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub changes: Vec<TextEdit>,
    pub selection: Selection,
}

impl HistoryEntry {
    fn reverting(changes: &ChangeSet, selection: Selection) -> Self {
        Self {
            changes: changes.inverse(),
            selection,
        }
    }
}

#[derive(Debug, Clone)]
pub struct History {
    undo: VecDeque<HistoryEntry>,
    redo: Vec<HistoryEntry>,
    depth: usize,
}

impl History {
    pub fn new(depth: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            depth: depth.max(1),
        }
    }

    /// Record a user change. Starts a new branch, so redo is dropped.
    pub fn record(&mut self, changes: &ChangeSet, selection_before: Selection) {
        self.push_undo(HistoryEntry::reverting(changes, selection_before));
        self.redo.clear();
    }

    pub fn pop_undo(&mut self) -> Option<HistoryEntry> {
        self.undo.pop_back()
    }

    pub fn pop_redo(&mut self) -> Option<HistoryEntry> {
        self.redo.pop()
    }

    /// An undo entry was applied: remember how to redo it.
    pub fn undone(&mut self, changes: &ChangeSet, selection_before: Selection) {
        self.redo
            .push(HistoryEntry::reverting(changes, selection_before));
    }

    /// A redo entry was applied: make it undoable again without touching
    /// the rest of the redo stack.
    pub fn redone(&mut self, changes: &ChangeSet, selection_before: Selection) {
        self.push_undo(HistoryEntry::reverting(changes, selection_before));
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    fn push_undo(&mut self, entry: HistoryEntry) {
        if self.undo.len() == self.depth {
            self.undo.pop_front();
        }
        self.undo.push_back(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentState, TransactionSpec};

    fn change(doc: &DocumentState, edit: TextEdit) -> (DocumentState, ChangeSet) {
        doc.apply(&TransactionSpec::edit(edit)).unwrap()
    }

    #[test]
    fn depth_limit_drops_oldest_entries() {
        let mut history = History::new(2);
        let mut doc = DocumentState::new("");
        for i in 0..3 {
            let (next, changes) = change(&doc, TextEdit::insert(i, "x"));
            history.record(&changes, doc.selection());
            doc = next;
        }
        assert_eq!(history.undo_depth(), 2);
    }

    #[test]
    fn recording_clears_redo() {
        let mut history = History::new(10);
        let doc = DocumentState::new("a");
        let (doc2, changes) = change(&doc, TextEdit::insert(1, "b"));
        history.record(&changes, doc.selection());

        let entry = history.pop_undo().unwrap();
        let (_, undo_changes) = doc2
            .apply(&TransactionSpec::changes(entry.changes))
            .unwrap();
        history.undone(&undo_changes, doc2.selection());
        assert!(history.can_redo());

        let (_, changes) = change(&doc, TextEdit::insert(0, "z"));
        history.record(&changes, doc.selection());
        assert!(!history.can_redo());
        assert!(history.can_undo());
    }
}
