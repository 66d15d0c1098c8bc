//! Document state and transaction application.
//!
//! A [`DocumentState`] is an immutable value: applying a [`TransactionSpec`]
//! yields a new state plus the [`ChangeSet`] that produced it. The rope is
//! shared between versions, so keeping old states around is cheap.

use modelsync_protocol::{TextEdit, TextRange};
use ropey::Rope;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransactionError {
    #[error("change {from}..{to} is outside the document (length {len})")]
    ChangeOutOfBounds { from: usize, to: usize, len: usize },

    #[error("change {from}..{to} is inverted")]
    InvertedChange { from: usize, to: usize },

    #[error("change starting at {from} overlaps or precedes the previous change ending at {previous_to}")]
    UnorderedChanges { from: usize, previous_to: usize },

    #[error("selection {anchor}..{head} is outside the document (length {len})")]
    SelectionOutOfBounds {
        anchor: usize,
        head: usize,
        len: usize,
    },

    #[error("document session has been disposed")]
    Disposed,
}

/// Primary selection, in character offsets
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub anchor: usize,
    pub head: usize,
}

impl Selection {
    pub fn cursor(pos: usize) -> Self {
        Self {
            anchor: pos,
            head: pos,
        }
    }

    pub fn range(anchor: usize, head: usize) -> Self {
        Self { anchor, head }
    }

    pub fn from(&self) -> usize {
        self.anchor.min(self.head)
    }

    pub fn to(&self) -> usize {
        self.anchor.max(self.head)
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }

    fn map(&self, changes: &ChangeSet) -> Self {
        Self {
            anchor: changes.map_pos(self.anchor),
            head: changes.map_pos(self.head),
        }
    }

    fn clamp(&self, len: usize) -> Self {
        Self {
            anchor: self.anchor.min(len),
            head: self.head.min(len),
        }
    }
}

/// How a transaction interacts with undo history
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HistoryMode {
    #[default]
    Record,
    Skip,
}

/// A described change to the document. Edits are expressed against the
/// document *before* the transaction and must be sorted and non-overlapping.
/// An explicit selection is expressed against the document *after* it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionSpec {
    pub changes: Vec<TextEdit>,
    pub selection: Option<Selection>,
    pub scroll_into_view: Option<usize>,
    pub history: HistoryMode,
}

impl TransactionSpec {
    pub fn changes(changes: Vec<TextEdit>) -> Self {
        Self {
            changes,
            ..Self::default()
        }
    }

    pub fn edit(edit: TextEdit) -> Self {
        Self::changes(vec![edit])
    }

    pub fn select(selection: Selection) -> Self {
        Self {
            selection: Some(selection),
            ..Self::default()
        }
    }

    pub fn with_selection(mut self, selection: Selection) -> Self {
        self.selection = Some(selection);
        self
    }

    pub fn scroll_to(mut self, pos: usize) -> Self {
        self.scroll_into_view = Some(pos);
        self
    }

    pub fn without_history(mut self) -> Self {
        self.history = HistoryMode::Skip;
        self
    }
}

/// One edit as it was applied, keeping the replaced text for inversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedEdit {
    pub from: usize,
    pub to: usize,
    pub insert: String,
    pub removed: String,
    insert_len: usize,
}

/// The edits a transaction actually applied, in ascending order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    edits: Vec<AppliedEdit>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn edits(&self) -> &[AppliedEdit] {
        &self.edits
    }

    /// The edits in wire form, relative to the pre-transaction document.
    pub fn to_text_edits(&self) -> Vec<TextEdit> {
        self.edits
            .iter()
            .map(|e| TextEdit::replace(e.from, e.to, e.insert.clone()))
            .collect()
    }

    /// Edits that undo this change set, relative to the post-transaction
    /// document.
    pub fn inverse(&self) -> Vec<TextEdit> {
        let mut delta: isize = 0;
        self.edits
            .iter()
            .map(|e| {
                let from = (e.from as isize + delta) as usize;
                delta += e.insert_len as isize - (e.to - e.from) as isize;
                TextEdit::replace(from, from + e.insert_len, e.removed.clone())
            })
            .collect()
    }

    /// Map a position in the old document to the new one. A cursor sitting
    /// exactly at an insertion point ends up after the inserted text; a
    /// position inside a replaced range moves to the end of the replacement.
    pub fn map_pos(&self, pos: usize) -> usize {
        let mut delta: isize = 0;
        for edit in &self.edits {
            if pos < edit.from || (pos == edit.from && edit.from < edit.to) {
                break;
            }
            let inserted = edit.insert_len as isize;
            if pos >= edit.to {
                delta += inserted - (edit.to - edit.from) as isize;
            } else {
                return (edit.from as isize + delta + inserted) as usize;
            }
        }
        (pos as isize + delta) as usize
    }

    pub fn map_range(&self, range: TextRange) -> TextRange {
        let from = self.map_pos(range.from);
        let to = self.map_pos(range.to).max(from);
        TextRange::new(from, to)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentState {
    text: Rope,
    selection: Selection,
    version: u64,
}

impl DocumentState {
    pub fn new(text: &str) -> Self {
        Self {
            text: Rope::from_str(text),
            selection: Selection::default(),
            version: 0,
        }
    }

    pub fn text(&self) -> &Rope {
        &self.text
    }

    /// The whole document as a `String`.
    pub fn contents(&self) -> String {
        self.text.to_string()
    }

    pub fn len_chars(&self) -> usize {
        self.text.len_chars()
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn has_selection(&self) -> bool {
        !self.selection.is_empty()
    }

    /// Incremented on every content change.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Apply `spec`, returning the next state. On error `self` is untouched.
    pub fn apply(&self, spec: &TransactionSpec) -> Result<(DocumentState, ChangeSet), TransactionError> {
        self.validate(&spec.changes)?;

        let mut text = self.text.clone();
        let mut applied = Vec::with_capacity(spec.changes.len());
        for edit in spec.changes.iter().rev() {
            if edit.from == edit.to && edit.insert.is_empty() {
                continue;
            }
            let removed = text.slice(edit.from..edit.to).to_string();
            text.remove(edit.from..edit.to);
            text.insert(edit.from, &edit.insert);
            applied.push(AppliedEdit {
                from: edit.from,
                to: edit.to,
                insert: edit.insert.clone(),
                removed,
                insert_len: edit.insert.chars().count(),
            });
        }
        applied.reverse();
        let changes = ChangeSet { edits: applied };

        let len = text.len_chars();
        let selection = match spec.selection {
            Some(selection) => {
                if selection.anchor > len || selection.head > len {
                    return Err(TransactionError::SelectionOutOfBounds {
                        anchor: selection.anchor,
                        head: selection.head,
                        len,
                    });
                }
                selection
            }
            None => self.selection.map(&changes).clamp(len),
        };

        let version = if changes.is_empty() {
            self.version
        } else {
            self.version + 1
        };

        Ok((
            DocumentState {
                text,
                selection,
                version,
            },
            changes,
        ))
    }

    fn validate(&self, changes: &[TextEdit]) -> Result<(), TransactionError> {
        let len = self.len_chars();
        let mut previous_to: Option<usize> = None;
        for edit in changes {
            if edit.from > edit.to {
                return Err(TransactionError::InvertedChange {
                    from: edit.from,
                    to: edit.to,
                });
            }
            if edit.to > len {
                return Err(TransactionError::ChangeOutOfBounds {
                    from: edit.from,
                    to: edit.to,
                    len,
                });
            }
            if let Some(previous_to) = previous_to {
                if edit.from < previous_to {
                    return Err(TransactionError::UnorderedChanges {
                        from: edit.from,
                        previous_to,
                    });
                }
            }
            previous_to = Some(edit.to);
        }
        Ok(())
    }
}
