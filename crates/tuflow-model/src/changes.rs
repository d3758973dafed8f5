//! Change log for undo and reset.
//!
//! Every mutating model operation opens one transaction and records a
//! [`Change`] per affected input, holding whatever is needed to put the
//! input back. Undo replays a transaction's changes in reverse.

use smol_str::SmolStr;
use tuflow_syntax::ScopeList;

use crate::conditions::Condition;
use crate::database::Entry;
use crate::ids::{ControlFileId, DatabaseId, InputId, TransactionId};
use crate::input::Input;

/// The edit a change records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeKind {
    /// The value of an input was replaced.
    UpdateValue,
    /// The command name of an input was replaced.
    UpdateCommand,
    /// An input was added to a control file.
    AddInput,
    /// An input was removed from a control file.
    RemoveInput,
    /// An input was turned into a comment.
    CommentOut,
    /// A comment was turned back into an input.
    Uncomment,
    /// An input was moved under a new scope.
    SetScope,
    /// A database entry was added, replaced or removed.
    DatabaseChange,
}

/// What undo restores.
#[derive(Debug, Clone, PartialEq)]
pub enum PriorState {
    /// The input as it was before the edit.
    Input(Box<Input>),
    /// The input was inserted; undo detaches it.
    Added,
    /// The input was detached from this position.
    Removed {
        /// Index in the control file's input list.
        index: usize,
    },
    /// The scope before a scope change.
    Scope(ScopeList),
    /// A database entry before the edit; `None` if it did not exist.
    Entry {
        /// The database.
        database: DatabaseId,
        /// Lower-case entry key.
        key: SmolStr,
        /// Entry and row position before the edit.
        prior: Option<(Box<Entry>, usize)>,
    },
}

/// One recorded edit.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Kind of edit.
    pub kind: ChangeKind,
    /// Control file the edit applies to.
    pub control_file: ControlFileId,
    /// Input the edit applies to.
    pub input: InputId,
    /// State needed to reverse the edit.
    pub prior: PriorState,
    /// Conditions the input carried before the edit.
    pub conditions: Vec<Condition>,
}

/// Changes that undo together.
#[derive(Debug, Clone, PartialEq)]
pub struct Transaction {
    /// Shared id of the grouped changes.
    pub id: TransactionId,
    /// Changes in the order they were made.
    pub changes: Vec<Change>,
}

impl Transaction {
    /// Returns `true` if every change targets `control_file`.
    #[must_use]
    pub fn only_in(&self, control_file: ControlFileId) -> bool {
        self.changes.iter().all(|c| c.control_file == control_file)
    }
}

/// Append-only journal of transactions.
///
/// A successful write seals the log: [`reset`](crate::Model::reset) stops
/// at the seal, [`undo`](crate::Model::undo) can step past it.
#[derive(Debug, Clone, Default)]
pub struct ChangeLog {
    transactions: Vec<Transaction>,
    open: Option<Transaction>,
    sealed: usize,
    next_id: u32,
}

impl ChangeLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a transaction. Nested calls join the open one.
    pub(crate) fn begin(&mut self) -> bool {
        if self.open.is_some() {
            return false;
        }
        let id = TransactionId(self.next_id);
        self.next_id += 1;
        self.open = Some(Transaction {
            id,
            changes: Vec::new(),
        });
        true
    }

    /// Records a change in the open transaction.
    pub(crate) fn record(&mut self, change: Change) {
        match &mut self.open {
            Some(tx) => tx.changes.push(change),
            None => {
                let id = TransactionId(self.next_id);
                self.next_id += 1;
                self.transactions.push(Transaction {
                    id,
                    changes: vec![change],
                });
            }
        }
    }

    /// Closes the open transaction; empty transactions are dropped.
    pub(crate) fn commit(&mut self) {
        if let Some(tx) = self.open.take() {
            if !tx.changes.is_empty() {
                self.transactions.push(tx);
            }
        }
    }

    /// Takes the open transaction back out, for rollback.
    pub(crate) fn abandon(&mut self) -> Option<Transaction> {
        self.open.take()
    }

    /// Removes the most recent transaction, optionally the most recent one
    /// that only touches `control_file`.
    pub(crate) fn pop(&mut self, control_file: Option<ControlFileId>) -> Option<Transaction> {
        let index = match control_file {
            None => self.transactions.len().checked_sub(1)?,
            Some(cf) => self.transactions.iter().rposition(|tx| tx.only_in(cf))?,
        };
        let tx = self.transactions.remove(index);
        if index < self.sealed {
            self.sealed -= 1;
        }
        Some(tx)
    }

    /// Returns `true` if the most recent matching transaction was recorded
    /// after the last seal.
    pub(crate) fn has_unsealed(&self, control_file: Option<ControlFileId>) -> bool {
        let index = match control_file {
            None => self.transactions.len().checked_sub(1),
            Some(cf) => self.transactions.iter().rposition(|tx| tx.only_in(cf)),
        };
        index.is_some_and(|i| i >= self.sealed)
    }

    /// Marks everything recorded so far as written.
    pub(crate) fn seal(&mut self) {
        self.sealed = self.transactions.len();
    }

    /// Recorded transactions, oldest first.
    #[must_use]
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    /// Number of transactions covered by the last seal.
    #[must_use]
    pub fn sealed(&self) -> usize {
        self.sealed
    }

    /// Returns `true` if there is nothing to undo.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn change(cf: u32, input: u32) -> Change {
        Change {
            kind: ChangeKind::AddInput,
            control_file: ControlFileId(cf),
            input: InputId(input),
            prior: PriorState::Added,
            conditions: Vec::new(),
        }
    }

    #[test]
    fn test_transactions_group_changes() {
        let mut log = ChangeLog::new();
        assert!(log.begin());
        assert!(!log.begin());
        log.record(change(0, 1));
        log.record(change(0, 2));
        log.commit();
        log.begin();
        log.commit();
        assert_eq!(log.transactions().len(), 1);
        assert_eq!(log.transactions()[0].changes.len(), 2);
    }

    #[test]
    fn test_pop_restricted_to_control_file() {
        let mut log = ChangeLog::new();
        log.record(change(0, 1));
        log.record(change(1, 2));
        let tx = log.pop(Some(ControlFileId(0))).unwrap();
        assert_eq!(tx.changes[0].input, InputId(1));
        assert_eq!(log.transactions().len(), 1);
        assert!(log.pop(Some(ControlFileId(0))).is_none());
    }

    #[test]
    fn test_seal_limits_reset_not_undo() {
        let mut log = ChangeLog::new();
        log.record(change(0, 1));
        log.seal();
        assert!(!log.has_unsealed(None));
        log.record(change(0, 2));
        assert!(log.has_unsealed(None));
        log.pop(None);
        assert!(!log.has_unsealed(None));
        assert!(log.pop(None).is_some());
        assert_eq!(log.sealed(), 0);
    }
}
