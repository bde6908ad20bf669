use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::action::ActionRecord;

/// Undo history limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum undo entries kept; the oldest are evicted first. `0` is unbounded.
    pub max_depth: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { max_depth: 100 }
    }
}

/// Two LIFO stacks of [`ActionRecord`]s.
///
/// Popping hands the record to the caller; the caller pushes it to the
/// opposite stack after a successful replay, or restores it to the stack it
/// came from when the replay fails.
#[derive(Debug, Clone, Default)]
pub struct ActionLog {
    undo: VecDeque<ActionRecord>,
    redo: Vec<ActionRecord>,
    config: HistoryConfig,
}

impl ActionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: HistoryConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Records a fresh mutation. Clears the redo stack.
    pub fn record(&mut self, record: ActionRecord) {
        log::debug!("history: recorded '{}'", record.description());
        self.push_undo(record);
        self.redo.clear();
    }

    pub fn pop_undo(&mut self) -> Option<ActionRecord> {
        self.undo.pop_back()
    }

    pub fn pop_redo(&mut self) -> Option<ActionRecord> {
        self.redo.pop()
    }

    /// Pushes a record that was just redone, keeping the redo stack intact.
    pub fn push_undo(&mut self, record: ActionRecord) {
        self.undo.push_back(record);
        if self.config.max_depth > 0 {
            while self.undo.len() > self.config.max_depth {
                if let Some(evicted) = self.undo.pop_front() {
                    log::debug!("history: evicted '{}'", evicted.description());
                }
            }
        }
    }

    /// Pushes a record that was just undone.
    pub fn push_redo(&mut self, record: ActionRecord) {
        self.redo.push(record);
    }

    /// Puts back a record whose undo failed.
    pub fn restore_undo(&mut self, record: ActionRecord) {
        self.undo.push_back(record);
    }

    /// Puts back a record whose redo failed.
    pub fn restore_redo(&mut self, record: ActionRecord) {
        self.redo.push(record);
    }

    /// Rewrites every record on both stacks that mentions `old`.
    pub fn rebind(&mut self, old: &str, new: &str) {
        for record in self.undo.iter_mut().chain(self.redo.iter_mut()) {
            if record.references(old) {
                *record = record.rebind(old, new);
            }
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn undo_description(&self) -> Option<String> {
        self.undo.back().map(ActionRecord::description)
    }

    pub fn redo_description(&self) -> Option<String> {
        self.redo.last().map(ActionRecord::description)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        log::debug!("history: cleared");
    }
}
