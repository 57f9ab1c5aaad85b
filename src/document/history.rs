//! Local undo and redo.
//!
//! Every local change records how to reverse the operations that support
//! it. Undoing replays those reversals as a new change, which records its
//! own reversals onto the redo stack.

use crate::crdt::primitive::Primitive;
use crate::crdt::primitives::TimeTicket;
use crate::document::value::Value;

/// Bound on each stack. The oldest entries fall off first.
pub const MAX_HISTORY_DEPTH: usize = 50;

/// One step of reversing a local operation. Targets that have since been
/// removed or collected are skipped when the step is replayed.
#[derive(Clone, Debug, PartialEq)]
pub enum Reverse {
    /// Write `value` back under `key`.
    SetKey {
        parent: TimeTicket,
        key: String,
        value: Value,
    },
    /// Remove whatever owns `key`.
    RemoveKey { parent: TimeTicket, key: String },
    /// Remove an array element added by the change being reversed.
    RemoveElement {
        parent: TimeTicket,
        created_at: TimeTicket,
    },
    /// Put a removed array element back after `prev_created_at`.
    InsertElement {
        parent: TimeTicket,
        prev_created_at: TimeTicket,
        value: Value,
    },
    Increase { counter: TimeTicket, delta: Primitive },
}

#[derive(Clone, Debug, Default)]
pub struct History {
    undo: Vec<Vec<Reverse>>,
    redo: Vec<Vec<Reverse>>,
}

impl History {
    pub fn new() -> History {
        return History::default();
    }

    pub fn push_undo(&mut self, entry: Vec<Reverse>) {
        push_bounded(&mut self.undo, entry);
    }

    pub fn push_redo(&mut self, entry: Vec<Reverse>) {
        push_bounded(&mut self.redo, entry);
    }

    pub fn pop_undo(&mut self) -> Option<Vec<Reverse>> {
        return self.undo.pop();
    }

    pub fn pop_redo(&mut self) -> Option<Vec<Reverse>> {
        return self.redo.pop();
    }

    pub fn clear_redo(&mut self) {
        self.redo.clear();
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    pub fn can_undo(&self) -> bool {
        return !self.undo.is_empty();
    }

    pub fn can_redo(&self) -> bool {
        return !self.redo.is_empty();
    }
}

fn push_bounded(stack: &mut Vec<Vec<Reverse>>, entry: Vec<Reverse>) {
    if entry.is_empty() {
        return;
    }
    if stack.len() >= MAX_HISTORY_DEPTH {
        stack.remove(0);
    }
    stack.push(entry);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stacks_are_bounded() {
        let mut history = History::new();
        for i in 0..(MAX_HISTORY_DEPTH + 5) {
            history.push_undo(vec![Reverse::RemoveKey {
                parent: TimeTicket::INITIAL,
                key: i.to_string(),
            }]);
        }
        history.push_undo(Vec::new());

        let mut count = 0;
        let mut last = None;
        while let Some(entry) = history.pop_undo() {
            count += 1;
            last = Some(entry);
        }
        assert_eq!(count, MAX_HISTORY_DEPTH);
        // The oldest five fell off.
        assert_eq!(
            last,
            Some(vec![Reverse::RemoveKey {
                parent: TimeTicket::INITIAL,
                key: "5".to_string(),
            }])
        );
        assert!(!history.can_undo());
    }
}
