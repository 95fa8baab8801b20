//! Undo and redo history.
//!
//! An entry is one request group: a single message, a bundle, or the replay
//! of an earlier entry. It keeps the inverse messages of each event so the
//! whole group can be reversed in one step.

use crate::events::Mode;
use ensemble_core::Uri;
use ensemble_protocol::Message;
use std::collections::VecDeque;

/// Inverses of one request group.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UndoEntry {
    /// One list per event, in the order the events ran.
    events: Vec<Vec<Message>>,
    /// Set when the group was a single-property edit.
    merge_key: Option<(Uri, Uri)>,
}

impl UndoEntry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_event(&mut self, inverse: Vec<Message>) {
        if !inverse.is_empty() {
            self.events.push(inverse);
        }
    }

    pub fn set_merge_key(&mut self, key: Option<(Uri, Uri)>) {
        self.merge_key = key;
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn num_events(&self) -> usize {
        self.events.len()
    }

    /// Messages that reverse the group: events last to first, each event's
    /// inverse in its own order.
    pub fn replay(&self) -> impl Iterator<Item = &Message> {
        self.events.iter().rev().flatten()
    }
}

/// A bounded stack of entries; the oldest falls off the bottom.
#[derive(Debug)]
pub struct UndoStack {
    entries: VecDeque<UndoEntry>,
    depth: usize,
}

impl UndoStack {
    pub fn new(depth: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            depth: depth.max(1),
        }
    }

    /// Push `entry`. Empty entries are dropped. With `merge`, an entry with
    /// the same merge key as the top collapses into it: the top already
    /// restores the state from before the first edit.
    pub fn push(&mut self, entry: UndoEntry, merge: bool) -> bool {
        if entry.is_empty() {
            return false;
        }
        if merge
            && entry.merge_key.is_some()
            && self.entries.back().map(|top| &top.merge_key) == Some(&entry.merge_key)
        {
            return false;
        }
        self.entries.push_back(entry);
        if self.entries.len() > self.depth {
            self.entries.pop_front();
        }
        true
    }

    pub fn pop(&mut self) -> Option<UndoEntry> {
        self.entries.pop_back()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Undo and redo stacks together.
#[derive(Debug)]
pub struct History {
    undo: UndoStack,
    redo: UndoStack,
}

impl History {
    pub fn new(depth: usize) -> Self {
        Self {
            undo: UndoStack::new(depth),
            redo: UndoStack::new(depth),
        }
    }

    /// File the entry produced by a group run in `mode`.
    pub(crate) fn record(&mut self, mode: Mode, entry: UndoEntry) {
        match mode {
            Mode::Normal => {
                if entry.is_empty() {
                    return;
                }
                self.undo.push(entry, true);
                self.redo.clear();
            }
            Mode::Undo => {
                self.redo.push(entry, false);
            }
            Mode::Redo => {
                self.undo.push(entry, false);
            }
        }
    }

    /// The entry an undo (or redo) request should replay.
    pub(crate) fn take(&mut self, mode: Mode) -> Option<UndoEntry> {
        match mode {
            Mode::Undo => self.undo.pop(),
            Mode::Redo => self.redo.pop(),
            Mode::Normal => None,
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
}
