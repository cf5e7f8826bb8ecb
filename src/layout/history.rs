// src/layout/history.rs

/// Ordered snapshots plus a cursor pointing at the live one.
///
/// The stack is never empty: it is seeded with the initial snapshot, so the
/// cursor is always a valid index. Pushing after an undo discards the
/// entries past the cursor. When `limit` is reached the oldest entry is
/// dropped.
#[derive(Debug, Clone)]
pub struct History<T: Clone> {
    entries: Vec<T>,
    cursor: usize,
    limit: usize,
}

impl<T: Clone> History<T> {
    pub fn new(initial: T, limit: usize) -> Self {
        Self {
            entries: vec![initial],
            cursor: 0,
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, snapshot: T) {
        self.entries.truncate(self.cursor + 1);
        self.entries.push(snapshot);
        if self.entries.len() > self.limit {
            let overflow = self.entries.len() - self.limit;
            self.entries.drain(..overflow);
        }
        self.cursor = self.entries.len() - 1;
    }

    pub fn undo(&mut self) -> Option<T> {
        if !self.can_undo() {
            return None;
        }
        self.cursor -= 1;
        Some(self.entries[self.cursor].clone())
    }

    pub fn redo(&mut self) -> Option<T> {
        if !self.can_redo() {
            return None;
        }
        self.cursor += 1;
        Some(self.entries[self.cursor].clone())
    }

    pub fn can_undo(&self) -> bool {
        self.cursor > 0
    }

    pub fn can_redo(&self) -> bool {
        self.cursor + 1 < self.entries.len()
    }

    pub fn current(&self) -> &T {
        &self.entries[self.cursor]
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_stack_has_one_entry_and_cannot_undo() {
        let mut history = History::new("initial", 10);
        assert_eq!(history.len(), 1);
        assert_eq!(history.cursor(), 0);
        assert_eq!(history.undo(), None);
        assert_eq!(history.cursor(), 0);
        assert_eq!(history.redo(), None);
    }

    #[test]
    fn undo_and_redo_walk_the_stack() {
        let mut history = History::new("initial", 10);
        history.push("A");
        history.push("B");
        assert_eq!(history.undo(), Some("A"));
        assert_eq!(history.undo(), Some("initial"));
        assert_eq!(history.redo(), Some("A"));
        assert_eq!(*history.current(), "A");
    }

    #[test]
    fn push_after_undo_discards_forward_entries() {
        let mut history = History::new("initial", 10);
        history.push("A");
        history.push("B");
        history.undo();
        history.push("C");
        assert_eq!(history.len(), 3);
        assert!(!history.can_redo());
        assert_eq!(history.undo(), Some("A"));
        assert_eq!(history.redo(), Some("C"));
    }

    #[test]
    fn limit_drops_oldest_entries() {
        let mut history = History::new(0, 3);
        for i in 1..=5 {
            history.push(i);
        }
        assert_eq!(history.len(), 3);
        assert_eq!(history.cursor(), 2);
        assert_eq!(history.undo(), Some(4));
        assert_eq!(history.undo(), Some(3));
        assert_eq!(history.undo(), None);
    }
}
