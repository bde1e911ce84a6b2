//! The displayed memory view: capped, de-duplicated, most recent first.

use crate::entry::Entry;

/// Entries shown to the user (K).
pub const VIEW_CAPACITY: usize = 5;

#[derive(Debug, Clone)]
pub struct MemoryView {
    capacity: usize,
    /// Most recent first
    entries: Vec<Entry>,
}

impl Default for MemoryView {
    fn default() -> Self {
        Self::new(VIEW_CAPACITY)
    }
}

impl MemoryView {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: Vec::with_capacity(capacity + 1),
        }
    }

    /// Merge one entry. Returns false when it was already present or too
    /// old to make the cut.
    pub fn merge(&mut self, entry: Entry) -> bool {
        if self.entries.iter().any(|e| e.same_record(&entry)) {
            return false;
        }
        // Ties go in front of existing entries: the later arrival is newer.
        let pos = self
            .entries
            .iter()
            .position(|e| e.timestamp <= entry.timestamp)
            .unwrap_or(self.entries.len());
        if pos >= self.capacity {
            return false;
        }
        self.entries.insert(pos, entry);
        self.entries.truncate(self.capacity);
        true
    }

    /// Replace the contents wholesale (reconciliation).
    pub fn replace(&mut self, entries: Vec<Entry>) {
        self.entries.clear();
        let mut sorted = entries;
        // Stable: equal timestamps keep the store's order.
        sorted.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        for entry in sorted {
            if self.entries.len() == self.capacity {
                break;
            }
            if !self.entries.iter().any(|e| e.same_record(&entry)) {
                self.entries.push(entry);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
