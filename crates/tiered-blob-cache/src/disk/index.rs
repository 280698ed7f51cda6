//! Approximate existence index
//!
//! Answers "could a file with this name exist?" without touching the
//! filesystem. Presence is only a hint and may be stale; a negative from a
//! built index is fast-path only, and callers reconcile it against the
//! real filesystem before trusting a miss.

use std::collections::HashSet;

#[derive(Debug)]
pub(super) enum ExistenceIndex {
    /// Initial directory scan in flight. Everything is "maybe present";
    /// names recorded meanwhile are kept and merged when the scan lands.
    Building { pending: HashSet<String> },
    /// Scan complete. The set may drift from the directory between
    /// cleanups.
    Ready(HashSet<String>),
    /// Scan failed; every lookup falls through to the filesystem.
    Disabled,
}

impl ExistenceIndex {
    pub fn new() -> Self {
        ExistenceIndex::Building {
            pending: HashSet::new(),
        }
    }

    /// False only when a completed scan has no trace of the name.
    pub fn believes_present(&self, name: &str) -> bool {
        match self {
            ExistenceIndex::Ready(names) => names.contains(name),
            ExistenceIndex::Building { .. } | ExistenceIndex::Disabled => true,
        }
    }

    pub fn record(&mut self, name: String) {
        match self {
            ExistenceIndex::Building { pending } => {
                pending.insert(name);
            }
            ExistenceIndex::Ready(names) => {
                names.insert(name);
            }
            ExistenceIndex::Disabled => {}
        }
    }

    pub fn forget(&mut self, name: &str) {
        match self {
            ExistenceIndex::Building { pending } => {
                pending.remove(name);
            }
            ExistenceIndex::Ready(names) => {
                names.remove(name);
            }
            ExistenceIndex::Disabled => {}
        }
    }

    /// Publish the initial scan, merging names recorded while it ran.
    pub fn complete(&mut self, mut listing: HashSet<String>) {
        if let ExistenceIndex::Building { pending } = self {
            listing.extend(pending.drain());
            *self = ExistenceIndex::Ready(listing);
        }
    }

    /// Give up on indexing for the lifetime of the instance.
    pub fn disable(&mut self) {
        if let ExistenceIndex::Building { .. } = self {
            *self = ExistenceIndex::Disabled;
        }
    }

    /// Reset after the backing directory was recreated empty.
    pub fn reset_empty(&mut self) {
        *self = ExistenceIndex::Ready(HashSet::new());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_building_assumes_present() {
        let index = ExistenceIndex::new();
        assert!(index.believes_present("anything"));
    }

    #[test]
    fn test_ready_answers_negatives() {
        let mut index = ExistenceIndex::new();
        index.complete(HashSet::from(["aaa".to_string()]));
        assert!(index.believes_present("aaa"));
        assert!(!index.believes_present("bbb"));
    }

    #[test]
    fn test_complete_merges_pending_records() {
        let mut index = ExistenceIndex::new();
        index.record("written-during-scan".to_string());
        index.complete(HashSet::from(["scanned".to_string()]));
        assert!(index.believes_present("written-during-scan"));
        assert!(index.believes_present("scanned"));
        assert!(!index.believes_present("other"));
    }

    #[test]
    fn test_forget() {
        let mut index = ExistenceIndex::new();
        index.complete(HashSet::from(["aaa".to_string()]));
        index.forget("aaa");
        assert!(!index.believes_present("aaa"));
    }

    #[test]
    fn test_disabled_assumes_present() {
        let mut index = ExistenceIndex::new();
        index.disable();
        assert!(index.believes_present("anything"));
        // A disabled index stays disabled.
        index.complete(HashSet::new());
        assert!(index.believes_present("anything"));
    }

    #[test]
    fn test_reset_empty_clears_names() {
        let mut index = ExistenceIndex::new();
        index.complete(HashSet::from(["aaa".to_string()]));
        index.reset_empty();
        assert!(!index.believes_present("aaa"));
    }
}
