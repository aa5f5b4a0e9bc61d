//! Progress counters for a root's initial scan.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Atomic progress of one initial scan.
#[derive(Debug, Default)]
pub struct ScanProgress {
    /// Files handed to the indexer
    discovered: AtomicU64,
    /// Files whose change event finished processing
    indexed: AtomicU64,
    /// The walk is over, `discovered` will not grow any more
    discovery_finished: AtomicBool,
}

/// Point-in-time view of [`ScanProgress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub discovered: u64,
    pub indexed: u64,
    pub done: bool,
}

impl ProgressSnapshot {
    /// Completion percentage (0 - 100).
    pub fn percent(&self) -> u8 {
        match (self.discovered, self.done) {
            (_, true) => 100,
            (0, false) => 0,
            (total, false) => (self.indexed.min(total) * 100 / total) as u8,
        }
    }
}

impl ScanProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file_discovered(&self) {
        self.discovered.fetch_add(1, Ordering::AcqRel);
    }

    pub fn file_indexed(&self) {
        self.indexed.fetch_add(1, Ordering::AcqRel);
    }

    pub fn finish_discovery(&self) {
        self.discovery_finished.store(true, Ordering::Release);
    }

    pub fn is_done(&self) -> bool {
        self.snapshot().done
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        // Read the flag first: once set, `discovered` is final
        let finished = self.discovery_finished.load(Ordering::Acquire);
        let discovered = self.discovered.load(Ordering::Acquire);
        let indexed = self.indexed.load(Ordering::Acquire);
        ProgressSnapshot {
            discovered,
            indexed,
            done: finished && indexed >= discovered,
        }
    }
}
