//! In-memory word <-> fingerprint index.
//!
//! Rows are keyed by content fingerprint rather than by path, so files
//! with identical content share one set of rows. The reverse mapping
//! (fingerprint -> words) is what makes a fingerprint "indexed" and is
//! used to delete its rows.

use crate::fingerprint::Fingerprint;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use tracing::{debug, trace};

#[derive(Debug, Default)]
pub struct WordIndex {
    words: DashMap<String, HashSet<Fingerprint>>,
    reverse: DashMap<Fingerprint, HashSet<String>>,
}

impl WordIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write rows for `fingerprint`. Returns `false` if it was already indexed.
    pub fn insert(&self, fingerprint: Fingerprint, words: HashSet<String>) -> bool {
        // Forward rows are written before the reverse entry becomes visible
        match self.reverse.entry(fingerprint) {
            Entry::Occupied(_) => false,
            Entry::Vacant(vacant) => {
                for word in &words {
                    self.words.entry(word.clone()).or_default().insert(fingerprint);
                }
                debug!(fingerprint = %fingerprint, words = words.len(), "Indexed content");
                vacant.insert(words);
                true
            }
        }
    }

    /// Delete every row of `fingerprint`. Returns `false` if it was not indexed.
    pub fn remove(&self, fingerprint: &Fingerprint) -> bool {
        let Some((_, words)) = self.reverse.remove(fingerprint) else {
            return false;
        };
        for word in &words {
            if let Entry::Occupied(mut entry) = self.words.entry(word.clone()) {
                entry.get_mut().remove(fingerprint);
                if entry.get().is_empty() {
                    entry.remove();
                }
            }
        }
        debug!(fingerprint = %fingerprint, words = words.len(), "Removed content from index");
        true
    }

    /// True iff reverse rows exist for `fingerprint`, regardless of owners.
    pub fn is_indexed(&self, fingerprint: &Fingerprint) -> bool {
        self.reverse.contains_key(fingerprint)
    }

    /// Fingerprints whose content contains `word`.
    pub fn query(&self, word: &str) -> HashSet<Fingerprint> {
        trace!(word, "Querying word index");
        self.words
            .get(word)
            .map(|fingerprints| fingerprints.clone())
            .unwrap_or_default()
    }

    /// Number of indexed fingerprints.
    pub fn content_count(&self) -> usize {
        self.reverse.len()
    }

    /// Number of distinct words.
    pub fn word_count(&self) -> usize {
        self.words.len()
    }
}
