//! Cancellable, fingerprint-keyed eviction timers.

use crate::fingerprint::Fingerprint;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct PendingEviction {
    id: u64,
    cancel: CancellationToken,
}

/// Registry of pending evictions, at most one per fingerprint.
///
/// The timer task itself is owned by the indexer; this registry only decides
/// which timer is current. A timer may act only if [`EvictionScheduler::claim`]
/// succeeds with its own id.
#[derive(Debug, Default)]
pub(crate) struct EvictionScheduler {
    pending: DashMap<Fingerprint, PendingEviction>,
    next_id: AtomicU64,
}

impl EvictionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new timer for `fingerprint`, cancelling any previous one.
    pub fn register(&self, fingerprint: Fingerprint) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let previous = self.pending.insert(
            fingerprint,
            PendingEviction {
                id,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }
        (id, cancel)
    }

    /// Cancel the pending timer for `fingerprint`, if any.
    pub fn cancel(&self, fingerprint: &Fingerprint) -> bool {
        match self.pending.remove(fingerprint) {
            Some((_, pending)) => {
                pending.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Remove the timer `id` if it is still the current one for `fingerprint`.
    pub fn claim(&self, fingerprint: &Fingerprint, id: u64) -> bool {
        self.pending
            .remove_if(fingerprint, |_, pending| pending.id == id)
            .is_some()
    }

    pub fn is_pending(&self, fingerprint: &Fingerprint) -> bool {
        self.pending.contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }
}
