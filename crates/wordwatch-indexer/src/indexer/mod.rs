//! Change-event driven file indexer.
//!
//! Consumes timestamped UPDATE/DELETE events and keeps the word index in
//! sync with file contents:
//! - events older than the newest accepted event of a path are dropped
//! - identical contents are tokenized once and shared by all owning paths
//! - content that loses its last owner is evicted after a grace period,
//!   unless a path with the same content shows up again in the meantime

mod event;
mod eviction;
mod locks;

pub use event::{ChangeEvent, ChangeKind, EventSink};

use crate::clock::Timestamp;
use crate::config::IndexerConfig;
use crate::fingerprint::{ContentFingerprinter, Fingerprint};
use crate::tokenizer::Tokenizer;
use crate::word_index::WordIndex;
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use eviction::EvictionScheduler;
use locks::PathLocks;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace};

/// Tuning knobs of [`FileChangeIndexer`].
#[derive(Debug, Clone)]
pub struct IndexerOptions {
    /// Change events processed concurrently
    pub workers: usize,
    /// Grace period before ownerless content is evicted
    pub eviction_ttl: Duration,
    /// How long the last accepted event time of a path is kept
    pub last_event_ttl: Duration,
}

impl Default for IndexerOptions {
    fn default() -> Self {
        Self::from(&IndexerConfig::default())
    }
}

impl From<&IndexerConfig> for IndexerOptions {
    fn from(config: &IndexerConfig) -> Self {
        Self {
            workers: config.index_workers.max(1),
            eviction_ttl: config.eviction_ttl(),
            last_event_ttl: config.last_event_ttl(),
        }
    }
}

/// Counters describing the index contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexStats {
    /// Paths with a known fingerprint
    pub files: usize,
    /// Distinct indexed contents
    pub contents: usize,
    /// Distinct words
    pub words: usize,
    /// Contents waiting for eviction
    pub pending_evictions: usize,
}

/// Marks a fingerprint as being tokenized for as long as it lives.
struct ComputationGuard<'a> {
    computing: &'a DashSet<Fingerprint>,
    fingerprint: Fingerprint,
}

impl<'a> ComputationGuard<'a> {
    fn acquire(computing: &'a DashSet<Fingerprint>, fingerprint: Fingerprint) -> Option<Self> {
        computing.insert(fingerprint).then_some(Self {
            computing,
            fingerprint,
        })
    }
}

impl Drop for ComputationGuard<'_> {
    fn drop(&mut self) {
        self.computing.remove(&self.fingerprint);
    }
}

/// Incremental word index over a changing set of files.
///
/// Lock order is `owners` before `evictions` and the word index. No code
/// path holds entries of `path_fingerprints` and `owners` at the same time.
pub struct FileChangeIndexer {
    tokenizer: Arc<dyn Tokenizer>,
    fingerprinter: Arc<dyn ContentFingerprinter>,
    word_index: WordIndex,
    /// Newest accepted event time per path
    last_events: DashMap<PathBuf, Timestamp>,
    path_fingerprints: DashMap<PathBuf, Fingerprint>,
    /// Paths currently holding each content; entries are never empty
    owners: DashMap<Fingerprint, HashSet<PathBuf>>,
    computing: DashSet<Fingerprint>,
    evictions: EvictionScheduler,
    path_locks: PathLocks,
    options: IndexerOptions,
    runtime: Handle,
}

impl FileChangeIndexer {
    /// Create an indexer bound to the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new(
        tokenizer: Arc<dyn Tokenizer>,
        fingerprinter: Arc<dyn ContentFingerprinter>,
        options: IndexerOptions,
    ) -> Arc<Self> {
        Self::with_runtime(tokenizer, fingerprinter, options, Handle::current())
    }

    /// Create an indexer that schedules its timers on `runtime`.
    pub fn with_runtime(
        tokenizer: Arc<dyn Tokenizer>,
        fingerprinter: Arc<dyn ContentFingerprinter>,
        options: IndexerOptions,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            tokenizer,
            fingerprinter,
            word_index: WordIndex::new(),
            last_events: DashMap::new(),
            path_fingerprints: DashMap::new(),
            owners: DashMap::new(),
            computing: DashSet::new(),
            evictions: EvictionScheduler::new(),
            path_locks: PathLocks::new(),
            options,
            runtime,
        })
    }

    /// Consume `events` until every sender is gone.
    ///
    /// Admission happens in arrival order; admitted events are processed on
    /// the blocking pool, at most `workers` at a time. A companion task
    /// forgets stale per-path event times while the indexer is alive.
    pub fn start(self: &Arc<Self>, mut events: UnboundedReceiver<ChangeEvent>) -> JoinHandle<()> {
        self.spawn_sweeper();

        let indexer = Arc::clone(self);
        let workers = Arc::new(Semaphore::new(self.options.workers.max(1)));
        self.runtime.spawn(async move {
            while let Some(event) = events.recv().await {
                trace!(
                    path = ?event.path,
                    kind = ?event.kind,
                    timestamp = %event.timestamp,
                    "Got change event"
                );
                if !indexer.admit(&event) {
                    trace!(path = ?event.path, "Dropping out-of-order event");
                    event.complete();
                    continue;
                }

                let Ok(permit) = Arc::clone(&workers).acquire_owned().await else {
                    break;
                };
                let indexer = Arc::clone(&indexer);
                tokio::task::spawn_blocking(move || {
                    indexer.process(event);
                    drop(permit);
                });
            }
            debug!("Change event stream closed");
        })
    }

    fn spawn_sweeper(self: &Arc<Self>) {
        let indexer = Arc::downgrade(self);
        let period = self.options.last_event_ttl.max(Duration::from_millis(1));
        self.runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let Some(indexer) = indexer.upgrade() else {
                    break;
                };
                let removed = indexer.sweep_last_events();
                if removed > 0 {
                    debug!(removed, "Forgot stale event times");
                }
            }
        });
    }

    /// Record the event's timestamp if it is the newest seen for its path.
    /// Returns `false` for events older than one already accepted.
    pub fn admit(&self, event: &ChangeEvent) -> bool {
        let mut latest = self
            .last_events
            .entry(event.path.clone())
            .or_insert(event.timestamp);
        if *latest < event.timestamp {
            *latest = event.timestamp;
        }
        *latest == event.timestamp
    }

    /// Admit and process an event on the calling thread.
    pub fn handle(self: &Arc<Self>, event: ChangeEvent) -> bool {
        if !self.admit(&event) {
            event.complete();
            return false;
        }
        self.process(event);
        true
    }

    /// Apply an admitted event. Blocking.
    pub fn process(self: &Arc<Self>, event: ChangeEvent) {
        self.path_locks.with_lock(&event.path, || {
            // A newer event may have been admitted while this one waited
            if !self.is_latest(&event) {
                debug!(path = ?event.path, "Superseded by a newer event");
                return;
            }
            match event.kind {
                ChangeKind::Update => self.update(&event.path),
                ChangeKind::Delete => self.delete(&event.path),
            }
        });
        event.complete();
    }

    fn is_latest(&self, event: &ChangeEvent) -> bool {
        self.last_events
            .get(&event.path)
            .map_or(true, |latest| *latest == event.timestamp)
    }

    fn update(self: &Arc<Self>, path: &Path) {
        // Symlinks, directories and vanished files are all skipped here
        let is_file = fs::symlink_metadata(path).is_ok_and(|m| m.is_file());
        if !is_file {
            debug!(path = ?path, "Not a regular file, skipping");
            return;
        }

        let fingerprint = self.fingerprinter.fingerprint(path);
        if fingerprint.is_empty() {
            debug!(path = ?path, "File is gone, skipping");
            return;
        }

        let previous = self.path_fingerprints.get(path).map(|fp| *fp);
        if previous == Some(fingerprint) {
            trace!(path = ?path, "Content unchanged");
            return;
        }
        if let Some(previous) = previous {
            self.release_owner(previous, path);
        }

        if self.evictions.cancel(&fingerprint) {
            debug!(path = ?path, fingerprint = %fingerprint, "Reclaimed content pending eviction");
        }
        self.path_fingerprints.insert(path.to_path_buf(), fingerprint);
        self.owners
            .entry(fingerprint)
            .or_default()
            .insert(path.to_path_buf());

        if self.word_index.is_indexed(&fingerprint) {
            debug!(path = ?path, fingerprint = %fingerprint, "Content already indexed");
            return;
        }

        self.index_content(path, fingerprint);
    }

    /// Write rows for `fingerprint`, reading the content from `path` or,
    /// failing that, from any other current owner.
    fn index_content(&self, path: &Path, fingerprint: Fingerprint) {
        let mut tried = HashSet::new();
        let mut source = Some(path.to_path_buf());
        while let Some(candidate) = source.take() {
            {
                let Some(_computing) = ComputationGuard::acquire(&self.computing, fingerprint)
                else {
                    debug!(path = ?path, fingerprint = %fingerprint, "Indexed by another task");
                    return;
                };
                if self.word_index.is_indexed(&fingerprint)
                    || self.index_from(&candidate, fingerprint)
                {
                    return;
                }
                tried.insert(candidate);
            }
            // Owners that lost the guard race rely on this task to index the content
            source = self
                .owners_of(&fingerprint)
                .into_iter()
                .find(|owner| !tried.contains(owner));
            if let Some(owner) = &source {
                debug!(path = ?owner, fingerprint = %fingerprint, "Retrying with another owner");
            }
        }
    }

    /// Read and tokenize `path`. Returns `false` when its bytes no longer
    /// match `fingerprint`.
    fn index_from(&self, path: &Path, fingerprint: Fingerprint) -> bool {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!(path = ?path, error = %e, "Failed to read file");
                return false;
            }
        };
        if self.fingerprinter.digest(&bytes) != fingerprint {
            debug!(path = ?path, "File changed while indexing");
            return false;
        }

        let words = self.tokenizer.tokenize(&String::from_utf8_lossy(&bytes));
        self.commit(path, fingerprint, words);
        true
    }

    fn commit(&self, path: &Path, fingerprint: Fingerprint, words: HashSet<String>) {
        // Holding the owner entry keeps eviction out until the rows are written
        let Some(owners) = self.owners.get(&fingerprint) else {
            debug!(path = ?path, fingerprint = %fingerprint, "Content lost its owners");
            return;
        };
        let word_count = words.len();
        self.word_index.insert(fingerprint, words);
        drop(owners);
        debug!(path = ?path, fingerprint = %fingerprint, words = word_count, "Indexed file");
    }

    fn delete(self: &Arc<Self>, path: &Path) {
        match self.path_fingerprints.remove(path) {
            Some((_, fingerprint)) => {
                self.release_owner(fingerprint, path);
                debug!(path = ?path, "Removed file from index");
            }
            None => trace!(path = ?path, "Deleted file was not indexed"),
        }
    }

    /// Drop `path` from the owners of `fingerprint`, scheduling eviction
    /// when no owner is left.
    fn release_owner(self: &Arc<Self>, fingerprint: Fingerprint, path: &Path) {
        let orphaned = match self.owners.entry(fingerprint) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().remove(path);
                if entry.get().is_empty() {
                    entry.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => {
                self.word_index.is_indexed(&fingerprint) && !self.evictions.is_pending(&fingerprint)
            }
        };
        if orphaned {
            self.schedule_eviction(fingerprint);
        }
    }

    fn schedule_eviction(self: &Arc<Self>, fingerprint: Fingerprint) {
        let (id, cancelled) = self.evictions.register(fingerprint);
        let indexer: Weak<Self> = Arc::downgrade(self);
        let ttl = self.options.eviction_ttl;
        debug!(fingerprint = %fingerprint, ttl_ms = ttl.as_millis(), "Scheduled eviction");

        self.runtime.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(ttl) => {
                    if let Some(indexer) = indexer.upgrade() {
                        indexer.evict(fingerprint, id);
                    }
                }
            }
        });
    }

    fn evict(&self, fingerprint: Fingerprint, id: u64) {
        let entry = self.owners.entry(fingerprint);
        if matches!(entry, Entry::Occupied(_)) {
            self.evictions.claim(&fingerprint, id);
            debug!(fingerprint = %fingerprint, "Content has owners again, keeping it");
            return;
        }
        if !self.evictions.claim(&fingerprint, id) {
            trace!(fingerprint = %fingerprint, "Eviction was cancelled");
            return;
        }
        if self.word_index.remove(&fingerprint) {
            info!(fingerprint = %fingerprint, "Evicted unowned content");
        }
        drop(entry);
    }

    /// Paths whose current content contains `word`.
    pub fn query(&self, word: &str) -> HashSet<PathBuf> {
        if word.is_empty() {
            return HashSet::new();
        }
        self.word_index
            .query(word)
            .iter()
            .filter_map(|fingerprint| self.owners.get(fingerprint).map(|o| o.value().clone()))
            .flatten()
            .collect()
    }

    /// Whether rows for `fingerprint` exist in the word index.
    pub fn is_fingerprint_indexed(&self, fingerprint: &Fingerprint) -> bool {
        self.word_index.is_indexed(fingerprint)
    }

    /// Fingerprint currently recorded for `path`.
    pub fn fingerprint_of(&self, path: &Path) -> Option<Fingerprint> {
        self.path_fingerprints.get(path).map(|fp| *fp)
    }

    /// Paths currently holding `fingerprint`.
    pub fn owners_of(&self, fingerprint: &Fingerprint) -> HashSet<PathBuf> {
        self.owners
            .get(fingerprint)
            .map(|o| o.value().clone())
            .unwrap_or_default()
    }

    pub fn has_pending_eviction(&self, fingerprint: &Fingerprint) -> bool {
        self.evictions.is_pending(fingerprint)
    }

    /// Known paths equal to or below `root`.
    pub fn known_paths_under(&self, root: &Path) -> Vec<PathBuf> {
        self.path_fingerprints
            .iter()
            .filter(|entry| entry.key().starts_with(root))
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Forget event times older than the configured TTL.
    pub fn sweep_last_events(&self) -> usize {
        let now = Timestamp::now().as_nanos();
        let ttl = self.options.last_event_ttl.as_nanos() as u64;
        let before = self.last_events.len();
        self.last_events
            .retain(|_, latest| now.saturating_sub(latest.as_nanos()) < ttl);
        before.saturating_sub(self.last_events.len())
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            files: self.path_fingerprints.len(),
            contents: self.word_index.content_count(),
            words: self.word_index.word_count(),
            pending_evictions: self.evictions.len(),
        }
    }
}
