//! Watch root management.
//!
//! Keeps the set of watched roots an antichain under path-prefix order,
//! runs the initial scan of each new root and owns its notification
//! subscription. Registration calls are serialized; queries never wait on
//! them.

use crate::clock::Timestamp;
use crate::config::IndexerConfig;
use crate::filter::{AdmissionOptions, AdmissionPolicy};
use crate::fingerprint::Sha256Fingerprinter;
use crate::indexer::{ChangeEvent, EventSink, FileChangeIndexer, IndexerOptions};
use crate::scanner::{InitialScan, ProgressSnapshot, ScanProgress, Walker};
use crate::tokenizer;
use crate::watcher::RootSubscription;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Why a root could not be added or removed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WatchRejection {
    #[error("Path doesn't exist: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Symbolic links can't be watched: {}", .0.display())]
    Symlink(PathBuf),

    #[error("Only regular files and directories can be watched: {}", .0.display())]
    Unsupported(PathBuf),

    #[error("Already watching {}", .0.display())]
    AlreadyWatched(PathBuf),

    #[error("{} is already covered by watched root {}", .path.display(), .root.display())]
    CoveredBy { path: PathBuf, root: PathBuf },

    #[error("Not a watched root: {}", .0.display())]
    NotWatched(PathBuf),

    #[error("Failed to subscribe to {}: {reason}", .path.display())]
    Subscription { path: PathBuf, reason: String },
}

/// Result of a registration call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchOutcome {
    pub accepted: bool,
    pub message: String,
}

impl WatchOutcome {
    fn accepted(message: String) -> Self {
        Self {
            accepted: true,
            message,
        }
    }
}

impl From<WatchRejection> for WatchOutcome {
    fn from(rejection: WatchRejection) -> Self {
        Self {
            accepted: false,
            message: rejection.to_string(),
        }
    }
}

/// Shared, read-only facts about a watched root.
#[derive(Debug)]
struct WatchedRoot {
    root: PathBuf,
    policy: Arc<AdmissionPolicy>,
    progress: Arc<ScanProgress>,
}

/// Everything owned by one registered root.
struct RootWatch {
    watched: Arc<WatchedRoot>,
    sink: EventSink,
    subscription: RootSubscription,
    scan: JoinHandle<()>,
}

/// Owns watched roots and the indexer they feed.
pub struct WatchManager {
    indexer: Arc<FileChangeIndexer>,
    events: UnboundedSender<ChangeEvent>,
    registry: Mutex<HashMap<PathBuf, RootWatch>>,
    /// Read-mostly copy of the registry for listing and progress
    roots: RwLock<BTreeMap<PathBuf, Arc<WatchedRoot>>>,
    default_options: AdmissionOptions,
    scan_parallelism: usize,
}

impl WatchManager {
    /// Build a manager and its indexer from configuration.
    ///
    /// # Panics
    ///
    /// Panics if called outside of a tokio runtime.
    pub fn new(config: &IndexerConfig) -> Self {
        let indexer = FileChangeIndexer::new(
            tokenizer::from_kind(config.tokenizer),
            Arc::new(Sha256Fingerprinter),
            IndexerOptions::from(config),
        );
        Self::with_indexer(indexer, config)
    }

    /// Build a manager around an existing indexer and start its event loop.
    pub fn with_indexer(indexer: Arc<FileChangeIndexer>, config: &IndexerConfig) -> Self {
        let (events, rx) = mpsc::unbounded_channel();
        indexer.start(rx);
        Self {
            indexer,
            events,
            registry: Mutex::new(HashMap::new()),
            roots: RwLock::new(BTreeMap::new()),
            default_options: config.admission_options(),
            scan_parallelism: config.scan_parallelism.max(1),
        }
    }

    /// Watch `path` with the configured admission options.
    pub async fn start_watching(&self, path: &Path) -> WatchOutcome {
        let options = self.default_options.clone();
        self.start_watching_with(path, options).await
    }

    /// Watch `path`, admitting files according to `options`.
    pub async fn start_watching_with(
        &self,
        path: &Path,
        options: AdmissionOptions,
    ) -> WatchOutcome {
        let mut registry = self.registry.lock().await;

        let root = match validate_new_root(path) {
            Ok(root) => root,
            Err(rejection) => return rejection.into(),
        };
        if registry.contains_key(&root) {
            return WatchRejection::AlreadyWatched(root).into();
        }
        if let Some(ancestor) = registry.keys().find(|r| root.starts_with(r)) {
            return WatchRejection::CoveredBy {
                path: root.clone(),
                root: ancestor.clone(),
            }
            .into();
        }

        let mut absorbed: Vec<PathBuf> = registry
            .keys()
            .filter(|r| r.starts_with(&root))
            .cloned()
            .collect();
        absorbed.sort();
        for child in &absorbed {
            if let Some(watch) = registry.remove(child) {
                self.teardown(child, watch).await;
            }
        }

        let policy = Arc::new(AdmissionPolicy::for_root(&root, &options));
        let progress = Arc::new(ScanProgress::new());
        let sink = EventSink::new(self.events.clone());
        // Taken after absorption so the scan outranks the purge of absorbed roots
        let scan_timestamp = Timestamp::now();

        let subscription = match RootSubscription::start(
            &root,
            Arc::clone(&policy),
            sink.clone(),
            Arc::clone(&self.indexer),
            Handle::current(),
        ) {
            Ok(subscription) => subscription,
            Err(e) => {
                warn!(root = ?root, error = %e, "Failed to subscribe to notifications");
                return WatchRejection::Subscription {
                    path: root,
                    reason: e.to_string(),
                }
                .into();
            }
        };

        let watched = Arc::new(WatchedRoot {
            root: root.clone(),
            policy: Arc::clone(&policy),
            progress: Arc::clone(&progress),
        });
        self.roots.write().insert(root.clone(), Arc::clone(&watched));

        let scan = InitialScan::new(&root, policy, progress, scan_timestamp)
            .parallelism(self.scan_parallelism);
        let scan_sink = sink.clone();
        let scan = tokio::task::spawn_blocking(move || {
            scan.run(&scan_sink);
        });

        registry.insert(
            root.clone(),
            RootWatch {
                watched,
                sink,
                subscription,
                scan,
            },
        );
        info!(root = ?root, absorbed = absorbed.len(), "Started watching");

        let mut message = format!("Watching {}", root.display());
        if !absorbed.is_empty() {
            let names: Vec<String> = absorbed.iter().map(|p| p.display().to_string()).collect();
            message.push_str(&format!(", replacing [{}]", names.join(", ")));
        }
        WatchOutcome::accepted(message)
    }

    /// Stop watching an exact root and purge its files from the index.
    pub async fn stop_watching(&self, path: &Path) -> WatchOutcome {
        let mut registry = self.registry.lock().await;

        let root = normalize(path);
        let Some(watch) = registry.remove(&root) else {
            return WatchRejection::NotWatched(root).into();
        };
        let purged = self.teardown(&root, watch).await;
        WatchOutcome::accepted(format!(
            "Stopped watching {} ({} files removed)",
            root.display(),
            purged
        ))
    }

    /// Unsubscribe a root, wait for its scan and enqueue DELETE events for
    /// everything indexed or present under it. Returns the purge size.
    async fn teardown(&self, root: &Path, watch: RootWatch) -> usize {
        // After this no live event of the root can be stamped later than the purge
        watch.sink.close();
        drop(watch.subscription);
        if let Err(e) = watch.scan.await {
            warn!(root = ?root, error = %e, "Initial scan task failed");
        }
        self.roots.write().remove(root);

        let mut purge: BTreeSet<PathBuf> =
            self.indexer.known_paths_under(root).into_iter().collect();
        let walker = Walker::new(root, Arc::clone(&watch.watched.policy))
            .parallelism(self.scan_parallelism);
        match tokio::task::spawn_blocking(move || walker.walk()).await {
            Ok(paths) => purge.extend(paths),
            Err(e) => warn!(root = ?root, error = %e, "Failed to walk stopped root"),
        }

        for path in &purge {
            if self
                .events
                .send(ChangeEvent::delete(path.clone(), Timestamp::now()))
                .is_err()
            {
                warn!(root = ?root, "Indexer is gone, purge aborted");
                break;
            }
        }
        info!(root = ?root, purged = purge.len(), "Stopped watching");
        purge.len()
    }

    /// Watched files currently containing `word`.
    pub fn query_index(&self, word: &str) -> HashSet<PathBuf> {
        self.indexer.query(word)
    }

    pub fn list_watched_roots(&self) -> BTreeSet<PathBuf> {
        self.roots.read().keys().cloned().collect()
    }

    /// Initial scan progress of a watched root.
    pub fn progress(&self, root: &Path) -> Option<ProgressSnapshot> {
        let root = normalize(root);
        self.roots.read().get(&root).map(|w| w.progress.snapshot())
    }

    /// Whether every root has finished its initial scan.
    pub fn scans_complete(&self) -> bool {
        self.roots.read().values().all(|w| w.progress.is_done())
    }

    /// One printable line per root with scan state and filters.
    pub fn describe_roots(&self) -> Vec<String> {
        self.roots
            .read()
            .values()
            .map(|w| {
                let snapshot = w.progress.snapshot();
                let state = if snapshot.done {
                    format!("{} files", snapshot.indexed)
                } else {
                    format!("scanning {}%", snapshot.percent())
                };
                let filters = w.policy.to_string();
                if filters.is_empty() {
                    format!("{} ({})", w.root.display(), state)
                } else {
                    format!("{} ({}) {}", w.root.display(), state, filters)
                }
            })
            .collect()
    }

    pub fn indexer(&self) -> &Arc<FileChangeIndexer> {
        &self.indexer
    }
}

/// Absolute, symlink-resolved form of a candidate root.
fn validate_new_root(path: &Path) -> Result<PathBuf, WatchRejection> {
    let absolute =
        std::path::absolute(path).map_err(|_| WatchRejection::NotFound(path.to_path_buf()))?;
    let metadata =
        fs::symlink_metadata(&absolute).map_err(|_| WatchRejection::NotFound(absolute.clone()))?;
    if metadata.file_type().is_symlink() {
        return Err(WatchRejection::Symlink(absolute));
    }

    // Resolves `..` and symlinked ancestors
    let root = absolute
        .canonicalize()
        .map_err(|_| WatchRejection::NotFound(absolute.clone()))?;
    if !(metadata.is_file() || metadata.is_dir()) {
        return Err(WatchRejection::Unsupported(root));
    }
    Ok(root)
}

fn normalize(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::tempdir;

    fn manager() -> WatchManager {
        WatchManager::new(&IndexerConfig::default())
    }

    async fn wait_for_scans(manager: &WatchManager) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while !manager.scans_complete() {
            assert!(tokio::time::Instant::now() < deadline, "scan timed out");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_path_rejected() {
        let temp_dir = tempdir().unwrap();
        let outcome = manager().start_watching(&temp_dir.path().join("nope")).await;

        assert!(!outcome.accepted);
        assert!(outcome.message.starts_with("Path doesn't exist"));
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_symlinks_rejected() {
        let temp_dir = tempdir().unwrap();
        let target = temp_dir.path().join("target");
        fs::create_dir(&target).unwrap();
        let link = temp_dir.path().join("link");
        std::os::unix::fs::symlink(&target, &link).unwrap();
        let dangling = temp_dir.path().join("dangling");
        std::os::unix::fs::symlink(temp_dir.path().join("gone"), &dangling).unwrap();

        let manager = manager();
        for path in [&link, &dangling] {
            let outcome = manager.start_watching(path).await;
            assert!(!outcome.accepted);
            assert!(outcome.message.starts_with("Symbolic links can't be watched"));
        }
        assert!(manager.list_watched_roots().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_root_rejected() {
        let temp_dir = tempdir().unwrap();
        let manager = manager();

        assert!(manager.start_watching(temp_dir.path()).await.accepted);
        let outcome = manager.start_watching(temp_dir.path()).await;
        assert!(!outcome.accepted);
        assert!(outcome.message.starts_with("Already watching"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_descendant_of_root_rejected() {
        let temp_dir = tempdir().unwrap();
        let child = temp_dir.path().join("child");
        fs::create_dir(&child).unwrap();
        let manager = manager();

        assert!(manager.start_watching(temp_dir.path()).await.accepted);
        let outcome = manager.start_watching(&child).await;

        assert!(!outcome.accepted);
        let parent = temp_dir.path().canonicalize().unwrap();
        assert!(outcome.message.contains(&parent.display().to_string()));
        assert_eq!(manager.list_watched_roots(), BTreeSet::from([parent]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_ancestor_absorbs_children() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path().canonicalize().unwrap();
        let a = root.join("a");
        let b = root.join("b");
        fs::create_dir(&a).unwrap();
        fs::create_dir(&b).unwrap();
        let manager = manager();

        assert!(manager.start_watching(&a).await.accepted);
        assert!(manager.start_watching(&b).await.accepted);
        let outcome = manager.start_watching(&root).await;

        assert!(outcome.accepted);
        assert!(outcome.message.contains(&a.display().to_string()));
        assert!(outcome.message.contains(&b.display().to_string()));
        assert_eq!(manager.list_watched_roots(), BTreeSet::from([root]));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_stop_unknown_root_rejected() {
        let temp_dir = tempdir().unwrap();
        let outcome = manager().stop_watching(temp_dir.path()).await;

        assert!(!outcome.accepted);
        assert!(outcome.message.starts_with("Not a watched root"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_relative_and_dotted_paths_are_normalized() {
        let temp_dir = tempdir().unwrap();
        let sub = temp_dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        let manager = manager();

        assert!(manager.start_watching(&sub.join("..").join("sub")).await.accepted);
        assert_eq!(
            manager.list_watched_roots(),
            BTreeSet::from([sub.canonicalize().unwrap()])
        );
        assert!(manager.stop_watching(&sub).await.accepted);
        assert!(manager.list_watched_roots().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_progress_and_description() {
        let temp_dir = tempdir().unwrap();
        fs::create_dir(temp_dir.path().join("target")).unwrap();
        fs::write(temp_dir.path().join("a.txt"), "one two").unwrap();
        fs::write(temp_dir.path().join("target/b.txt"), "three").unwrap();

        let manager = manager();
        let options = AdmissionOptions::new(vec!["target".to_string()], Vec::new());
        assert!(manager.start_watching_with(temp_dir.path(), options).await.accepted);
        wait_for_scans(&manager).await;

        let snapshot = manager.progress(temp_dir.path()).unwrap();
        assert!(snapshot.done);
        assert_eq!(snapshot.discovered, 1);

        let lines = manager.describe_roots();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("excluded dirs - [target]"), "{}", lines[0]);
    }
}
