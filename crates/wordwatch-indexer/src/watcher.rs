//! Live filesystem notifications for a watch root.
//!
//! Uses inotify on Linux and FSEvents on macOS through `notify`. Raw events
//! are translated into UPDATE/DELETE changes, filtered by the root's
//! admission policy and pushed through the root's [`EventSink`].

use crate::filter::AdmissionPolicy;
use crate::indexer::{ChangeKind, EventSink, FileChangeIndexer};
use crate::scanner::Walker;
use crate::IndexerError;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, trace, warn};

/// Active notification subscription of one root. Dropping it unsubscribes.
pub struct RootSubscription {
    root: PathBuf,
    _watcher: RecommendedWatcher,
}

impl RootSubscription {
    /// Subscribe to changes under `root`.
    ///
    /// Directories are watched recursively. A single file is watched through
    /// its parent directory so that editors replacing the file by rename are
    /// still observed; only events for the file itself are forwarded.
    pub fn start(
        root: &Path,
        policy: Arc<AdmissionPolicy>,
        sink: EventSink,
        indexer: Arc<FileChangeIndexer>,
        runtime: Handle,
    ) -> Result<Self, IndexerError> {
        let file_root = !root.is_dir();
        let forwarder = EventForwarder {
            root: root.to_path_buf(),
            file_root,
            policy,
            sink,
            indexer,
            runtime,
        };

        let mut watcher = notify::recommended_watcher(move |result: notify::Result<Event>| {
            forwarder.forward(result)
        })?;
        if file_root {
            let parent = root
                .parent()
                .ok_or_else(|| IndexerError::NotFound(root.to_path_buf()))?;
            watcher.watch(parent, RecursiveMode::NonRecursive)?;
        } else {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }

        info!(root = ?root, "Subscribed to filesystem notifications");
        Ok(Self {
            root: root.to_path_buf(),
            _watcher: watcher,
        })
    }
}

impl Drop for RootSubscription {
    fn drop(&mut self) {
        debug!(root = ?self.root, "Unsubscribed from filesystem notifications");
    }
}

/// Runs on the notification thread; must never block on the indexer.
struct EventForwarder {
    root: PathBuf,
    file_root: bool,
    policy: Arc<AdmissionPolicy>,
    sink: EventSink,
    indexer: Arc<FileChangeIndexer>,
    runtime: Handle,
}

impl EventForwarder {
    fn forward(&self, result: notify::Result<Event>) {
        let event = match result {
            Ok(event) => event,
            Err(e) => {
                warn!(root = ?self.root, error = %e, "Watcher error");
                return;
            }
        };
        if event.need_rescan() {
            warn!(root = ?self.root, "Filesystem events were dropped, index may be stale");
        }

        for (kind, path) in translate(&event) {
            let in_scope = if self.file_root {
                path == self.root
            } else {
                path.starts_with(&self.root)
            };
            if !in_scope {
                continue;
            }
            trace!(path = ?path, kind = ?kind, "File change detected");
            match kind {
                ChangeKind::Update => self.on_update(path),
                ChangeKind::Delete => self.on_delete(path),
            }
        }
    }

    fn on_update(&self, path: PathBuf) {
        let Ok(metadata) = fs::symlink_metadata(&path) else {
            // Already gone; its DELETE follows
            return;
        };

        if metadata.is_dir() {
            if !self.policy.accept_directory(&path) {
                return;
            }
            // Files may have landed in the directory before it was watched
            let walker = Walker::new(&path, Arc::clone(&self.policy));
            let sink = self.sink.clone();
            self.runtime.spawn_blocking(move || {
                walker.visit(|file| sink.send(ChangeKind::Update, file));
            });
            return;
        }

        if self.policy.accept_file(&path) {
            self.sink.send(ChangeKind::Update, path);
        } else {
            trace!(path = ?path, "Change rejected by admission policy");
        }
    }

    fn on_delete(&self, path: PathBuf) {
        if self.indexer.fingerprint_of(&path).is_some() {
            self.sink.send(ChangeKind::Delete, path);
            return;
        }
        // Not an indexed file, so possibly a directory taking indexed files along
        let mut removed = self.indexer.known_paths_under(&path);
        removed.push(path);
        for path in removed {
            if !self.sink.send(ChangeKind::Delete, path) {
                break;
            }
        }
    }
}

/// Translate a raw notification into changes, one per affected path.
pub fn translate(event: &Event) -> Vec<(ChangeKind, PathBuf)> {
    let all = |kind: ChangeKind| -> Vec<(ChangeKind, PathBuf)> {
        event.paths.iter().map(|p| (kind, p.clone())).collect()
    };
    let by_existence = || -> Vec<(ChangeKind, PathBuf)> {
        event
            .paths
            .iter()
            .map(|p| {
                let kind = if fs::symlink_metadata(p).is_ok() {
                    ChangeKind::Update
                } else {
                    ChangeKind::Delete
                };
                (kind, p.clone())
            })
            .collect()
    };

    match &event.kind {
        EventKind::Create(_) => all(ChangeKind::Update),
        EventKind::Remove(_) => all(ChangeKind::Delete),
        EventKind::Modify(ModifyKind::Name(mode)) => match mode {
            RenameMode::From => all(ChangeKind::Delete),
            RenameMode::To => all(ChangeKind::Update),
            RenameMode::Both => {
                let mut changes = Vec::with_capacity(2);
                if let Some(from) = event.paths.first() {
                    changes.push((ChangeKind::Delete, from.clone()));
                }
                if let Some(to) = event.paths.get(1) {
                    changes.push((ChangeKind::Update, to.clone()));
                }
                changes
            }
            _ => by_existence(),
        },
        EventKind::Modify(_) => all(ChangeKind::Update),
        EventKind::Any => by_existence(),
        EventKind::Access(_) | EventKind::Other => Vec::new(),
    }
}
