//! Initial scan of a watch root.
//!
//! Walks the root once with the root's admission policy and feeds an UPDATE
//! event for every admitted file into the indexer, all stamped with the
//! timestamp taken when the root was registered.

mod progress;
mod walker;

pub use progress::{ProgressSnapshot, ScanProgress};
pub use walker::Walker;

use crate::clock::Timestamp;
use crate::filter::AdmissionPolicy;
use crate::indexer::{ChangeEvent, EventSink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// A single pass over a watch root.
pub struct InitialScan {
    root: PathBuf,
    policy: Arc<AdmissionPolicy>,
    progress: Arc<ScanProgress>,
    timestamp: Timestamp,
    parallelism: usize,
}

impl InitialScan {
    pub fn new(
        root: &Path,
        policy: Arc<AdmissionPolicy>,
        progress: Arc<ScanProgress>,
        timestamp: Timestamp,
    ) -> Self {
        Self {
            root: root.to_path_buf(),
            policy,
            progress,
            timestamp,
            parallelism: 1,
        }
    }

    /// Number of walker threads.
    pub fn parallelism(mut self, threads: usize) -> Self {
        self.parallelism = threads.max(1);
        self
    }

    /// Walk the root and send one event per admitted file. Blocks until the
    /// walk is over or the sink is closed. Returns the number of files sent.
    pub fn run(&self, sink: &EventSink) -> u64 {
        let start = Instant::now();
        info!(root = ?self.root, policy = %self.policy, "Starting initial scan");

        let walker =
            Walker::new(&self.root, Arc::clone(&self.policy)).parallelism(self.parallelism);
        walker.visit(|path| {
            self.progress.file_discovered();
            let event = ChangeEvent::update(path, self.timestamp)
                .with_progress(Arc::clone(&self.progress));
            if sink.send_event(event) {
                return true;
            }
            // Root is being stopped; count the dropped file as handled
            self.progress.file_indexed();
            debug!(root = ?self.root, "Event sink closed, aborting scan");
            false
        });
        self.progress.finish_discovery();

        let snapshot = self.progress.snapshot();
        info!(
            root = ?self.root,
            files = snapshot.discovered,
            duration_ms = start.elapsed().as_millis(),
            "Initial scan complete"
        );
        snapshot.discovered
    }
}
