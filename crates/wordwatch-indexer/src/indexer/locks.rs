//! Key-scoped critical sections over a concurrent map.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// One mutex per path, created on demand and dropped when the last holder
/// releases it. Operations on different paths never contend.
#[derive(Debug, Default)]
pub(crate) struct PathLocks {
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` while holding the lock for `path`.
    pub fn with_lock<R>(&self, path: &Path, f: impl FnOnce() -> R) -> R {
        // The map's own reference counts as one; every waiter adds one
        let mutex = Arc::clone(&*self.locks.entry(path.to_path_buf()).or_default());
        let result = {
            let _guard = mutex.lock();
            f()
        };
        drop(mutex);
        self.locks.remove_if(path, |_, m| Arc::strong_count(m) == 1);
        result
    }

    /// Number of paths with a live lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }
}
