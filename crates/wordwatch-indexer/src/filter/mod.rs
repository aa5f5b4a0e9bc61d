//! Path admission filters.
//!
//! A root's [`AdmissionPolicy`] decides which directories the initial scan
//! descends into and which files it emits. Filters are evaluated in
//! ascending priority so cheap structural checks run before content sniffing.

mod binary;
mod directory;
mod extension;
mod symlink;

pub use binary::BinaryFileFilter;
pub use directory::DirectoryNameFilter;
pub use extension::FileExtensionFilter;
pub use symlink::SymlinkFilter;

use std::collections::BTreeSet;
use std::fmt;
use std::path::Path;

/// A single admission predicate.
pub trait AdmissionFilter: Send + Sync {
    fn accept_file(&self, path: &Path) -> bool;

    fn accept_directory(&self, path: &Path) -> bool;

    /// Lower values are evaluated first.
    fn priority(&self) -> u8;

    /// Human-readable summary, if the filter is configurable.
    fn describe(&self) -> Option<String> {
        None
    }
}

/// Caller-supplied admission settings for a watched root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdmissionOptions {
    /// Directory names that are never descended into
    pub excluded_dirs: BTreeSet<String>,
    /// Allowed file extensions, without the dot (empty = any)
    pub extensions: BTreeSet<String>,
}

impl AdmissionOptions {
    pub fn new<D, E>(excluded_dirs: D, extensions: E) -> Self
    where
        D: IntoIterator<Item = String>,
        E: IntoIterator<Item = String>,
    {
        Self {
            excluded_dirs: excluded_dirs
                .into_iter()
                .map(|d| d.trim().to_string())
                .filter(|d| !d.is_empty())
                .collect(),
            extensions: extensions
                .into_iter()
                .map(|e| e.trim().trim_start_matches('.').to_string())
                .filter(|e| !e.is_empty())
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.excluded_dirs.is_empty() && self.extensions.is_empty()
    }
}

/// Conjunction of admission filters, ordered by priority.
pub struct AdmissionPolicy {
    filters: Vec<Box<dyn AdmissionFilter>>,
}

impl AdmissionPolicy {
    pub fn new(mut filters: Vec<Box<dyn AdmissionFilter>>) -> Self {
        filters.sort_by_key(|f| f.priority());
        Self { filters }
    }

    /// Policy for a watched root: symlink and binary rejection always apply,
    /// directory and extension filters only when configured.
    pub fn for_root(root: &Path, options: &AdmissionOptions) -> Self {
        let mut filters: Vec<Box<dyn AdmissionFilter>> =
            vec![Box::new(SymlinkFilter), Box::new(BinaryFileFilter)];
        if !options.excluded_dirs.is_empty() {
            filters.push(Box::new(DirectoryNameFilter::new(
                root,
                options.excluded_dirs.clone(),
            )));
        }
        if !options.extensions.is_empty() {
            filters.push(Box::new(FileExtensionFilter::new(options.extensions.clone())));
        }
        Self::new(filters)
    }

    pub fn accept_file(&self, path: &Path) -> bool {
        self.filters.iter().all(|f| f.accept_file(path))
    }

    pub fn accept_directory(&self, path: &Path) -> bool {
        self.filters.iter().all(|f| f.accept_directory(path))
    }
}

impl fmt::Display for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.filters.iter().filter_map(|f| f.describe()).collect();
        write!(f, "{}", parts.join(", "))
    }
}

impl fmt::Debug for AdmissionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdmissionPolicy")
            .field("filters", &self.filters.len())
            .field("summary", &self.to_string())
            .finish()
    }
}
