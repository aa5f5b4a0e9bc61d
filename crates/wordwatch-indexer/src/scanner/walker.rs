//! Parallel, admission-filtered file system walker.

use crate::filter::AdmissionPolicy;
use ignore::{DirEntry, WalkBuilder, WalkState};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use tracing::debug;

/// Walks a directory tree with a bounded pool of threads, descending only
/// into directories admitted by the policy and reporting admitted files.
pub struct Walker {
    root: PathBuf,
    policy: Arc<AdmissionPolicy>,
    parallelism: usize,
}

impl Walker {
    /// Create a new walker for the given root.
    pub fn new(root: &Path, policy: Arc<AdmissionPolicy>) -> Self {
        Self {
            root: root.to_path_buf(),
            policy,
            parallelism: 1,
        }
    }

    /// Number of walker threads.
    pub fn parallelism(mut self, threads: usize) -> Self {
        self.parallelism = threads.max(1);
        self
    }

    /// Call `on_file` for every admitted regular file. Returning `false`
    /// from the callback stops the walk.
    pub fn visit<F>(&self, on_file: F)
    where
        F: Fn(PathBuf) -> bool + Sync,
    {
        if !self.root.is_dir() {
            if self.policy.accept_file(&self.root) {
                on_file(self.root.clone());
            }
            return;
        }

        let policy = Arc::clone(&self.policy);
        let walker = WalkBuilder::new(&self.root)
            // Admission is decided by the policy alone
            .standard_filters(false)
            .follow_links(false)
            .threads(self.parallelism)
            .filter_entry(move |entry| admit(&policy, entry))
            .build_parallel();

        let on_file = &on_file;
        walker.run(|| {
            Box::new(move |result| match result {
                Ok(entry) => {
                    let is_file = entry.file_type().is_some_and(|ft| ft.is_file());
                    if is_file && !on_file(entry.into_path()) {
                        return WalkState::Quit;
                    }
                    WalkState::Continue
                }
                Err(e) => {
                    // Don't fail the entire walk for individual errors
                    debug!(error = %e, "Walk error");
                    WalkState::Continue
                }
            })
        });
    }

    /// Collect every admitted file, sorted by path.
    pub fn walk(&self) -> Vec<PathBuf> {
        let (tx, rx) = mpsc::channel();
        self.visit(|path| tx.send(path).is_ok());

        // Drop the original sender so the receiver knows when we're done
        drop(tx);

        let mut entries: Vec<PathBuf> = rx.into_iter().collect();
        entries.sort();
        entries
    }
}

fn admit(policy: &AdmissionPolicy, entry: &DirEntry) -> bool {
    // Symlinks are reported by their own file type and never followed
    match entry.file_type() {
        Some(ft) if ft.is_dir() => policy.accept_directory(entry.path()),
        _ => policy.accept_file(entry.path()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::AdmissionOptions;
    use std::fs::{self, File};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    fn default_policy(root: &Path) -> Arc<AdmissionPolicy> {
        Arc::new(AdmissionPolicy::for_root(root, &AdmissionOptions::default()))
    }

    fn names(entries: &[PathBuf]) -> Vec<String> {
        let mut names: Vec<String> = entries
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_walker_empty_directory() {
        let temp_dir = tempdir().unwrap();
        let walker = Walker::new(temp_dir.path(), default_policy(temp_dir.path()));

        assert!(walker.walk().is_empty());
    }

    #[test]
    fn test_walker_handles_nested_directories() {
        let temp_dir = tempdir().unwrap();

        fs::create_dir_all(temp_dir.path().join("a/b/c")).unwrap();
        File::create(temp_dir.path().join("a/file1.txt")).unwrap();
        File::create(temp_dir.path().join("a/b/file2.txt")).unwrap();
        File::create(temp_dir.path().join("a/b/c/file3.txt")).unwrap();

        let walker = Walker::new(temp_dir.path(), default_policy(temp_dir.path())).parallelism(4);
        let entries = walker.walk();

        assert_eq!(names(&entries), vec!["file1.txt", "file2.txt", "file3.txt"]);
        assert!(entries.iter().all(|p| p.is_absolute()));
    }

    #[test]
    fn test_walker_includes_hidden_and_gitignored_files() {
        let temp_dir = tempdir().unwrap();

        fs::create_dir(temp_dir.path().join(".git")).unwrap();
        fs::write(temp_dir.path().join(".gitignore"), "build/\n").unwrap();
        fs::create_dir(temp_dir.path().join("build")).unwrap();
        File::create(temp_dir.path().join("build/output.txt")).unwrap();
        File::create(temp_dir.path().join(".hidden.txt")).unwrap();

        let walker = Walker::new(temp_dir.path(), default_policy(temp_dir.path()));
        let found = names(&walker.walk());

        assert!(found.contains(&"output.txt".to_string()), "found: {:?}", found);
        assert!(found.contains(&".hidden.txt".to_string()), "found: {:?}", found);
    }

    #[test]
    fn test_walker_skips_excluded_directories() {
        let temp_dir = tempdir().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("target/debug")).unwrap();
        fs::write(root.join("target/debug/out.txt"), "out").unwrap();
        fs::write(root.join("kept.txt"), "kept").unwrap();

        let options = AdmissionOptions::new(vec!["target".into()], Vec::new());
        let policy = Arc::new(AdmissionPolicy::for_root(root, &options));
        let found = names(&Walker::new(root, policy).walk());

        assert_eq!(found, vec!["kept.txt"]);
    }

    #[test]
    fn test_walker_skips_binary_files() {
        let temp_dir = tempdir().unwrap();
        fs::write(temp_dir.path().join("text.txt"), "plain").unwrap();
        fs::write(temp_dir.path().join("image.png"), [0x89, b'P', b'N', b'G', 0, 0]).unwrap();

        let found = names(&Walker::new(temp_dir.path(), default_policy(temp_dir.path())).walk());
        assert_eq!(found, vec!["text.txt"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_walker_does_not_follow_symlinks() {
        let temp_dir = tempdir().unwrap();
        let outside = tempdir().unwrap();
        fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        fs::write(temp_dir.path().join("real.txt"), "real").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp_dir.path().join("linked_dir")).unwrap();
        std::os::unix::fs::symlink(
            temp_dir.path().join("real.txt"),
            temp_dir.path().join("linked.txt"),
        )
        .unwrap();

        let found = names(&Walker::new(temp_dir.path(), default_policy(temp_dir.path())).walk());
        assert_eq!(found, vec!["real.txt"]);
    }

    #[test]
    fn test_walker_single_file_root() {
        let temp_dir = tempdir().unwrap();
        let file = temp_dir.path().join("only.md");
        fs::write(&file, "content").unwrap();

        let entries = Walker::new(&file, default_policy(&file)).walk();
        assert_eq!(entries, vec![file.clone()]);

        let options = AdmissionOptions::new(Vec::new(), vec!["rs".into()]);
        let policy = Arc::new(AdmissionPolicy::for_root(&file, &options));
        assert!(Walker::new(&file, policy).walk().is_empty());
    }

    #[test]
    fn test_walker_stops_when_callback_declines() {
        let temp_dir = tempdir().unwrap();
        for i in 0..50 {
            fs::write(temp_dir.path().join(format!("f{}.txt", i)), "x").unwrap();
        }

        let visited = AtomicUsize::new(0);
        Walker::new(temp_dir.path(), default_policy(temp_dir.path())).visit(|_| {
            visited.fetch_add(1, Ordering::SeqCst);
            false
        });

        assert!(visited.load(Ordering::SeqCst) < 50);
    }
}
