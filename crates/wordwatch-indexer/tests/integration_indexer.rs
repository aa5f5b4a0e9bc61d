//! Integration tests for the watch -> index -> query pipeline.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::tempdir;
use tokio::time::{sleep, Instant};

use wordwatch_indexer::{IndexerConfig, WatchManager};

fn test_config() -> IndexerConfig {
    IndexerConfig {
        scan_parallelism: 2,
        index_workers: 4,
        eviction_ttl_ms: 300,
        ..IndexerConfig::default()
    }
}

/// Poll `condition` until it holds or a generous timeout expires.
async fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        sleep(Duration::from_millis(20)).await;
    }
}

fn set(paths: &[&Path]) -> HashSet<PathBuf> {
    paths.iter().map(|p| p.to_path_buf()).collect()
}

/// Canonical temp directory, so paths compare equal to what the index reports.
fn canonical_dir() -> (tempfile::TempDir, PathBuf) {
    let temp_dir = tempdir().unwrap();
    let root = temp_dir.path().canonicalize().unwrap();
    (temp_dir, root)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_identical_files_found_until_deleted() {
    let (_guard, root) = canonical_dir();
    let a = root.join("a");
    let b = root.join("b");
    std::fs::write(&a, "aaa").unwrap();
    std::fs::write(&b, "aaa").unwrap();

    let manager = WatchManager::new(&test_config());
    assert!(manager.start_watching(&root).await.accepted);
    wait_for("initial scan", || manager.scans_complete()).await;

    assert_eq!(manager.query_index("aaa"), set(&[&a, &b]));

    std::fs::remove_file(&a).unwrap();
    wait_for("a to disappear", || manager.query_index("aaa") == set(&[&b])).await;

    std::fs::remove_file(&b).unwrap();
    wait_for("b to disappear", || manager.query_index("aaa").is_empty()).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unowned_content_evicted_after_ttl() {
    let (_guard, root) = canonical_dir();
    let a = root.join("a.txt");
    std::fs::write(&a, "alpha beta").unwrap();

    let manager = WatchManager::new(&test_config());
    manager.start_watching(&root).await;
    wait_for("initial scan", || manager.scans_complete()).await;

    let indexer = manager.indexer();
    let fingerprint = indexer.fingerprint_of(&a).unwrap();
    std::fs::remove_file(&a).unwrap();

    wait_for("delete", || manager.query_index("alpha").is_empty()).await;
    wait_for("eviction", || !indexer.is_fingerprint_indexed(&fingerprint)).await;
    assert_eq!(indexer.stats().words, 0);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_live_modification_is_reindexed() {
    let (_guard, root) = canonical_dir();
    let file = root.join("notes.md");
    std::fs::write(&file, "before").unwrap();

    let manager = WatchManager::new(&test_config());
    manager.start_watching(&root).await;
    wait_for("initial scan", || manager.scans_complete()).await;
    assert_eq!(manager.query_index("before"), set(&[&file]));

    std::fs::write(&file, "after").unwrap();
    wait_for("new content", || manager.query_index("after") == set(&[&file])).await;
    assert!(manager.query_index("before").is_empty());

    let created = root.join("created.md");
    std::fs::write(&created, "after").unwrap();
    wait_for("created file", || manager.query_index("after").len() == 2).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_rename_moves_results() {
    let (_guard, root) = canonical_dir();
    let old = root.join("old.txt");
    let new = root.join("new.txt");
    std::fs::write(&old, "moving").unwrap();

    let manager = WatchManager::new(&test_config());
    manager.start_watching(&root).await;
    wait_for("initial scan", || manager.scans_complete()).await;

    std::fs::rename(&old, &new).unwrap();
    wait_for("rename", || manager.query_index("moving") == set(&[&new])).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_watching_purges_index() {
    let (_guard, root) = canonical_dir();
    let file = root.join("a.txt");
    std::fs::write(&file, "gone soon").unwrap();

    let manager = WatchManager::new(&test_config());
    manager.start_watching(&root).await;
    wait_for("initial scan", || manager.scans_complete()).await;
    assert!(!manager.query_index("gone").is_empty());

    let outcome = manager.stop_watching(&root).await;
    assert!(outcome.accepted, "{}", outcome.message);
    assert!(manager.list_watched_roots().is_empty());
    wait_for("purge", || manager.query_index("gone").is_empty()).await;

    // Changes after the stop are ignored
    std::fs::write(root.join("b.txt"), "gone again").unwrap();
    sleep(Duration::from_millis(200)).await;
    assert!(manager.query_index("gone").is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_absorbed_children_stay_searchable() {
    let (_guard, root) = canonical_dir();
    let left = root.join("left");
    let right = root.join("right");
    std::fs::create_dir(&left).unwrap();
    std::fs::create_dir(&right).unwrap();
    let l = left.join("l.txt");
    let r = right.join("r.txt");
    std::fs::write(&l, "shared").unwrap();
    std::fs::write(&r, "shared").unwrap();

    let manager = WatchManager::new(&test_config());
    assert!(manager.start_watching(&left).await.accepted);
    assert!(manager.start_watching(&right).await.accepted);
    wait_for("child scans", || manager.scans_complete()).await;

    let outcome = manager.start_watching(&root).await;
    assert!(outcome.accepted, "{}", outcome.message);
    assert_eq!(manager.list_watched_roots(), BTreeSet::from([root.clone()]));

    wait_for("parent scan", || manager.scans_complete()).await;
    assert_eq!(manager.query_index("shared"), set(&[&l, &r]));

    let nested = manager.start_watching(&left).await;
    assert!(!nested.accepted);
    assert!(nested.message.contains(&root.display().to_string()));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_single_file_root() {
    let (_guard, root) = canonical_dir();
    let watched = root.join("watched.txt");
    let sibling = root.join("sibling.txt");
    std::fs::write(&watched, "first").unwrap();
    std::fs::write(&sibling, "first").unwrap();

    let manager = WatchManager::new(&test_config());
    assert!(manager.start_watching(&watched).await.accepted);
    wait_for("initial scan", || manager.scans_complete()).await;
    assert_eq!(manager.query_index("first"), set(&[&watched]));

    // Replace through a temporary file, the way editors save
    let temp = root.join("watched.txt.tmp");
    std::fs::write(&temp, "second").unwrap();
    std::fs::rename(&temp, &watched).unwrap();
    wait_for("replaced content", || manager.query_index("second") == set(&[&watched])).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_excluded_directories_not_scanned() {
    let (_guard, root) = canonical_dir();
    std::fs::create_dir(root.join("node_modules")).unwrap();
    std::fs::write(root.join("node_modules/dep.js"), "needle").unwrap();
    let kept = root.join("main.js");
    std::fs::write(&kept, "needle").unwrap();

    let config = IndexerConfig {
        excluded_dirs: vec!["node_modules".to_string()],
        ..test_config()
    };
    let manager = WatchManager::new(&config);
    manager.start_watching(&root).await;
    wait_for("initial scan", || manager.scans_complete()).await;

    assert_eq!(manager.query_index("needle"), set(&[&kept]));
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread")]
async fn test_symlinked_root_rejected() {
    let (_guard, root) = canonical_dir();
    let real = root.join("real");
    std::fs::create_dir(&real).unwrap();
    let link = root.join("link");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let manager = WatchManager::new(&test_config());
    let outcome = manager.start_watching(&link).await;

    assert!(!outcome.accepted);
    assert!(manager.list_watched_roots().is_empty());
}
