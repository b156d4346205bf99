// crates/db/tests/indexer_test.rs
//! Indexer behavior against a real filesystem: depth caps, excludes,
//! symlink policy, incremental refresh, prune.

use pickme_core::Config;
use pickme_db::indexer::{self, IndexOptions};
use pickme_db::Database;
use std::fs;
use std::path::{Path, PathBuf};

fn write_file(path: &Path, contents: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

async fn index_with(
    db: &Database,
    root: &Path,
    opts: &IndexOptions,
) -> pickme_db::indexer::IndexOutcome {
    let canonical = fs::canonicalize(root).unwrap();
    indexer::index_directory(db, root, &[canonical], opts)
        .await
        .unwrap()
}

#[tokio::test]
async fn indexes_files_and_derives_entries() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("README.md"), "hi");
    write_file(&dir.path().join("src/main.rs"), "fn main() {}");

    let db = Database::open_in_memory().await.unwrap();
    let outcome = index_with(&db, dir.path(), &IndexOptions::default()).await;

    assert_eq!(outcome.files_indexed, 2);
    assert!(outcome.errors.is_empty());

    let root = fs::canonicalize(dir.path()).unwrap();
    let paths = db
        .list_paths_for_root(&root.to_string_lossy())
        .await
        .unwrap();
    assert_eq!(paths.len(), 2);

    let main = db
        .get_file(&root.join("src/main.rs").to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(main.filename, "main.rs");
    assert_eq!(main.relative_path, "src/main.rs");
    assert_eq!(main.dir_components, "src");
    assert!(main.mtime_ms > 0);
}

#[tokio::test]
async fn max_depth_zero_indexes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("a.txt"), "x");

    let db = Database::open_in_memory().await.unwrap();
    let opts = IndexOptions {
        max_depth: 0,
        ..Default::default()
    };
    let outcome = index_with(&db, dir.path(), &opts).await;
    assert_eq!(outcome.files_indexed, 0);
}

#[tokio::test]
async fn max_depth_one_indexes_only_root_entries() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("top.txt"), "x");
    write_file(&dir.path().join("nested/deep.txt"), "x");

    let db = Database::open_in_memory().await.unwrap();
    let opts = IndexOptions {
        max_depth: 1,
        ..Default::default()
    };
    let outcome = index_with(&db, dir.path(), &opts).await;
    assert_eq!(outcome.files_indexed, 1);

    let root = fs::canonicalize(dir.path()).unwrap();
    let paths = db
        .list_paths_for_root(&root.to_string_lossy())
        .await
        .unwrap();
    assert!(paths[0].ends_with("top.txt"));
}

#[tokio::test]
async fn hidden_files_skipped_unless_included() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("visible.txt"), "x");
    write_file(&dir.path().join(".hidden.txt"), "x");

    let db = Database::open_in_memory().await.unwrap();
    let outcome = index_with(&db, dir.path(), &IndexOptions::default()).await;
    assert_eq!(outcome.files_indexed, 1);

    let db = Database::open_in_memory().await.unwrap();
    let opts = IndexOptions {
        include_hidden: true,
        ..Default::default()
    };
    let outcome = index_with(&db, dir.path(), &opts).await;
    assert_eq!(outcome.files_indexed, 2);
}

#[tokio::test]
async fn exclude_patterns_prune_by_basename() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("keep.rs"), "x");
    write_file(&dir.path().join("debug.log"), "x");
    write_file(&dir.path().join("node_modules/pkg/index.js"), "x");

    let db = Database::open_in_memory().await.unwrap();
    let opts = IndexOptions {
        exclude: vec!["*.log".into(), "node_modules".into()],
        ..Default::default()
    };
    let outcome = index_with(&db, dir.path(), &opts).await;
    assert_eq!(outcome.files_indexed, 1);

    let root = fs::canonicalize(dir.path()).unwrap();
    let paths = db
        .list_paths_for_root(&root.to_string_lossy())
        .await
        .unwrap();
    assert!(paths[0].ends_with("keep.rs"));
}

#[tokio::test]
async fn disabled_prefixes_are_never_traversed() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("ok/a.txt"), "x");
    write_file(&dir.path().join("blocked/b.txt"), "x");

    let canonical = fs::canonicalize(dir.path()).unwrap();
    let db = Database::open_in_memory().await.unwrap();
    let opts = IndexOptions {
        disabled: vec![canonical.join("blocked")],
        ..Default::default()
    };
    let outcome = index_with(&db, dir.path(), &opts).await;
    assert_eq!(outcome.files_indexed, 1);
}

#[cfg(unix)]
#[tokio::test]
async fn symlink_out_of_roots_is_skipped() {
    let outside = tempfile::tempdir().unwrap();
    write_file(&outside.path().join("secret.txt"), "x");

    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("normal.txt"), "x");
    std::os::unix::fs::symlink(
        outside.path().join("secret.txt"),
        dir.path().join("link.txt"),
    )
    .unwrap();

    let db = Database::open_in_memory().await.unwrap();
    let outcome = index_with(&db, dir.path(), &IndexOptions::default()).await;
    assert_eq!(outcome.files_indexed, 1);
    assert!(outcome.files_skipped >= 1);
    assert!(outcome.errors.is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn broken_symlink_is_skipped_silently() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("normal.txt"), "x");
    std::os::unix::fs::symlink(dir.path().join("gone.txt"), dir.path().join("dangling.txt"))
        .unwrap();

    let db = Database::open_in_memory().await.unwrap();
    let outcome = index_with(&db, dir.path(), &IndexOptions::default()).await;
    assert_eq!(outcome.files_indexed, 1);
    assert!(outcome.errors.is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn same_canonical_path_indexed_once() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("real.txt"), "x");
    std::os::unix::fs::symlink(dir.path().join("real.txt"), dir.path().join("alias.txt"))
        .unwrap();

    let db = Database::open_in_memory().await.unwrap();
    let outcome = index_with(&db, dir.path(), &IndexOptions::default()).await;
    assert_eq!(outcome.files_indexed, 1);
    assert_eq!(db.file_count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn incremental_skips_unmodified_files() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("a.txt"), "x");

    let db = Database::open_in_memory().await.unwrap();
    let outcome = index_with(&db, dir.path(), &IndexOptions::default()).await;
    assert_eq!(outcome.files_indexed, 1);

    // A file whose mtime equals last_indexed_ms exactly is skipped (strict >).
    let root = fs::canonicalize(dir.path()).unwrap();
    let stored = db
        .get_file(&root.join("a.txt").to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    let opts = IndexOptions {
        incremental: true,
        last_indexed_ms: Some(stored.mtime_ms),
        ..Default::default()
    };
    let outcome = index_with(&db, dir.path(), &opts).await;
    assert_eq!(outcome.files_indexed, 0);
    assert_eq!(outcome.files_skipped, 1);

    // Older cutoff re-indexes it.
    let opts = IndexOptions {
        incremental: true,
        last_indexed_ms: Some(stored.mtime_ms - 1),
        ..Default::default()
    };
    let outcome = index_with(&db, dir.path(), &opts).await;
    assert_eq!(outcome.files_indexed, 1);
}

#[tokio::test]
async fn refresh_reindexes_only_touched_files() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..5 {
        write_file(&dir.path().join(format!("f{i}.txt")), "x");
    }

    let mut config = Config::default();
    config.index.roots = vec![dir.path().to_string_lossy().into_owned()];

    let db = Database::open_in_memory().await.unwrap();
    let first = indexer::refresh_all(&db, &config).await;
    assert_eq!(first.roots.len(), 1);
    assert_eq!(first.roots[0].files_indexed, 5);

    // Touch a single file with a strictly newer mtime.
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    write_file(&dir.path().join("f3.txt"), "updated");

    let second = indexer::refresh_all(&db, &config).await;
    assert_eq!(second.roots[0].files_indexed, 1);
    assert_eq!(second.roots[0].files_skipped, 4);

    // The watched-root row reflects the latest refresh.
    let root = fs::canonicalize(dir.path()).unwrap();
    let watched = db
        .get_watched_root(&root.to_string_lossy())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(watched.file_count, Some(1));
    assert!(watched.last_indexed_ms.is_some());
}

#[tokio::test]
async fn refresh_prunes_deleted_files() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("stays.txt"), "x");
    write_file(&dir.path().join("goes.txt"), "x");

    let mut config = Config::default();
    config.index.roots = vec![dir.path().to_string_lossy().into_owned()];

    let db = Database::open_in_memory().await.unwrap();
    indexer::refresh_all(&db, &config).await;
    assert_eq!(db.file_count(None).await.unwrap(), 2);

    fs::remove_file(dir.path().join("goes.txt")).unwrap();
    let outcome = indexer::refresh_all(&db, &config).await;
    assert_eq!(outcome.roots[0].files_pruned, 1);
    assert_eq!(db.file_count(None).await.unwrap(), 1);
}

#[tokio::test]
async fn refresh_survives_missing_root() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("a.txt"), "x");

    let mut config = Config::default();
    config.index.roots = vec![
        "/nonexistent/pickme-test-root".to_string(),
        dir.path().to_string_lossy().into_owned(),
    ];

    let db = Database::open_in_memory().await.unwrap();
    let outcome = indexer::refresh_all(&db, &config).await;
    assert_eq!(outcome.roots.len(), 2);
    assert!(!outcome.roots[0].errors.is_empty());
    assert_eq!(outcome.roots[1].files_indexed, 1);
}

#[tokio::test]
async fn max_files_caps_a_root() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..10 {
        write_file(&dir.path().join(format!("f{i}.txt")), "x");
    }

    let db = Database::open_in_memory().await.unwrap();
    let opts = IndexOptions {
        max_files: Some(3),
        ..Default::default()
    };
    let outcome = index_with(&db, dir.path(), &opts).await;
    assert_eq!(outcome.files_indexed, 3);
}

#[tokio::test]
async fn recent_files_filters_by_window() {
    let dir = tempfile::tempdir().unwrap();
    write_file(&dir.path().join("fresh.txt"), "x");

    let recent = indexer::recent_files(dir.path(), "24h", None, &[])
        .await
        .unwrap();
    assert_eq!(recent.len(), 1);

    let err = indexer::recent_files(dir.path(), "soon", None, &[]).await;
    assert!(err.is_err());
}

#[tokio::test]
async fn recent_files_respects_excludes_and_cap() {
    let dir = tempfile::tempdir().unwrap();
    for i in 0..5 {
        write_file(&dir.path().join(format!("f{i}.txt")), "x");
    }
    write_file(&dir.path().join("noise.log"), "x");

    let recent = indexer::recent_files(dir.path(), "1d", Some(3), &["*.log".to_string()])
        .await
        .unwrap();
    assert_eq!(recent.len(), 3);
    assert!(recent.iter().all(|p: &PathBuf| !p.ends_with("noise.log")));
}
