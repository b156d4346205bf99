// crates/db/tests/storage_test.rs
//! Storage invariants: FTS trigger lockstep, prune exactness, ranking order.

use pickme_core::Weights;
use pickme_db::{escape_fts_query, Database, FileEntry, FrecencyRecord};
use std::collections::HashSet;
use std::path::Path;

fn entry(path: &str, root: &str, mtime_ms: i64) -> FileEntry {
    FileEntry::new(Path::new(path), Path::new(root), mtime_ms)
}

async fn seed(db: &Database, paths: &[&str], root: &str) {
    let entries: Vec<FileEntry> = paths.iter().map(|p| entry(p, root, 1)).collect();
    db.upsert_files(&entries).await.unwrap();
}

#[tokio::test]
async fn fts_rows_follow_inserts_and_deletes() {
    let db = Database::open_in_memory().await.unwrap();
    seed(&db, &["/p/src/button.ts"], "/p").await;

    assert_eq!(db.fts_match_count("\"button\"*").await.unwrap(), 1);

    db.delete_files(&["/p/src/button.ts".to_string()])
        .await
        .unwrap();
    assert_eq!(db.fts_match_count("\"button\"*").await.unwrap(), 0);
    assert_eq!(db.file_count(None).await.unwrap(), 0);
}

#[tokio::test]
async fn fts_rows_follow_updates() {
    let db = Database::open_in_memory().await.unwrap();
    seed(&db, &["/p/old_name.ts"], "/p").await;

    // Re-upserting the same path with new text columns rewrites the FTS row.
    let mut updated = entry("/p/old_name.ts", "/p", 2);
    updated.filename = "renamed.ts".into();
    updated.relative_path = "renamed.ts".into();
    db.upsert_files(&[updated]).await.unwrap();

    assert_eq!(db.fts_match_count("\"renamed\"*").await.unwrap(), 1);
    assert_eq!(db.fts_match_count("\"old_name\"*").await.unwrap(), 0);
}

#[tokio::test]
async fn delete_cascades_to_frecency() {
    let db = Database::open_in_memory().await.unwrap();
    seed(&db, &["/p/a.ts"], "/p").await;
    db.upsert_frecency(
        &[FrecencyRecord {
            path: "/p/a.ts".into(),
            git_recency: 0.9,
            git_frequency: 3,
            git_status_boost: 5.0,
        }],
        1000,
    )
    .await
    .unwrap();
    assert!(db.get_frecency("/p/a.ts").await.unwrap().is_some());

    db.delete_files(&["/p/a.ts".to_string()]).await.unwrap();
    assert!(db.get_frecency("/p/a.ts").await.unwrap().is_none());
}

#[tokio::test]
async fn frecency_upsert_skips_unknown_paths() {
    let db = Database::open_in_memory().await.unwrap();
    seed(&db, &["/p/a.ts"], "/p").await;

    let written = db
        .upsert_frecency(
            &[
                FrecencyRecord {
                    path: "/p/a.ts".into(),
                    git_recency: 0.5,
                    git_frequency: 1,
                    git_status_boost: 0.0,
                },
                FrecencyRecord {
                    path: "/p/never-indexed.ts".into(),
                    git_recency: 0.5,
                    git_frequency: 1,
                    git_status_boost: 0.0,
                },
            ],
            1000,
        )
        .await
        .unwrap();
    assert_eq!(written, 1);
}

#[tokio::test]
async fn prune_deleted_keeps_exactly_the_existing_set() {
    let db = Database::open_in_memory().await.unwrap();
    seed(&db, &["/p/a.ts", "/p/b.ts", "/p/c.ts"], "/p").await;
    seed(&db, &["/q/z.ts"], "/q").await;

    let existing: HashSet<String> = ["/p/a.ts", "/p/c.ts"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let pruned = db.prune_deleted("/p", &existing).await.unwrap();
    assert_eq!(pruned, 1);

    let remaining = db.list_paths_for_root("/p").await.unwrap();
    assert_eq!(remaining, vec!["/p/a.ts".to_string(), "/p/c.ts".to_string()]);

    // Other roots are untouched.
    assert_eq!(db.list_paths_for_root("/q").await.unwrap().len(), 1);
}

#[tokio::test]
async fn prune_deleted_handles_large_sets() {
    let db = Database::open_in_memory().await.unwrap();
    let entries: Vec<FileEntry> = (0..1500)
        .map(|i| entry(&format!("/p/f{i:05}.ts"), "/p", 1))
        .collect();
    db.upsert_files(&entries).await.unwrap();

    // Keep every even-numbered file.
    let existing: HashSet<String> = (0..1500)
        .filter(|i| i % 2 == 0)
        .map(|i| format!("/p/f{i:05}.ts"))
        .collect();
    let pruned = db.prune_deleted("/p", &existing).await.unwrap();
    assert_eq!(pruned, 750);
    assert_eq!(db.file_count(Some("/p")).await.unwrap(), 750);
}

#[tokio::test]
async fn ranking_prefers_frecent_files_and_breaks_ties_by_path() {
    let db = Database::open_in_memory().await.unwrap();
    // Identical shapes except for the directory, so the FTS scores tie.
    seed(
        &db,
        &["/p/zz/button.ts", "/p/bb/button.ts", "/p/aa/button.ts"],
        "/p",
    )
    .await;
    db.upsert_frecency(
        &[FrecencyRecord {
            path: "/p/zz/button.ts".into(),
            git_recency: 1.0,
            git_frequency: 7,
            git_status_boost: 5.0,
        }],
        1000,
    )
    .await
    .unwrap();

    let hits = db
        .search_ranked(
            &escape_fts_query("button"),
            &[],
            Weights::default(),
            50,
        )
        .await
        .unwrap();

    assert_eq!(hits.len(), 3);
    // The boosted file wins despite sorting last by path.
    assert_eq!(hits[0].path, "/p/zz/button.ts");
    assert!(hits[0].score > hits[1].score);
    // The remaining equal-scored candidates order by ascending path.
    let rest: Vec<&str> = hits[1..].iter().map(|h| h.path.as_str()).collect();
    assert_eq!(rest, vec!["/p/aa/button.ts", "/p/bb/button.ts"]);
}

#[tokio::test]
async fn search_respects_root_filters_and_limit() {
    let db = Database::open_in_memory().await.unwrap();
    seed(&db, &["/p/button.ts", "/p/button_bar.ts"], "/p").await;
    seed(&db, &["/q/button.ts"], "/q").await;

    let hits = db
        .search_ranked(
            &escape_fts_query("button"),
            &["/p".to_string()],
            Weights::default(),
            50,
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.path.starts_with("/p/")));

    let hits = db
        .search_ranked(
            &escape_fts_query("button"),
            &[],
            Weights::default(),
            1,
        )
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn empty_match_expression_short_circuits() {
    let db = Database::open_in_memory().await.unwrap();
    seed(&db, &["/p/a.ts"], "/p").await;
    let hits = db
        .search_ranked("", &[], Weights::default(), 50)
        .await
        .unwrap();
    assert!(hits.is_empty());
}

#[tokio::test]
async fn extension_listing_matches_suffix_only() {
    let db = Database::open_in_memory().await.unwrap();
    seed(
        &db,
        &["/p/README.md", "/p/docs/a.md", "/p/src/index.ts"],
        "/p",
    )
    .await;

    let hits = db
        .list_by_extension(".md", Some("/p"), Weights::default(), 50)
        .await
        .unwrap();
    let mut paths: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
    paths.sort_unstable();
    assert_eq!(paths, vec!["/p/README.md", "/p/docs/a.md"]);
}

#[tokio::test]
async fn watched_roots_persist_and_update() {
    let db = Database::open_in_memory().await.unwrap();
    assert!(db.get_watched_root("/p").await.unwrap().is_none());

    db.upsert_watched_root("/p", 10, 111, 42).await.unwrap();
    let row = db.get_watched_root("/p").await.unwrap().unwrap();
    assert_eq!(row.max_depth, 10);
    assert_eq!(row.last_indexed_ms, Some(111));
    assert_eq!(row.file_count, Some(42));

    db.upsert_watched_root("/p", 6, 222, 7).await.unwrap();
    let row = db.get_watched_root("/p").await.unwrap().unwrap();
    assert_eq!(row.max_depth, 6);
    assert_eq!(row.last_indexed_ms, Some(222));
    assert_eq!(row.file_count, Some(7));
    assert_eq!(db.list_watched_roots().await.unwrap().len(), 1);
}
