// crates/db/src/queries.rs
//! Prepared statements over the index schema. Every other component talks to
//! the database exclusively through these.

use crate::{Database, DbError, DbResult, UPSERT_BATCH_SIZE};
use pickme_core::Weights;
use std::collections::HashSet;
use std::path::Path;

/// One indexed file. `path` is absolute and canonical; `relative_path` is
/// `path` minus `root` and the joining slash.
#[derive(Debug, Clone, PartialEq)]
pub struct FileEntry {
    pub path: String,
    pub filename: String,
    pub dir_components: String,
    pub root: String,
    pub mtime_ms: i64,
    pub relative_path: String,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for FileEntry {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            path: row.try_get("path")?,
            filename: row.try_get("filename")?,
            dir_components: row.try_get("dir_components")?,
            root: row.try_get("root")?,
            mtime_ms: row.try_get("mtime_ms")?,
            relative_path: row.try_get("relative_path")?,
        })
    }
}

impl FileEntry {
    /// Build an entry for a canonical path under the given root.
    pub fn new(path: &Path, root: &Path, mtime_ms: i64) -> Self {
        let path_str = path.to_string_lossy().into_owned();
        let root_str = root.to_string_lossy().into_owned();
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let relative_path = path
            .strip_prefix(root)
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| filename.clone());
        let dir_components = Path::new(&relative_path)
            .parent()
            .map(|dir| {
                dir.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .unwrap_or_default();

        Self {
            path: path_str,
            filename,
            dir_components,
            root: root_str,
            mtime_ms,
            relative_path,
        }
    }
}

/// Per-file git score inputs; zero-or-one row per file entry.
#[derive(Debug, Clone, PartialEq)]
pub struct FrecencyRecord {
    pub path: String,
    /// Exponential-decay score from last-commit age, in [0,1].
    pub git_recency: f64,
    /// Commits touching the file within the look-back window.
    pub git_frequency: i64,
    /// 5.0 modified/staged, 3.0 untracked, 0 otherwise.
    pub git_status_boost: f64,
}

/// Persistent bookkeeping for a root that has ever been indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchedRoot {
    pub root: String,
    pub max_depth: i64,
    pub last_indexed_ms: Option<i64>,
    pub file_count: Option<i64>,
}

impl<'r> sqlx::FromRow<'r, sqlx::sqlite::SqliteRow> for WatchedRoot {
    fn from_row(row: &'r sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(Self {
            root: row.try_get("root")?,
            max_depth: row.try_get("max_depth")?,
            last_indexed_ms: row.try_get("last_indexed_ms")?,
            file_count: row.try_get("file_count")?,
        })
    }
}

/// A ranked search candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredFile {
    pub path: String,
    pub score: f64,
    pub root: String,
}

const COMPOSITE_FRECENCY_SQL: &str = "\
      ?1 * COALESCE(fr.git_recency, 0.0) \
    + ?2 * log2(1.0 + COALESCE(fr.git_frequency, 0)) \
    + ?3 * COALESCE(fr.git_status_boost, 0.0)";

impl Database {
    /// Upsert file entries in batches of [`UPSERT_BATCH_SIZE`], one
    /// transaction per batch. The FTS triggers keep the shadow table in
    /// lockstep.
    pub async fn upsert_files(&self, entries: &[FileEntry]) -> DbResult<()> {
        for chunk in entries.chunks(UPSERT_BATCH_SIZE) {
            let mut tx = self.pool().begin().await?;
            for entry in chunk {
                sqlx::query(
                    "INSERT INTO files (path, filename, dir_components, root, mtime_ms, relative_path) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                     ON CONFLICT(path) DO UPDATE SET \
                         filename = excluded.filename, \
                         dir_components = excluded.dir_components, \
                         root = excluded.root, \
                         mtime_ms = excluded.mtime_ms, \
                         relative_path = excluded.relative_path",
                )
                .bind(&entry.path)
                .bind(&entry.filename)
                .bind(&entry.dir_components)
                .bind(&entry.root)
                .bind(entry.mtime_ms)
                .bind(&entry.relative_path)
                .execute(&mut *tx)
                .await?;
            }
            tx.commit().await?;
        }
        Ok(())
    }

    /// Delete file entries by path. Triggers drop the FTS rows; the frecency
    /// cascade drops any score rows.
    pub async fn delete_files(&self, paths: &[String]) -> DbResult<u64> {
        let mut deleted = 0;
        for chunk in paths.chunks(UPSERT_BATCH_SIZE) {
            let mut tx = self.pool().begin().await?;
            for path in chunk {
                let result = sqlx::query("DELETE FROM files WHERE path = ?1")
                    .bind(path)
                    .execute(&mut *tx)
                    .await?;
                deleted += result.rows_affected();
            }
            tx.commit().await?;
        }
        Ok(deleted)
    }

    /// Delete every entry under `root` whose path is not in `existing`.
    ///
    /// The existing set is staged into an indexed temp table so the delete
    /// stays linear even for hundreds of thousands of paths. Temp tables are
    /// per-connection, so everything runs inside one transaction.
    pub async fn prune_deleted(&self, root: &str, existing: &HashSet<String>) -> DbResult<u64> {
        let mut tx = self.pool().begin().await?;

        sqlx::query("CREATE TEMP TABLE IF NOT EXISTS keep_paths (path TEXT PRIMARY KEY)")
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM keep_paths").execute(&mut *tx).await?;

        let paths: Vec<&String> = existing.iter().collect();
        for chunk in paths.chunks(500) {
            let placeholders = vec!["(?)"; chunk.len()].join(", ");
            let sql = format!("INSERT OR IGNORE INTO keep_paths (path) VALUES {placeholders}");
            let mut query = sqlx::query(&sql);
            for path in chunk {
                query = query.bind(*path);
            }
            query.execute(&mut *tx).await?;
        }

        let result = sqlx::query(
            "DELETE FROM files WHERE root = ?1 \
             AND path NOT IN (SELECT path FROM keep_paths)",
        )
        .bind(root)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(result.rows_affected())
    }

    pub async fn get_file(&self, path: &str) -> DbResult<Option<FileEntry>> {
        let entry = sqlx::query_as::<_, FileEntry>(
            "SELECT path, filename, dir_components, root, mtime_ms, relative_path \
             FROM files WHERE path = ?1",
        )
        .bind(path)
        .fetch_optional(self.pool())
        .await?;
        Ok(entry)
    }

    /// All stored paths for a root, ascending.
    pub async fn list_paths_for_root(&self, root: &str) -> DbResult<Vec<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT path FROM files WHERE root = ?1 ORDER BY path")
                .bind(root)
                .fetch_all(self.pool())
                .await?;
        Ok(rows.into_iter().map(|(p,)| p).collect())
    }

    pub async fn file_count(&self, root: Option<&str>) -> DbResult<i64> {
        let row: (i64,) = match root {
            Some(root) => {
                sqlx::query_as("SELECT COUNT(*) FROM files WHERE root = ?1")
                    .bind(root)
                    .fetch_one(self.pool())
                    .await?
            }
            None => {
                sqlx::query_as("SELECT COUNT(*) FROM files")
                    .fetch_one(self.pool())
                    .await?
            }
        };
        Ok(row.0)
    }

    /// Run the ranking query: FTS match joined against files, left-joined
    /// against frecency, ordered by the composite score (descending) with
    /// ties broken by ascending path.
    ///
    /// `match_expr` must come from [`crate::escape_fts_query`]; an empty
    /// expression is a caller bug and returns no rows without querying.
    pub async fn search_ranked(
        &self,
        match_expr: &str,
        root_filters: &[String],
        weights: Weights,
        limit: usize,
    ) -> DbResult<Vec<ScoredFile>> {
        if match_expr.is_empty() {
            return Ok(Vec::new());
        }

        let mut sql = format!(
            "SELECT f.path, f.root, \
             (-bm25(files_fts) + {COMPOSITE_FRECENCY_SQL}) AS score \
             FROM files_fts \
             JOIN files f ON f.rowid = files_fts.rowid \
             LEFT JOIN frecency fr ON fr.path = f.path \
             WHERE files_fts MATCH ?4"
        );
        push_root_filters(&mut sql, root_filters.len(), 5);
        sql.push_str(&format!(
            " ORDER BY score DESC, f.path ASC LIMIT ?{}",
            5 + root_filters.len()
        ));

        let mut query = sqlx::query_as::<_, (String, String, f64)>(&sql)
            .bind(weights.git_recency)
            .bind(weights.git_frequency)
            .bind(weights.git_status)
            .bind(match_expr);
        for root in root_filters {
            query = query.bind(root_prefix(root));
        }
        let rows = query.bind(limit as i64).fetch_all(self.pool()).await?;

        Ok(rows
            .into_iter()
            .map(|(path, root, score)| ScoredFile { path, score, root })
            .collect())
    }

    /// Extension-only listing: files whose path ends with `suffix` (e.g.
    /// `.md`), ranked by the frecency part of the composite score.
    pub async fn list_by_extension(
        &self,
        suffix: &str,
        root_filter: Option<&str>,
        weights: Weights,
        limit: usize,
    ) -> DbResult<Vec<ScoredFile>> {
        let mut sql = format!(
            "SELECT f.path, f.root, ({COMPOSITE_FRECENCY_SQL}) AS score \
             FROM files f \
             LEFT JOIN frecency fr ON fr.path = f.path \
             WHERE substr(f.path, length(f.path) - length(?4) + 1) = ?4"
        );
        let filter_count = root_filter.iter().count();
        push_root_filters(&mut sql, filter_count, 5);
        sql.push_str(&format!(
            " ORDER BY score DESC, f.path ASC LIMIT ?{}",
            5 + filter_count
        ));

        let mut query = sqlx::query_as::<_, (String, String, f64)>(&sql)
            .bind(weights.git_recency)
            .bind(weights.git_frequency)
            .bind(weights.git_status)
            .bind(suffix);
        if let Some(root) = root_filter {
            query = query.bind(root_prefix(root));
        }
        let rows = query.bind(limit as i64).fetch_all(self.pool()).await?;

        Ok(rows
            .into_iter()
            .map(|(path, root, score)| ScoredFile { path, score, root })
            .collect())
    }

    /// Frecency-ranked listing with no text match, for prefix-only queries
    /// (`@folder/`, `@ns:` with empty search text).
    pub async fn list_ranked(
        &self,
        root_filters: &[String],
        weights: Weights,
        limit: usize,
    ) -> DbResult<Vec<ScoredFile>> {
        let mut sql = format!(
            "SELECT f.path, f.root, ({COMPOSITE_FRECENCY_SQL}) AS score \
             FROM files f \
             LEFT JOIN frecency fr ON fr.path = f.path \
             WHERE 1 = 1"
        );
        push_root_filters(&mut sql, root_filters.len(), 4);
        sql.push_str(&format!(
            " ORDER BY score DESC, f.path ASC LIMIT ?{}",
            4 + root_filters.len()
        ));

        let mut query = sqlx::query_as::<_, (String, String, f64)>(&sql)
            .bind(weights.git_recency)
            .bind(weights.git_frequency)
            .bind(weights.git_status);
        for root in root_filters {
            query = query.bind(root_prefix(root));
        }
        let rows = query.bind(limit as i64).fetch_all(self.pool()).await?;

        Ok(rows
            .into_iter()
            .map(|(path, root, score)| ScoredFile { path, score, root })
            .collect())
    }

    pub async fn get_watched_root(&self, root: &str) -> DbResult<Option<WatchedRoot>> {
        let row = sqlx::query_as::<_, WatchedRoot>(
            "SELECT root, max_depth, last_indexed_ms, file_count \
             FROM watched_roots WHERE root = ?1",
        )
        .bind(root)
        .fetch_optional(self.pool())
        .await?;
        Ok(row)
    }

    pub async fn list_watched_roots(&self) -> DbResult<Vec<WatchedRoot>> {
        let rows = sqlx::query_as::<_, WatchedRoot>(
            "SELECT root, max_depth, last_indexed_ms, file_count \
             FROM watched_roots ORDER BY root",
        )
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }

    pub async fn upsert_watched_root(
        &self,
        root: &str,
        max_depth: usize,
        last_indexed_ms: i64,
        file_count: i64,
    ) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO watched_roots (root, max_depth, last_indexed_ms, file_count) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(root) DO UPDATE SET \
                 max_depth = excluded.max_depth, \
                 last_indexed_ms = excluded.last_indexed_ms, \
                 file_count = excluded.file_count",
        )
        .bind(root)
        .bind(max_depth as i64)
        .bind(last_indexed_ms)
        .bind(file_count)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Upsert frecency records with `last_seen_ms`. Records whose path has
    /// no file entry are skipped (the foreign key would reject them);
    /// pre-existing records for paths not in this batch are left alone.
    pub async fn upsert_frecency(
        &self,
        records: &[FrecencyRecord],
        last_seen_ms: i64,
    ) -> DbResult<u64> {
        let mut written = 0;
        for chunk in records.chunks(UPSERT_BATCH_SIZE) {
            let mut tx = self.pool().begin().await?;
            for record in chunk {
                let result = sqlx::query(
                    "INSERT INTO frecency (path, git_recency, git_frequency, git_status_boost, last_seen_ms) \
                     SELECT ?1, ?2, ?3, ?4, ?5 \
                     WHERE EXISTS (SELECT 1 FROM files WHERE path = ?1) \
                     ON CONFLICT(path) DO UPDATE SET \
                         git_recency = excluded.git_recency, \
                         git_frequency = excluded.git_frequency, \
                         git_status_boost = excluded.git_status_boost, \
                         last_seen_ms = excluded.last_seen_ms",
                )
                .bind(&record.path)
                .bind(record.git_recency)
                .bind(record.git_frequency)
                .bind(record.git_status_boost)
                .bind(last_seen_ms)
                .execute(&mut *tx)
                .await?;
                written += result.rows_affected();
            }
            tx.commit().await?;
        }
        Ok(written)
    }

    pub async fn get_frecency(&self, path: &str) -> DbResult<Option<FrecencyRecord>> {
        let row: Option<(String, f64, i64, f64)> = sqlx::query_as(
            "SELECT path, git_recency, git_frequency, git_status_boost \
             FROM frecency WHERE path = ?1",
        )
        .bind(path)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(|(path, git_recency, git_frequency, git_status_boost)| FrecencyRecord {
            path,
            git_recency,
            git_frequency,
            git_status_boost,
        }))
    }

    /// Rows in the FTS shadow table matching an expression; used by tests to
    /// verify trigger lockstep.
    pub async fn fts_match_count(&self, match_expr: &str) -> DbResult<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM files_fts WHERE files_fts MATCH ?1")
                .bind(match_expr)
                .fetch_one(self.pool())
                .await
                .map_err(DbError::from)?;
        Ok(row.0)
    }
}

/// Append `AND (substr(path,1,len)=prefix OR …)` clauses for root scoping.
/// Placeholders are numbered from `first_index` so each prefix binds once.
fn push_root_filters(sql: &mut String, count: usize, first_index: usize) {
    if count == 0 {
        return;
    }
    sql.push_str(" AND (");
    for i in 0..count {
        if i > 0 {
            sql.push_str(" OR ");
        }
        let n = first_index + i;
        sql.push_str(&format!("substr(f.path, 1, length(?{n})) = ?{n}"));
    }
    sql.push(')');
}

/// `substr`-based prefix for "path lives under root", avoiding LIKE wildcard
/// pitfalls with `_` in directory names.
fn root_prefix(root: &str) -> String {
    format!("{}/", root.trim_end_matches('/'))
}
