// crates/db/src/lib.rs
//! SQLite storage for the pickme file index.
//!
//! Owns the schema (files + FTS5 shadow table + frecency + watched roots),
//! the prepared queries every other component goes through, the directory
//! indexer, and the git frecency builder.

pub mod frecency;
pub mod fts;
pub mod indexer;
mod migrations;
mod queries;

pub use fts::escape_fts_query;
pub use queries::{FileEntry, FrecencyRecord, ScoredFile, WatchedRoot};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::info;

/// Batch size for file upserts and deletes.
pub const UPSERT_BATCH_SIZE: usize = 100;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("database error: {0}")]
    Database(sqlx::Error),

    #[error("FTS syntax error: {0}")]
    FtsSyntax(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

impl From<sqlx::Error> for DbError {
    /// FTS5 reports query-syntax problems through the generic SQLite error
    /// path; discriminate on the message text. Escaping makes these
    /// unreachable from user input, but the caller still gets the right kind.
    fn from(e: sqlx::Error) -> Self {
        let text = e.to_string();
        if text.contains("fts5: syntax error") || text.contains("malformed MATCH") {
            DbError::FtsSyntax(text)
        } else {
            DbError::Database(e)
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Main database handle wrapping a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    db_path: PathBuf,
}

fn connect_options(path: &Path) -> DbResult<SqliteConnectOptions> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))
        .map_err(DbError::Database)?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(std::time::Duration::from_secs(5))
        .pragma("temp_store", "MEMORY")
        // Negative cache_size is KiB: 64 MiB page cache.
        .pragma("cache_size", "-65536")
        // 256 MiB memory-mapped region.
        .pragma("mmap_size", "268435456");
    Ok(options)
}

impl Database {
    /// Open (or create) the database at the given path and run migrations.
    pub async fn open(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = connect_options(path)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self {
            pool,
            db_path: path.to_owned(),
        };
        db.run_migrations().await?;

        info!("database opened at {}", path.display());
        Ok(db)
    }

    /// Open an existing database read-only. Used by the daemon, which never
    /// writes: the background indexer owns all writes and WAL isolates the
    /// two processes. Freshness is observed via the `-wal` sidecar mtime.
    pub async fn open_read_only(path: &Path) -> DbResult<Self> {
        let options = connect_options(path)?.read_only(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        Ok(Self {
            pool,
            db_path: path.to_owned(),
        })
    }

    /// Create an in-memory database (for testing).
    ///
    /// `shared_cache` makes all pool connections see the same database;
    /// without it each connection would get a private empty one.
    pub async fn open_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(DbError::Database)?
            .shared_cache(true)
            .foreign_keys(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let db = Self {
            pool,
            db_path: PathBuf::new(),
        };
        db.run_migrations().await?;
        Ok(db)
    }

    /// Open the database at the default location:
    /// `$XDG_DATA_HOME/pickme/index.db` (`PICKME_DB_PATH` override honored).
    pub async fn open_default() -> DbResult<Self> {
        let path = pickme_core::paths::db_path()
            .ok_or_else(|| DbError::Schema("cannot determine data directory".to_string()))?;
        Self::open(&path).await
    }

    /// Run all inline migrations.
    ///
    /// A `_migrations` table tracks which statements have been applied, so
    /// non-idempotent statements only ever run once.
    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1; // 1-based
            if version > current_version {
                sqlx::raw_sql(migration)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| {
                        DbError::Schema(format!("migration {version} failed: {e}"))
                    })?;
                sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
                    .bind(version as i64)
                    .execute(&self.pool)
                    .await?;
            }
        }

        Ok(())
    }

    /// The recorded schema version from `schema_meta`.
    pub async fn schema_version(&self) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT version FROM schema_meta LIMIT 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Path of the database file; empty for in-memory databases.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}
