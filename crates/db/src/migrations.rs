/// Inline SQL migrations for the pickme index schema.
///
/// Simple inline migrations rather than sqlx migration files: the schema is
/// small and self-contained, and the daemon opens the database read-only so
/// only the indexer process ever applies these.
pub const MIGRATIONS: &[&str] = &[
    // Migration 1: full initial schema.
    r#"
CREATE TABLE IF NOT EXISTS files (
    path           TEXT PRIMARY KEY,
    filename       TEXT NOT NULL,
    dir_components TEXT NOT NULL DEFAULT '',
    root           TEXT NOT NULL,
    mtime_ms       INTEGER NOT NULL,
    relative_path  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_files_root ON files(root);

CREATE VIRTUAL TABLE IF NOT EXISTS files_fts USING fts5(
    filename,
    dir_components,
    relative_path,
    content='files',
    content_rowid='rowid'
);

CREATE TRIGGER IF NOT EXISTS files_ai AFTER INSERT ON files BEGIN
    INSERT INTO files_fts(rowid, filename, dir_components, relative_path)
    VALUES (new.rowid, new.filename, new.dir_components, new.relative_path);
END;

CREATE TRIGGER IF NOT EXISTS files_ad AFTER DELETE ON files BEGIN
    INSERT INTO files_fts(files_fts, rowid, filename, dir_components, relative_path)
    VALUES ('delete', old.rowid, old.filename, old.dir_components, old.relative_path);
END;

CREATE TRIGGER IF NOT EXISTS files_au AFTER UPDATE ON files BEGIN
    INSERT INTO files_fts(files_fts, rowid, filename, dir_components, relative_path)
    VALUES ('delete', old.rowid, old.filename, old.dir_components, old.relative_path);
    INSERT INTO files_fts(rowid, filename, dir_components, relative_path)
    VALUES (new.rowid, new.filename, new.dir_components, new.relative_path);
END;

CREATE TABLE IF NOT EXISTS frecency (
    path             TEXT PRIMARY KEY REFERENCES files(path) ON DELETE CASCADE,
    git_recency      REAL NOT NULL DEFAULT 0,
    git_frequency    INTEGER NOT NULL DEFAULT 0,
    git_status_boost REAL NOT NULL DEFAULT 0,
    last_seen_ms     INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_frecency_path ON frecency(path);

CREATE TABLE IF NOT EXISTS watched_roots (
    root            TEXT PRIMARY KEY,
    max_depth       INTEGER NOT NULL,
    last_indexed_ms INTEGER,
    file_count      INTEGER
);

CREATE TABLE IF NOT EXISTS schema_meta (
    version INTEGER NOT NULL
);

INSERT INTO schema_meta (version)
SELECT 1 WHERE NOT EXISTS (SELECT 1 FROM schema_meta);
"#,
];
