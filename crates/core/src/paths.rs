// crates/core/src/paths.rs
//! Centralized path functions for all app storage locations.
//!
//! XDG base-dir resolution with `PICKME_CONFIG_PATH` / `PICKME_DB_PATH`
//! overrides, used when the indexer is spawned as a subprocess.

use std::path::PathBuf;

fn xdg_dir(env_var: &str, home_fallback: &[&str]) -> Option<PathBuf> {
    if let Ok(dir) = std::env::var(env_var) {
        if !dir.is_empty() {
            return Some(PathBuf::from(dir));
        }
    }
    let mut dir = dirs::home_dir()?;
    for part in home_fallback {
        dir.push(part);
    }
    Some(dir)
}

/// Config file: `$PICKME_CONFIG_PATH`, else `$XDG_CONFIG_HOME/pickme/config.toml`.
pub fn config_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("PICKME_CONFIG_PATH") {
        if !p.is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    xdg_dir("XDG_CONFIG_HOME", &[".config"]).map(|d| d.join("pickme").join("config.toml"))
}

/// Database file: `$PICKME_DB_PATH`, else `$XDG_DATA_HOME/pickme/index.db`.
pub fn db_path() -> Option<PathBuf> {
    if let Ok(p) = std::env::var("PICKME_DB_PATH") {
        if !p.is_empty() {
            return Some(PathBuf::from(p));
        }
    }
    xdg_dir("XDG_DATA_HOME", &[".local", "share"]).map(|d| d.join("pickme").join("index.db"))
}

/// Runtime directory for the daemon socket: `$XDG_RUNTIME_DIR/pickme`, when set.
///
/// The `/tmp/pickme-<uid>` fallback lives in the daemon crate, which owns the
/// uid lookup and the 0700 permission enforcement.
pub fn runtime_dir() -> Option<PathBuf> {
    match std::env::var("XDG_RUNTIME_DIR") {
        Ok(dir) if !dir.is_empty() => Some(PathBuf::from(dir).join("pickme")),
        _ => None,
    }
}

/// WAL sidecar path for a database file (`index.db` → `index.db-wal`).
pub fn wal_path(db: &std::path::Path) -> PathBuf {
    let mut name = db.as_os_str().to_owned();
    name.push("-wal");
    PathBuf::from(name)
}
