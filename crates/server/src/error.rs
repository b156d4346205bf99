// crates/server/src/error.rs
use std::path::PathBuf;
use thiserror::Error;

/// Daemon-level failures. Per-request failures never surface here; they are
/// encoded into `ok:false` responses on the wire.
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("config error: {0}")]
    Config(#[from] pickme_core::ConfigError),

    #[error("database error: {0}")]
    Db(#[from] pickme_db::DbError),

    #[error("socket directory {path} has loose permissions {mode:o}; expected 0700")]
    SocketDirPermissions { path: PathBuf, mode: u32 },

    #[error("failed to prepare socket at {path}: {source}")]
    Socket {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot determine a socket directory (no XDG_RUNTIME_DIR and no uid)")]
    NoSocketDir,

    #[error("watcher error: {0}")]
    Watcher(#[from] notify::Error),
}
