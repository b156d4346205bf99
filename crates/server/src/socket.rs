// crates/server/src/socket.rs
//! Socket path resolution and directory preparation.
//!
//! The socket lives under `$XDG_RUNTIME_DIR/pickme/`, falling back to
//! `/tmp/pickme-<uid>/`. The parent directory must be private (0700); an
//! existing directory with looser permissions is a fatal startup error
//! because any other user could swap the socket underneath us.

use crate::error::DaemonError;
use pickme_core::Config;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};

pub const SOCKET_FILE: &str = "pickme.sock";

/// Resolve the socket path: config override, runtime dir, `/tmp` fallback.
pub fn resolve_socket_path(config: &Config) -> Result<PathBuf, DaemonError> {
    if let Some(path) = &config.daemon.socket_path {
        return Ok(path.clone());
    }
    if let Some(dir) = pickme_core::paths::runtime_dir() {
        return Ok(dir.join(SOCKET_FILE));
    }
    let uid = unsafe { libc::getuid() };
    Ok(PathBuf::from(format!("/tmp/pickme-{uid}")).join(SOCKET_FILE))
}

/// Create the socket's parent directory with mode 0700, verify an existing
/// directory is no looser, and unlink any stale socket file.
pub fn prepare_socket(path: &Path) -> Result<(), DaemonError> {
    let dir = path.parent().ok_or(DaemonError::NoSocketDir)?;

    if !dir.exists() {
        std::fs::DirBuilder::new()
            .recursive(true)
            .mode(0o700)
            .create(dir)
            .map_err(|source| DaemonError::Socket {
                path: dir.to_path_buf(),
                source,
            })?;
    }

    let meta = std::fs::metadata(dir).map_err(|source| DaemonError::Socket {
        path: dir.to_path_buf(),
        source,
    })?;
    let mode = meta.permissions().mode() & 0o777;
    if mode & 0o077 != 0 {
        return Err(DaemonError::SocketDirPermissions {
            path: dir.to_path_buf(),
            mode,
        });
    }

    // A previous daemon may have died without cleanup; errors here are
    // uninteresting (listen will surface anything real).
    let _ = std::fs::remove_file(path);
    Ok(())
}

/// Best-effort socket unlink for the shutdown path. Another process may have
/// already removed it.
pub fn cleanup_socket(path: &Path) {
    let _ = std::fs::remove_file(path);
}
