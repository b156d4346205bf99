// crates/server/src/watchers.rs
//! Filesystem watchers feeding the coordinator.
//!
//! Watcher callbacks run on notify's own thread; they only forward events
//! over an mpsc channel, turning the callback lifetime problem into plain
//! data flow. Debouncing and generation bumps happen in the coordinator.

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Events posted to the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    /// Something under a watched root changed.
    RootChanged,
    /// A watcher failed; treated as a change out of caution.
    WatchError,
    /// The database file or its WAL sidecar was touched.
    DbTouched,
}

/// Start one recursive watcher per root. Roots that cannot be watched are
/// logged and skipped; the returned handles must be kept alive for the
/// watch to continue.
pub fn start_root_watchers(
    roots: &[PathBuf],
    tx: &mpsc::Sender<WatchEvent>,
) -> Vec<RecommendedWatcher> {
    let mut watchers = Vec::new();
    for root in roots {
        let event_tx = tx.clone();
        let watcher = notify::recommended_watcher(
            move |res: Result<notify::Event, notify::Error>| {
                let event = match res {
                    Ok(event) => match event.kind {
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) => {
                            WatchEvent::RootChanged
                        }
                        _ => return,
                    },
                    Err(_) => WatchEvent::WatchError,
                };
                // Best-effort; a full channel already has a pending bump.
                let _ = event_tx.try_send(event);
            },
        );
        match watcher {
            Ok(mut watcher) => match watcher.watch(root, RecursiveMode::Recursive) {
                Ok(()) => {
                    debug!(root = %root.display(), "watching root");
                    watchers.push(watcher);
                }
                Err(e) => warn!(root = %root.display(), error = %e, "cannot watch root"),
            },
            Err(e) => warn!(root = %root.display(), error = %e, "cannot create watcher"),
        }
    }
    watchers
}

/// Watch the database file and its WAL sidecar via their parent directory.
/// Events for other files in the directory are filtered out here.
pub fn start_db_watcher(
    db_path: &Path,
    tx: &mpsc::Sender<WatchEvent>,
) -> notify::Result<RecommendedWatcher> {
    let db = db_path.to_path_buf();
    let wal = pickme_core::paths::wal_path(db_path);
    let event_tx = tx.clone();

    let mut watcher =
        notify::recommended_watcher(move |res: Result<notify::Event, notify::Error>| {
            match res {
                Ok(event) => {
                    if event.paths.iter().any(|p| p == &db || p == &wal) {
                        let _ = event_tx.try_send(WatchEvent::DbTouched);
                    }
                }
                Err(_) => {
                    let _ = event_tx.try_send(WatchEvent::WatchError);
                }
            }
        })?;

    let dir = db_path.parent().unwrap_or(Path::new("."));
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    debug!(db = %db_path.display(), "watching database");
    Ok(watcher)
}

/// Newest mtime across the database file and its WAL sidecar. Used by the
/// coordinator's debounced comparison to suppress spurious events.
pub fn latest_db_mtime(db_path: &Path) -> Option<SystemTime> {
    let wal = pickme_core::paths::wal_path(db_path);
    [db_path, wal.as_path()]
        .iter()
        .filter_map(|p| std::fs::metadata(p).ok())
        .filter_map(|m| m.modified().ok())
        .max()
}
