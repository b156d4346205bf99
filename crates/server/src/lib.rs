// crates/server/src/lib.rs
//! The pickme daemon: a Unix-socket NDJSON server over the search index,
//! with TTL + prefix caches, filesystem watchers, and lifecycle management.
//!
//! [`run`] owns the whole lifetime: bind the socket, spawn the coordinator,
//! idle timer, and signal listeners, serve until something cancels the
//! shared token, then tear everything down in order and return so the entry
//! point can exit 0.

pub mod cache;
pub mod error;
pub mod handlers;
pub mod lifecycle;
pub mod server;
pub mod socket;
pub mod state;
pub mod watchers;

pub use error::DaemonError;

use cache::{PrefixCache, TtlCache};
use pickme_core::Config;
use pickme_db::Database;
use pickme_search::Picker;
use state::DaemonState;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use watchers::WatchEvent;

/// Debounce window shared by all filesystem watchers.
pub const DEBOUNCE: Duration = Duration::from_millis(100);

/// Everything a request handler can touch. One instance per daemon process,
/// created in [`run`] and passed by `Arc`; no process-wide statics.
pub struct Daemon {
    picker: Picker,
    state: Mutex<DaemonState>,
    ttl_cache: Mutex<TtlCache>,
    prefix_cache: Mutex<PrefixCache>,
    cancel: CancellationToken,
    roots: Vec<PathBuf>,
    active_watchers: std::sync::atomic::AtomicUsize,
}

impl Daemon {
    pub fn new(picker: Picker, cancel: CancellationToken) -> Self {
        let roots = picker.config().expanded_roots();
        Self {
            picker,
            state: Mutex::new(DaemonState::new()),
            ttl_cache: Mutex::new(TtlCache::new(cache::TTL_CAPACITY)),
            prefix_cache: Mutex::new(PrefixCache::new()),
            cancel,
            roots,
            active_watchers: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn picker(&self) -> &Picker {
        &self.picker
    }

    /// Lock the daemon state. Guards are held for field updates only, never
    /// across an await.
    pub fn state(&self) -> MutexGuard<'_, DaemonState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn ttl_cache(&self) -> MutexGuard<'_, TtlCache> {
        self.ttl_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn prefix_cache(&self) -> MutexGuard<'_, PrefixCache> {
        self.prefix_cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Bump the generation and eagerly drop the prefix cache. TTL entries
    /// keyed by the old generation become unreachable and age out.
    pub fn bump_generation(&self) -> u64 {
        let generation = self.state().bump_generation();
        self.prefix_cache().clear();
        generation
    }

    /// Request daemon shutdown. Idempotent.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn roots_loaded(&self) -> Vec<String> {
        self.roots
            .iter()
            .map(|r| r.to_string_lossy().into_owned())
            .collect()
    }

    pub fn active_watchers(&self) -> usize {
        self.active_watchers
            .load(std::sync::atomic::Ordering::Relaxed)
    }

    fn set_active_watchers(&self, count: usize) {
        self.active_watchers
            .store(count, std::sync::atomic::Ordering::Relaxed);
    }
}

/// Startup knobs; the defaults are production behavior, tests shrink them.
pub struct DaemonOptions {
    /// Socket path override (wins over config and XDG resolution).
    pub socket_path: Option<PathBuf>,
    /// Database path override (wins over `PICKME_DB_PATH` / XDG resolution).
    pub db_path: Option<PathBuf>,
    pub idle_timeout: Duration,
    /// Install SIGINT/SIGTERM/SIGHUP listeners.
    pub handle_signals: bool,
    /// Run once during shutdown, before the server stops. Errors (panics)
    /// are swallowed.
    pub shutdown_hook: Option<Box<dyn FnOnce() + Send>>,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            socket_path: None,
            db_path: None,
            idle_timeout: lifecycle::IDLE_TIMEOUT,
            handle_signals: true,
            shutdown_hook: None,
        }
    }
}

/// Debounced coordinator: collapse bursts of watcher events into one
/// generation bump per quiet window; confirm database events against the
/// real file mtimes before bumping.
async fn coordinator_loop(
    daemon: Arc<Daemon>,
    mut rx: mpsc::Receiver<WatchEvent>,
    db_path: Option<PathBuf>,
    cancel: CancellationToken,
) {
    use tokio::time::{sleep_until, Instant};

    let mut fs_deadline: Option<Instant> = None;
    let mut db_deadline: Option<Instant> = None;
    let mut last_db_mtime = db_path.as_deref().and_then(watchers::latest_db_mtime);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            event = rx.recv() => {
                match event {
                    Some(WatchEvent::RootChanged) => {
                        fs_deadline = Some(Instant::now() + DEBOUNCE);
                    }
                    Some(WatchEvent::WatchError) => {
                        let generation = daemon.bump_generation();
                        debug!(generation, "watcher error, generation bumped");
                    }
                    Some(WatchEvent::DbTouched) => {
                        db_deadline = Some(Instant::now() + DEBOUNCE);
                    }
                    None => return,
                }
            }
            _ = sleep_until(fs_deadline.unwrap_or_else(Instant::now)), if fs_deadline.is_some() => {
                fs_deadline = None;
                let generation = daemon.bump_generation();
                debug!(generation, "filesystem change, generation bumped");
            }
            _ = sleep_until(db_deadline.unwrap_or_else(Instant::now)), if db_deadline.is_some() => {
                db_deadline = None;
                let current = db_path.as_deref().and_then(watchers::latest_db_mtime);
                if current > last_db_mtime {
                    last_db_mtime = current;
                    let generation = daemon.bump_generation();
                    debug!(generation, "database rewritten, generation bumped");
                }
            }
        }
    }
}

/// Open the index read-only, creating an empty one first if the indexer has
/// never run.
async fn open_index(db_path: Option<PathBuf>) -> Result<Database, DaemonError> {
    let path = match db_path.or_else(pickme_core::paths::db_path) {
        Some(path) => path,
        None => return Ok(Database::open_in_memory().await?),
    };
    if !path.exists() {
        // First run before any index refresh: create the schema so reads
        // succeed, then reopen read-only.
        drop(Database::open(&path).await?);
    }
    Ok(Database::open_read_only(&path).await?)
}

/// Run the daemon to completion. Returns when shutdown finishes; the caller
/// exits the process (code 0) — never from inside the shutdown path.
pub async fn run(config: Config, options: DaemonOptions) -> Result<(), DaemonError> {
    let socket_path = match &options.socket_path {
        Some(path) => path.clone(),
        None => socket::resolve_socket_path(&config)?,
    };
    socket::prepare_socket(&socket_path)?;

    let db = open_index(options.db_path.clone()).await?;
    let db_file = (!db.db_path().as_os_str().is_empty()).then(|| db.db_path().to_path_buf());

    let cancel = CancellationToken::new();
    let daemon = Arc::new(Daemon::new(Picker::new(db, config), cancel.clone()));

    let listener = tokio::net::UnixListener::bind(&socket_path).map_err(|source| {
        DaemonError::Socket {
            path: socket_path.clone(),
            source,
        }
    })?;
    info!(socket = %socket_path.display(), "daemon listening");

    // Watchers post into the coordinator channel; the handles must stay
    // alive until shutdown.
    let (watch_tx, watch_rx) = mpsc::channel(64);
    let root_watchers = watchers::start_root_watchers(&daemon.roots, &watch_tx);
    let db_watcher = match &db_file {
        Some(path) => match watchers::start_db_watcher(path, &watch_tx) {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                debug!(error = %e, "database watcher unavailable");
                None
            }
        },
        None => None,
    };
    daemon.set_active_watchers(root_watchers.len() + usize::from(db_watcher.is_some()));

    let coordinator = tokio::spawn(coordinator_loop(
        daemon.clone(),
        watch_rx,
        db_file,
        cancel.clone(),
    ));
    let idle = tokio::spawn(lifecycle::idle_loop(
        daemon.clone(),
        options.idle_timeout,
        cancel.clone(),
    ));
    if options.handle_signals {
        tokio::spawn(lifecycle::signal_loop(cancel.clone()));
    }

    server::serve(daemon.clone(), listener, cancel.clone()).await;

    // Shutdown sequence: hook first (errors swallowed), then the background
    // tasks, watchers, and finally the socket file.
    if let Some(hook) = options.shutdown_hook {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(hook));
        if result.is_err() {
            debug!("shutdown hook panicked (ignored)");
        }
    }
    cancel.cancel();
    let _ = idle.await;
    let _ = coordinator.await;
    drop(root_watchers);
    drop(db_watcher);
    socket::cleanup_socket(&socket_path);
    info!("daemon stopped");
    Ok(())
}
