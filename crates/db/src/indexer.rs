// crates/db/src/indexer.rs
//! Directory indexer: discover → stat → batch-upsert → prune.
//!
//! Discovery prefers an external `fd` binary and falls back to a recursive
//! walk. The indexer runs as a short-lived process driven by the host's
//! session-start hook; the daemon only ever reads what it wrote.

use crate::{Database, DbError, FileEntry, UPSERT_BATCH_SIZE};
use pickme_core::{now_ms, Config};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, warn};

/// Timeout for external finder invocations.
const FD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum IndexError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

pub type IndexResult<T> = Result<T, IndexError>;

/// Traversal options for one root.
#[derive(Debug, Clone)]
pub struct IndexOptions {
    /// Depth cap, counting the root as depth 1. Zero indexes nothing.
    pub max_depth: usize,
    pub include_hidden: bool,
    pub include_gitignored: bool,
    /// Basename exclude patterns: exact name, `*.ext` suffix, or `prefix*`.
    pub exclude: Vec<String>,
    /// Basename allowlist; empty means everything.
    pub include: Vec<String>,
    /// Absolute path prefixes never traversed.
    pub disabled: Vec<PathBuf>,
    /// Cap on files indexed for this root.
    pub max_files: Option<usize>,
    pub incremental: bool,
    pub last_indexed_ms: Option<i64>,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            max_depth: pickme_core::config::DEFAULT_MAX_DEPTH,
            include_hidden: false,
            include_gitignored: false,
            exclude: Vec::new(),
            include: Vec::new(),
            disabled: Vec::new(),
            max_files: None,
            incremental: false,
            last_indexed_ms: None,
        }
    }
}

impl IndexOptions {
    pub fn from_config(config: &Config, root: &str) -> Self {
        Self {
            max_depth: config.depth_for_root(root),
            include_hidden: config.index.include_hidden,
            include_gitignored: !config.index.exclude.gitignored_files,
            exclude: config.index.exclude.patterns.clone(),
            include: config.index.include.patterns.clone(),
            disabled: config.expanded_disabled(),
            max_files: config.index.limits.max_files_per_root,
            incremental: false,
            last_indexed_ms: None,
        }
    }
}

/// Counts for one `index_directory` pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndexOutcome {
    pub files_indexed: usize,
    pub files_skipped: usize,
    /// Per-file errors; these never abort the pass.
    pub errors: Vec<String>,
}

/// Per-root counts from a refresh pass.
#[derive(Debug, Clone, Default)]
pub struct RootRefresh {
    pub root: String,
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub files_pruned: u64,
    pub errors: Vec<String>,
}

/// Result of refreshing every configured root.
#[derive(Debug, Clone, Default)]
pub struct RefreshOutcome {
    pub roots: Vec<RootRefresh>,
    pub elapsed_ms: u64,
}

/// Match a basename against the simplified exclude grammar: exact name,
/// `*.ext` suffix, or `prefix*`.
fn matches_simple_pattern(name: &str, pattern: &str) -> bool {
    if let Some(suffix) = pattern.strip_prefix("*.") {
        return Path::new(name)
            .extension()
            .map(|e| e.to_string_lossy() == suffix)
            .unwrap_or(false);
    }
    if let Some(prefix) = pattern.split_once('*').map(|(p, _)| p) {
        if !prefix.is_empty() {
            return name.starts_with(prefix);
        }
    }
    name == pattern
}

fn is_excluded(name: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| matches_simple_pattern(name, p))
}

fn is_disabled(path: &Path, disabled: &[PathBuf]) -> bool {
    disabled.iter().any(|d| path.starts_with(d))
}

/// Locate an `fd`-style finder on PATH (`fd`, or Debian's `fdfind`).
fn find_fd() -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for name in ["fd", "fdfind"] {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }
    None
}

/// Run the external finder; `Ok(None)` means it was unusable and the caller
/// should fall back to the walker.
async fn discover_with_fd(
    fd: &Path,
    root: &Path,
    opts: &IndexOptions,
    changed_within: Option<&str>,
) -> Option<Vec<PathBuf>> {
    let mut cmd = Command::new(fd);
    cmd.arg("--absolute-path")
        .arg("--type")
        .arg("f")
        .arg("--follow")
        .arg("--max-depth")
        .arg(opts.max_depth.to_string());
    if opts.include_hidden {
        cmd.arg("--hidden");
    }
    if opts.include_gitignored {
        cmd.arg("--no-ignore");
    }
    for pattern in &opts.exclude {
        cmd.arg("--exclude").arg(pattern);
    }
    if let Some(within) = changed_within {
        cmd.arg("--changed-within").arg(within);
    }
    cmd.arg(".")
        .arg(root)
        .stdout(Stdio::piped())
        .stderr(Stdio::null());

    let output = match tokio::time::timeout(FD_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => output,
        Ok(Ok(output)) => {
            debug!(root = %root.display(), status = ?output.status.code(), "fd failed, falling back to walker");
            return None;
        }
        Ok(Err(e)) => {
            debug!(root = %root.display(), error = %e, "fd spawn failed, falling back to walker");
            return None;
        }
        Err(_) => {
            warn!(root = %root.display(), "fd timed out, falling back to walker");
            return None;
        }
    };

    let paths = String::from_utf8_lossy(&output.stdout)
        .lines()
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect();
    Some(paths)
}

/// Recursive walk fallback with simplified exclude matching.
fn discover_with_walker(root: &Path, opts: &IndexOptions) -> (Vec<PathBuf>, Vec<String>) {
    if opts.max_depth == 0 {
        return (Vec::new(), Vec::new());
    }

    let exclude = opts.exclude.clone();
    let disabled = opts.disabled.clone();
    let mut walker = ignore::WalkBuilder::new(root);
    walker
        .max_depth(Some(opts.max_depth))
        .follow_links(true)
        .hidden(!opts.include_hidden)
        .git_ignore(!opts.include_gitignored)
        .git_global(!opts.include_gitignored)
        .git_exclude(!opts.include_gitignored)
        .filter_entry(move |entry| {
            let name = entry.file_name().to_string_lossy();
            !is_excluded(&name, &exclude) && !is_disabled(entry.path(), &disabled)
        });

    let mut paths = Vec::new();
    let mut errors = Vec::new();
    for result in walker.build() {
        match result {
            Ok(entry) => {
                if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    paths.push(entry.into_path());
                }
            }
            // Broken symlinks and dangling entries are skipped silently;
            // anything else is reported.
            Err(ignore::Error::WithPath { path, err }) => {
                if let ignore::Error::Io(io) = err.as_ref() {
                    if io.kind() == std::io::ErrorKind::NotFound {
                        continue;
                    }
                }
                errors.push(format!("{}: {err}", path.display()));
            }
            Err(e) => errors.push(e.to_string()),
        }
    }
    (paths, errors)
}

/// Enumerate candidate files under `root` according to the options.
async fn discover(root: &Path, opts: &IndexOptions) -> (Vec<PathBuf>, Vec<String>) {
    if opts.max_depth == 0 {
        return (Vec::new(), Vec::new());
    }

    let mut discovered = None;
    if let Some(fd) = find_fd() {
        discovered = discover_with_fd(&fd, root, opts, None).await;
    }
    let (mut paths, errors) = match discovered {
        Some(paths) => (paths, Vec::new()),
        None => {
            let root = root.to_path_buf();
            let opts = opts.clone();
            tokio::task::spawn_blocking(move || discover_with_walker(&root, &opts))
                .await
                .unwrap_or_else(|e| (Vec::new(), vec![format!("walker task failed: {e}")]))
        }
    };

    // fd passes excludes natively but not the disabled prefixes or the
    // include allowlist; apply both uniformly here.
    paths.retain(|p| !is_disabled(p, &opts.disabled));
    if !opts.include.is_empty() {
        paths.retain(|p| {
            p.file_name()
                .map(|n| is_excluded(&n.to_string_lossy(), &opts.include))
                .unwrap_or(false)
        });
    }
    if let Some(cap) = opts.max_files {
        paths.truncate(cap);
    }
    (paths, errors)
}

/// Index one root: discover files, stat them, and upsert in batches of
/// [`UPSERT_BATCH_SIZE`]. `all_roots` is the full set of indexed roots used
/// by the symlink policy: a target whose canonical path escapes every root
/// is skipped.
pub async fn index_directory(
    db: &Database,
    root: &Path,
    all_roots: &[PathBuf],
    opts: &IndexOptions,
) -> IndexResult<IndexOutcome> {
    let root = tokio::fs::canonicalize(root)
        .await
        .map_err(|source| IndexError::Io {
            path: root.to_path_buf(),
            source,
        })?;

    let (paths, walk_errors) = discover(&root, opts).await;

    let mut outcome = IndexOutcome {
        errors: walk_errors,
        ..Default::default()
    };
    let mut seen: HashSet<PathBuf> = HashSet::new();
    let mut batch: Vec<FileEntry> = Vec::with_capacity(UPSERT_BATCH_SIZE);

    for path in paths {
        let meta = match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) => meta,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Raced deletion or broken symlink.
                outcome.files_skipped += 1;
                continue;
            }
            Err(e) => {
                outcome.errors.push(format!("{}: {e}", path.display()));
                continue;
            }
        };

        // Resolve the canonical target; a broken symlink fails here and is
        // skipped silently.
        let canonical = match tokio::fs::canonicalize(&path).await {
            Ok(canonical) => canonical,
            Err(_) => {
                outcome.files_skipped += 1;
                continue;
            }
        };

        // Symlink policy: the canonical path must live under an indexed root.
        let owner = all_roots
            .iter()
            .find(|r| canonical.starts_with(r))
            .cloned()
            .or_else(|| canonical.starts_with(&root).then(|| root.clone()));
        let Some(owner) = owner else {
            outcome.files_skipped += 1;
            continue;
        };

        if !seen.insert(canonical.clone()) {
            continue;
        }

        let mtime_ms = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);

        if opts.incremental {
            if let Some(last) = opts.last_indexed_ms {
                if mtime_ms <= last {
                    outcome.files_skipped += 1;
                    continue;
                }
            }
        }

        batch.push(FileEntry::new(&canonical, &owner, mtime_ms));
        if batch.len() >= UPSERT_BATCH_SIZE {
            db.upsert_files(&batch).await?;
            outcome.files_indexed += batch.len();
            batch.clear();
        }
    }

    if !batch.is_empty() {
        db.upsert_files(&batch).await?;
        outcome.files_indexed += batch.len();
    }

    Ok(outcome)
}

/// Remove entries for a root whose files no longer exist on disk.
pub async fn prune_root(db: &Database, root: &str) -> IndexResult<u64> {
    let stored = db.list_paths_for_root(root).await?;
    let mut missing = Vec::new();
    for path in stored {
        match tokio::fs::symlink_metadata(&path).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => missing.push(path),
            Err(e) => debug!(path = %path, error = %e, "prune existence check failed"),
        }
    }
    if missing.is_empty() {
        return Ok(0);
    }
    Ok(db.delete_files(&missing).await?)
}

/// Refresh every configured root in declaration order. Per-root failures are
/// recorded and never abort the pass.
pub async fn refresh_all(db: &Database, config: &Config) -> RefreshOutcome {
    let start = Instant::now();
    let mut outcome = RefreshOutcome::default();

    let all_roots: Vec<PathBuf> = config
        .expanded_roots()
        .iter()
        .map(|r| std::fs::canonicalize(r).unwrap_or_else(|_| r.clone()))
        .collect();

    for (raw_root, root) in config.index.roots.iter().zip(&all_roots) {
        let root_str = root.to_string_lossy().into_owned();
        let mut refresh = RootRefresh {
            root: root_str.clone(),
            ..Default::default()
        };

        let mut opts = IndexOptions::from_config(config, raw_root);
        match db.get_watched_root(&root_str).await {
            Ok(Some(watched)) => {
                if let Some(last) = watched.last_indexed_ms {
                    opts.incremental = true;
                    opts.last_indexed_ms = Some(last);
                }
            }
            Ok(None) => {}
            Err(e) => refresh.errors.push(e.to_string()),
        }

        let indexed_at = now_ms();
        match index_directory(db, root, &all_roots, &opts).await {
            Ok(pass) => {
                refresh.files_indexed = pass.files_indexed;
                refresh.files_skipped = pass.files_skipped;
                refresh.errors.extend(pass.errors);

                match prune_root(db, &root_str).await {
                    Ok(pruned) => refresh.files_pruned = pruned,
                    Err(e) => refresh.errors.push(e.to_string()),
                }

                if let Err(e) = db
                    .upsert_watched_root(
                        &root_str,
                        opts.max_depth,
                        indexed_at,
                        pass.files_indexed as i64,
                    )
                    .await
                {
                    refresh.errors.push(e.to_string());
                }
            }
            Err(e) => {
                warn!(root = %root.display(), error = %e, "root refresh failed");
                refresh.errors.push(e.to_string());
            }
        }

        outcome.roots.push(refresh);
    }

    outcome.elapsed_ms = start.elapsed().as_millis() as u64;
    outcome
}

/// Parse a change window like `30m`, `24h`, `1d`, `2w`.
pub fn parse_within(text: &str) -> Option<Duration> {
    let (digits, unit) = text.split_at(text.len().checked_sub(1)?);
    let amount: u64 = digits.parse().ok()?;
    let secs = match unit {
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        "w" => 7 * 24 * 60 * 60,
        _ => return None,
    };
    Some(Duration::from_secs(amount * secs))
}

/// Files under `root` modified within the given window (`30m`, `24h`, `1d`,
/// `2w`), for the session-start hook. Uses the external finder's
/// changed-within flag when available.
pub async fn recent_files(
    root: &Path,
    within: &str,
    max_results: Option<usize>,
    exclude: &[String],
) -> IndexResult<Vec<PathBuf>> {
    let window = parse_within(within).ok_or_else(|| IndexError::Io {
        path: root.to_path_buf(),
        source: std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid change window {within:?}"),
        ),
    })?;
    let cap = max_results.unwrap_or(100);
    let opts = IndexOptions {
        exclude: exclude.to_vec(),
        ..Default::default()
    };

    if let Some(fd) = find_fd() {
        if let Some(mut paths) = discover_with_fd(&fd, root, &opts, Some(within)).await {
            paths.truncate(cap);
            return Ok(paths);
        }
    }

    let cutoff = std::time::SystemTime::now()
        .checked_sub(window)
        .unwrap_or(std::time::UNIX_EPOCH);
    let root_buf = root.to_path_buf();
    let (paths, _errors) =
        tokio::task::spawn_blocking(move || discover_with_walker(&root_buf, &opts))
            .await
            .unwrap_or_else(|e| (Vec::new(), vec![e.to_string()]));

    let mut recent = Vec::new();
    for path in paths {
        if recent.len() >= cap {
            break;
        }
        if let Ok(meta) = tokio::fs::metadata(&path).await {
            if meta.modified().map(|t| t >= cutoff).unwrap_or(false) {
                recent.push(path);
            }
        }
    }
    Ok(recent)
}
