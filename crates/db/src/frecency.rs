// crates/db/src/frecency.rs
//! Git-derived frecency: recency, frequency, and working-tree status boosts.
//!
//! Everything here is best-effort. A missing `git`, a non-repository
//! directory, or a failing subprocess yields empty data — never an error
//! that could abort an index refresh.

use crate::{Database, DbResult, FrecencyRecord};
use pickme_core::now_ms;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Timeout for git operations.
const GIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Half-life of the recency score, in days.
const RECENCY_HALF_LIFE_DAYS: f64 = 14.0;

/// Look-back window passed to `git log --since`.
const LOG_WINDOW: &str = "90 days";

/// Commit cap passed to `git log -n`.
const LOG_CAP: usize = 1000;

/// Boost for modified or staged files.
const BOOST_TRACKED: f64 = 5.0;
/// Boost for untracked files.
const BOOST_UNTRACKED: f64 = 3.0;

/// Run git with args in `dir`, returning stdout on success and `None` on any
/// failure (missing binary, non-zero exit, timeout).
async fn run_git(dir: &Path, args: &[&str]) -> Option<Vec<u8>> {
    let mut cmd = Command::new("git");
    cmd.arg("-C")
        .arg(dir)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .stdin(Stdio::null());

    match tokio::time::timeout(GIT_TIMEOUT, cmd.output()).await {
        Ok(Ok(output)) if output.status.success() => Some(output.stdout),
        Ok(Ok(output)) => {
            debug!(dir = %dir.display(), status = ?output.status.code(), args = ?args, "git exited nonzero");
            None
        }
        Ok(Err(e)) => {
            debug!(dir = %dir.display(), error = %e, "failed to spawn git");
            None
        }
        Err(_) => {
            debug!(dir = %dir.display(), args = ?args, "git timed out");
            None
        }
    }
}

/// True when `dir` is inside a git work tree.
pub async fn is_git_repo(dir: &Path) -> bool {
    match run_git(dir, &["rev-parse", "--is-inside-work-tree"]).await {
        Some(out) => String::from_utf8_lossy(&out).trim() == "true",
        None => false,
    }
}

/// The repository top level, for resolving repo-relative paths.
async fn repo_toplevel(dir: &Path) -> Option<PathBuf> {
    let out = run_git(dir, &["rev-parse", "--show-toplevel"]).await?;
    let text = String::from_utf8_lossy(&out);
    let line = text.trim();
    (!line.is_empty()).then(|| PathBuf::from(line))
}

/// Parse NUL-delimited `git status --porcelain -z` output into
/// `repo-relative path → boost`.
///
/// Each entry is a two-character status, a space, and the path. Entries
/// whose status starts with `R` or `C` consume the following entry as the
/// rename/copy destination and boost that. A `?` anywhere in the status
/// marks the file untracked.
pub fn parse_status_boosts(output: &[u8]) -> HashMap<String, f64> {
    let mut boosts = HashMap::new();
    let mut entries = output
        .split(|&b| b == 0)
        .map(|e| String::from_utf8_lossy(e).into_owned())
        .filter(|e| !e.is_empty());

    while let Some(entry) = entries.next() {
        let (Some(status), Some(path)) = (entry.get(..2), entry.get(3..)) else {
            continue;
        };
        if path.is_empty() {
            continue;
        }
        let path = path.to_string();
        let boost = if status.contains('?') {
            BOOST_UNTRACKED
        } else {
            BOOST_TRACKED
        };

        if status.starts_with('R') || status.starts_with('C') {
            if let Some(destination) = entries.next() {
                boosts.insert(destination, boost);
            }
            continue;
        }
        boosts.insert(path, boost);
    }
    boosts
}

/// Parse `git log --name-only --format=%at -z` output into
/// `repo-relative path → (last_commit_ts, frequency)`.
///
/// The stream alternates between 10-digit Unix timestamps and file names;
/// `git log` emits newest first, so the first timestamp seen for a path is
/// its last commit and every later appearance increments the frequency.
pub fn parse_log_frecency(output: &[u8]) -> HashMap<String, (i64, i64)> {
    let mut map: HashMap<String, (i64, i64)> = HashMap::new();
    let mut current_ts: Option<i64> = None;

    for chunk in output.split(|&b| b == 0) {
        let chunk = String::from_utf8_lossy(chunk);
        for line in chunk.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            if line.len() == 10 && line.bytes().all(|b| b.is_ascii_digit()) {
                current_ts = line.parse().ok();
                continue;
            }
            let Some(ts) = current_ts else { continue };
            map.entry(line.to_string())
                .and_modify(|(_, freq)| *freq += 1)
                .or_insert((ts, 1));
        }
    }
    map
}

/// Exponential-decay recency score: 1.0 at zero days, ~0.368 at 14 days.
pub fn recency_score(days_since_last_commit: f64) -> f64 {
    (-days_since_last_commit / RECENCY_HALF_LIFE_DAYS).exp()
}

/// Gather frecency records for a repository at `dir`, resolving paths
/// against the repo top level. Returns an empty vec outside a repository.
pub async fn collect_frecency(dir: &Path, now_ms: i64) -> Vec<FrecencyRecord> {
    if !is_git_repo(dir).await {
        return Vec::new();
    }
    let Some(toplevel) = repo_toplevel(dir).await else {
        return Vec::new();
    };

    let boosts = match run_git(dir, &["status", "--porcelain", "-z"]).await {
        Some(out) => parse_status_boosts(&out),
        None => HashMap::new(),
    };

    let since = format!("--since={LOG_WINDOW}");
    let cap = format!("-n{LOG_CAP}");
    let log = match run_git(
        dir,
        &["log", "--name-only", "--format=%at", "-z", &since, &cap],
    )
    .await
    {
        Some(out) => parse_log_frecency(&out),
        None => HashMap::new(),
    };

    let now_secs = now_ms as f64 / 1000.0;
    let mut records: HashMap<String, FrecencyRecord> = HashMap::new();

    for (rel, (last_ts, freq)) in &log {
        let path = resolve_repo_path(&toplevel, rel);
        let days = ((now_secs - *last_ts as f64) / 86_400.0).max(0.0);
        records.insert(
            path.clone(),
            FrecencyRecord {
                path,
                git_recency: recency_score(days),
                git_frequency: *freq,
                git_status_boost: 0.0,
            },
        );
    }

    for (rel, boost) in &boosts {
        let path = resolve_repo_path(&toplevel, rel);
        records
            .entry(path.clone())
            .and_modify(|r| r.git_status_boost = *boost)
            .or_insert(FrecencyRecord {
                path,
                git_recency: 0.0,
                git_frequency: 0,
                git_status_boost: *boost,
            });
    }

    records.into_values().collect()
}

/// Build and persist frecency for the repository containing `dir`. Rows for
/// paths without a file entry are skipped by the storage layer; rows not
/// touched by this run are left alone. Returns the number written.
pub async fn build_frecency(db: &Database, dir: &Path) -> DbResult<u64> {
    let now = now_ms();
    let records = collect_frecency(dir, now).await;
    if records.is_empty() {
        return Ok(0);
    }
    let written = db.upsert_frecency(&records, now).await?;
    debug!(dir = %dir.display(), candidates = records.len(), written, "frecency updated");
    Ok(written)
}

fn resolve_repo_path(toplevel: &Path, relative: &str) -> String {
    let joined = toplevel.join(relative);
    std::fs::canonicalize(&joined)
        .unwrap_or(joined)
        .to_string_lossy()
        .into_owned()
}
