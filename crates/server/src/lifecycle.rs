// crates/server/src/lifecycle.rs
//! Idle shutdown, signal handling, and the memory circuit breaker.

use crate::Daemon;
use std::sync::Arc;
use std::time::Duration;
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Default idle timeout before the daemon shuts itself down.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// Minimum spacing between RSS samples on the request path.
pub const RSS_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// RSS above this logs a warning.
pub const RSS_WARN_BYTES: u64 = 256 * 1024 * 1024;

/// RSS above this shuts the daemon down.
pub const RSS_EXIT_BYTES: u64 = 512 * 1024 * 1024;

/// Resident set size of this process, in bytes.
pub fn sample_rss() -> Option<u64> {
    let pid = Pid::from_u32(std::process::id());
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).map(|p| p.memory())
}

/// Sample RSS (rate-limited through the daemon state) and act on the
/// thresholds. Returns true when a shutdown was initiated.
pub fn maybe_check_rss(daemon: &Daemon) -> bool {
    if !daemon.state().should_check_rss(RSS_CHECK_INTERVAL) {
        return false;
    }
    let Some(rss) = sample_rss() else {
        return false;
    };
    if rss >= RSS_EXIT_BYTES {
        warn!(rss, "resident memory over hard limit, shutting down");
        daemon.cancel();
        return true;
    }
    if rss >= RSS_WARN_BYTES {
        warn!(rss, "resident memory high");
    }
    false
}

/// Idle watchdog: wake on the configured cadence and shut down once the
/// observed idle time really exceeds the threshold (activity between wakeups
/// reschedules instead).
pub async fn idle_loop(daemon: Arc<Daemon>, timeout: Duration, cancel: CancellationToken) {
    loop {
        let idle = daemon.state().idle_for();
        let wait = timeout.saturating_sub(idle).max(Duration::from_millis(50));
        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }
        if daemon.state().idle_for() >= timeout {
            info!(idle_secs = timeout.as_secs(), "idle timeout, shutting down");
            cancel.cancel();
            return;
        }
    }
}

/// SIGINT / SIGTERM / SIGHUP all trigger the same orderly shutdown.
pub async fn signal_loop(cancel: CancellationToken) {
    use tokio::signal::unix::{signal, SignalKind};

    let mut interrupt = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "cannot install SIGINT handler");
            return;
        }
    };
    let mut terminate = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "cannot install SIGTERM handler");
            return;
        }
    };
    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "cannot install SIGHUP handler");
            return;
        }
    };

    tokio::select! {
        _ = cancel.cancelled() => return,
        _ = interrupt.recv() => info!("received SIGINT"),
        _ = terminate.recv() => info!("received SIGTERM"),
        _ = hangup.recv() => info!("received SIGHUP"),
    }
    cancel.cancel();
}
