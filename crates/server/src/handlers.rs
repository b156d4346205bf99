// crates/server/src/handlers.rs
//! Request dispatch: one parsed request in, one response out.

use crate::cache::CacheKey;
use crate::lifecycle;
use crate::state::CircuitAction;
use crate::Daemon;
use pickme_search::effective_limit;
use pickme_types::{
    parse_request, HealthInfo, Request, RequestBody, Response, SearchHit,
};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Hard ceiling on a single request's handling time. Work past the deadline
/// is abandoned, not cancelled; the client just gets the timeout error.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Handle one NDJSON line and produce the response line.
pub async fn handle_line(daemon: &Daemon, line: &str) -> Response {
    let start = Instant::now();
    let request = match parse_request(line) {
        Ok(request) => request,
        Err(e) => return Response::failure(e.id, e.message, elapsed_ms(start)),
    };

    let id = request.id.clone();
    match tokio::time::timeout(REQUEST_TIMEOUT, dispatch(daemon, request, start)).await {
        Ok(response) => response,
        Err(_) => {
            warn!(id = %id, "request timed out");
            Response::failure(id, "Request timeout", elapsed_ms(start))
        }
    }
}

async fn dispatch(daemon: &Daemon, request: Request, start: Instant) -> Response {
    daemon.state().touch();
    let id = request.id;
    match request.body {
        RequestBody::Search { query, cwd, limit } => {
            handle_search(daemon, id, query, cwd, limit, start).await
        }
        RequestBody::Health {} => handle_health(daemon, id),
        RequestBody::Invalidate { root } => {
            let generation = daemon.bump_generation();
            debug!(id = %id, ?root, generation, "invalidated");
            Response::ack(id)
        }
        RequestBody::Stop {} => {
            debug!(id = %id, "stop requested");
            daemon.cancel();
            Response::ack(id)
        }
    }
}

async fn handle_search(
    daemon: &Daemon,
    id: String,
    query: String,
    cwd: Option<String>,
    limit: Option<usize>,
    start: Instant,
) -> Response {
    if lifecycle::maybe_check_rss(daemon) {
        return Response::failure(id, "daemon shutting down", elapsed_ms(start));
    }

    let limit = effective_limit(query.chars().count(), limit);
    let generation = daemon.state().generation();
    let key = CacheKey {
        generation,
        cwd: cwd.clone(),
        query: query.clone(),
        limit,
    };

    if let Some(results) = daemon.ttl_cache().get(&key) {
        daemon.state().record_cache_lookup(true);
        return Response::search(id, results, true, elapsed_ms(start));
    }

    // The prefix cache filters the previous result set by the current search
    // text, so retypes stay flat while the user extends the query.
    let (_, search_text) = pickme_core::parse_query(&query, daemon.picker().config());
    let needle = search_text.to_lowercase();
    let prefix_hit = daemon.prefix_cache().get(&query, cwd.as_deref(), |hit| {
        hit.path.to_lowercase().contains(&needle)
    });
    if let Some(results) = prefix_hit {
        daemon.state().record_cache_lookup(true);
        daemon.ttl_cache().insert(key, results.clone());
        return Response::search(id, results, true, elapsed_ms(start));
    }
    daemon.state().record_cache_lookup(false);

    let project_root = cwd.as_deref().map(Path::new);
    let additional: Vec<PathBuf> = Vec::new();
    match daemon
        .picker()
        .search(&query, project_root, &additional, limit)
        .await
    {
        Ok(hits) => {
            daemon.state().record_db_success();
            let results: Vec<SearchHit> = hits
                .into_iter()
                .map(|h| SearchHit {
                    path: h.path,
                    score: h.score,
                    root: h.root,
                })
                .collect();
            daemon.ttl_cache().insert(key, results.clone());
            daemon
                .prefix_cache()
                .store(&query, cwd.as_deref(), results.clone());
            Response::search(id, results, false, elapsed_ms(start))
        }
        Err(e) if e.is_database() => match daemon.state().record_db_error() {
            CircuitAction::Retry => {
                warn!(error = %e, "database error, asking client to retry");
                Response::failure(id, format!("{e} (retry)"), elapsed_ms(start))
            }
            CircuitAction::Shutdown => {
                warn!(error = %e, "repeated database errors, shutting down");
                daemon.cancel();
                Response::failure(id, format!("{e} (shutting down)"), elapsed_ms(start))
            }
        },
        Err(e) => Response::failure(id, e.to_string(), elapsed_ms(start)),
    }
}

fn handle_health(daemon: &Daemon, id: String) -> Response {
    let (uptime, generation, cache_hit_rate) = {
        let state = daemon.state();
        (
            state.uptime().as_secs_f64(),
            state.generation(),
            state.cache_hit_rate(),
        )
    };
    let health = HealthInfo {
        uptime,
        rss: lifecycle::sample_rss().unwrap_or(0),
        generation,
        cache_hit_rate,
        active_watchers: daemon.active_watchers(),
        roots_loaded: daemon.roots_loaded(),
    };
    Response::health(id, health)
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}
