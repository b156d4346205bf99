// crates/types/src/lib.rs
//! Wire protocol for the pickme daemon socket.
//!
//! One JSON value per line (NDJSON), request-response. Every request carries
//! a string `id` and a discriminating `type`; every response echoes the `id`
//! and a boolean `ok`. Parsing is two-phase so that a structurally invalid
//! request can still echo its `id` back to the client.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum accepted query length, in characters.
pub const MAX_QUERY_LEN: usize = 1000;
/// Maximum accepted result limit.
pub const MAX_LIMIT: usize = 500;

/// A request envelope: the shared `id` plus the typed body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub id: String,
    #[serde(flatten)]
    pub body: RequestBody,
}

/// The discriminated request payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RequestBody {
    Search {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cwd: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    Health {},
    Invalidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        root: Option<String>,
    },
    Stop {},
}

/// A single ranked search result on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub path: String,
    pub score: f64,
    pub root: String,
}

/// Daemon health payload returned by `health` requests.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthInfo {
    /// Seconds since the daemon started.
    pub uptime: f64,
    /// Resident set size in bytes.
    pub rss: u64,
    /// Current cache generation.
    pub generation: u64,
    /// Rolling cache hit rate in [0,1].
    pub cache_hit_rate: f64,
    /// Number of live root watchers.
    pub active_watchers: usize,
    /// Roots the daemon has loaded.
    pub roots_loaded: Vec<String>,
}

/// A response line. Absent fields are omitted from the wire entirely.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub results: Option<Vec<SearchHit>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cached: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<HealthInfo>,
}

impl Response {
    /// A bare `ok:true` acknowledgement (invalidate, stop).
    pub fn ack(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: true,
            error: None,
            results: None,
            cached: None,
            duration_ms: None,
            health: None,
        }
    }

    pub fn search(
        id: impl Into<String>,
        results: Vec<SearchHit>,
        cached: bool,
        duration_ms: f64,
    ) -> Self {
        Self {
            results: Some(results),
            cached: Some(cached),
            duration_ms: Some(duration_ms),
            ..Self::ack(id)
        }
    }

    pub fn health(id: impl Into<String>, health: HealthInfo) -> Self {
        Self {
            health: Some(health),
            ..Self::ack(id)
        }
    }

    pub fn failure(id: impl Into<String>, error: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            duration_ms: Some(duration_ms),
            ..Self::ack(id)
        }
    }

    /// Serialize to a single NDJSON line (without the trailing newline).
    pub fn to_line(&self) -> String {
        // A Response contains no map keys or non-string values that can fail
        // to serialize; fall back to a bare failure line just in case.
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(r#"{{"id":"{}","ok":false,"error":"encode error"}}"#, self.id)
        })
    }
}

/// Why a request line was rejected. Carries whatever `id` could be recovered
/// so the error response can still echo it.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct RequestError {
    pub id: String,
    pub message: String,
}

/// Parse one NDJSON request line.
///
/// - Malformed JSON → `error: "invalid JSON"`, empty `id`.
/// - Structurally invalid (missing `type`, wrong field types, …) → the serde
///   message, echoing `id` when the payload carried a parseable string id.
/// - Out-of-range `query`/`limit` → the first validator message.
pub fn parse_request(line: &str) -> Result<Request, RequestError> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|_| RequestError {
        id: String::new(),
        message: "invalid JSON".to_string(),
    })?;

    let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    let request: Request = serde_json::from_value(value).map_err(|e| RequestError {
        id: id.clone(),
        message: e.to_string(),
    })?;

    validate(&request).map_err(|message| RequestError { id, message })?;
    Ok(request)
}

fn validate(request: &Request) -> Result<(), String> {
    if let RequestBody::Search { query, limit, .. } = &request.body {
        let len = query.chars().count();
        if len == 0 || len > MAX_QUERY_LEN {
            return Err(format!(
                "query must be between 1 and {MAX_QUERY_LEN} characters"
            ));
        }
        if let Some(limit) = limit {
            if *limit == 0 || *limit > MAX_LIMIT {
                return Err(format!("limit must be between 1 and {MAX_LIMIT}"));
            }
        }
    }
    Ok(())
}
