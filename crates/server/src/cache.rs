// crates/server/src/cache.rs
//! Result caches for incremental typing.
//!
//! The TTL cache answers exact repeats of a query; its key embeds the
//! generation so an invalidation silently orphans every stale entry. The
//! prefix cache answers *extensions* of the last query ("but" → "butt") by
//! filtering the previous result set, which is what makes per-keystroke
//! latency flat while the user types.

use pickme_types::SearchHit;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Default TTL for non-empty cached results.
pub const TTL_POSITIVE: Duration = Duration::from_secs(1);
/// Default TTL for empty cached results; misses re-check sooner.
pub const TTL_EMPTY: Duration = Duration::from_millis(200);
/// Bound on TTL cache entries.
pub const TTL_CAPACITY: usize = 256;
/// TTL for the single-slot prefix cache.
pub const PREFIX_TTL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub generation: u64,
    pub cwd: Option<String>,
    pub query: String,
    pub limit: usize,
}

#[derive(Debug)]
struct TtlEntry {
    results: Vec<SearchHit>,
    created: Instant,
    /// Insertion sequence; re-inserts renew it, so evicting the minimum is
    /// an insertion-order LRU.
    seq: u64,
}

#[derive(Debug)]
pub struct TtlCache {
    entries: HashMap<CacheKey, TtlEntry>,
    capacity: usize,
    ttl_positive: Duration,
    ttl_empty: Duration,
    next_seq: u64,
}

impl TtlCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity,
            ttl_positive: TTL_POSITIVE,
            ttl_empty: TTL_EMPTY,
            next_seq: 0,
        }
    }

    #[cfg(test)]
    fn with_ttls(capacity: usize, ttl_positive: Duration, ttl_empty: Duration) -> Self {
        Self {
            ttl_positive,
            ttl_empty,
            ..Self::new(capacity)
        }
    }

    pub fn get(&mut self, key: &CacheKey) -> Option<Vec<SearchHit>> {
        let entry = self.entries.get(key)?;
        let ttl = if entry.results.is_empty() {
            self.ttl_empty
        } else {
            self.ttl_positive
        };
        if entry.created.elapsed() >= ttl {
            self.entries.remove(key);
            return None;
        }
        Some(entry.results.clone())
    }

    pub fn insert(&mut self, key: CacheKey, results: Vec<SearchHit>) {
        self.next_seq += 1;
        self.entries.insert(
            key,
            TtlEntry {
                results,
                created: Instant::now(),
                seq: self.next_seq,
            },
        );
        if self.entries.len() > self.capacity {
            if let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.seq)
                .map(|(k, _)| k.clone())
            {
                self.entries.remove(&oldest);
            }
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug)]
struct PrefixEntry {
    query: String,
    cwd: Option<String>,
    results: Vec<SearchHit>,
    stored: Instant,
}

/// Single-slot cache answering extensions of the previous query.
#[derive(Debug, Default)]
pub struct PrefixCache {
    entry: Option<PrefixEntry>,
}

impl PrefixCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the stored results filtered by `keep` when the new query
    /// extends the stored one under the same cwd within the TTL.
    pub fn get(
        &self,
        query: &str,
        cwd: Option<&str>,
        keep: impl Fn(&SearchHit) -> bool,
    ) -> Option<Vec<SearchHit>> {
        let entry = self.entry.as_ref()?;
        if entry.stored.elapsed() >= PREFIX_TTL {
            return None;
        }
        if entry.cwd.as_deref() != cwd {
            return None;
        }
        if !query.starts_with(&entry.query) {
            return None;
        }
        Some(entry.results.iter().filter(|h| keep(h)).cloned().collect())
    }

    /// Every store replaces the slot.
    pub fn store(&mut self, query: &str, cwd: Option<&str>, results: Vec<SearchHit>) {
        self.entry = Some(PrefixEntry {
            query: query.to_string(),
            cwd: cwd.map(str::to_string),
            results,
            stored: Instant::now(),
        });
    }

    pub fn clear(&mut self) {
        self.entry = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(path: &str) -> SearchHit {
        SearchHit {
            path: path.to_string(),
            score: 1.0,
            root: "/p".to_string(),
        }
    }

    fn key(generation: u64, query: &str) -> CacheKey {
        CacheKey {
            generation,
            cwd: Some("/p".into()),
            query: query.into(),
            limit: 50,
        }
    }

    #[test]
    fn ttl_cache_hits_within_ttl() {
        let mut cache = TtlCache::new(TTL_CAPACITY);
        cache.insert(key(0, "but"), vec![hit("/p/button.ts")]);
        let cached = cache.get(&key(0, "but")).unwrap();
        assert_eq!(cached.len(), 1);
    }

    #[test]
    fn ttl_cache_misses_across_generations() {
        let mut cache = TtlCache::new(TTL_CAPACITY);
        cache.insert(key(0, "but"), vec![hit("/p/button.ts")]);
        assert!(cache.get(&key(1, "but")).is_none());
    }

    #[test]
    fn ttl_cache_expires_entries() {
        let mut cache = TtlCache::with_ttls(4, Duration::ZERO, Duration::ZERO);
        cache.insert(key(0, "but"), vec![hit("/p/button.ts")]);
        assert!(cache.get(&key(0, "but")).is_none());
        assert!(cache.is_empty(), "expired entry should be dropped");
    }

    #[test]
    fn empty_results_use_the_short_ttl() {
        let mut cache = TtlCache::with_ttls(4, Duration::from_secs(60), Duration::ZERO);
        cache.insert(key(0, "zzz"), vec![]);
        assert!(cache.get(&key(0, "zzz")).is_none());
        cache.insert(key(0, "but"), vec![hit("/p/button.ts")]);
        assert!(cache.get(&key(0, "but")).is_some());
    }

    #[test]
    fn eviction_drops_the_oldest_insert() {
        let mut cache = TtlCache::new(2);
        cache.insert(key(0, "a"), vec![hit("/p/a")]);
        cache.insert(key(0, "b"), vec![hit("/p/b")]);
        // Re-inserting "a" renews its position; "b" is now oldest.
        cache.insert(key(0, "a"), vec![hit("/p/a")]);
        cache.insert(key(0, "c"), vec![hit("/p/c")]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get(&key(0, "b")).is_none());
        assert!(cache.get(&key(0, "a")).is_some());
        assert!(cache.get(&key(0, "c")).is_some());
    }

    #[test]
    fn prefix_cache_filters_extensions() {
        let mut cache = PrefixCache::new();
        cache.store(
            "but",
            Some("/p"),
            vec![hit("/p/button.ts"), hit("/p/but.md"), hit("/p/butter.rs")],
        );

        let filtered = cache
            .get("butt", Some("/p"), |h| h.path.contains("butt"))
            .unwrap();
        let paths: Vec<&str> = filtered.iter().map(|h| h.path.as_str()).collect();
        assert_eq!(paths, vec!["/p/button.ts", "/p/butter.rs"]);
    }

    #[test]
    fn prefix_cache_requires_matching_cwd_and_prefix() {
        let mut cache = PrefixCache::new();
        cache.store("but", Some("/p"), vec![hit("/p/button.ts")]);

        assert!(cache.get("butt", Some("/q"), |_| true).is_none());
        assert!(cache.get("xyz", Some("/p"), |_| true).is_none());
        // Identical query is a degenerate extension and hits.
        assert!(cache.get("but", Some("/p"), |_| true).is_some());
    }

    #[test]
    fn prefix_cache_clear_empties_slot() {
        let mut cache = PrefixCache::new();
        cache.store("but", None, vec![hit("/p/button.ts")]);
        cache.clear();
        assert!(cache.get("but", None, |_| true).is_none());
    }
}
