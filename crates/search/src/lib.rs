// crates/search/src/lib.rs
//! Query pipeline: parsed prefix + FTS match + frecency → ranked results.
//!
//! The [`Picker`] is the single entry point the daemon calls per search. It
//! never sees raw FTS syntax (escaping lives in the storage layer) and never
//! blocks: all storage calls suspend on the SQLite pool.

use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use pickme_core::{parse_query, resolve_prefix, Config, Prefix, ResolvedPrefix};
use pickme_db::{escape_fts_query, Database, DbError, ScoredFile};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Default result limit when the caller does not supply one.
pub const DEFAULT_LIMIT: usize = 50;

/// Multiplier for the candidate pool when glob filters run in memory after
/// the SQL limit.
const PATTERN_POOL_FACTOR: usize = 4;

#[derive(Debug, Error)]
pub enum PickerError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("invalid pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        source: globset::Error,
    },
}

impl PickerError {
    /// True when the failure came out of the database; feeds the daemon's
    /// consecutive-error circuit breaker.
    pub fn is_database(&self) -> bool {
        matches!(self, PickerError::Db(DbError::Database(_)))
    }
}

/// Result limit for incremental typing: short queries get tight caps so the
/// daemon answers retypes from cache instead of churning the index.
pub fn effective_limit(search_len: usize, requested: Option<usize>) -> usize {
    let cap = match search_len {
        0..=2 => 10,
        3..=4 => 25,
        _ => DEFAULT_LIMIT,
    };
    requested.unwrap_or(DEFAULT_LIMIT).min(cap)
}

/// The query engine facade over storage + config.
#[derive(Debug, Clone)]
pub struct Picker {
    db: Database,
    config: Config,
}

impl Picker {
    pub fn new(db: Database, config: Config) -> Self {
        Self { db, config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Execute a search. Empty queries, and an inactive config, short-circuit
    /// to empty results without touching SQL.
    pub async fn search(
        &self,
        query: &str,
        project_root: Option<&Path>,
        additional_dirs: &[PathBuf],
        limit: usize,
    ) -> Result<Vec<ScoredFile>, PickerError> {
        if !self.config.active || query.is_empty() {
            return Ok(Vec::new());
        }

        let (prefix, search_text) = parse_query(query, &self.config);
        let weights = self.config.weights;

        // Bare extension globs list by suffix instead of matching.
        if let Prefix::Glob(pattern) = &prefix {
            if search_text.is_empty() {
                let suffix = pattern.strip_prefix('*').unwrap_or(pattern);
                let root = project_root.map(|p| p.to_string_lossy().into_owned());
                let hits = self
                    .db
                    .list_by_extension(suffix, root.as_deref(), weights, limit)
                    .await?;
                debug!(query, hits = hits.len(), "extension listing");
                return Ok(hits);
            }
        }

        let (root_filters, patterns) = match resolve_prefix(&prefix, &self.config) {
            ResolvedPrefix::Roots(roots) => (
                roots
                    .iter()
                    .map(|r| r.to_string_lossy().into_owned())
                    .collect(),
                Vec::new(),
            ),
            ResolvedPrefix::Patterns(pats) => (base_roots(project_root, additional_dirs), pats),
            ResolvedPrefix::None => (base_roots(project_root, additional_dirs), Vec::new()),
        };

        let glob_set = build_glob_set(&patterns)?;
        let fetch_limit = if glob_set.is_some() {
            (limit * PATTERN_POOL_FACTOR).max(200)
        } else {
            limit
        };

        let match_expr = escape_fts_query(&search_text);
        let hits = if match_expr.is_empty() {
            // A prefix with no remaining text browses rather than matches;
            // a fully empty parse means there is nothing to do.
            if matches!(prefix, Prefix::None) {
                return Ok(Vec::new());
            }
            self.db
                .list_ranked(&root_filters, weights, fetch_limit)
                .await?
        } else {
            self.db
                .search_ranked(&match_expr, &root_filters, weights, fetch_limit)
                .await?
        };

        let hits = match glob_set {
            Some(set) => hits
                .into_iter()
                .filter(|h| set.is_match(&h.path))
                .take(limit)
                .collect(),
            None => hits,
        };
        debug!(query, hits = hits.len(), "search complete");
        Ok(hits)
    }
}

fn base_roots(project_root: Option<&Path>, additional_dirs: &[PathBuf]) -> Vec<String> {
    project_root
        .into_iter()
        .map(Path::to_path_buf)
        .chain(additional_dirs.iter().cloned())
        .map(|p| p.to_string_lossy().into_owned())
        .collect()
}

fn build_glob_set(patterns: &[String]) -> Result<Option<GlobSet>, PickerError> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(true)
            .build()
            .map_err(|source| PickerError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
        builder.add(glob);
    }
    let set = builder.build().map_err(|source| PickerError::Pattern {
        pattern: patterns.join(", "),
        source,
    })?;
    Ok(Some(set))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pickme_core::NamespaceValue;
    use pickme_db::FileEntry;

    async fn picker_with_files(files: &[(&str, &str)], config: Config) -> Picker {
        let db = Database::open_in_memory().await.unwrap();
        let entries: Vec<FileEntry> = files
            .iter()
            .map(|(path, root)| FileEntry::new(Path::new(path), Path::new(root), 1))
            .collect();
        db.upsert_files(&entries).await.unwrap();
        Picker::new(db, config)
    }

    #[test]
    fn effective_limit_follows_typing_table() {
        assert_eq!(effective_limit(1, None), 10);
        assert_eq!(effective_limit(2, Some(500)), 10);
        assert_eq!(effective_limit(3, None), 25);
        assert_eq!(effective_limit(4, Some(5)), 5);
        assert_eq!(effective_limit(9, None), 50);
        assert_eq!(effective_limit(9, Some(500)), 50);
        // Never exceeds the request or the table.
        for len in 0..12 {
            for req in [1, 10, 30, 80] {
                let eff = effective_limit(len, Some(req));
                assert!(eff <= req);
                assert!(eff <= 50);
            }
        }
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let picker = picker_with_files(&[("/p/a.ts", "/p")], Config::default()).await;
        let hits = picker.search("", None, &[], 50).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn inactive_config_short_circuits() {
        let mut config = Config::default();
        config.active = false;
        let picker = picker_with_files(&[("/p/button.ts", "/p")], config).await;
        let hits = picker.search("button", None, &[], 50).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn plain_search_scopes_to_project_root() {
        let picker = picker_with_files(
            &[("/p/button.ts", "/p"), ("/q/button.ts", "/q")],
            Config::default(),
        )
        .await;
        let hits = picker
            .search("button", Some(Path::new("/p")), &[], 50)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/p/button.ts");

        // Additional dirs widen the scope.
        let hits = picker
            .search(
                "button",
                Some(Path::new("/p")),
                &[PathBuf::from("/q")],
                50,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn extension_glob_lists_by_suffix() {
        let picker = picker_with_files(
            &[
                ("/p/README.md", "/p"),
                ("/p/docs/a.md", "/p"),
                ("/p/src/index.ts", "/p"),
            ],
            Config::default(),
        )
        .await;
        let hits = picker
            .search("@*.md", Some(Path::new("/p")), &[], 50)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|h| h.path.ends_with(".md")));
    }

    #[tokio::test]
    async fn namespace_path_substitutes_search_root() {
        let mut config = Config::default();
        config
            .namespaces
            .insert("dev".into(), NamespaceValue::Path("/dev-root".into()));
        let picker = picker_with_files(
            &[
                ("/dev-root/button.ts", "/dev-root"),
                ("/p/button.ts", "/p"),
            ],
            config,
        )
        .await;

        let hits = picker
            .search("@dev:button", Some(Path::new("/p")), &[], 50)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/dev-root/button.ts");
    }

    #[tokio::test]
    async fn folder_prefix_includes_dotted_sibling() {
        let picker = picker_with_files(
            &[
                ("/p/components/Button.tsx", "/p"),
                ("/p/.components/Hidden.tsx", "/p"),
                ("/p/other.tsx", "/p"),
            ],
            Config::default(),
        )
        .await;

        let hits = picker
            .search("@/components:", Some(Path::new("/p")), &[], 50)
            .await
            .unwrap();
        let mut paths: Vec<&str> = hits.iter().map(|h| h.path.as_str()).collect();
        paths.sort_unstable();
        assert_eq!(
            paths,
            vec!["/p/.components/Hidden.tsx", "/p/components/Button.tsx"]
        );
    }

    #[tokio::test]
    async fn folder_prefix_with_search_text_narrows() {
        let picker = picker_with_files(
            &[
                ("/p/components/Button.tsx", "/p"),
                ("/p/components/Input.tsx", "/p"),
            ],
            Config::default(),
        )
        .await;
        let hits = picker
            .search("@/components:but", Some(Path::new("/p")), &[], 50)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/p/components/Button.tsx");
    }

    #[tokio::test]
    async fn namespace_patterns_filter_results() {
        let mut config = Config::default();
        config.namespaces.insert(
            "docs".into(),
            NamespaceValue::Patterns(vec!["**/*.md".into()]),
        );
        let picker = picker_with_files(
            &[("/p/guide.md", "/p"), ("/p/guide.ts", "/p")],
            config,
        )
        .await;
        let hits = picker
            .search("@docs:guide", Some(Path::new("/p")), &[], 50)
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].path.ends_with("guide.md"));
    }

    #[tokio::test]
    async fn results_respect_limit() {
        let files: Vec<(String, &str)> = (0..30)
            .map(|i| (format!("/p/button_{i:02}.ts"), "/p"))
            .collect();
        let refs: Vec<(&str, &str)> = files.iter().map(|(p, r)| (p.as_str(), *r)).collect();
        let picker = picker_with_files(&refs, Config::default()).await;
        let hits = picker.search("button", None, &[], 5).await.unwrap();
        assert_eq!(hits.len(), 5);
    }
}
