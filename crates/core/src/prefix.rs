// crates/core/src/prefix.rs
//! Query-prefix parsing for @-completion queries.
//!
//! A query may start with a sigil that narrows the search: `@ns:` (configured
//! namespace), `@/folder:` or `@folder/` (directory scope), `@*.ext`
//! (extension glob), `@@` (literal `@`), or quoted literals. Parsing never
//! fails; unrecognized sigils fall through to a plain search.

use crate::config::{Config, NamespaceValue};
use crate::expand_tilde;
use std::path::PathBuf;

/// A parsed query prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Prefix {
    None,
    Namespace(String),
    Folder(String),
    Glob(String),
}

/// What a prefix means for the search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedPrefix {
    /// No constraint beyond the caller's own root filters.
    None,
    /// Replace the search roots with these absolute paths.
    Roots(Vec<PathBuf>),
    /// Filter results through these glob patterns.
    Patterns(Vec<String>),
}

/// Strip one level of matching quotes, if present.
fn unquote(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let first = bytes[0];
        if (first == b'"' || first == b'\'') && bytes[bytes.len() - 1] == first {
            return &text[1..text.len() - 1];
        }
    }
    text
}

fn is_quoted(text: &str) -> bool {
    text.starts_with('"') || text.starts_with('\'')
}

/// Parse a raw query into `(prefix, search_text)`.
///
/// Rules apply first-match-wins; see each arm. Unknown namespaces never
/// error, they fall through to a plain search over the raw input.
pub fn parse_query(input: &str, config: &Config) -> (Prefix, String) {
    // `@@rest` escapes the sigil: search for a literal `@rest`.
    if let Some(rest) = input.strip_prefix("@@") {
        return (Prefix::None, format!("@{rest}"));
    }

    // `@"literal"` / `@'literal'` with no namespace.
    if let Some(body) = input.strip_prefix('@') {
        if is_quoted(body) {
            return (Prefix::None, unquote(body).to_string());
        }
    }

    // `@/NAME:REST` — explicit folder prefix.
    if let Some(body) = input.strip_prefix("@/") {
        if let Some((name, rest)) = body.split_once(':') {
            if !name.is_empty() && !name.contains('/') {
                return (Prefix::Folder(name.to_string()), unquote(rest).to_string());
            }
        }
    }

    if let Some(body) = input.strip_prefix('@') {
        // `@NAME:REST` for a configured namespace.
        if let Some((name, rest)) = body.split_once(':') {
            if !name.is_empty() && !name.starts_with('/') && config.namespaces.contains_key(name) {
                return (
                    Prefix::Namespace(name.to_string()),
                    unquote(rest).to_string(),
                );
            }
        }

        // `@*.EXT` — extension glob; the search text is consumed entirely.
        if let Some(ext) = body.strip_prefix("*.") {
            if !ext.is_empty() {
                return (Prefix::Glob(format!("*.{ext}")), String::new());
            }
        }

        // `@FOLDER/REST` shorthand.
        if let Some((folder, rest)) = body.split_once('/') {
            if !folder.is_empty() {
                return (Prefix::Folder(folder.to_string()), rest.to_string());
            }
        }

        return (Prefix::None, input.to_string());
    }

    // `NAME:REST` without the sigil, for known namespaces only.
    if let Some((name, rest)) = input.split_once(':') {
        if config.namespaces.contains_key(name) {
            return (
                Prefix::Namespace(name.to_string()),
                unquote(rest).to_string(),
            );
        }
    }

    (Prefix::None, input.to_string())
}

/// Render a prefix + search text back into query syntax. Inverse of
/// [`parse_query`] for search texts that do not themselves start with a
/// prefix trigger.
pub fn format_prefix(prefix: &Prefix, search: &str) -> String {
    match prefix {
        Prefix::None => search.to_string(),
        Prefix::Namespace(name) => format!("@{name}:{search}"),
        Prefix::Folder(name) => format!("@/{name}:{search}"),
        Prefix::Glob(pattern) => format!("@{pattern}"),
    }
}

/// Resolve a prefix into search constraints.
pub fn resolve_prefix(prefix: &Prefix, config: &Config) -> ResolvedPrefix {
    match prefix {
        Prefix::None => ResolvedPrefix::None,
        Prefix::Folder(name) => {
            if name.starts_with('.') {
                ResolvedPrefix::Patterns(vec![format!("**/{name}/**/*")])
            } else {
                ResolvedPrefix::Patterns(vec![
                    format!("**/{name}/**/*"),
                    format!("**/.{name}/**/*"),
                ])
            }
        }
        Prefix::Namespace(name) => match config.namespaces.get(name) {
            Some(NamespaceValue::Path(path)) => {
                ResolvedPrefix::Roots(vec![expand_tilde(path)])
            }
            Some(NamespaceValue::Patterns(patterns)) => {
                ResolvedPrefix::Patterns(patterns.clone())
            }
            // Parse already verified membership; treat a race as no constraint.
            None => ResolvedPrefix::None,
        },
        Prefix::Glob(pattern) => ResolvedPrefix::Patterns(vec![format!("**/{pattern}")]),
    }
}
