// crates/core/src/lib.rs
//! Shared foundations for pickme: config loading, storage paths, and the
//! query-prefix parser.

pub mod config;
pub mod paths;
pub mod prefix;

pub use config::{Config, ConfigError, IndexConfig, NamespaceValue, Weights};
pub use prefix::{format_prefix, parse_query, resolve_prefix, Prefix, ResolvedPrefix};

/// Current Unix time in integer milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

/// Expand a leading `~` or `~/` to the user's home directory.
pub fn expand_tilde(path: &str) -> std::path::PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    std::path::PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_positive() {
        assert!(now_ms() > 0);
    }

    #[test]
    fn expand_tilde_plain_path_unchanged() {
        assert_eq!(
            expand_tilde("/usr/local"),
            std::path::PathBuf::from("/usr/local")
        );
    }

    #[test]
    fn expand_tilde_home_prefix() {
        let home = dirs::home_dir().unwrap();
        assert_eq!(expand_tilde("~/Dev"), home.join("Dev"));
        assert_eq!(expand_tilde("~"), home);
    }
}
