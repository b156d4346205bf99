// crates/db/src/fts.rs
//! FTS5 query construction.
//!
//! Raw user text never reaches the FTS engine. Tokens are split on path
//! separators and whitespace, stripped of FTS operator characters, quoted,
//! and the final token gets a `*` for prefix matching while typing.

/// Characters FTS5 treats as syntax; stripped from every token.
const STRIPPED: &[char] = &['"', '(', ')', '*', ':', '+', '-'];

/// Build a safe FTS5 MATCH expression from user text.
///
/// Returns an empty string for input with no usable tokens; callers must
/// short-circuit to an empty result set instead of running the query.
pub fn escape_fts_query(input: &str) -> String {
    let tokens: Vec<String> = input
        .split(|c: char| c == '/' || c == '\\' || c.is_ascii_whitespace())
        .map(|token| token.replace(STRIPPED, ""))
        .filter(|token| !token.is_empty())
        .collect();

    if tokens.is_empty() {
        return String::new();
    }

    let last = tokens.len() - 1;
    tokens
        .iter()
        .enumerate()
        .map(|(i, token)| {
            if i == last {
                format!("\"{token}\"*")
            } else {
                format!("\"{token}\"")
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_token_gets_prefix_star() {
        assert_eq!(escape_fts_query("but"), "\"but\"*");
    }

    #[test]
    fn path_separators_split_tokens() {
        assert_eq!(
            escape_fts_query("src/components/Button"),
            "\"src\" \"components\" \"Button\"*"
        );
        assert_eq!(escape_fts_query("a\\b"), "\"a\" \"b\"*");
    }

    #[test]
    fn operator_characters_are_stripped() {
        assert_eq!(escape_fts_query("a+b-c:d*e"), "\"abcde\"*");
        assert_eq!(escape_fts_query("\"quoted\" (x)"), "\"quoted\" \"x\"*");
    }

    #[test]
    fn empty_and_operator_only_input_yield_empty() {
        assert_eq!(escape_fts_query(""), "");
        assert_eq!(escape_fts_query("   "), "");
        assert_eq!(escape_fts_query("*:+-"), "");
        assert_eq!(escape_fts_query("//"), "");
    }

    #[test]
    fn escaping_is_idempotent_on_escaped_strings() {
        for input in ["but", "src/main.rs", "a b c", "weird*:chars"] {
            let once = escape_fts_query(input);
            assert_eq!(escape_fts_query(&once), once, "input: {input}");
        }
    }
}
