//! Lexical preprocessing for the full-text arm.
//!
//! Identifiers are split at case and underscore/hyphen boundaries while the
//! original spelling is kept, so both `getUserById` and `user` hit the same
//! row. The output is a plain space-separated token string; the store turns
//! it into a tsvector with a stemming-free ('simple') configuration, which
//! also handles lowercasing. Nothing here changes case.

/// Split one identifier into its constituent words.
///
/// `getUserById` → `["get", "User", "By", "Id"]`
/// `HTTPServer`  → `["HTTP", "Server"]`
/// `snake_case`  → `["snake", "case"]`
pub fn split_identifier(ident: &str) -> Vec<String> {
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();
    let chars: Vec<char> = ident.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if c == '_' || c == '-' || !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        if !current.is_empty() {
            let prev = chars[i - 1];
            let lower_to_upper = prev.is_lowercase() && c.is_uppercase();
            // "HTTPServer": break between the last capital of an acronym run
            // and the word that follows it (P|Server).
            let acronym_end = prev.is_uppercase()
                && c.is_uppercase()
                && chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            let digit_boundary = prev.is_ascii_digit() != c.is_ascii_digit();

            if lower_to_upper || acronym_end || digit_boundary {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// True when a token looks like a code identifier (camelCase, PascalCase,
/// snake_case or kebab-case) rather than a plain word. Used by the search
/// pipeline's `auto` hybrid decision.
pub fn is_identifier_like(token: &str) -> bool {
    // "_leading" or "trailing_" alone doesn't count; we want word_word.
    if token.split(['_', '-']).filter(|p| !p.is_empty()).count() > 1 {
        return true;
    }
    // Case transition anywhere after the first character.
    let mut prev: Option<char> = None;
    for c in token.chars() {
        if let Some(p) = prev {
            if p.is_lowercase() && c.is_uppercase() {
                return true;
            }
        }
        prev = Some(c);
    }
    false
}

/// Produce the token string stored as `content_tsv_input` for one chunk.
///
/// Every original token is preserved verbatim and followed by its split
/// words; path components of `filename` are appended so "workflows yaml"
/// style queries can land on files whose content never says so.
pub fn tokenize(text: &str, filename: &str) -> String {
    let mut out: Vec<String> = Vec::new();

    for token in text.split(|c: char| !c.is_alphanumeric() && c != '_' && c != '-') {
        if token.is_empty() {
            continue;
        }
        out.push(token.to_string());
        let words = split_identifier(token);
        // A plain word splits into itself; skip the duplicate.
        if words.len() > 1 || (words.len() == 1 && words[0] != token) {
            out.extend(words);
        }
    }

    for component in filename.split(['/', '\\']) {
        for part in component.split('.') {
            if part.is_empty() {
                continue;
            }
            out.push(part.to_string());
            let words = split_identifier(part);
            if words.len() > 1 {
                out.extend(words);
            }
        }
    }

    out.join(" ")
}

/// Normalize a query with the same splitting rule as indexing, so the
/// lexical arm tokenizes queries and documents identically.
pub fn normalize_query(query: &str) -> String {
    tokenize(query, "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_camel_case_preserving_original() {
        let toks = tokenize("getUserById", "");
        for expected in ["getUserById", "get", "User", "By", "Id"] {
            assert!(toks.split(' ').any(|t| t == expected), "missing {expected} in {toks}");
        }
    }

    #[test]
    fn splits_snake_and_kebab() {
        assert_eq!(split_identifier("parse_config_file"), vec!["parse", "config", "file"]);
        assert_eq!(split_identifier("dry-run"), vec!["dry", "run"]);
    }

    #[test]
    fn acronym_runs_stay_together() {
        assert_eq!(split_identifier("HTTPServer"), vec!["HTTP", "Server"]);
        assert_eq!(split_identifier("parseJSONBody"), vec!["parse", "JSON", "Body"]);
    }

    #[test]
    fn digits_form_their_own_words() {
        assert_eq!(split_identifier("sha256sum"), vec!["sha", "256", "sum"]);
    }

    #[test]
    fn path_components_are_appended() {
        let toks = tokenize("jobs:", ".github/workflows/release.yaml");
        for expected in ["github", "workflows", "release", "yaml"] {
            assert!(toks.split(' ').any(|t| t == expected), "missing {expected}");
        }
    }

    #[test]
    fn identifier_detection() {
        assert!(is_identifier_like("getUserById"));
        assert!(is_identifier_like("snake_case"));
        assert!(is_identifier_like("kebab-case"));
        assert!(!is_identifier_like("authentication"));
        assert!(!is_identifier_like("Handler")); // single capitalized word
        assert!(!is_identifier_like("_private")); // leading underscore only
    }

    #[test]
    fn query_normalization_matches_indexing_rule() {
        assert_eq!(normalize_query("getUserById"), tokenize("getUserById", ""));
    }
}
