//! # Secret Markers
//!
//! Detection and substitution of `SECRET::<name>` markers inside raw values.
//!
//! Two matching modes exist and they are not interchangeable:
//!
//! - **Substring** ([`extract_secret_names`], [`substitute_secrets`]): every
//!   marker anywhere in the string counts.
//! - **Whole value** ([`whole_value_secret_name`]): the value is a secret only
//!   when it consists of exactly one marker and nothing else. This decides
//!   which service configs are stored as secrets.

use crate::constants::{SECRET_MARKER_PATTERN, SECRET_MARKER_PREFIX};
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::LazyLock;

static SECRET_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(SECRET_MARKER_PATTERN)
        .expect("Failed to compile secret marker regex - this should never happen")
});

/// Extract every secret name referenced in `value`, left to right
///
/// A string may carry several markers; duplicates are kept.
pub fn extract_secret_names(value: &str) -> Vec<String> {
    SECRET_MARKER
        .captures_iter(value)
        .filter_map(|caps| caps.get(1).map(|m| m.as_str().to_string()))
        .collect()
}

/// Replace each marker whose name is present in `resolved`
///
/// Markers with no entry in `resolved` are left verbatim so callers can tell
/// they are still unresolved.
pub fn substitute_secrets(value: &str, resolved: &HashMap<String, String>) -> String {
    SECRET_MARKER
        .replace_all(value, |caps: &Captures<'_>| {
            match caps.get(1).and_then(|name| resolved.get(name.as_str())) {
                Some(secret) => secret.clone(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Secret name when the whole value is exactly one `SECRET::<name>` marker
pub fn whole_value_secret_name(value: &str) -> Option<&str> {
    let name = value.strip_prefix(SECRET_MARKER_PREFIX)?;
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    valid.then_some(name)
}

/// True if `value` contains at least one marker
pub fn contains_secret_marker(value: &str) -> bool {
    SECRET_MARKER.is_match(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_secret_names_in_order() {
        assert_eq!(
            extract_secret_names("SECRET::s1 and SECRET::s2"),
            vec!["s1".to_string(), "s2".to_string()]
        );
    }

    #[test]
    fn test_extract_secret_names_plain_value() {
        assert!(extract_secret_names("plain").is_empty());
        assert!(extract_secret_names("").is_empty());
        assert!(extract_secret_names("SECRET::").is_empty());
    }

    #[test]
    fn test_extract_secret_names_stops_at_invalid_character() {
        assert_eq!(
            extract_secret_names("postgres://u:SECRET::db_pass@host"),
            vec!["db_pass".to_string()]
        );
        assert_eq!(
            extract_secret_names("SECRET::api-key.v2"),
            vec!["api-key".to_string()]
        );
    }

    #[test]
    fn test_extract_secret_names_keeps_duplicates() {
        assert_eq!(
            extract_secret_names("SECRET::a SECRET::a"),
            vec!["a".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn test_substitute_leaves_unresolved_markers() {
        let mut resolved = HashMap::new();
        resolved.insert("x".to_string(), "1".to_string());
        assert_eq!(
            substitute_secrets("a SECRET::x b SECRET::y c", &resolved),
            "a 1 b SECRET::y c"
        );
    }

    #[test]
    fn test_substitute_replaces_every_occurrence() {
        let mut resolved = HashMap::new();
        resolved.insert("pw".to_string(), "hunter2".to_string());
        assert_eq!(
            substitute_secrets("SECRET::pw:SECRET::pw", &resolved),
            "hunter2:hunter2"
        );
    }

    #[test]
    fn test_substitute_does_not_expand_replacement_syntax() {
        let mut resolved = HashMap::new();
        resolved.insert("pw".to_string(), "$1${0}".to_string());
        assert_eq!(substitute_secrets("SECRET::pw", &resolved), "$1${0}");
    }

    #[test]
    fn test_whole_value_secret_name() {
        assert_eq!(whole_value_secret_name("SECRET::x"), Some("x"));
        assert_eq!(whole_value_secret_name("SECRET::db_pass-1"), Some("db_pass-1"));
        assert_eq!(whole_value_secret_name("prefix SECRET::x"), None);
        assert_eq!(whole_value_secret_name("SECRET::x suffix"), None);
        assert_eq!(whole_value_secret_name("SECRET::"), None);
        assert_eq!(whole_value_secret_name("plain"), None);
    }

    #[test]
    fn test_contains_secret_marker() {
        assert!(contains_secret_marker("url=SECRET::x"));
        assert!(!contains_secret_marker("SECRET:x"));
    }
}
