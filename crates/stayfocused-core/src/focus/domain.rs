//! Domain syntax checks for site-list entries.

use regex::Regex;
use std::sync::LazyLock;

/// One DNS label: alphanumerics and hyphens, no leading or trailing hyphen,
/// at most 63 characters.
static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?$").expect("label pattern compiles")
});

/// Top-level domain: alphabetic, at least two characters.
static TLD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z]{2,63}$").expect("tld pattern compiles"));

/// Trim and lower-case a user-supplied domain.
pub fn normalize_domain(input: &str) -> String {
    input.trim().to_ascii_lowercase()
}

/// Whether `domain` (already normalized) is a syntactically valid domain.
///
/// Requires at least one dot; every label must be valid and the last label
/// must be an alphabetic TLD.
pub fn is_valid_domain(domain: &str) -> bool {
    if domain.len() > 253 {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    let Some((tld, rest)) = labels.split_last() else {
        return false;
    };
    !rest.is_empty() && TLD.is_match(tld) && rest.iter().all(|label| LABEL.is_match(label))
}
