//! Citation extraction from research reports

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

const TRAILING_PUNCTUATION: &[char] = &[',', '.', ';', ':', '!', '?'];

fn url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r#"https?://[^\s)\]<>"']+"#).ok())
        .as_ref()
}

/// Unique http(s) URLs in `text`, sorted, without trailing punctuation
pub fn extract_citations(text: &str) -> Vec<String> {
    let Some(pattern) = url_pattern() else {
        return Vec::new();
    };
    pattern
        .find_iter(text)
        .map(|m| m.as_str().trim_end_matches(TRAILING_PUNCTUATION))
        .filter(|url| !url.ends_with("://"))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}
