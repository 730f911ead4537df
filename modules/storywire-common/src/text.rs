use std::collections::HashSet;

use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

/// Lowercase scheme+host+path, strip trailing `/`, discard query and
/// fragment. Falls back to a lowercased copy of the input if it doesn't
/// parse as a URL at all.
pub fn normalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(url) => {
            let scheme = url.scheme().to_lowercase();
            let host = url.host_str().unwrap_or("").to_lowercase();
            let mut path = url.path().to_string();
            if path.len() > 1 && path.ends_with('/') {
                path.pop();
            }
            format!("{scheme}://{host}{path}")
        }
        Err(_) => raw.to_lowercase(),
    }
}

/// Host minus a leading `www.`. Falls back to a conservative regex over the
/// raw string when URL parsing fails.
pub fn extract_domain(raw: &str) -> String {
    if let Ok(url) = Url::parse(raw) {
        if let Some(host) = url.host_str() {
            return strip_www(host);
        }
    }
    fallback_domain(raw)
}

fn strip_www(host: &str) -> String {
    host.strip_prefix("www.").unwrap_or(host).to_lowercase()
}

fn fallback_domain(raw: &str) -> String {
    let re = Regex::new(r"^(?:[a-zA-Z][a-zA-Z0-9+.-]*://)?(?:www\.)?([^/:?#]+)").unwrap();
    re.captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_default()
}

/// Content hash per the ingest-item identity rule: SHA-256 over
/// `normalize(url)|externalId|""` when an external id is present, otherwise
/// `normalize(url)|lowercased-title|publishedDateBucket-or-"unknown"`.
pub fn content_hash(
    url: &str,
    external_id: Option<&str>,
    title: &str,
    published_date_bucket: Option<&str>,
) -> String {
    let normalized = normalize_url(url);
    let material = match external_id {
        Some(id) => format!("{normalized}|{id}|"),
        None => format!(
            "{normalized}|{}|{}",
            title.to_lowercase(),
            published_date_bucket.unwrap_or("unknown")
        ),
    };
    hex_sha256(&material)
}

/// SHA-256 over a fingerprint string, keeping only the first 60 bits
/// interpreted as a signed integer — stays within the 64-bit signed range
/// used for Postgres advisory locks.
pub fn fingerprint_lock_key(fingerprint: &str) -> i64 {
    let digest = Sha256::digest(fingerprint.as_bytes());
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&digest[0..8]);
    let full = i64::from_be_bytes(buf);
    // Keep 60 bits: clear the top 4 bits so the value always fits signed i64
    // regardless of sign extension from the dropped bits.
    full & 0x0FFF_FFFF_FFFF_FFFF
}

fn hex_sha256(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Truncate to `max_chars`, appending an ellipsis marker when truncation
/// occurred. Re-exported from `types` for hash/text callers; kept here too
/// so this module is self-contained for its own tests.
pub use crate::types::truncate;

const STOPWORDS: &[&str] = &[
    "a", "about", "above", "after", "again", "against", "all", "am", "an", "and", "any", "are",
    "as", "at", "be", "because", "been", "before", "being", "below", "between", "both", "but",
    "by", "can", "did", "do", "does", "doing", "down", "during", "each", "few", "for", "from",
    "further", "had", "has", "have", "having", "her", "here", "hers", "herself", "him",
    "himself", "his", "how", "into", "is", "it", "its", "itself", "just", "me", "more", "most",
    "my", "myself", "no", "nor", "not", "now", "of", "off", "on", "once", "only", "or", "other",
    "our", "ours", "ourselves", "out", "over", "own", "same", "she", "should", "so", "some",
    "such", "than", "that", "the", "their", "theirs", "them", "themselves", "then", "there",
    "these", "they", "this", "those", "through", "to", "too", "under", "until", "up", "very",
    "was", "we", "were", "what", "when", "where", "which", "while", "who", "whom", "why", "will",
    "with", "you", "your", "yours", "yourself", "yourselves",
];

/// Lowercase, replace non-alphanumeric with spaces, split on whitespace,
/// drop tokens of length ≤2 or in the stopword set. Deterministic, no
/// locale dependence.
pub fn tokenize(text: &str) -> Vec<String> {
    let stopwords: HashSet<&str> = STOPWORDS.iter().copied().collect();
    let lowered = text.to_lowercase();
    let cleaned: String = lowered
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|t| t.chars().count() > 2 && !stopwords.contains(t))
        .map(String::from)
        .collect()
}

/// Tokenize, count, return the top-N tokens by frequency. Ties are broken
/// by first-appearance order.
pub fn extract_keywords(text: &str, n: usize) -> Vec<String> {
    let tokens = tokenize(text);
    let mut order: Vec<String> = Vec::new();
    let mut counts: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for token in tokens {
        if !counts.contains_key(&token) {
            order.push(token.clone());
        }
        *counts.entry(token).or_insert(0) += 1;
    }
    let mut ranked = order;
    ranked.sort_by(|a, b| counts[b].cmp(&counts[a]));
    ranked.truncate(n);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_url_strips_query_fragment_and_trailing_slash() {
        assert_eq!(
            normalize_url("HTTPS://Example.com/Path/?q=1#frag"),
            "https://example.com/Path"
        );
    }

    #[test]
    fn normalize_url_root_path_keeps_single_slash() {
        assert_eq!(normalize_url("https://example.com/"), "https://example.com/");
    }

    #[test]
    fn extract_domain_strips_www() {
        assert_eq!(extract_domain("https://www.example.com/a"), "example.com");
        assert_eq!(extract_domain("https://blog.example.com/a"), "blog.example.com");
    }

    #[test]
    fn extract_domain_falls_back_without_scheme() {
        assert_eq!(extract_domain("www.example.com/a/b"), "example.com");
    }

    #[test]
    fn content_hash_is_deterministic_and_order_sensitive_only_to_inputs() {
        let a = content_hash("https://x.com/a", Some("123"), "Title", None);
        let b = content_hash("https://x.com/a", Some("123"), "Title", None);
        let c = content_hash("https://x.com/a", Some("456"), "Title", None);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn content_hash_without_external_id_uses_title_and_bucket() {
        let a = content_hash("https://x.com/a", None, "Hello World", Some("2024-01-01"));
        let b = content_hash("https://x.com/a", None, "hello world", Some("2024-01-01"));
        assert_eq!(a, b, "title comparison is case-insensitive");
    }

    #[test]
    fn fingerprint_lock_key_fits_in_60_bits() {
        let key = fingerprint_lock_key("some-fingerprint");
        assert!(key >= 0);
        assert!(key < (1i64 << 60));
    }

    #[test]
    fn tokenize_drops_short_tokens_and_stopwords() {
        let tokens = tokenize("The quick fox is an OK runner");
        assert!(!tokens.contains(&"the".to_string()));
        assert!(!tokens.contains(&"is".to_string()));
        assert!(!tokens.contains(&"ok".to_string()));
        assert!(tokens.contains(&"quick".to_string()));
        assert!(tokens.contains(&"runner".to_string()));
    }

    #[test]
    fn extract_keywords_orders_by_frequency_then_first_appearance() {
        let keywords = extract_keywords("alpha beta alpha gamma beta alpha", 2);
        assert_eq!(keywords, vec!["alpha".to_string(), "beta".to_string()]);
    }
}
