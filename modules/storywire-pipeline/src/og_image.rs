use std::time::Duration;

use futures::StreamExt;
use regex::Regex;
use tracing::debug;
use url::Url;

const TIMEOUT: Duration = Duration::from_secs(10);
const MAX_BYTES: usize = 50 * 1024;
const USER_AGENT: &str =
    "Mozilla/5.0 (compatible; storywire/0.1; +https://example.invalid/bot)";
const MAX_URL_LEN: usize = 2000;
const MAX_QUERY_LEN: usize = 200;

pub fn build_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(TIMEOUT)
        .build()
        .expect("failed to build og-image HTTP client")
}

/// Best-effort Open Graph image lookup. Reads at most `MAX_BYTES` or until
/// `</head>`, regex-extracts `og:image` then falls back to `twitter:image`,
/// and validates the candidate URL. Any failure along the way returns
/// `None` silently rather than propagating.
pub async fn fetch_og_image(client: &reqwest::Client, page_url: &str) -> Option<String> {
    let html = fetch_head_html(client, page_url).await.ok()?;
    let candidate = extract_meta_content(&html, "og:image")
        .or_else(|| extract_meta_content(&html, "twitter:image"))?;
    validate_image_url(&candidate)
}

async fn fetch_head_html(client: &reqwest::Client, page_url: &str) -> Result<String, ()> {
    let resp = client
        .get(page_url)
        .header("User-Agent", USER_AGENT)
        .send()
        .await
        .map_err(|e| debug!(page_url, error = %e, "og-image request failed"))?;

    let mut stream = resp.bytes_stream();
    let mut buf: Vec<u8> = Vec::with_capacity(MAX_BYTES);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| debug!(page_url, error = %e, "og-image stream error"))?;
        buf.extend_from_slice(&chunk);
        let text_so_far = String::from_utf8_lossy(&buf);
        if text_so_far.contains("</head>") || buf.len() >= MAX_BYTES {
            break;
        }
    }

    buf.truncate(MAX_BYTES);
    Ok(String::from_utf8_lossy(&buf).to_string())
}

fn extract_meta_content(html: &str, property: &str) -> Option<String> {
    let pattern = format!(
        r#"<meta[^>]+(?:property|name)\s*=\s*["']{}["'][^>]+content\s*=\s*["']([^"']+)["']"#,
        regex::escape(property)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .or_else(|| extract_meta_content_reversed(html, property))
}

/// Some pages emit `content` before `property`/`name` in the tag.
fn extract_meta_content_reversed(html: &str, property: &str) -> Option<String> {
    let pattern = format!(
        r#"<meta[^>]+content\s*=\s*["']([^"']+)["'][^>]+(?:property|name)\s*=\s*["']{}["']"#,
        regex::escape(property)
    );
    let re = Regex::new(&pattern).ok()?;
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn validate_image_url(candidate: &str) -> Option<String> {
    if candidate.chars().count() > MAX_URL_LEN {
        return None;
    }
    let url = Url::parse(candidate).ok()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return None;
    }
    if let Some(query) = url.query() {
        if query.chars().count() > MAX_QUERY_LEN {
            return None;
        }
    }
    let path = url.path();
    if path.contains("/api/og") || path.contains("/og-image") {
        return None;
    }
    Some(candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_meta_content_finds_og_image() {
        let html = r#"<head><meta property="og:image" content="https://example.com/a.png"></head>"#;
        assert_eq!(
            extract_meta_content(html, "og:image"),
            Some("https://example.com/a.png".to_string())
        );
    }

    #[test]
    fn extract_meta_content_handles_reversed_attribute_order() {
        let html = r#"<meta content="https://example.com/b.png" property="og:image">"#;
        assert_eq!(
            extract_meta_content(html, "og:image"),
            Some("https://example.com/b.png".to_string())
        );
    }

    #[test]
    fn validate_image_url_rejects_non_http_scheme() {
        assert_eq!(validate_image_url("ftp://example.com/a.png"), None);
    }

    #[test]
    fn validate_image_url_rejects_og_generator_paths() {
        assert_eq!(validate_image_url("https://example.com/api/og?title=x"), None);
        assert_eq!(validate_image_url("https://example.com/og-image/x.png"), None);
    }

    #[test]
    fn validate_image_url_rejects_long_query_strings() {
        let long_query = "q=".to_string() + &"x".repeat(250);
        let url = format!("https://example.com/a.png?{long_query}");
        assert_eq!(validate_image_url(&url), None);
    }

    #[test]
    fn validate_image_url_accepts_plain_candidate() {
        let url = "https://example.com/a.png";
        assert_eq!(validate_image_url(url), Some(url.to_string()));
    }
}
