use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use storywire_common::{truncate, SourceType};
use tracing::{info, warn};

use crate::connector::{FetchConnector, FetchItemError, FetchOutcome, FetchedItem, SourceConfig};
use crate::error::FetchError;

const RSS_MAX_ITEMS: usize = 20;
const RSS_MAX_AGE_DAYS: i64 = 30;
const MAX_TEXT_CHARS: usize = 5_000;

/// RSS/Atom/JSON feed connector. Matches any `MEDIA` source — the syndication
/// feed is this system's only implemented source type; `PRODUCT`, `SOCIAL`
/// and `REGULATORY` sources are served by the stub connectors.
pub struct SyndicationConnector {
    client: reqwest::Client,
}

impl SyndicationConnector {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .expect("failed to build syndication HTTP client");
        Self { client }
    }
}

impl Default for SyndicationConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FetchConnector for SyndicationConnector {
    fn can_handle(&self, config: &SourceConfig) -> bool {
        config.source_type == SourceType::Media
    }

    async fn fetch(&self, config: &SourceConfig) -> FetchOutcome {
        match self.fetch_feed(config).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(source = %config.name, error = %e, "syndication fetch failed");
                FetchOutcome {
                    items: Vec::new(),
                    errors: vec![FetchItemError::from_error(&config.name, &e)],
                    metadata: serde_json::Value::Null,
                }
            }
        }
    }
}

impl SyndicationConnector {
    async fn fetch_feed(&self, config: &SourceConfig) -> Result<FetchOutcome, FetchError> {
        let resp = self
            .client
            .get(&config.url)
            .header("User-Agent", "storywire-fetch/0.1")
            .send()
            .await
            .map_err(FetchError::from)?;

        let bytes = resp.bytes().await.map_err(FetchError::from)?;
        let feed = feed_rs::parser::parse(&bytes[..])
            .map_err(|e| FetchError::Fetch(format!("feed parse failed: {e}")))?;

        let cutoff = Utc::now() - chrono::Duration::days(RSS_MAX_AGE_DAYS);
        let mut items: Vec<(Option<DateTime<Utc>>, FetchedItem)> = Vec::new();
        let mut errors = Vec::new();

        for entry in feed.entries {
            let source_url = match entry
                .links
                .first()
                .map(|l| l.href.clone())
                .or_else(|| entry.id.starts_with("http").then(|| entry.id.clone()))
            {
                Some(url) => url,
                None => {
                    errors.push(FetchItemError {
                        kind: "FETCH_ERROR".to_string(),
                        source: config.name.clone(),
                        message: "feed entry has no resolvable URL".to_string(),
                    });
                    continue;
                }
            };

            let published_at = permissive_entry_date(&entry);
            if let Some(date) = published_at {
                if date < cutoff {
                    continue;
                }
            }

            let title = entry.title.map(|t| t.content);
            let author = entry.authors.first().map(|a| a.name.clone());
            let raw_body = entry
                .content
                .and_then(|c| c.body)
                .or_else(|| entry.summary.map(|s| s.content))
                .unwrap_or_default();
            let text = truncate(&strip_html(&raw_body), MAX_TEXT_CHARS);

            let raw_payload = serde_json::json!({
                "url": source_url,
                "title": title,
                "author": author,
                "publishedAt": published_at,
            });

            items.push((
                published_at,
                FetchedItem {
                    external_id: (!entry.id.is_empty()).then_some(entry.id),
                    source_url,
                    title,
                    author,
                    published_at,
                    text,
                    raw_payload,
                    content_type: "article".to_string(),
                },
            ));
        }

        items.sort_by(|a, b| b.0.cmp(&a.0));
        items.truncate(RSS_MAX_ITEMS);

        info!(source = %config.name, items = items.len(), "syndication feed parsed");

        Ok(FetchOutcome {
            items: items.into_iter().map(|(_, item)| item).collect(),
            errors,
            metadata: serde_json::json!({ "feedTitle": feed.title.map(|t| t.content) }),
        })
    }
}

/// Date fields are tried in order since feeds vary in which they populate.
fn permissive_entry_date(entry: &feed_rs::model::Entry) -> Option<DateTime<Utc>> {
    entry
        .published
        .or(entry.updated)
        .map(|dt| dt.with_timezone(&Utc))
}

/// Strip `<script>`/`<style>` blocks and remaining tags, collapsing
/// whitespace. A regex pipeline rather than a full HTML parser — matches the
/// permissiveness of feed content, which is rarely well-formed HTML.
fn strip_html(html: &str) -> String {
    let script_style = Regex::new(r"(?is)<(script|style)[^>]*>.*?</\1>").unwrap();
    let without_blocks = script_style.replace_all(html, " ");
    let tags = Regex::new(r"(?s)<[^>]+>").unwrap();
    let without_tags = tags.replace_all(&without_blocks, " ");
    let whitespace = Regex::new(r"\s+").unwrap();
    whitespace.replace_all(&without_tags, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_html_removes_script_and_style_blocks() {
        let html = "<p>Hello</p><script>evil()</script><style>.x{}</style><p>World</p>";
        assert_eq!(strip_html(html), "Hello World");
    }

    #[test]
    fn strip_html_collapses_whitespace() {
        assert_eq!(strip_html("<p>a</p>\n\n<p>b</p>"), "a b");
    }

    #[test]
    fn can_handle_accepts_only_media() {
        let connector = SyndicationConnector::new();
        let media = SourceConfig {
            source_type: SourceType::Media,
            name: "feed".to_string(),
            url: "https://example.com/feed".to_string(),
        };
        let social = SourceConfig {
            source_type: SourceType::Social,
            ..media.clone()
        };
        assert!(connector.can_handle(&media));
        assert!(!connector.can_handle(&social));
    }
}
