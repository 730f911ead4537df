use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use storywire_common::SourceType;

use crate::error::FetchError;

/// Configuration for one configured source, as handed to a connector's
/// `can_handle`/`fetch` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub source_type: SourceType,
    pub name: String,
    pub url: String,
}

/// One item returned by a connector: an external id when the upstream
/// format carries one, the item's own URL, optional title/author/published
/// date, a plain-text extract with HTML stripped, the original structured
/// payload for audit, and a content-type tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchedItem {
    pub external_id: Option<String>,
    pub source_url: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub text: String,
    pub raw_payload: serde_json::Value,
    pub content_type: String,
}

/// A per-item or per-source error captured during a fetch, never aborting
/// the cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchItemError {
    pub kind: String,
    pub source: String,
    pub message: String,
}

impl FetchItemError {
    pub fn from_error(source: &str, err: &FetchError) -> Self {
        Self {
            kind: err.kind().to_string(),
            source: source.to_string(),
            message: err.to_string(),
        }
    }
}

/// The result of one connector invocation over one source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FetchOutcome {
    pub items: Vec<FetchedItem>,
    pub errors: Vec<FetchItemError>,
    pub metadata: serde_json::Value,
}

impl FetchOutcome {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            errors: Vec::new(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// A pluggable source fetcher. The registry calls `can_handle` in order and
/// dispatches to the first connector that accepts a given source.
#[async_trait]
pub trait FetchConnector: Send + Sync {
    fn can_handle(&self, config: &SourceConfig) -> bool;

    async fn fetch(&self, config: &SourceConfig) -> FetchOutcome;
}
