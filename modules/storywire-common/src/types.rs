use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Truncate a string to at most `max_chars` characters, appending an
/// ellipsis marker when truncation occurred. Required fields never go to
/// null on overflow — this is the only normalization bounded fields get.
pub fn truncate(s: &str, max_chars: usize) -> String {
    let char_count = s.chars().count();
    if char_count <= max_chars {
        return s.to_string();
    }
    const MARKER: &str = "…";
    let keep = max_chars.saturating_sub(1);
    let mut truncated: String = s.chars().take(keep).collect();
    truncated.push_str(MARKER);
    truncated
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "source_type", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum SourceType {
    Media,
    Product,
    Social,
    Regulatory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ingest_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum IngestStatus {
    Pending,
    Accepted,
    Rejected,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "cluster_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum ClusterStatus {
    Active,
    Stale,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "ingest_run_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum IngestRunStatus {
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "category", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    ProductUpdate,
    MonetizationChange,
    SafetyYouthRisk,
    NsfwContentPolicy,
    CulturalTrend,
    RegulatoryLegal,
    BusinessFunding,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::ProductUpdate,
        Category::MonetizationChange,
        Category::SafetyYouthRisk,
        Category::NsfwContentPolicy,
        Category::CulturalTrend,
        Category::RegulatoryLegal,
        Category::BusinessFunding,
    ];

    /// Wire string as used in LLM JSON output and query params.
    pub fn as_wire_str(&self) -> &'static str {
        match self {
            Category::ProductUpdate => "PRODUCT_UPDATE",
            Category::MonetizationChange => "MONETIZATION_CHANGE",
            Category::SafetyYouthRisk => "SAFETY_YOUTH_RISK",
            Category::NsfwContentPolicy => "NSFW_CONTENT_POLICY",
            Category::CulturalTrend => "CULTURAL_TREND",
            Category::RegulatoryLegal => "REGULATORY_LEGAL",
            Category::BusinessFunding => "BUSINESS_FUNDING",
        }
    }

    pub fn from_wire_str(s: &str) -> Option<Category> {
        Self::ALL.into_iter().find(|c| c.as_wire_str() == s)
    }

    /// Category weight used by the ranker's category factor (§4.7).
    pub fn ranking_weight(&self) -> f64 {
        match self {
            Category::SafetyYouthRisk | Category::RegulatoryLegal => 1.5,
            _ => 1.0,
        }
    }
}

/// Entity sets extracted by the normalizer, each a deduplicated string set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entities {
    #[serde(default)]
    pub platforms: Vec<String>,
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub people: Vec<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Immutable artifact of one fetch. Created once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RawSignal {
    pub id: Uuid,
    pub source_type: SourceType,
    pub source_name: String,
    pub source_url: String,
    pub source_domain: String,
    pub external_id: Option<String>,
    pub fetched_at: DateTime<Utc>,
    pub content_type: String,
    pub raw_payload: serde_json::Value,
    pub raw_text: Option<String>,
    pub content_hash: String,
}

/// The interpreted view of a RawSignal, 1:1 via `raw_signal_id`.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Signal {
    pub id: Uuid,
    pub raw_signal_id: Uuid,
    pub canonical_url: String,
    pub title: String,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub language: String,
    pub summary: Option<String>,
    pub suggested_headline: Option<String>,
    pub categories: Vec<Category>,
    pub entities: Option<serde_json::Value>,
    pub confidence: Option<f64>,
    pub llm_provider: Option<String>,
    pub llm_model: Option<String>,
    pub llm_prompt_version: Option<String>,
    pub llm_raw_response: Option<String>,
    pub ingest_status: IngestStatus,
    pub ingest_reason: Option<String>,
    pub normalized_at: Option<DateTime<Utc>>,
    pub cluster_id: Option<Uuid>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A group of signals reporting the same event.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct StoryCluster {
    pub id: Uuid,
    pub fingerprint: String,
    pub headline: String,
    pub context_summary: String,
    pub search_text: String,
    pub categories: Vec<Category>,
    pub importance_score: i64,
    pub score_breakdown: serde_json::Value,
    pub manual_boost: i32,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
    pub last_signal_at: DateTime<Utc>,
    pub status: ClusterStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Platform {
    pub id: Uuid,
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub website: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SourceCredibility {
    pub domain: String,
    pub weight: f64,
}

/// Structured per-item/per-source error captured during an ingest cycle,
/// appended to an IngestRun's error list. Never propagated to callers of the
/// query API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestError {
    pub kind: String,
    pub source: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct IngestRun {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: IngestRunStatus,
    pub signals_fetched: i32,
    pub signals_accepted: i32,
    pub signals_rejected: i32,
    pub errors: serde_json::Value,
}

/// The shape the LLM is asked to emit, after validation. Field lengths are
/// enforced by the normalizer before a Signal is constructed from this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizedFields {
    pub summary: String,
    pub suggested_headline: String,
    pub categories: Vec<Category>,
    pub entities: Entities,
    pub confidence: f64,
}

/// Score breakdown persisted for audit alongside the integer importance
/// score (§4.7). Never used for comparison — pagination always compares the
/// rounded integer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub source_diversity: f64,
    pub velocity: f64,
    pub credibility: f64,
    pub category: f64,
    pub recency: f64,
    pub manual: f64,
    pub total: f64,
}

pub type PlatformSlugs = HashMap<String, ()>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncate_within_bound_is_unchanged() {
        assert_eq!(truncate("hello", 10), "hello");
    }

    #[test]
    fn truncate_over_bound_appends_ellipsis_within_limit() {
        let t = truncate("hello world", 6);
        assert_eq!(t.chars().count(), 6);
        assert!(t.ends_with('…'));
    }

    #[test]
    fn category_wire_roundtrip() {
        for c in Category::ALL {
            assert_eq!(Category::from_wire_str(c.as_wire_str()), Some(c));
        }
    }

    #[test]
    fn category_ranking_weight() {
        assert_eq!(Category::SafetyYouthRisk.ranking_weight(), 1.5);
        assert_eq!(Category::RegulatoryLegal.ranking_weight(), 1.5);
        assert_eq!(Category::ProductUpdate.ranking_weight(), 1.0);
    }
}
