use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables. Every
/// tunable named in the configuration table is represented with its
/// documented default; required secrets panic with a named message rather
/// than silently defaulting.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,

    // LLM provider
    pub llm_provider: String,
    pub llm_api_key: String,
    pub llm_base_url: Option<String>,
    pub llm_model: String,
    pub llm_request_timeout: Duration,

    // Web server
    pub web_host: String,
    pub web_port: u16,

    // Ingest trigger auth — either secret authorizes POST /ingest.
    pub ingest_secret: String,
    pub scheduler_secret: Option<String>,

    // Clustering
    pub cluster_similarity_threshold: f64,
    pub cluster_trgm_threshold: f64,
    pub cluster_active_days: i64,

    // Ranking
    pub ranking_max_domains: u32,
    pub ranking_recency_decay_hours: f64,

    // Pipeline cycle
    pub max_items: usize,
    pub timeout_ms: u64,
    pub llm_concurrency: usize,
    pub min_confidence_threshold: f64,

    // Feed sources: comma-separated `name|url` pairs, all treated as MEDIA
    // syndication feeds. No `sources` table exists in this revision's schema.
    pub feed_sources: Vec<(String, String)>,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if a required var is missing.
    pub fn from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            llm_provider: env::var("LLM_PROVIDER").unwrap_or_else(|_| "openai".to_string()),
            llm_api_key: required_env("LLM_API_KEY"),
            llm_base_url: env::var("LLM_BASE_URL").ok(),
            llm_model: env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            llm_request_timeout: Duration::from_secs(
                parse_env("LLM_REQUEST_TIMEOUT_SECS").unwrap_or(30),
            ),
            web_host: env::var("WEB_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            web_port: parse_env("WEB_PORT").unwrap_or(3000),
            ingest_secret: required_env("INGEST_SECRET"),
            scheduler_secret: env::var("SCHEDULER_SECRET").ok(),
            cluster_similarity_threshold: parse_env("CLUSTER_SIMILARITY_THRESHOLD")
                .unwrap_or(0.4),
            cluster_trgm_threshold: parse_env("CLUSTER_TRGM_THRESHOLD").unwrap_or(0.2),
            cluster_active_days: parse_env("CLUSTER_ACTIVE_DAYS").unwrap_or(7),
            ranking_max_domains: parse_env("RANKING_MAX_DOMAINS").unwrap_or(6),
            ranking_recency_decay_hours: parse_env("RANKING_RECENCY_DECAY_HOURS")
                .unwrap_or(24.0),
            max_items: parse_env("DIRECT_MODE_MAX_ITEMS").unwrap_or(30),
            timeout_ms: parse_env("DIRECT_MODE_TIMEOUT_MS").unwrap_or(120_000),
            llm_concurrency: parse_env("DIRECT_MODE_LLM_CONCURRENCY").unwrap_or(3),
            min_confidence_threshold: parse_env("MIN_CONFIDENCE_THRESHOLD").unwrap_or(0.6),
            feed_sources: parse_feed_sources(&env::var("FEED_SOURCES").unwrap_or_default()),
        }
    }

    /// Log config values, redacting secrets to a character count.
    pub fn log_redacted(&self) {
        tracing::info!(
            llm_provider = %self.llm_provider,
            llm_model = %self.llm_model,
            web_port = self.web_port,
            max_items = self.max_items,
            timeout_ms = self.timeout_ms,
            llm_concurrency = self.llm_concurrency,
            "config loaded"
        );
        for (name, value) in [
            ("DATABASE_URL", &self.database_url),
            ("LLM_API_KEY", &self.llm_api_key),
            ("INGEST_SECRET", &self.ingest_secret),
        ] {
            tracing::info!("{name} = ({} chars)", value.len());
        }
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Parses `name1|url1,name2|url2`. Entries missing the `|` separator, or
/// with an empty name or url, are skipped.
fn parse_feed_sources(raw: &str) -> Vec<(String, String)> {
    raw.split(',')
        .filter_map(|entry| {
            let entry = entry.trim();
            let (name, url) = entry.split_once('|')?;
            let (name, url) = (name.trim(), url.trim());
            (!name.is_empty() && !url.is_empty()).then(|| (name.to_string(), url.to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_feed_sources_splits_pairs() {
        let parsed = parse_feed_sources("TechCrunch|https://techcrunch.com/feed,The Verge|https://theverge.com/rss.xml");
        assert_eq!(
            parsed,
            vec![
                ("TechCrunch".to_string(), "https://techcrunch.com/feed".to_string()),
                ("The Verge".to_string(), "https://theverge.com/rss.xml".to_string()),
            ]
        );
    }

    #[test]
    fn parse_feed_sources_skips_malformed_entries() {
        let parsed = parse_feed_sources("no-pipe-here,|missing-name,Missing Url|");
        assert!(parsed.is_empty());
    }

    #[test]
    fn parse_feed_sources_empty_string_yields_empty_vec() {
        assert!(parse_feed_sources("").is_empty());
    }
}
