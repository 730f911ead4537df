use axum::http::HeaderMap;
use storywire_common::Config;

/// Accepts a bearer token equal to the ingest secret or the scheduler
/// secret, carried as `Authorization: Bearer <token>`, `x-cron-secret`, or
/// the legacy `?secret=` query param. Any one matching is sufficient.
pub fn ingest_authorized(config: &Config, headers: &HeaderMap, query_secret: Option<&str>) -> bool {
    let candidate = bearer_token(headers)
        .or_else(|| headers.get("x-cron-secret").and_then(|v| v.to_str().ok()))
        .or(query_secret);

    match candidate {
        Some(token) => {
            constant_time_eq(token.as_bytes(), config.ingest_secret.as_bytes())
                || config
                    .scheduler_secret
                    .as_deref()
                    .is_some_and(|s| constant_time_eq(token.as_bytes(), s.as_bytes()))
        }
        None => false,
    }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn config_with_secrets(ingest: &str, scheduler: Option<&str>) -> Config {
        Config {
            database_url: String::new(),
            llm_provider: "openai".into(),
            llm_api_key: String::new(),
            llm_base_url: None,
            llm_model: "gpt-4o-mini".into(),
            llm_request_timeout: std::time::Duration::from_secs(30),
            web_host: "0.0.0.0".into(),
            web_port: 3000,
            ingest_secret: ingest.to_string(),
            scheduler_secret: scheduler.map(String::from),
            cluster_similarity_threshold: 0.4,
            cluster_trgm_threshold: 0.2,
            cluster_active_days: 7,
            ranking_max_domains: 6,
            ranking_recency_decay_hours: 24.0,
            max_items: 30,
            timeout_ms: 120_000,
            llm_concurrency: 3,
            min_confidence_threshold: 0.6,
            feed_sources: Vec::new(),
        }
    }

    #[test]
    fn accepts_bearer_token() {
        let config = config_with_secrets("s3cret", None);
        let mut headers = HeaderMap::new();
        headers.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert!(ingest_authorized(&config, &headers, None));
    }

    #[test]
    fn accepts_cron_secret_header() {
        let config = config_with_secrets("s3cret", None);
        let mut headers = HeaderMap::new();
        headers.insert("x-cron-secret", HeaderValue::from_static("s3cret"));
        assert!(ingest_authorized(&config, &headers, None));
    }

    #[test]
    fn accepts_legacy_query_param() {
        let config = config_with_secrets("s3cret", None);
        assert!(ingest_authorized(&config, &HeaderMap::new(), Some("s3cret")));
    }

    #[test]
    fn accepts_scheduler_secret() {
        let config = config_with_secrets("s3cret", Some("other-secret"));
        assert!(ingest_authorized(&config, &HeaderMap::new(), Some("other-secret")));
    }

    #[test]
    fn rejects_wrong_token() {
        let config = config_with_secrets("s3cret", None);
        assert!(!ingest_authorized(&config, &HeaderMap::new(), Some("wrong")));
    }

    #[test]
    fn rejects_missing_token() {
        let config = config_with_secrets("s3cret", None);
        assert!(!ingest_authorized(&config, &HeaderMap::new(), None));
    }
}
