use storywire_common::SourceType;

use crate::connector::{FetchConnector, FetchOutcome, SourceConfig};
use crate::stub::StubConnector;
use crate::syndication::SyndicationConnector;

/// Ordered list of connectors; the first one whose `can_handle` returns true
/// handles a given source. Built once at startup with the syndication
/// connector first and a stub for every other source type, so every
/// `SourceType` resolves to exactly one connector.
pub struct ConnectorRegistry {
    connectors: Vec<Box<dyn FetchConnector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self {
            connectors: vec![
                Box::new(SyndicationConnector::new()),
                Box::new(StubConnector::new(SourceType::Product)),
                Box::new(StubConnector::new(SourceType::Social)),
                Box::new(StubConnector::new(SourceType::Regulatory)),
            ],
        }
    }

    /// Dispatch to the first matching connector. Returns an empty outcome
    /// carrying a `NOT_IMPLEMENTED` error if nothing matches, which should
    /// not happen given the stub coverage above.
    pub async fn fetch(&self, config: &SourceConfig) -> FetchOutcome {
        for connector in &self.connectors {
            if connector.can_handle(config) {
                return connector.fetch(config).await;
            }
        }
        FetchOutcome {
            items: Vec::new(),
            errors: vec![crate::connector::FetchItemError {
                kind: "NOT_IMPLEMENTED".to_string(),
                source: config.name.clone(),
                message: format!("no connector registered for {:?}", config.source_type),
            }],
            metadata: serde_json::Value::Null,
        }
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn media_source_dispatches_to_syndication_but_fails_offline() {
        let registry = ConnectorRegistry::new();
        let config = SourceConfig {
            source_type: SourceType::Media,
            name: "example-feed".to_string(),
            url: "http://127.0.0.1:1/not-reachable".to_string(),
        };
        let outcome = registry.fetch(&config).await;
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }

    #[tokio::test]
    async fn product_source_dispatches_to_stub() {
        let registry = ConnectorRegistry::new();
        let config = SourceConfig {
            source_type: SourceType::Product,
            name: "example-product".to_string(),
            url: "https://example.com".to_string(),
        };
        let outcome = registry.fetch(&config).await;
        assert!(outcome.items.is_empty());
        assert_eq!(outcome.errors[0].kind, "NOT_IMPLEMENTED");
    }
}
