use async_trait::async_trait;
use storywire_common::SourceType;

use crate::connector::{FetchConnector, FetchItemError, FetchOutcome, SourceConfig};

/// Connector for a source type with no real integration yet. Always
/// reports `NOT_IMPLEMENTED` rather than silently returning nothing, so the
/// gap is visible in the `IngestRun` audit log.
pub struct StubConnector {
    source_type: SourceType,
}

impl StubConnector {
    pub fn new(source_type: SourceType) -> Self {
        Self { source_type }
    }
}

#[async_trait]
impl FetchConnector for StubConnector {
    fn can_handle(&self, config: &SourceConfig) -> bool {
        config.source_type == self.source_type
    }

    async fn fetch(&self, config: &SourceConfig) -> FetchOutcome {
        FetchOutcome {
            items: Vec::new(),
            errors: vec![FetchItemError {
                kind: "NOT_IMPLEMENTED".to_string(),
                source: config.name.clone(),
                message: format!("{:?} sources are not yet integrated", self.source_type),
            }],
            metadata: serde_json::Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_handles_only_its_own_source_type() {
        let stub = StubConnector::new(SourceType::Product);
        let config = SourceConfig {
            source_type: SourceType::Product,
            name: "x".to_string(),
            url: "https://example.com".to_string(),
        };
        assert!(stub.can_handle(&config));
        let other = SourceConfig {
            source_type: SourceType::Social,
            ..config
        };
        assert!(!stub.can_handle(&other));
    }
}
