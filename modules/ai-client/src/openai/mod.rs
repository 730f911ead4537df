mod client;
pub(crate) mod types;

use std::time::Duration;

use tracing::warn;

use crate::error::{AiClientError, Result};

use client::OpenAiClient;
use types::{ChatRequest, WireMessage};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A chat-completion agent bound to one OpenAI-compatible model.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    model: String,
    base_url: Option<String>,
    timeout: Duration,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: model.into(),
            base_url: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_env(model: impl Into<String>) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| AiClientError::Provider {
                status: 0,
                body: "OPENAI_API_KEY environment variable not set".to_string(),
            })?;
        Ok(Self::new(api_key, model))
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn client(&self) -> OpenAiClient {
        OpenAiClient::new(&self.api_key, self.base_url.as_deref(), self.timeout)
    }

    /// Single-turn chat completion: one system prompt, one user prompt, the
    /// model's text reply. Callers needing JSON do their own parsing — this
    /// client does not assume a response shape.
    pub async fn chat_completion(
        &self,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Result<String> {
        let request = ChatRequest::new(
            &self.model,
            vec![WireMessage::system(system), WireMessage::user(user)],
        );

        let response = self.client().chat(&request).await?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(AiClientError::EmptyResponse)
    }

    /// Chat completion with bounded retry: retries on `RateLimited`, sleeping
    /// for the server-advised interval when present, otherwise a linear
    /// backoff of `attempt * base_delay`. Any other error is returned
    /// immediately without retry.
    pub async fn chat_completion_with_retry(
        &self,
        system: impl Into<String> + Clone,
        user: impl Into<String> + Clone,
        max_attempts: u32,
        base_delay: Duration,
    ) -> Result<String> {
        let mut last_err = None;
        for attempt in 1..=max_attempts {
            match self
                .chat_completion(system.clone(), user.clone())
                .await
            {
                Ok(text) => return Ok(text),
                Err(AiClientError::RateLimited { retry_after }) if attempt < max_attempts => {
                    let delay = retry_after.unwrap_or(base_delay * attempt);
                    warn!(attempt, delay_ms = delay.as_millis() as u64, "rate limited, retrying");
                    tokio::time::sleep(delay).await;
                    last_err = Some(AiClientError::RateLimited { retry_after });
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err.unwrap_or(AiClientError::EmptyResponse))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openai_new() {
        let ai = OpenAi::new("sk-test", "gpt-4o-mini");
        assert_eq!(ai.model, "gpt-4o-mini");
        assert_eq!(ai.api_key, "sk-test");
    }

    #[test]
    fn test_openai_with_base_url() {
        let ai = OpenAi::new("sk-test", "gpt-4o-mini").with_base_url("https://custom.api.com");
        assert_eq!(ai.base_url, Some("https://custom.api.com".to_string()));
    }
}
