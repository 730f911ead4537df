use std::time::Duration;

/// Error surfaced by a chat-completion call.
///
/// `RateLimited` carries the server-advised retry interval when the provider
/// sent one (OpenAI's `Retry-After` header); callers fall back to their own
/// backoff schedule when it is absent.
#[derive(Debug, thiserror::Error)]
pub enum AiClientError {
    #[error("rate limited{}", retry_after.map(|d| format!(", retry after {:?}", d)).unwrap_or_default())]
    RateLimited { retry_after: Option<Duration> },

    #[error("provider error ({status}): {body}")]
    Provider { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("empty response from provider")]
    EmptyResponse,
}

pub type Result<T> = std::result::Result<T, AiClientError>;
