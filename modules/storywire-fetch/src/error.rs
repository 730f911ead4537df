/// Result type alias for fetch operations.
pub type Result<T> = std::result::Result<T, FetchError>;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FetchError {
    /// The error-kind tag recorded alongside per-item/per-source fetch
    /// failures, matching the taxonomy used for the `IngestRun` audit log.
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::Fetch(_) => "FETCH_ERROR",
            FetchError::NotImplemented(_) => "NOT_IMPLEMENTED",
            FetchError::Network(_) => "NETWORK",
            FetchError::Other(_) => "FETCH_ERROR",
        }
    }
}
