use thiserror::Error;

/// One variant per error kind in use across the pipeline. `Dedup` and
/// `BudgetExceeded` from the error-kind taxonomy are not represented here —
/// they are recorded outcomes (a counter increment, a clean early return),
/// never propagated as a Rust error.
#[derive(Error, Debug)]
pub enum StorywireError {
    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("rate limited")]
    RateLimit,

    #[error("timeout: {0}")]
    Timeout(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("pipeline error: {0}")]
    Pipeline(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, StorywireError>;
