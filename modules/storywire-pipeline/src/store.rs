use chrono::Utc;
use sqlx::PgPool;
use storywire_common::{text, IngestStatus, RawSignal, Signal, SourceType, StorywireError};
use tracing::warn;
use uuid::Uuid;

/// A fetched item on its way into storage, prior to content-hash dedup.
pub struct PendingRawSignal {
    pub source_type: SourceType,
    pub source_name: String,
    pub source_url: String,
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub text: String,
    pub published_at: Option<chrono::DateTime<Utc>>,
    pub raw_payload: serde_json::Value,
    pub content_type: String,
}

pub struct RawSignalStore {
    pool: PgPool,
}

impl RawSignalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Compute the content hash, check uniqueness, and if new insert the
    /// RawSignal together with a companion PENDING Signal in one
    /// transaction. Returns `None` when the item is a duplicate. Failure
    /// isolates to this one item — the caller logs and moves on.
    pub async fn store_item(&self, item: PendingRawSignal) -> Result<Option<Signal>, StorywireError> {
        let hash = content_hash(&item);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| StorywireError::Database(e.to_string()))?;

        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM raw_signals WHERE content_hash = $1)",
        )
        .bind(&hash)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| StorywireError::Database(e.to_string()))?;

        if exists {
            return Ok(None);
        }

        let domain = text::extract_domain(&item.source_url);
        let raw_id = Uuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO raw_signals
                (id, source_type, source_name, source_url, source_domain, external_id,
                 fetched_at, content_type, raw_payload, raw_text, content_hash)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(raw_id)
        .bind(item.source_type)
        .bind(&item.source_name)
        .bind(&item.source_url)
        .bind(&domain)
        .bind(&item.external_id)
        .bind(Utc::now())
        .bind(&item.content_type)
        .bind(&item.raw_payload)
        .bind(&item.text)
        .bind(&hash)
        .execute(&mut *tx)
        .await
        .map_err(|e| StorywireError::Database(e.to_string()))?;

        let signal_id = Uuid::new_v4();
        let title = item.title.clone().unwrap_or_else(|| item.source_url.clone());

        sqlx::query(
            r#"
            INSERT INTO signals
                (id, raw_signal_id, canonical_url, title, published_at, language,
                 categories, ingest_status, created_at)
            VALUES ($1, $2, $3, $4, $5, 'en', '{}', $6, $7)
            "#,
        )
        .bind(signal_id)
        .bind(raw_id)
        .bind(text::normalize_url(&item.source_url))
        .bind(&title)
        .bind(item.published_at)
        .bind(IngestStatus::Pending)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| StorywireError::Database(e.to_string()))?;

        tx.commit()
            .await
            .map_err(|e| StorywireError::Database(e.to_string()))?;

        let signal = sqlx::query_as::<_, Signal>("SELECT * FROM signals WHERE id = $1")
            .bind(signal_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorywireError::Database(e.to_string()))?;

        Ok(Some(signal))
    }
}

fn content_hash(item: &PendingRawSignal) -> String {
    let bucket = item.published_at.map(|d| d.format("%Y-%m-%d").to_string());
    text::content_hash(
        &item.source_url,
        item.external_id.as_deref(),
        item.title.as_deref().unwrap_or(""),
        bucket.as_deref(),
    )
}

/// Fetched a RawSignal for audit/read purposes (not used on the write path).
#[allow(dead_code)]
pub async fn fetch_raw_signal(pool: &PgPool, id: Uuid) -> Result<RawSignal, StorywireError> {
    sqlx::query_as::<_, RawSignal>("SELECT * FROM raw_signals WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .map_err(|e| StorywireError::Database(e.to_string()))
}

pub fn log_store_failure(source: &str, err: &StorywireError) {
    warn!(source, error = %err, "raw signal store failed for item");
}
