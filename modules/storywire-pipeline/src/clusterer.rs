use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use storywire_common::{text, Category, StorywireError};
use tracing::warn;
use uuid::Uuid;

use crate::similarity;

const PHASE1_CANDIDATE_LIMIT: i64 = 10;

pub struct ClusterInput {
    pub signal_id: Uuid,
    pub headline: String,
    pub summary: String,
    pub categories: Vec<Category>,
    pub known_platforms: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub raw_text_for_keywords: String,
}

struct Candidate {
    id: Uuid,
    search_text: String,
    platform_slugs: Vec<String>,
}

pub struct Clusterer {
    pool: PgPool,
    similarity_threshold: f64,
    trgm_threshold: f64,
    active_days: i64,
}

impl Clusterer {
    pub fn new(pool: PgPool, similarity_threshold: f64, trgm_threshold: f64, active_days: i64) -> Self {
        Self {
            pool,
            similarity_threshold,
            trgm_threshold,
            active_days,
        }
    }

    /// `sortedPlatforms | YYYY-MM-DD(publishedAt or createdAt) | top5Keywords`
    /// — stable per signal, deliberately coarse.
    pub fn compute_fingerprint(&self, input: &ClusterInput) -> String {
        let mut platforms = input.known_platforms.clone();
        platforms.sort();
        let date = input
            .published_at
            .unwrap_or(input.created_at)
            .format("%Y-%m-%d")
            .to_string();
        let keywords = text::extract_keywords(&input.raw_text_for_keywords, 5);
        format!("{}|{}|{}", platforms.join(","), date, keywords.join(","))
    }

    /// Assigns the signal to a cluster, creating one if needed, fully within
    /// one transaction per the locking protocol: advisory lock, exact-match
    /// lookup, two-phase candidate search, create-or-race-fallback, attach.
    pub async fn assign(&self, input: ClusterInput) -> Result<Uuid, StorywireError> {
        let fingerprint = self.compute_fingerprint(&input);
        let search_text = similarity::build_search_text(&input.headline, &input.summary);

        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let lock_key = text::fingerprint_lock_key(&fingerprint);
        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(lock_key)
            .execute(&mut *tx)
            .await
            .map_err(db_err)?;

        if let Some(cluster_id) = self.find_by_fingerprint(&mut tx, &fingerprint).await? {
            self.attach(&mut tx, cluster_id, input.signal_id).await?;
            tx.commit().await.map_err(db_err)?;
            return Ok(cluster_id);
        }

        if let Some(cluster_id) = self
            .find_phase2_match(&mut tx, &search_text, &input.known_platforms)
            .await?
        {
            self.attach(&mut tx, cluster_id, input.signal_id).await?;
            tx.commit().await.map_err(db_err)?;
            return Ok(cluster_id);
        }

        match self
            .create_cluster(&mut tx, &fingerprint, &search_text, &input)
            .await
        {
            Ok(cluster_id) => {
                self.attach(&mut tx, cluster_id, input.signal_id).await?;
                tx.commit().await.map_err(db_err)?;
                Ok(cluster_id)
            }
            Err(e) if is_unique_violation(&e) => {
                warn!(fingerprint, "fingerprint race on create, re-reading and attaching");
                let cluster_id = self
                    .find_by_fingerprint(&mut tx, &fingerprint)
                    .await?
                    .ok_or_else(|| {
                        StorywireError::Database("fingerprint race but row missing on reread".into())
                    })?;
                self.attach(&mut tx, cluster_id, input.signal_id).await?;
                tx.commit().await.map_err(db_err)?;
                Ok(cluster_id)
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn find_by_fingerprint(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        fingerprint: &str,
    ) -> Result<Option<Uuid>, StorywireError> {
        sqlx::query_scalar("SELECT id FROM story_clusters WHERE fingerprint = $1")
            .bind(fingerprint)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_err)
    }

    async fn find_phase2_match(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        search_text: &str,
        known_platforms: &[String],
    ) -> Result<Option<Uuid>, StorywireError> {
        sqlx::query("SELECT set_config('pg_trgm.similarity_threshold', $1, true)")
            .bind(self.trgm_threshold.to_string())
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

        let cutoff = Utc::now() - chrono::Duration::days(self.active_days);

        let rows: Vec<(Uuid, String)> = sqlx::query_as(
            r#"
            SELECT id, search_text FROM story_clusters
            WHERE status = 'ACTIVE' AND last_signal_at >= $1 AND search_text % $2
            ORDER BY similarity(search_text, $2) DESC
            LIMIT $3
            "#,
        )
        .bind(cutoff)
        .bind(search_text)
        .bind(PHASE1_CANDIDATE_LIMIT)
        .fetch_all(&mut **tx)
        .await
        .map_err(db_err)?;

        let mut candidates = Vec::with_capacity(rows.len());
        for (id, candidate_search_text) in rows {
            let platform_slugs = self.platform_slugs_for_cluster(tx, id).await?;
            candidates.push(Candidate {
                id,
                search_text: candidate_search_text,
                platform_slugs,
            });
        }

        let documents: Vec<&str> = candidates
            .iter()
            .map(|c| c.search_text.as_str())
            .chain(std::iter::once(search_text))
            .collect();
        let idf = similarity::inverse_document_frequencies(&documents);
        let query_vector = similarity::tfidf_vector(search_text, &idf);

        let mut best: Option<(Uuid, f64)> = None;
        for candidate in &candidates {
            let candidate_vector = similarity::tfidf_vector(&candidate.search_text, &idf);
            let cosine = similarity::cosine_similarity(&query_vector, &candidate_vector);
            let bonus = similarity::platform_overlap_bonus(known_platforms, &candidate.platform_slugs);
            let score = cosine + bonus;
            if best.as_ref().map(|(_, s)| score > *s).unwrap_or(true) {
                best = Some((candidate.id, score));
            }
        }

        Ok(best.and_then(|(id, score)| (score >= self.similarity_threshold).then_some(id)))
    }

    async fn platform_slugs_for_cluster(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cluster_id: Uuid,
    ) -> Result<Vec<String>, StorywireError> {
        sqlx::query_scalar(
            r#"
            SELECT p.slug FROM cluster_platforms cp
            JOIN platforms p ON p.id = cp.platform_id
            WHERE cp.cluster_id = $1
            "#,
        )
        .bind(cluster_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(db_err)
    }

    async fn create_cluster(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        fingerprint: &str,
        search_text: &str,
        input: &ClusterInput,
    ) -> Result<Uuid, sqlx::Error> {
        let cluster_id = Uuid::new_v4();
        let headline = if input.headline.trim().is_empty() {
            "Untitled Story".to_string()
        } else {
            storywire_common::truncate(&input.headline, 200)
        };
        let context_summary = storywire_common::truncate(&input.summary, 1000);
        let first_seen_at = input.published_at.unwrap_or(input.created_at);
        let now = Utc::now();
        let category_strs: Vec<&str> = input.categories.iter().map(|c| c.as_wire_str()).collect();

        sqlx::query(
            r#"
            INSERT INTO story_clusters
                (id, fingerprint, headline, context_summary, search_text, categories,
                 importance_score, score_breakdown, manual_boost,
                 first_seen_at, last_seen_at, last_signal_at, status)
            VALUES ($1, $2, $3, $4, $5, $6::category[], 0, '{}'::jsonb, 0, $7, $8, $8, 'ACTIVE')
            "#,
        )
        .bind(cluster_id)
        .bind(fingerprint)
        .bind(&headline)
        .bind(&context_summary)
        .bind(search_text)
        .bind(&category_strs)
        .bind(first_seen_at)
        .bind(now)
        .execute(&mut **tx)
        .await?;

        for slug in &input.known_platforms {
            sqlx::query(
                r#"
                INSERT INTO cluster_platforms (cluster_id, platform_id)
                SELECT $1, id FROM platforms WHERE slug = $2
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(cluster_id)
            .bind(slug)
            .execute(&mut **tx)
            .await?;
        }

        Ok(cluster_id)
    }

    /// Sets `cluster_id` and flips `ingest_status` to `ACCEPTED` in the same
    /// statement — the CHECK constraint on `signals` forbids the two
    /// transitioning separately, since an ACCEPTED row with a null
    /// `cluster_id` (or vice versa) is never valid, even momentarily.
    async fn attach(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        cluster_id: Uuid,
        signal_id: Uuid,
    ) -> Result<(), StorywireError> {
        let now = Utc::now();
        sqlx::query("UPDATE signals SET cluster_id = $1, ingest_status = 'ACCEPTED' WHERE id = $2")
            .bind(cluster_id)
            .bind(signal_id)
            .execute(&mut **tx)
            .await
            .map_err(db_err)?;

        sqlx::query(
            "UPDATE story_clusters SET last_signal_at = $1, last_seen_at = $1 WHERE id = $2",
        )
        .bind(now)
        .bind(cluster_id)
        .execute(&mut **tx)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    /// Marks `ACTIVE` clusters whose `lastSignalAt` has aged out of the
    /// active window as `STALE`. Run once per cycle.
    pub async fn sweep_stale(&self) -> Result<u64, StorywireError> {
        let cutoff = Utc::now() - chrono::Duration::days(self.active_days);
        let result = sqlx::query(
            "UPDATE story_clusters SET status = 'STALE' WHERE status = 'ACTIVE' AND last_signal_at < $1",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(result.rows_affected())
    }
}

fn db_err(e: sqlx::Error) -> StorywireError {
    StorywireError::Database(e.to_string())
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    matches!(e.as_database_error(), Some(db_err) if db_err.code().as_deref() == Some("23505"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_input() -> ClusterInput {
        ClusterInput {
            signal_id: Uuid::new_v4(),
            headline: "Replika launches new feature".to_string(),
            summary: "Replika announced a new companion feature today.".to_string(),
            categories: vec![Category::ProductUpdate],
            known_platforms: vec!["replika".to_string(), "character-ai".to_string()],
            published_at: None,
            created_at: "2024-06-15T12:00:00Z".parse().unwrap(),
            raw_text_for_keywords: "Replika announced a new companion feature today.".to_string(),
        }
    }

    #[test]
    fn fingerprint_sorts_platforms_and_uses_date_bucket() {
        let clusterer = Clusterer::new_unconnected();
        let fp = clusterer.compute_fingerprint(&sample_input());
        assert!(fp.starts_with("character-ai,replika|2024-06-15|"));
    }

    impl Clusterer {
        fn new_unconnected() -> Self {
            Clusterer {
                pool: sqlx::Pool::connect_lazy("postgres://invalid/invalid").unwrap(),
                similarity_threshold: 0.4,
                trgm_threshold: 0.2,
                active_days: 7,
            }
        }
    }
}
