use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::Utc;
use sqlx::PgPool;
use storywire_common::{Category, ScoreBreakdown, StorywireError};
use tokio::sync::RwLock;
use tracing::warn;
use uuid::Uuid;

const DEFAULT_DOMAIN_WEIGHT: f64 = 0.5;
const CREDIBILITY_CACHE_TTL: Duration = Duration::from_secs(300);

struct CredibilityCache {
    weights: HashMap<String, f64>,
    refreshed_at: Instant,
}

/// Read-mostly cache over `source_credibility`, refreshed lazily once its
/// TTL (~5 min) has elapsed, per the ranker's read-mostly access pattern.
pub struct CredibilityCacheHandle {
    inner: RwLock<Option<CredibilityCache>>,
}

impl CredibilityCacheHandle {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(None),
        }
    }

    async fn weight_for(&self, pool: &PgPool, domain: &str) -> Result<f64, StorywireError> {
        {
            let guard = self.inner.read().await;
            if let Some(cache) = guard.as_ref() {
                if cache.refreshed_at.elapsed() < CREDIBILITY_CACHE_TTL {
                    return Ok(cache.weights.get(domain).copied().unwrap_or(DEFAULT_DOMAIN_WEIGHT));
                }
            }
        }

        let rows: Vec<(String, f64)> =
            sqlx::query_as("SELECT domain, weight FROM source_credibility")
                .fetch_all(pool)
                .await
                .map_err(|e| StorywireError::Database(e.to_string()))?;

        let weights: HashMap<String, f64> = rows.into_iter().collect();
        let weight = weights.get(domain).copied().unwrap_or(DEFAULT_DOMAIN_WEIGHT);

        let mut guard = self.inner.write().await;
        *guard = Some(CredibilityCache {
            weights,
            refreshed_at: Instant::now(),
        });

        Ok(weight)
    }
}

impl Default for CredibilityCacheHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RankingConfig {
    pub max_domains: u32,
    pub recency_decay_hours: f64,
}

pub struct Ranker {
    pool: PgPool,
    config: RankingConfig,
    credibility: CredibilityCacheHandle,
}

impl Ranker {
    pub fn new(pool: PgPool, config: RankingConfig) -> Self {
        Self {
            pool,
            config,
            credibility: CredibilityCacheHandle::new(),
        }
    }

    /// Scores one cluster and persists the integer `importanceScore`
    /// (`round(score * 1000)`) plus its breakdown. Pagination always
    /// compares the rounded integer, never the float.
    pub async fn rescore(&self, cluster_id: Uuid) -> Result<(), StorywireError> {
        let categories: Vec<Category> =
            sqlx::query_scalar("SELECT categories FROM story_clusters WHERE id = $1")
                .bind(cluster_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StorywireError::Database(e.to_string()))?;

        let manual_boost: i32 = sqlx::query_scalar(
            "SELECT manual_boost FROM story_clusters WHERE id = $1",
        )
        .bind(cluster_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorywireError::Database(e.to_string()))?;

        let last_signal_at: chrono::DateTime<Utc> = sqlx::query_scalar(
            "SELECT last_signal_at FROM story_clusters WHERE id = $1",
        )
        .bind(cluster_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorywireError::Database(e.to_string()))?;

        let domains: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT DISTINCT rs.source_domain
            FROM signals s
            JOIN raw_signals rs ON rs.id = s.raw_signal_id
            WHERE s.cluster_id = $1
            "#,
        )
        .bind(cluster_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorywireError::Database(e.to_string()))?;

        let recent_count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM signals WHERE cluster_id = $1 AND created_at >= $2",
        )
        .bind(cluster_id)
        .bind(Utc::now() - chrono::Duration::minutes(60))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| StorywireError::Database(e.to_string()))?;

        let mut total_weight = 0.0;
        if domains.is_empty() {
            total_weight = DEFAULT_DOMAIN_WEIGHT;
        } else {
            for domain in &domains {
                total_weight += self.credibility.weight_for(&self.pool, domain).await?;
            }
            total_weight /= domains.len() as f64;
        }

        let breakdown = self.compute_breakdown(
            &domains,
            recent_count,
            total_weight,
            &categories,
            last_signal_at,
            manual_boost,
        );

        let importance_score = (breakdown.total * 1000.0).round() as i64;
        let breakdown_json = serde_json::to_value(&breakdown)
            .map_err(|e| StorywireError::Pipeline(e.to_string()))?;

        sqlx::query(
            "UPDATE story_clusters SET importance_score = $1, score_breakdown = $2 WHERE id = $3",
        )
        .bind(importance_score)
        .bind(breakdown_json)
        .bind(cluster_id)
        .execute(&self.pool)
        .await
        .map_err(|e| StorywireError::Database(e.to_string()))?;

        Ok(())
    }

    fn compute_breakdown(
        &self,
        domains: &[String],
        recent_count: i64,
        avg_weight: f64,
        categories: &[Category],
        last_signal_at: chrono::DateTime<Utc>,
        manual_boost: i32,
    ) -> ScoreBreakdown {
        let source_diversity =
            (domains.len() as u32).min(self.config.max_domains) as f64 * 2.0;
        let velocity = ((1.0 + recent_count as f64).ln()) * 3.0;
        let credibility = avg_weight * 1.5;
        let category_weight = categories
            .iter()
            .map(|c| c.ranking_weight())
            .fold(1.0_f64, f64::max);
        let category = category_weight * 2.0;
        let hours_since = (Utc::now() - last_signal_at).num_seconds() as f64 / 3600.0;
        let recency = (-hours_since / self.config.recency_decay_hours).exp();
        let manual = manual_boost as f64 * 5.0;
        let total = source_diversity + velocity + credibility + category + recency + manual;

        ScoreBreakdown {
            source_diversity,
            velocity,
            credibility,
            category,
            recency,
            manual,
            total,
        }
    }

    /// Recomputes rankings for every active cluster. Individual failures are
    /// logged and skipped; the batch never aborts on one bad row.
    pub async fn recompute_all(&self) -> Result<u32, StorywireError> {
        let ids: Vec<Uuid> = sqlx::query_scalar("SELECT id FROM story_clusters WHERE status = 'ACTIVE'")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StorywireError::Database(e.to_string()))?;

        let mut succeeded = 0;
        for id in ids {
            match self.rescore(id).await {
                Ok(()) => succeeded += 1,
                Err(e) => warn!(cluster_id = %id, error = %e, "rescore failed, skipping"),
            }
        }
        Ok(succeeded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ranker_with_config(max_domains: u32, recency_decay_hours: f64) -> Ranker {
        Ranker {
            pool: sqlx::Pool::connect_lazy("postgres://invalid/invalid").unwrap(),
            config: RankingConfig {
                max_domains,
                recency_decay_hours,
            },
            credibility: CredibilityCacheHandle::new(),
        }
    }

    #[test]
    fn source_diversity_caps_at_max_domains() {
        let ranker = ranker_with_config(6, 24.0);
        let domains: Vec<String> = (0..10).map(|i| format!("d{i}.com")).collect();
        let breakdown = ranker.compute_breakdown(
            &domains,
            0,
            0.5,
            &[Category::ProductUpdate],
            Utc::now(),
            0,
        );
        assert_eq!(breakdown.source_diversity, 6.0 * 2.0);
    }

    #[test]
    fn category_weight_takes_max_across_categories() {
        let ranker = ranker_with_config(6, 24.0);
        let breakdown = ranker.compute_breakdown(
            &[],
            0,
            0.5,
            &[Category::ProductUpdate, Category::SafetyYouthRisk],
            Utc::now(),
            0,
        );
        assert_eq!(breakdown.category, 1.5 * 2.0);
    }

    #[test]
    fn recency_decays_toward_zero_for_old_signals() {
        let ranker = ranker_with_config(6, 24.0);
        let old = Utc::now() - chrono::Duration::hours(240);
        let breakdown = ranker.compute_breakdown(&[], 0, 0.5, &[Category::ProductUpdate], old, 0);
        assert!(breakdown.recency < 0.001);
    }

    #[test]
    fn manual_boost_scales_linearly() {
        let ranker = ranker_with_config(6, 24.0);
        let breakdown = ranker.compute_breakdown(&[], 0, 0.5, &[Category::ProductUpdate], Utc::now(), 3);
        assert_eq!(breakdown.manual, 15.0);
    }
}
