use std::time::Duration;

use ai_client::OpenAi;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use sqlx::PgPool;
use storywire_common::{Config, IngestRunStatus, IngestStatus, SourceType};
use storywire_fetch::{ConnectorRegistry, SourceConfig};
use tracing::{info, warn};
use uuid::Uuid;

use crate::budget::CycleBudget;
use crate::clusterer::{ClusterInput, Clusterer};
use crate::normalizer::{NormalizeDecision, NormalizeInput, NormalizeOutcome, Normalizer};
use crate::ranker::{Ranker, RankingConfig};
use crate::store::{PendingRawSignal, RawSignalStore};

const NORMALIZE_SAFETY_MARGIN: Duration = Duration::from_secs(10);
const CLUSTER_SAFETY_MARGIN: Duration = Duration::from_secs(5);

/// One configured source the pipeline fetches from. In this revision,
/// sources are supplied by the caller rather than stored in the database —
/// the schema has no `sources` table named in scope.
#[derive(Debug, Clone)]
pub struct SourceDefinition {
    pub source_type: SourceType,
    pub name: String,
    pub url: String,
}

pub struct CycleReport {
    pub run_id: Uuid,
    pub status: IngestRunStatus,
    pub signals_fetched: i32,
    pub signals_accepted: i32,
    pub signals_rejected: i32,
    pub error_count: i32,
    pub duration_ms: i64,
}

struct NormalizeTaskResult {
    signal_id: Uuid,
    published_at: Option<DateTime<Utc>>,
    raw_text: String,
    outcome: NormalizeOutcome,
}

pub struct PipelineRunner {
    pool: PgPool,
    fetch_registry: ConnectorRegistry,
    store: RawSignalStore,
    normalizer: Normalizer,
    clusterer: Clusterer,
    ranker: Ranker,
    max_items: usize,
    timeout: Duration,
    llm_concurrency: usize,
}

impl PipelineRunner {
    pub fn new(pool: PgPool, config: &Config, known_platform_slugs: Vec<String>) -> Self {
        let llm_client = OpenAi::new(config.llm_api_key.clone(), config.llm_model.clone())
            .with_timeout(config.llm_request_timeout);
        let llm_client = match &config.llm_base_url {
            Some(url) => llm_client.with_base_url(url.clone()),
            None => llm_client,
        };

        Self {
            store: RawSignalStore::new(pool.clone()),
            normalizer: Normalizer::new(llm_client, config.min_confidence_threshold, known_platform_slugs),
            clusterer: Clusterer::new(
                pool.clone(),
                config.cluster_similarity_threshold,
                config.cluster_trgm_threshold,
                config.cluster_active_days,
            ),
            ranker: Ranker::new(
                pool.clone(),
                RankingConfig {
                    max_domains: config.ranking_max_domains,
                    recency_decay_hours: config.ranking_recency_decay_hours,
                },
            ),
            fetch_registry: ConnectorRegistry::new(),
            max_items: config.max_items,
            timeout: Duration::from_millis(config.timeout_ms),
            llm_concurrency: config.llm_concurrency,
            pool,
        }
    }

    /// Runs one full ingest cycle: fetch, store, normalize, cluster, sweep,
    /// rescore. Per-item and per-source failures are isolated; only an
    /// unhandled error in the coordinator itself flips the run to `FAILED`.
    pub async fn run_cycle(&self, sources: &[SourceDefinition]) -> CycleReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let budget = CycleBudget::start(self.timeout);
        let mut errors: Vec<serde_json::Value> = Vec::new();

        if let Err(e) = self.insert_run_row(run_id, started_at).await {
            warn!(run_id = %run_id, error = %e, "failed to insert ingest run row");
        }

        let outcome = self.run_cycle_inner(sources, &budget, &mut errors).await;
        let duration_ms = (Utc::now() - started_at).num_milliseconds();

        let (status, fetched, accepted, rejected) = match outcome {
            Ok((fetched, accepted, rejected)) => (IngestRunStatus::Completed, fetched, accepted, rejected),
            Err(e) => {
                warn!(run_id = %run_id, error = %e, "ingest cycle failed");
                errors.push(serde_json::json!({ "kind": "PIPELINE_ERROR", "message": e.to_string() }));
                (IngestRunStatus::Failed, 0, 0, 0)
            }
        };

        self.finish_run(run_id, status, fetched, accepted, rejected, &errors).await;
        info!(run_id = %run_id, fetched, accepted, rejected, duration_ms, ?status, "ingest cycle finished");

        CycleReport {
            run_id,
            status,
            signals_fetched: fetched,
            signals_accepted: accepted,
            signals_rejected: rejected,
            error_count: errors.len() as i32,
            duration_ms,
        }
    }

    async fn run_cycle_inner(
        &self,
        sources: &[SourceDefinition],
        budget: &CycleBudget,
        errors: &mut Vec<serde_json::Value>,
    ) -> anyhow::Result<(i32, i32, i32)> {
        let fetched_items = self.fetch_all(sources, errors).await;
        let fetched_count = fetched_items.len() as i32;
        budget.log_status("fetch");

        let pending_signals = self.store_all(fetched_items, errors).await;
        budget.log_status("store");

        let normalize_results = self.normalize_all(pending_signals, budget).await;

        let mut accepted = 0;
        let mut rejected = 0;

        for result in normalize_results {
            let outcome = result.outcome;
            self.persist_normalize_outcome(result.signal_id, &outcome).await?;

            match &outcome.decision {
                NormalizeDecision::Accepted => {
                    accepted += 1;
                    if !budget.has_budget(CLUSTER_SAFETY_MARGIN) {
                        warn!(signal_id = %result.signal_id, "cluster budget exhausted, leaving signal unclustered");
                        continue;
                    }
                    self.cluster_one(result.signal_id, result.published_at, result.raw_text, &outcome, errors)
                        .await;
                }
                NormalizeDecision::Rejected { .. } => rejected += 1,
                NormalizeDecision::Failed { .. } => {}
            }
        }
        budget.log_status("normalize_and_cluster");

        if let Err(e) = self.clusterer.sweep_stale().await {
            warn!(error = %e, "stale sweep failed");
        }

        if let Err(e) = self.ranker.recompute_all().await {
            warn!(error = %e, "recompute_all failed");
        }

        Ok((fetched_count, accepted, rejected))
    }

    /// Step 2: fetch from all enabled sources, capped at `max_items` total
    /// across sources. Connector errors are collected per-source without
    /// aborting the cycle.
    async fn fetch_all(
        &self,
        sources: &[SourceDefinition],
        errors: &mut Vec<serde_json::Value>,
    ) -> Vec<(SourceDefinition, storywire_fetch::FetchedItem)> {
        let mut fetched_items = Vec::new();
        'sources: for source in sources {
            let config = SourceConfig {
                source_type: source.source_type,
                name: source.name.clone(),
                url: source.url.clone(),
            };
            let outcome = self.fetch_registry.fetch(&config).await;
            for err in &outcome.errors {
                warn!(source = %source.name, kind = %err.kind, message = %err.message, "fetch error");
                errors.push(serde_json::json!({
                    "kind": err.kind,
                    "source": err.source,
                    "message": err.message,
                }));
            }
            for item in outcome.items {
                fetched_items.push((source.clone(), item));
                if fetched_items.len() >= self.max_items {
                    break 'sources;
                }
            }
        }
        fetched_items
    }

    /// Step 3: store raw signals, deduping at this step. Failure isolates to
    /// the one item.
    async fn store_all(
        &self,
        fetched_items: Vec<(SourceDefinition, storywire_fetch::FetchedItem)>,
        errors: &mut Vec<serde_json::Value>,
    ) -> Vec<storywire_common::Signal> {
        let mut pending_signals = Vec::new();
        for (source, item) in fetched_items {
            let pending = PendingRawSignal {
                source_type: source.source_type,
                source_name: source.name.clone(),
                source_url: item.source_url,
                external_id: item.external_id,
                title: item.title,
                text: item.text,
                published_at: item.published_at,
                raw_payload: item.raw_payload,
                content_type: item.content_type,
            };
            match self.store.store_item(pending).await {
                Ok(Some(signal)) => pending_signals.push(signal),
                Ok(None) => {}
                Err(e) => {
                    crate::store::log_store_failure(&source.name, &e);
                    errors.push(serde_json::json!({
                        "kind": "FETCH_ERROR",
                        "source": source.name,
                        "message": e.to_string(),
                    }));
                }
            }
        }
        pending_signals
    }

    /// Step 4: normalize with bounded concurrency (`llm_concurrency`
    /// in-flight). Checked against the wall-clock budget before each task
    /// starts; in-flight work is never interrupted once started.
    async fn normalize_all(
        &self,
        pending_signals: Vec<storywire_common::Signal>,
        budget: &CycleBudget,
    ) -> Vec<NormalizeTaskResult> {
        let runnable: Vec<storywire_common::Signal> = pending_signals
            .into_iter()
            .take_while(|_| budget.has_budget(NORMALIZE_SAFETY_MARGIN))
            .collect();

        stream::iter(runnable)
            .map(|signal| async move {
                let raw_text = sqlx::query_scalar::<_, Option<String>>(
                    "SELECT raw_text FROM raw_signals WHERE id = $1",
                )
                .bind(signal.raw_signal_id)
                .fetch_one(&self.pool)
                .await
                .unwrap_or(None)
                .unwrap_or_default();

                let source_name: String = sqlx::query_scalar(
                    "SELECT source_name FROM raw_signals WHERE id = $1",
                )
                .bind(signal.raw_signal_id)
                .fetch_one(&self.pool)
                .await
                .unwrap_or_default();

                let outcome = self
                    .normalizer
                    .normalize(NormalizeInput {
                        title: &signal.title,
                        text: &raw_text,
                        source_name: &source_name,
                        url: &signal.canonical_url,
                        published_at: signal.published_at,
                    })
                    .await;

                NormalizeTaskResult {
                    signal_id: signal.id,
                    published_at: signal.published_at,
                    raw_text,
                    outcome,
                }
            })
            .buffer_unordered(self.llm_concurrency.max(1))
            .collect()
            .await
    }

    /// Step 5: sequential clustering — serialized to avoid cross-cluster
    /// lock contention and keep TF-IDF candidate snapshots consistent.
    async fn cluster_one(
        &self,
        signal_id: Uuid,
        published_at: Option<DateTime<Utc>>,
        raw_text: String,
        outcome: &NormalizeOutcome,
        errors: &mut Vec<serde_json::Value>,
    ) {
        let fields = outcome.fields.as_ref().expect("accepted signals carry fields");
        let input = ClusterInput {
            signal_id,
            headline: fields.suggested_headline.clone(),
            summary: fields.summary.clone(),
            categories: fields.categories.clone(),
            known_platforms: outcome.known_platforms.clone(),
            published_at,
            created_at: Utc::now(),
            raw_text_for_keywords: raw_text,
        };

        match self.clusterer.assign(input).await {
            Ok(cluster_id) => {
                if let Err(e) = self.ranker.rescore(cluster_id).await {
                    warn!(cluster_id = %cluster_id, error = %e, "rescore after assignment failed");
                }
            }
            Err(e) => {
                warn!(signal_id = %signal_id, error = %e, "clustering failed");
                errors.push(serde_json::json!({
                    "kind": "PIPELINE_ERROR",
                    "source": signal_id.to_string(),
                    "message": e.to_string(),
                }));
            }
        }
    }

    async fn persist_normalize_outcome(
        &self,
        signal_id: Uuid,
        outcome: &NormalizeOutcome,
    ) -> anyhow::Result<()> {
        // An accepted signal stays PENDING here: the CHECK constraint on
        // `signals` requires ACCEPTED and a non-null `cluster_id` to land in
        // the same statement, and clustering hasn't run yet. `Clusterer::
        // attach` makes that transition once a cluster_id actually exists.
        let (status, reason) = match &outcome.decision {
            NormalizeDecision::Accepted => (IngestStatus::Pending, None),
            NormalizeDecision::Rejected { reason } => (IngestStatus::Rejected, Some(reason.clone())),
            NormalizeDecision::Failed { reason } => (IngestStatus::Failed, Some(reason.clone())),
        };

        let (summary, headline, categories, entities, confidence) = match &outcome.fields {
            Some(f) => (
                Some(f.summary.clone()),
                Some(f.suggested_headline.clone()),
                f.categories.iter().map(|c| c.as_wire_str().to_string()).collect::<Vec<_>>(),
                Some(serde_json::to_value(&f.entities)?),
                Some(f.confidence),
            ),
            None => (None, None, Vec::new(), None, None),
        };

        sqlx::query(
            r#"
            UPDATE signals SET
                ingest_status = $1,
                ingest_reason = $2,
                summary = $3,
                suggested_headline = $4,
                categories = $5::category[],
                entities = $6,
                confidence = $7,
                llm_raw_response = $8,
                llm_prompt_version = $9,
                image_url = $10,
                normalized_at = $11
            WHERE id = $12
            "#,
        )
        .bind(status)
        .bind(reason)
        .bind(summary)
        .bind(headline)
        .bind(categories)
        .bind(entities)
        .bind(confidence)
        .bind(&outcome.raw_response)
        .bind(crate::normalizer::PROMPT_VERSION)
        .bind(&outcome.image_url)
        .bind(Utc::now())
        .bind(signal_id)
        .execute(&self.pool)
        .await?;

        for slug in &outcome.known_platforms {
            sqlx::query(
                r#"
                INSERT INTO signal_platforms (signal_id, platform_id)
                SELECT $1, id FROM platforms WHERE slug = $2
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(signal_id)
            .bind(slug)
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn insert_run_row(&self, run_id: Uuid, started_at: DateTime<Utc>) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO ingest_runs (id, started_at, status, signals_fetched, signals_accepted, signals_rejected, errors)
            VALUES ($1, $2, $3, 0, 0, 0, '[]'::jsonb)
            "#,
        )
        .bind(run_id)
        .bind(started_at)
        .bind(IngestRunStatus::Running)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn finish_run(
        &self,
        run_id: Uuid,
        status: IngestRunStatus,
        fetched: i32,
        accepted: i32,
        rejected: i32,
        errors: &[serde_json::Value],
    ) {
        let errors_json = serde_json::Value::Array(errors.to_vec());
        let result = sqlx::query(
            r#"
            UPDATE ingest_runs SET
                finished_at = $1, status = $2, signals_fetched = $3,
                signals_accepted = $4, signals_rejected = $5, errors = $6
            WHERE id = $7
            "#,
        )
        .bind(Utc::now())
        .bind(status)
        .bind(fetched)
        .bind(accepted)
        .bind(rejected)
        .bind(errors_json)
        .bind(run_id)
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            warn!(run_id = %run_id, error = %e, "failed to finalize ingest run row");
        }
    }
}
