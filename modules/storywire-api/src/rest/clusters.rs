use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder};
use tracing::warn;
use uuid::Uuid;

use storywire_common::Category;

use crate::cursor::Cursor;
use crate::AppState;

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 50;

#[derive(Deserialize)]
pub struct ClustersQuery {
    category: Option<String>,
    platform: Option<String>,
    window: Option<String>,
    cursor: Option<String>,
    limit: Option<i64>,
}

fn window_duration(window: &str) -> Duration {
    match window {
        "24h" => Duration::hours(24),
        "30d" => Duration::days(30),
        _ => Duration::days(7),
    }
}

#[derive(FromRow)]
struct ClusterRow {
    id: Uuid,
    headline: String,
    context_summary: String,
    categories: Vec<Category>,
    importance_score: i64,
    score_breakdown: serde_json::Value,
    first_seen_at: DateTime<Utc>,
    last_signal_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct PlatformLinkRow {
    cluster_id: Uuid,
    slug: String,
    name: String,
}

#[derive(FromRow)]
struct SignalRow {
    cluster_id: Uuid,
    id: Uuid,
    title: String,
    canonical_url: String,
    image_url: Option<String>,
    source_name: String,
    source_domain: String,
    published_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct PlatformView {
    slug: String,
    name: String,
}

#[derive(Serialize)]
struct SignalView {
    id: Uuid,
    title: String,
    #[serde(rename = "canonicalUrl")]
    canonical_url: String,
    #[serde(rename = "imageUrl")]
    image_url: Option<String>,
    #[serde(rename = "sourceName")]
    source_name: String,
    #[serde(rename = "sourceDomain")]
    source_domain: String,
    #[serde(rename = "publishedAt")]
    published_at: Option<DateTime<Utc>>,
    #[serde(rename = "createdAt")]
    created_at: DateTime<Utc>,
}

#[derive(Serialize)]
struct ClusterView {
    id: Uuid,
    headline: String,
    #[serde(rename = "contextSummary")]
    context_summary: String,
    categories: Vec<Category>,
    platforms: Vec<PlatformView>,
    #[serde(rename = "importanceScore")]
    importance_score: i64,
    #[serde(rename = "scoreBreakdown")]
    score_breakdown: serde_json::Value,
    #[serde(rename = "signalCount")]
    signal_count: i64,
    #[serde(rename = "firstSeenAt")]
    first_seen_at: DateTime<Utc>,
    #[serde(rename = "lastSignalAt")]
    last_signal_at: DateTime<Utc>,
    signals: Vec<SignalView>,
}

#[derive(Serialize)]
struct ClustersResponse {
    clusters: Vec<ClusterView>,
    #[serde(rename = "nextCursor")]
    next_cursor: Option<String>,
    #[serde(rename = "hasMore")]
    has_more: bool,
}

pub async fn get_clusters(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ClustersQuery>,
) -> impl IntoResponse {
    let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let cutoff = Utc::now() - window_duration(params.window.as_deref().unwrap_or("7d"));

    let cursor = match params.cursor.as_deref().map(Cursor::decode) {
        Some(Ok(c)) => Some(c),
        Some(Err(_)) => {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "invalid cursor" })))
                .into_response();
        }
        None => None,
    };

    let category: Option<Category> = match params.category.as_deref().map(Category::from_wire_str) {
        Some(Some(c)) => Some(c),
        Some(None) => {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": "invalid category" })))
                .into_response();
        }
        None => None,
    };

    let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
        "SELECT id, headline, context_summary, categories, importance_score, \
         score_breakdown, first_seen_at, last_signal_at \
         FROM story_clusters WHERE status = 'ACTIVE' AND last_signal_at >= ",
    );
    qb.push_bind(cutoff);

    if let Some(category) = &category {
        qb.push(" AND ");
        qb.push_bind(*category);
        qb.push(" = ANY(categories)");
    }

    if let Some(platform) = &params.platform {
        qb.push(
            " AND EXISTS (SELECT 1 FROM cluster_platforms cp JOIN platforms p ON p.id = cp.platform_id \
             WHERE cp.cluster_id = story_clusters.id AND p.slug = ",
        );
        qb.push_bind(platform.clone());
        qb.push(")");
    }

    if let Some(c) = &cursor {
        qb.push(" AND (importance_score < ");
        qb.push_bind(c.importance_score);
        qb.push(" OR (importance_score = ");
        qb.push_bind(c.importance_score);
        qb.push(" AND last_signal_at < ");
        qb.push_bind(c.last_signal_at);
        qb.push(") OR (importance_score = ");
        qb.push_bind(c.importance_score);
        qb.push(" AND last_signal_at = ");
        qb.push_bind(c.last_signal_at);
        qb.push(" AND id < ");
        qb.push_bind(c.id);
        qb.push("))");
    }

    qb.push(" ORDER BY importance_score DESC, last_signal_at DESC, id DESC LIMIT ");
    qb.push_bind(limit + 1);

    let mut rows: Vec<ClusterRow> = match qb.build_query_as().fetch_all(&state.pool).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "failed to load clusters");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let has_more = rows.len() as i64 > limit;
    if has_more {
        rows.truncate(limit as usize);
    }

    let next_cursor = if has_more {
        rows.last().map(|r| {
            Cursor {
                importance_score: r.importance_score,
                last_signal_at: r.last_signal_at,
                id: r.id,
            }
            .encode()
        })
    } else {
        None
    };

    let cluster_ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();

    let (platform_links, signals, counts) = match tokio::try_join!(
        fetch_platform_links(&state.pool, &cluster_ids),
        fetch_signals(&state.pool, &cluster_ids),
        fetch_signal_counts(&state.pool, &cluster_ids),
    ) {
        Ok(v) => v,
        Err(e) => {
            warn!(error = %e, "failed to load cluster detail rows");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let clusters: Vec<ClusterView> = rows
        .into_iter()
        .map(|row| {
            let platforms = platform_links
                .iter()
                .filter(|p| p.cluster_id == row.id)
                .map(|p| PlatformView { slug: p.slug.clone(), name: p.name.clone() })
                .collect();
            let mut cluster_signals: Vec<&SignalRow> =
                signals.iter().filter(|s| s.cluster_id == row.id).collect();
            cluster_signals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            cluster_signals.truncate(10);
            let signal_views = cluster_signals
                .into_iter()
                .map(|s| SignalView {
                    id: s.id,
                    title: s.title.clone(),
                    canonical_url: s.canonical_url.clone(),
                    image_url: s.image_url.clone(),
                    source_name: s.source_name.clone(),
                    source_domain: s.source_domain.clone(),
                    published_at: s.published_at,
                    created_at: s.created_at,
                })
                .collect();
            let signal_count = counts.iter().find(|(id, _)| *id == row.id).map(|(_, c)| *c).unwrap_or(0);

            ClusterView {
                id: row.id,
                headline: row.headline,
                context_summary: row.context_summary,
                categories: row.categories,
                platforms,
                importance_score: row.importance_score,
                score_breakdown: row.score_breakdown,
                signal_count,
                first_seen_at: row.first_seen_at,
                last_signal_at: row.last_signal_at,
                signals: signal_views,
            }
        })
        .collect();

    Json(ClustersResponse { clusters, next_cursor, has_more }).into_response()
}

async fn fetch_platform_links(pool: &PgPool, cluster_ids: &[Uuid]) -> Result<Vec<PlatformLinkRow>, sqlx::Error> {
    if cluster_ids.is_empty() {
        return Ok(Vec::new());
    }
    sqlx::query_as(
        "SELECT cp.cluster_id, p.slug, p.name FROM cluster_platforms cp \
         JOIN platforms p ON p.id = cp.platform_id WHERE cp.cluster_id = ANY($1)",
    )
    .bind(cluster_ids)
    .fetch_all(pool)
    .await
}

/// Pulls every attached signal per cluster in one query; trimming to the
/// newest 10 happens in application code once grouped by cluster.
async fn fetch_signals(pool: &PgPool, cluster_ids: &[Uuid]) -> Result<Vec<SignalRow>, sqlx::Error> {
    if cluster_ids.is_empty() {
        return Ok(Vec::new());
    }
    sqlx::query_as(
        r#"
        SELECT s.cluster_id, s.id, s.title, s.canonical_url, s.image_url,
               rs.source_name, rs.source_domain, s.published_at, s.created_at
        FROM signals s
        JOIN raw_signals rs ON rs.id = s.raw_signal_id
        WHERE s.cluster_id = ANY($1)
        "#,
    )
    .bind(cluster_ids)
    .fetch_all(pool)
    .await
}

async fn fetch_signal_counts(pool: &PgPool, cluster_ids: &[Uuid]) -> Result<Vec<(Uuid, i64)>, sqlx::Error> {
    if cluster_ids.is_empty() {
        return Ok(Vec::new());
    }
    sqlx::query_as(
        "SELECT cluster_id, COUNT(*) FROM signals WHERE cluster_id = ANY($1) GROUP BY cluster_id",
    )
    .bind(cluster_ids)
    .fetch_all(pool)
    .await
}
