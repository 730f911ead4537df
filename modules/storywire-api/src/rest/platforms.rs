use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use sqlx::FromRow;
use tracing::warn;
use uuid::Uuid;

use crate::AppState;

#[derive(FromRow)]
struct PlatformCountRow {
    id: Uuid,
    slug: String,
    name: String,
    description: Option<String>,
    website: Option<String>,
    active_cluster_count: i64,
}

#[derive(Serialize)]
struct PlatformView {
    id: Uuid,
    slug: String,
    name: String,
    description: Option<String>,
    website: Option<String>,
    #[serde(rename = "activeClusterCount")]
    active_cluster_count: i64,
}

pub async fn get_platforms(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let rows: Result<Vec<PlatformCountRow>, sqlx::Error> = sqlx::query_as(
        r#"
        SELECT p.id, p.slug, p.name, p.description, p.website,
               COUNT(cp.cluster_id) FILTER (WHERE sc.status = 'ACTIVE') AS active_cluster_count
        FROM platforms p
        LEFT JOIN cluster_platforms cp ON cp.platform_id = p.id
        LEFT JOIN story_clusters sc ON sc.id = cp.cluster_id
        GROUP BY p.id, p.slug, p.name, p.description, p.website
        ORDER BY p.name
        "#,
    )
    .fetch_all(&state.pool)
    .await;

    match rows {
        Ok(rows) => {
            let platforms: Vec<PlatformView> = rows
                .into_iter()
                .map(|r| PlatformView {
                    id: r.id,
                    slug: r.slug,
                    name: r.name,
                    description: r.description,
                    website: r.website,
                    active_cluster_count: r.active_cluster_count,
                })
                .collect();
            Json(serde_json::json!({ "platforms": platforms })).into_response()
        }
        Err(e) => {
            warn!(error = %e, "failed to load platforms");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}
