use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{info, warn};
use uuid::Uuid;

use storywire_common::IngestRunStatus;

use crate::auth::ingest_authorized;
use crate::AppState;

#[derive(Deserialize)]
pub struct IngestAuthQuery {
    secret: Option<String>,
}

#[derive(FromRow, Serialize)]
struct IngestRunView {
    id: Uuid,
    status: IngestRunStatus,
    #[serde(rename = "startedAt")]
    started_at: DateTime<Utc>,
    #[serde(rename = "finishedAt")]
    finished_at: Option<DateTime<Utc>>,
    #[serde(rename = "signalsFetched")]
    signals_fetched: i32,
    #[serde(rename = "signalsAccepted")]
    signals_accepted: i32,
    #[serde(rename = "signalsRejected")]
    signals_rejected: i32,
    errors: serde_json::Value,
}

pub async fn get_ingest_runs(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let runs: Result<Vec<IngestRunView>, sqlx::Error> = sqlx::query_as(
        r#"
        SELECT id, status, started_at, finished_at, signals_fetched,
               signals_accepted, signals_rejected, errors
        FROM ingest_runs
        ORDER BY started_at DESC
        LIMIT 10
        "#,
    )
    .fetch_all(&state.pool)
    .await;

    match runs {
        Ok(runs) => Json(serde_json::json!({ "runs": runs })).into_response(),
        Err(e) => {
            warn!(error = %e, "failed to load ingest runs");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn post_ingest(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<IngestAuthQuery>,
) -> impl IntoResponse {
    if !ingest_authorized(&state.config, &headers, query.secret.as_deref()) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    info!("ingest cycle triggered via API");
    let report = state.runner.run_cycle(&state.sources).await;

    Json(serde_json::json!({
        "runId": report.run_id,
        "status": report.status,
        "mode": "direct",
        "signalsFetched": report.signals_fetched,
        "signalsAccepted": report.signals_accepted,
        "signalsRejected": report.signals_rejected,
        "errorCount": report.error_count,
        "durationMs": report.duration_ms,
    }))
    .into_response()
}
