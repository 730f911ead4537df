#![cfg(feature = "test-utils")]

// Verifies the `signals` CHECK constraint (`ingest_status = 'ACCEPTED'` iff
// `cluster_id` is non-null) against a real Postgres instance, and that
// `Clusterer::assign` is the only path that flips a signal to ACCEPTED.
//
// Requires Docker. Run with:
// cargo test -p storywire-pipeline --features test-utils --test cluster_accept_atomicity_test

use chrono::Utc;
use sqlx::PgPool;
use storywire_common::{Category, IngestStatus};
use storywire_pipeline::clusterer::{ClusterInput, Clusterer};
use uuid::Uuid;

async fn setup() -> (impl std::any::Any, PgPool) {
    storywire_pipeline::testutil::postgres_container().await
}

async fn insert_pending_signal(pool: &PgPool) -> Uuid {
    let raw_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO raw_signals
            (id, source_type, source_name, source_url, source_domain,
             fetched_at, content_type, raw_payload, content_hash)
        VALUES ($1, 'MEDIA', 'Test Source', 'https://example.com/a', 'example.com',
                $2, 'text/html', '{}'::jsonb, $3)
        "#,
    )
    .bind(raw_id)
    .bind(Utc::now())
    .bind(format!("hash-{raw_id}"))
    .execute(pool)
    .await
    .expect("insert raw_signal");

    let signal_id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO signals (id, raw_signal_id, canonical_url, title)
        VALUES ($1, $2, 'https://example.com/a', 'Replika launches new feature')
        "#,
    )
    .bind(signal_id)
    .bind(raw_id)
    .execute(pool)
    .await
    .expect("insert signal");

    signal_id
}

fn cluster_input(signal_id: Uuid) -> ClusterInput {
    ClusterInput {
        signal_id,
        headline: "Replika launches new feature".to_string(),
        summary: "Replika announced a new companion feature today.".to_string(),
        categories: vec![Category::ProductUpdate],
        known_platforms: vec![],
        published_at: None,
        created_at: Utc::now(),
        raw_text_for_keywords: "Replika announced a new companion feature today.".to_string(),
    }
}

#[tokio::test]
async fn assign_sets_cluster_id_and_accepted_status_together() {
    let (_container, pool) = setup().await;
    let signal_id = insert_pending_signal(&pool).await;

    let clusterer = Clusterer::new(pool.clone(), 0.4, 0.2, 7);
    let cluster_id = clusterer
        .assign(cluster_input(signal_id))
        .await
        .expect("assign should succeed");

    let (status, stored_cluster_id): (IngestStatus, Option<Uuid>) =
        sqlx::query_as("SELECT ingest_status, cluster_id FROM signals WHERE id = $1")
            .bind(signal_id)
            .fetch_one(&pool)
            .await
            .expect("fetch signal row");

    assert_eq!(status, IngestStatus::Accepted);
    assert_eq!(stored_cluster_id, Some(cluster_id));
}

#[tokio::test]
async fn check_constraint_rejects_accepted_status_without_cluster_id() {
    let (_container, pool) = setup().await;
    let signal_id = insert_pending_signal(&pool).await;

    // The bug this guards against: flipping ingest_status to ACCEPTED in a
    // statement that doesn't also set cluster_id. The schema must reject it.
    let result = sqlx::query("UPDATE signals SET ingest_status = 'ACCEPTED' WHERE id = $1")
        .bind(signal_id)
        .execute(&pool)
        .await;

    let err = result.expect_err("update should violate the CHECK constraint");
    let db_err = err.as_database_error().expect("expected a database error");
    assert_eq!(db_err.code().as_deref(), Some("23514"));
}
