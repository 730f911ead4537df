use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use storywire_common::Config;
use storywire_pipeline::{PipelineRunner, SourceDefinition};
use tracing::info;
use tracing_subscriber::EnvFilter;

use storywire_api::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("storywire=info".parse()?))
        .init();

    let config = Config::from_env();
    config.log_redacted();

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;

    let known_platform_slugs: Vec<String> = sqlx::query_scalar("SELECT slug FROM platforms")
        .fetch_all(&pool)
        .await
        .unwrap_or_default();

    let sources: Vec<SourceDefinition> = config
        .feed_sources
        .iter()
        .map(|(name, url)| SourceDefinition {
            source_type: storywire_common::SourceType::Media,
            name: name.clone(),
            url: url.clone(),
        })
        .collect();
    info!(source_count = sources.len(), "configured feed sources");

    let runner = PipelineRunner::new(pool.clone(), &config, known_platform_slugs);

    let host = config.web_host.clone();
    let port = config.web_port;

    let state = Arc::new(AppState { pool, config, runner, sources });
    let app = build_router(state);

    let addr = format!("{host}:{port}");
    info!("storywire API starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received, draining in-flight requests");
}
