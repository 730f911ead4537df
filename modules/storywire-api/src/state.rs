use sqlx::PgPool;
use storywire_common::Config;
use storywire_pipeline::{PipelineRunner, SourceDefinition};

pub struct AppState {
    pub pool: PgPool,
    pub config: Config,
    pub runner: PipelineRunner,
    pub sources: Vec<SourceDefinition>,
}
