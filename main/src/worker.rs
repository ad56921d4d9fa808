use std::sync::Arc;

use common::{
    storage::{db::SurrealDbClient, store::StorageManager},
    utils::{config::get_config, job_signal::JobSignal},
};
use generation_pipeline::{run_worker_loop, GenerationPipeline, WorkerSettings};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set up tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );
    db.ensure_initialized().await?;

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let storage = StorageManager::new(&config).await?;

    let generation_pipeline = Arc::new(GenerationPipeline::new(
        db.clone(),
        openai_client,
        &config,
        storage,
    )?);

    // Standalone workers are woken by the idle poll only.
    run_worker_loop(
        db,
        generation_pipeline,
        JobSignal::new(),
        WorkerSettings::from_config(&config),
    )
    .await?;

    Ok(())
}
