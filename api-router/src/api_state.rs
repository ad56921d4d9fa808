use std::sync::Arc;

use common::{
    storage::db::SurrealDbClient,
    utils::{config::AppConfig, job_signal::JobSignal},
};
use generation_pipeline::JobSubmitter;

#[derive(Clone)]
pub struct ApiState {
    pub db: Arc<SurrealDbClient>,
    pub config: AppConfig,
    pub submitter: JobSubmitter,
}

impl ApiState {
    pub async fn new(
        config: &AppConfig,
        signal: JobSignal,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let surreal_db_client = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );

        surreal_db_client.ensure_initialized().await?;

        Ok(Self::with_db(surreal_db_client, config, signal))
    }

    /// Builds state over an existing connection, sharing `signal` with an in-process worker.
    pub fn with_db(db: Arc<SurrealDbClient>, config: &AppConfig, signal: JobSignal) -> Self {
        Self {
            submitter: JobSubmitter::new(Arc::clone(&db), signal),
            db,
            config: config.clone(),
        }
    }
}
