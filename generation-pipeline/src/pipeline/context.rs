use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::StorageManager,
        types::{
            category_profile::CategoryProfile,
            video_job::{VideoJob, CANCELLED_MESSAGE},
        },
    },
};
use tracing::error;

use super::{config::GenerationConfig, services::PipelineServices};
use crate::generator::RoundOutcome;

pub struct PipelineContext<'a> {
    pub job: &'a mut VideoJob,
    pub job_id: String,
    pub db: &'a SurrealDbClient,
    pub storage: &'a StorageManager,
    pub pipeline_config: &'a GenerationConfig,
    pub services: &'a dyn PipelineServices,
    pub profile: Option<CategoryProfile>,
    pub reference_image_url: Option<String>,
    pub round_outcome: Option<RoundOutcome>,
}

impl<'a> PipelineContext<'a> {
    pub fn new(
        job: &'a mut VideoJob,
        db: &'a SurrealDbClient,
        storage: &'a StorageManager,
        pipeline_config: &'a GenerationConfig,
        services: &'a dyn PipelineServices,
    ) -> Self {
        let job_id = job.id.clone();
        Self {
            job,
            job_id,
            db,
            storage,
            pipeline_config,
            services,
            profile: None,
            reference_image_url: None,
            round_outcome: None,
        }
    }

    pub fn profile(&self) -> Result<&CategoryProfile, AppError> {
        self.profile
            .as_ref()
            .ok_or_else(|| AppError::InternalError("category profile expected to be resolved".into()))
    }

    pub fn take_round_outcome(&mut self) -> Result<RoundOutcome, AppError> {
        self.round_outcome.take().ok_or_else(|| {
            AppError::InternalError("generation round expected to be available for selection".into())
        })
    }

    pub fn can_retry(&self) -> bool {
        self.job.retry_count < self.pipeline_config.tuning.max_retries
    }

    /// Stage-boundary cancellation check against the persisted flag.
    pub async fn ensure_not_cancelled(&mut self) -> Result<(), AppError> {
        if self.job.cancel_requested || VideoJob::is_cancel_requested(&self.job_id, self.db).await? {
            self.job.cancel_requested = true;
            return Err(AppError::Cancelled(CANCELLED_MESSAGE.into()));
        }
        Ok(())
    }

    pub fn abort(&mut self, err: AppError) -> AppError {
        error!(
            job_id = %self.job_id,
            stage = self.job.stage.as_str(),
            error = %err,
            "generation pipeline aborted"
        );
        err
    }
}
