mod config;
mod context;
mod services;
mod stages;
mod state;

pub use config::{GenerationConfig, GenerationTuning};
#[allow(clippy::module_name_repetitions)]
pub use services::{
    bounded, ComposedMedia, CompositionRequest, DefaultPipelineServices, PipelineServices,
    ProductCutout, RenderRequest, ScoreRequest, ShotPlanRequest,
};

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use async_openai::{config::OpenAIConfig, Client};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::StorageManager,
        types::{
            video_candidate::VideoCandidate,
            video_job::{VideoJob, CANCELLED_MESSAGE},
        },
    },
    utils::config::AppConfig,
};
use tracing::{debug, info, warn};

use self::{
    context::PipelineContext,
    stages::{exhausted_message, fall_back, generate, preprocess, retry, rewrite, select, Selection},
    state::ready,
};

#[allow(clippy::module_name_repetitions)]
pub struct GenerationPipeline {
    db: Arc<SurrealDbClient>,
    storage: StorageManager,
    pipeline_config: GenerationConfig,
    services: Arc<dyn PipelineServices>,
}

impl GenerationPipeline {
    pub fn new(
        db: Arc<SurrealDbClient>,
        openai_client: Arc<Client<OpenAIConfig>>,
        config: &AppConfig,
        storage: StorageManager,
    ) -> Result<Self, AppError> {
        Self::new_with_config(
            db,
            openai_client,
            config,
            storage,
            GenerationConfig::default(),
        )
    }

    pub fn new_with_config(
        db: Arc<SurrealDbClient>,
        openai_client: Arc<Client<OpenAIConfig>>,
        config: &AppConfig,
        storage: StorageManager,
        pipeline_config: GenerationConfig,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        let services = DefaultPipelineServices::new(openai_client, http, config);

        Self::with_services(db, storage, pipeline_config, Arc::new(services))
    }

    pub fn with_services(
        db: Arc<SurrealDbClient>,
        storage: StorageManager,
        pipeline_config: GenerationConfig,
        services: Arc<dyn PipelineServices>,
    ) -> Result<Self, AppError> {
        Ok(Self {
            db,
            storage,
            pipeline_config,
            services,
        })
    }

    /// Runs a claimed job to a terminal state. The job is failed with a readable message on any error.
    #[tracing::instrument(
        skip_all,
        fields(
            job_id = %job.id,
            tenant_id = %job.tenant_id,
            niche = %job.niche,
            worker_id = job.worker_id.as_deref().unwrap_or("unknown-worker")
        )
    )]
    pub async fn process_job(&self, mut job: VideoJob) -> Result<(), AppError> {
        match self.drive_pipeline(&mut job).await {
            Ok(()) => {
                info!(
                    job_id = %job.id,
                    fallback_used = job.fallback_used,
                    retry_count = job.retry_count,
                    "video job completed"
                );
                Ok(())
            }
            Err(err) => {
                let message = failure_message(&err);
                debug!(job_id = %job.id, error = %err, "generation pipeline failed");

                VideoCandidate::close_open_for_job(&job.id, &message, &self.db).await?;
                if !job.stage.is_terminal() {
                    job.mark_failed(message.clone(), &self.db).await?;
                }
                warn!(job_id = %job.id, error = %message, "video job failed");

                Err(err)
            }
        }
    }

    fn duration_millis(duration: Duration) -> u64 {
        u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
    }

    async fn drive_pipeline(&self, job: &mut VideoJob) -> Result<(), AppError> {
        let mut ctx = PipelineContext::new(
            job,
            self.db.as_ref(),
            &self.storage,
            &self.pipeline_config,
            self.services.as_ref(),
        );

        let pipeline_started = Instant::now();
        let machine = ready();

        ctx.ensure_not_cancelled().await.map_err(|err| ctx.abort(err))?;
        let stage_start = Instant::now();
        let machine = preprocess(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let preprocess_duration = stage_start.elapsed();

        ctx.ensure_not_cancelled().await.map_err(|err| ctx.abort(err))?;
        let stage_start = Instant::now();
        let mut machine = rewrite(machine, &mut ctx)
            .await
            .map_err(|err| ctx.abort(err))?;
        let mut rewrite_duration = stage_start.elapsed();

        let mut generate_duration = Duration::ZERO;
        let mut select_duration = Duration::ZERO;
        let mut fallback_duration = Duration::ZERO;

        loop {
            ctx.ensure_not_cancelled().await.map_err(|err| ctx.abort(err))?;
            let stage_start = Instant::now();
            let generated = generate(machine, &mut ctx)
                .await
                .map_err(|err| ctx.abort(err))?;
            generate_duration += stage_start.elapsed();

            ctx.ensure_not_cancelled().await.map_err(|err| ctx.abort(err))?;
            let stage_start = Instant::now();
            let selection = select(generated, &mut ctx)
                .await
                .map_err(|err| ctx.abort(err))?;
            select_duration += stage_start.elapsed();

            let rejected = match selection {
                Selection::Accepted(_machine) => break,
                Selection::Rejected(rejected) => rejected,
            };

            ctx.ensure_not_cancelled().await.map_err(|err| ctx.abort(err))?;
            if ctx.can_retry() {
                let stage_start = Instant::now();
                machine = retry(rejected, &mut ctx)
                    .await
                    .map_err(|err| ctx.abort(err))?;
                rewrite_duration += stage_start.elapsed();
                continue;
            }

            if !ctx.job.enable_fallback {
                let message = exhausted_message(&ctx);
                return Err(ctx.abort(AppError::Processing(message)));
            }

            let stage_start = Instant::now();
            let _machine = fall_back(rejected, &mut ctx)
                .await
                .map_err(|err| ctx.abort(err))?;
            fallback_duration = stage_start.elapsed();
            break;
        }

        ctx.job
            .mark_completed(ctx.db)
            .await
            .map_err(|err| ctx.abort(err))?;

        info!(
            job_id = %ctx.job_id,
            retry_count = ctx.job.retry_count,
            fallback_used = ctx.job.fallback_used,
            total_ms = Self::duration_millis(pipeline_started.elapsed()),
            preprocess_ms = Self::duration_millis(preprocess_duration),
            rewrite_ms = Self::duration_millis(rewrite_duration),
            generate_ms = Self::duration_millis(generate_duration),
            select_ms = Self::duration_millis(select_duration),
            fallback_ms = Self::duration_millis(fallback_duration),
            "generation pipeline finished"
        );

        Ok(())
    }
}

fn failure_message(err: &AppError) -> String {
    match err {
        AppError::Cancelled(_) => CANCELLED_MESSAGE.to_string(),
        AppError::FallbackNotViable(message) | AppError::Processing(message) => message.clone(),
        other => other.to_string(),
    }
}
