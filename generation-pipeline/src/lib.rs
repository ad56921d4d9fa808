#![allow(clippy::missing_docs_in_private_items, clippy::result_large_err)]

pub mod compositor;
pub mod generator;
pub mod pipeline;
pub mod preprocessor;
pub mod providers;
pub mod publisher;
pub mod rewriter;
pub mod scorer;
pub mod selector;
pub mod submit;
pub mod utils;

use chrono::Utc;
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{video_candidate::VideoCandidate, video_job::VideoJob},
    },
    utils::{config::AppConfig, job_signal::JobSignal},
};
pub use pipeline::{GenerationConfig, GenerationPipeline, GenerationTuning};
use std::sync::Arc;
pub use submit::{CancelOutcome, JobSnapshot, JobSubmitter, SubmittedJob};
use tokio::{
    sync::Semaphore,
    time::{sleep, Duration, Instant},
};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub concurrency: usize,
    pub stale_after: Duration,
    pub recovery_interval: Duration,
    pub idle_backoff: Duration,
}

impl WorkerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let stale_after = Duration::from_secs(config.stale_job_secs);
        Self {
            concurrency: config.worker_concurrency.max(1),
            stale_after,
            recovery_interval: (stale_after / 4)
                .clamp(Duration::from_secs(1), Duration::from_secs(60)),
            idle_backoff: Duration::from_millis(500),
        }
    }
}

/// Requeues jobs abandoned by a dead worker and closes their open candidates.
pub async fn recover_stale_jobs(
    db: &SurrealDbClient,
    stale_after: Duration,
) -> Result<usize, AppError> {
    let stale_after = chrono::Duration::from_std(stale_after)
        .map_err(|e| AppError::InternalError(format!("invalid stale job window: {e}")))?;
    let cutoff = Utc::now() - stale_after;

    let requeued = VideoJob::requeue_stale(cutoff, db).await?;
    for job in &requeued {
        VideoCandidate::close_open_for_job(&job.id, "worker interrupted; job requeued", db).await?;
        warn!(job_id = %job.id, "requeued stale video job");
    }

    Ok(requeued.len())
}

pub async fn run_worker_loop(
    db: Arc<SurrealDbClient>,
    generation_pipeline: Arc<GenerationPipeline>,
    signal: JobSignal,
    settings: WorkerSettings,
) -> Result<(), AppError> {
    let worker_id = format!("generation-worker-{}", Uuid::new_v4());

    let recovered = recover_stale_jobs(&db, settings.stale_after).await?;
    info!(%worker_id, recovered, concurrency = settings.concurrency, "generation worker started");

    let slots = Arc::new(Semaphore::new(settings.concurrency.max(1)));
    let mut next_recovery = Instant::now() + settings.recovery_interval;

    loop {
        // Jobs orphaned by a dead worker stay running until swept.
        if Instant::now() >= next_recovery {
            match recover_stale_jobs(&db, settings.stale_after).await {
                Ok(0) => {}
                Ok(recovered) => info!(%worker_id, recovered, "recovered stale video jobs"),
                Err(err) => error!(%worker_id, error = %err, "stale job recovery failed"),
            }
            next_recovery = Instant::now() + settings.recovery_interval;
        }

        let permit = Arc::clone(&slots)
            .acquire_owned()
            .await
            .map_err(|e| AppError::InternalError(format!("worker slots closed: {e}")))?;

        match VideoJob::claim_next_pending(&db, &worker_id, Utc::now()).await {
            Ok(Some(job)) => {
                let job_id = job.id.clone();
                info!(%worker_id, %job_id, "claimed video job");

                let pipeline = Arc::clone(&generation_pipeline);
                let worker_id = worker_id.clone();
                tokio::spawn(async move {
                    let _permit = permit;
                    if let Err(err) = pipeline.process_job(job).await {
                        error!(%worker_id, %job_id, error = %err, "video job failed");
                    }
                });
            }
            Ok(None) => {
                drop(permit);
                tokio::select! {
                    () = signal.notified() => {}
                    () = sleep(settings.idle_backoff) => {}
                }
            }
            Err(err) => {
                drop(permit);
                error!(%worker_id, error = %err, "failed to claim video job");
                warn!("Backing off for 1s after claim error");
                sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recovery_interval_follows_stale_window() {
        let config = AppConfig {
            stale_job_secs: 900,
            ..Default::default()
        };
        assert_eq!(
            WorkerSettings::from_config(&config).recovery_interval,
            Duration::from_secs(60)
        );

        let config = AppConfig {
            stale_job_secs: 2,
            ..Default::default()
        };
        assert_eq!(
            WorkerSettings::from_config(&config).recovery_interval,
            Duration::from_secs(1)
        );
    }
}
