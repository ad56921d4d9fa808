use std::time::Duration;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            shot_plan::PromptVariant,
            video_candidate::{CandidateStatus, VideoCandidate},
        },
    },
};
use futures::{stream::FuturesUnordered, StreamExt};
use tracing::{debug, instrument, warn};

use crate::pipeline::{bounded, PipelineServices, RenderRequest};

/// Parameters shared by every candidate of one generation round.
#[derive(Debug, Clone)]
pub struct RoundSpec<'a> {
    pub job_id: &'a str,
    pub round: u32,
    pub count: u32,
    pub prompt: &'a str,
    pub duration_seconds: u32,
    pub reference_image_url: Option<&'a str>,
    pub variant: PromptVariant,
}

#[derive(Debug, Default)]
pub struct RoundOutcome {
    /// Completed candidates in the order their renders finished.
    pub completed: Vec<VideoCandidate>,
    pub failed: Vec<VideoCandidate>,
}

/// Creates the round's candidates, then renders them concurrently.
///
/// Returns once every candidate is `completed` or `failed`. Provider failures stay on the
/// candidate; only persistence failures are returned as errors.
#[instrument(level = "trace", skip_all, fields(job_id = %spec.job_id, round = spec.round, count = spec.count))]
pub async fn generate_round(
    spec: &RoundSpec<'_>,
    services: &dyn PipelineServices,
    db: &SurrealDbClient,
    timeout: Duration,
) -> Result<RoundOutcome, AppError> {
    let candidates =
        VideoCandidate::create_round(spec.job_id, spec.count, spec.round, spec.variant, db).await?;

    let mut in_flight: FuturesUnordered<_> = candidates
        .into_iter()
        .map(|candidate| render_candidate(candidate, spec, services, db, timeout))
        .collect();

    let mut outcome = RoundOutcome::default();
    while let Some(result) = in_flight.next().await {
        let candidate = result?;
        match candidate.status {
            CandidateStatus::Completed => outcome.completed.push(candidate),
            _ => outcome.failed.push(candidate),
        }
    }

    debug!(
        job_id = %spec.job_id,
        round = spec.round,
        completed = outcome.completed.len(),
        failed = outcome.failed.len(),
        "generation round settled"
    );

    Ok(outcome)
}

async fn render_candidate(
    mut candidate: VideoCandidate,
    spec: &RoundSpec<'_>,
    services: &dyn PipelineServices,
    db: &SurrealDbClient,
    timeout: Duration,
) -> Result<VideoCandidate, AppError> {
    candidate.mark_running(db).await?;

    let request = RenderRequest {
        job_id: spec.job_id.to_string(),
        candidate_index: candidate.candidate_index,
        round: spec.round,
        prompt: spec.prompt.to_string(),
        duration_seconds: spec.duration_seconds,
        reference_image_url: spec.reference_image_url.map(str::to_string),
    };

    match bounded("render provider", timeout, services.render_clip(&request)).await {
        Ok(clip) => candidate.mark_completed(clip, db).await?,
        Err(err) => {
            warn!(
                job_id = %spec.job_id,
                candidate_id = %candidate.id,
                candidate_index = candidate.candidate_index,
                error = %err,
                "candidate render failed"
            );
            candidate.mark_failed(err.to_string(), db).await?;
        }
    }

    Ok(candidate)
}
