use std::time::Duration;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            category_profile::{CategoryProfile, QaWeights},
            video_candidate::{AxisScores, VideoCandidate},
        },
    },
};
use futures::{stream, StreamExt, TryStreamExt};
use tracing::{debug, instrument, warn};

use crate::pipeline::{bounded, PipelineServices, ScoreRequest};

/// Weighted sum of the four axes. Weights are used as given, without normalisation.
pub fn final_score(scores: &AxisScores, weights: &QaWeights) -> f64 {
    scores.similarity * weights.fidelity
        + scores.label * weights.label
        + scores.quality * weights.quality
        + scores.temporal * weights.temporal
}

pub fn passes(final_score: f64, threshold: f64) -> bool {
    final_score >= threshold
}

#[derive(Debug, Clone, Copy)]
pub struct ScoringSpec<'a> {
    pub profile: &'a CategoryProfile,
    pub reference_image_url: Option<&'a str>,
    pub duration_seconds: u32,
    pub concurrency: usize,
}

/// Scores completed candidates concurrently and persists every per-axis breakdown.
///
/// A candidate whose scoring call fails is left without scores and counts as not passing.
#[instrument(level = "trace", skip_all, fields(niche = %spec.profile.niche, candidates = candidates.len()))]
pub async fn score_candidates(
    candidates: Vec<VideoCandidate>,
    spec: ScoringSpec<'_>,
    services: &dyn PipelineServices,
    db: &SurrealDbClient,
    timeout: Duration,
) -> Result<Vec<VideoCandidate>, AppError> {
    stream::iter(candidates)
        .map(|candidate| score_one(candidate, spec, services, db, timeout))
        .buffer_unordered(spec.concurrency.max(1))
        .try_collect()
        .await
}

async fn score_one(
    mut candidate: VideoCandidate,
    spec: ScoringSpec<'_>,
    services: &dyn PipelineServices,
    db: &SurrealDbClient,
    timeout: Duration,
) -> Result<VideoCandidate, AppError> {
    let Some(clip_url) = candidate.output_url.clone() else {
        candidate
            .record_scoring_error("candidate has no output to score", db)
            .await?;
        return Ok(candidate);
    };

    let request = ScoreRequest {
        clip_url,
        reference_image_url: spec.reference_image_url.map(str::to_string),
        niche: spec.profile.niche.clone(),
        duration_seconds: spec.duration_seconds,
    };

    match bounded("vision provider", timeout, services.score_clip(&request)).await {
        Ok(raw) => {
            let scores = raw.clamped();
            let total = final_score(&scores, &spec.profile.weights);
            let qa_passed = passes(total, spec.profile.threshold);
            candidate.record_scores(scores, total, qa_passed, db).await?;
            debug!(
                candidate_id = %candidate.id,
                candidate_index = candidate.candidate_index,
                final_score = total,
                qa_passed,
                "candidate scored"
            );
        }
        Err(err) => {
            warn!(
                candidate_id = %candidate.id,
                candidate_index = candidate.candidate_index,
                error = %err,
                "candidate scoring failed; treating as not passing"
            );
            candidate
                .record_scoring_error(format!("scoring failed: {err}"), db)
                .await?;
        }
    }

    Ok(candidate)
}
