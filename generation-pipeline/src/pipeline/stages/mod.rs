use common::{
    error::AppError,
    storage::types::{
        category_profile::CategoryProfile,
        shot_plan::PromptVariant,
        video_candidate::{CandidateStatus, VideoCandidate},
        video_job::JobStage,
    },
};
use state_machines::core::GuardError;
use tracing::{debug, info, instrument, warn};

use super::{
    context::PipelineContext,
    services::ShotPlanRequest,
    state::{Accepted, Composited, GenerationMachine, Generated, Preprocessed, Ready, Rejected, Rewritten},
};
use crate::{
    compositor::{self, FrameSpec},
    generator::{generate_round, RoundSpec},
    preprocessor,
    publisher::{self, PublishedOutput},
    rewriter,
    scorer::{score_candidates, ScoringSpec},
    selector,
};

/// Outcome of QA selection for one round.
pub enum Selection {
    Accepted(GenerationMachine<(), Accepted>),
    Rejected(GenerationMachine<(), Rejected>),
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id))]
pub async fn preprocess(
    machine: GenerationMachine<(), Ready>,
    ctx: &mut PipelineContext<'_>,
) -> Result<GenerationMachine<(), Preprocessed>, AppError> {
    ctx.job
        .advance(JobStage::Preprocess, "resolving category profile and product assets", ctx.db)
        .await?;

    let (profile, source) = CategoryProfile::resolve(ctx.db, &ctx.job.niche).await?;
    info!(
        job_id = %ctx.job_id,
        niche = %profile.niche,
        profile_source = ?source,
        threshold = profile.threshold,
        "category profile resolved"
    );
    ctx.job.qa_threshold = Some(profile.threshold);
    ctx.job.profile = Some(profile.clone());
    ctx.profile = Some(profile);

    let reference = preprocessor::resolve_reference_image(ctx.job, ctx.db).await?;
    match reference.as_deref() {
        Some(image_ref) => {
            let timeout = ctx.pipeline_config.tuning.cutout_timeout;
            match preprocessor::prepare(image_ref, ctx.services, ctx.storage, timeout).await {
                Ok(assets) => {
                    ctx.job.record("product cutout prepared");
                    ctx.job.product_assets = Some(assets);
                }
                Err(err) if err.is_provider_failure() => {
                    warn!(
                        job_id = %ctx.job_id,
                        error = %err,
                        "product cutout unavailable; continuing without fidelity reference"
                    );
                    ctx.job.record(format!("product cutout unavailable: {err}"));
                }
                Err(err) => return Err(err),
            }
        }
        None => {
            debug!(job_id = %ctx.job_id, "no product image supplied");
            ctx.job.record("no product image supplied");
        }
    }
    ctx.reference_image_url = reference;
    ctx.job.save_progress(ctx.db).await?;

    machine
        .preprocess()
        .map_err(|(_, guard)| map_guard_error("preprocess", &guard))
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id))]
pub async fn rewrite(
    machine: GenerationMachine<(), Preprocessed>,
    ctx: &mut PipelineContext<'_>,
) -> Result<GenerationMachine<(), Rewritten>, AppError> {
    ctx.job
        .advance(JobStage::Rewrite, "expanding brief into shot plan", ctx.db)
        .await?;

    apply_rewrite(ctx, PromptVariant::Standard).await?;

    machine
        .rewrite()
        .map_err(|(_, guard)| map_guard_error("rewrite", &guard))
}

/// Re-plans with the hard-fidelity variant after a round where nothing passed.
#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id))]
pub async fn retry(
    machine: GenerationMachine<(), Rejected>,
    ctx: &mut PipelineContext<'_>,
) -> Result<GenerationMachine<(), Rewritten>, AppError> {
    ctx.job.retry_count = ctx.job.retry_count.saturating_add(1);
    ctx.job
        .advance(
            JobStage::Retry,
            "no candidate passed; retrying with hard-fidelity plan",
            ctx.db,
        )
        .await?;

    apply_rewrite(ctx, PromptVariant::HardFidelity).await?;

    machine
        .rewrite()
        .map_err(|(_, guard)| map_guard_error("retry", &guard))
}

async fn apply_rewrite(ctx: &mut PipelineContext<'_>, variant: PromptVariant) -> Result<(), AppError> {
    let profile = ctx.profile()?;
    let request = ShotPlanRequest {
        brief: ctx.job.prompt.clone(),
        niche: profile.niche.clone(),
        duration_seconds: ctx.job.duration_seconds,
        variant,
        allowed_context_tokens: profile.allowed_context_tokens.clone(),
        forbidden_actions: profile.forbidden_actions.clone(),
    };

    let outcome = rewriter::rewrite(
        &request,
        ctx.services,
        ctx.pipeline_config.tuning.rewrite_timeout,
    )
    .await;

    ctx.job.record(format!(
        "shot plan ready ({:?}, {:?})",
        outcome.source, variant
    ));
    ctx.job.shot_plan = Some(outcome.plan);
    ctx.job.plan_source = Some(outcome.source);
    ctx.job.prompt_variant = Some(variant);
    ctx.job.rewritten_prompt = Some(outcome.prompt);
    ctx.job.save_progress(ctx.db).await
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id, round = ctx.job.retry_count))]
pub async fn generate(
    machine: GenerationMachine<(), Rewritten>,
    ctx: &mut PipelineContext<'_>,
) -> Result<GenerationMachine<(), Generated>, AppError> {
    let count = ctx.job.variation_count;
    ctx.job
        .advance(
            JobStage::GenerateCandidates,
            format!("rendering {count} candidates"),
            ctx.db,
        )
        .await?;

    let prompt = ctx
        .job
        .rewritten_prompt
        .clone()
        .ok_or_else(|| AppError::InternalError("rewritten prompt expected before generation".into()))?;
    let spec = RoundSpec {
        job_id: &ctx.job_id,
        round: ctx.job.retry_count,
        count,
        prompt: &prompt,
        duration_seconds: ctx.job.duration_seconds,
        reference_image_url: ctx.reference_image_url.as_deref(),
        variant: ctx.job.prompt_variant.unwrap_or_default(),
    };

    let outcome = generate_round(
        &spec,
        ctx.services,
        ctx.db,
        ctx.pipeline_config.tuning.render_timeout,
    )
    .await?;

    ctx.job.record(format!(
        "round {} settled: {} completed, {} failed",
        spec.round,
        outcome.completed.len(),
        outcome.failed.len()
    ));
    ctx.round_outcome = Some(outcome);

    machine
        .generate()
        .map_err(|(_, guard)| map_guard_error("generate", &guard))
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id, enable_qa = ctx.job.enable_qa))]
pub async fn select(
    machine: GenerationMachine<(), Generated>,
    ctx: &mut PipelineContext<'_>,
) -> Result<Selection, AppError> {
    ctx.job
        .advance(JobStage::QaSelect, "selecting best candidate", ctx.db)
        .await?;

    let outcome = ctx.take_round_outcome()?;

    let (mut pool, winner_id) = if ctx.job.enable_qa {
        let profile = ctx.profile()?;
        let spec = ScoringSpec {
            profile,
            reference_image_url: ctx.reference_image_url.as_deref(),
            duration_seconds: ctx.job.duration_seconds,
            concurrency: ctx.pipeline_config.tuning.scoring_concurrency,
        };
        let scored = score_candidates(
            outcome.completed,
            spec,
            ctx.services,
            ctx.db,
            ctx.pipeline_config.tuning.scoring_timeout,
        )
        .await?;
        let winner = selector::select_best(&scored).map(|c| c.id.clone());
        (scored, winner)
    } else {
        let winner = selector::first_completed(&outcome.completed).map(|c| c.id.clone());
        (outcome.completed, winner)
    };

    for candidate in &mut pool {
        if Some(&candidate.id) == winner_id.as_ref() {
            candidate.mark_selected(ctx.db).await?;
        } else if candidate.status == CandidateStatus::Completed {
            candidate.mark_rejected(ctx.db).await?;
        }
    }

    let Some(best) = pool.into_iter().find(|c| c.is_best) else {
        let note = match ctx.job.qa_threshold {
            Some(threshold) if ctx.job.enable_qa => {
                format!("no candidate met the quality threshold of {threshold:.2}")
            }
            _ => "no candidate completed".to_string(),
        };
        ctx.job.record(note);
        ctx.job.save_progress(ctx.db).await?;
        return machine
            .reject()
            .map(Selection::Rejected)
            .map_err(|(_, guard)| map_guard_error("reject", &guard));
    };

    info!(
        job_id = %ctx.job_id,
        candidate_id = %best.id,
        candidate_index = best.candidate_index,
        final_score = ?best.final_score,
        "candidate selected"
    );
    let output = publisher::publish(
        &ctx.job_id,
        &best,
        ctx.services,
        ctx.storage,
        ctx.pipeline_config.tuning.download_timeout,
    )
    .await?;
    accept_candidate(ctx, &best, output);
    ctx.job.save_progress(ctx.db).await?;

    machine
        .accept()
        .map(Selection::Accepted)
        .map_err(|(_, guard)| map_guard_error("accept", &guard))
}

fn accept_candidate(ctx: &mut PipelineContext<'_>, best: &VideoCandidate, output: PublishedOutput) {
    ctx.job.best_candidate_id = Some(best.id.clone());
    ctx.job.output_url = Some(output.video_url);
    ctx.job.thumbnail_url = output.thumbnail_url;
    ctx.job.fallback_used = false;
}

#[instrument(level = "trace", skip_all, fields(job_id = %ctx.job_id))]
pub async fn fall_back(
    machine: GenerationMachine<(), Rejected>,
    ctx: &mut PipelineContext<'_>,
) -> Result<GenerationMachine<(), Composited>, AppError> {
    ctx.job
        .advance(JobStage::Fallback, "composing product cutout over background", ctx.db)
        .await?;

    let tuning = &ctx.pipeline_config.tuning;
    let frame = FrameSpec {
        duration_seconds: ctx.job.duration_seconds,
        width: tuning.fallback_width,
        height: tuning.fallback_height,
    };
    let output = compositor::compose(
        &ctx.job_id,
        &ctx.job.niche,
        ctx.job.product_assets.as_ref(),
        frame,
        ctx.services,
        ctx.storage,
        tuning.compose_timeout,
    )
    .await?;

    ctx.job.best_candidate_id = None;
    ctx.job.output_url = Some(output.video_url);
    ctx.job.thumbnail_url = Some(output.thumbnail_url);
    ctx.job.fallback_used = true;
    ctx.job.save_progress(ctx.db).await?;

    machine
        .compose()
        .map_err(|(_, guard)| map_guard_error("compose", &guard))
}

/// Failure text once retry is spent and fallback is switched off.
pub fn exhausted_message(ctx: &PipelineContext<'_>) -> String {
    let retries = ctx.job.retry_count;
    let attempts = if retries == 1 { "retry" } else { "retries" };
    match ctx.job.qa_threshold {
        Some(threshold) if ctx.job.enable_qa => format!(
            "no candidate met the quality threshold of {threshold:.2} after {retries} {attempts} and fallback is disabled"
        ),
        _ => format!("no candidate completed after {retries} {attempts} and fallback is disabled"),
    }
}

fn map_guard_error(event: &str, guard: &GuardError) -> AppError {
    AppError::InternalError(format!(
        "invalid generation pipeline transition during {event}: {guard:?}"
    ))
}
