use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        types::{
            shot_plan::{PlanSource, PromptVariant, ShotPlan},
            video_candidate::{AxisScores, CandidateStatus, VideoCandidate},
            video_job::{AuditEntry, JobStage, JobStatus, NewVideoJob, VideoJob},
        },
    },
    utils::job_signal::JobSignal,
};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SubmittedJob {
    pub job_id: String,
    pub status: JobStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CandidateSnapshot {
    pub candidate_id: String,
    pub candidate_index: u32,
    pub round: u32,
    pub prompt_variant: PromptVariant,
    pub status: CandidateStatus,
    pub output_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: Option<f64>,
    pub qa_scores: Option<AxisScores>,
    pub final_score: Option<f64>,
    pub qa_passed: bool,
    pub is_best: bool,
    pub error_message: Option<String>,
}

impl From<VideoCandidate> for CandidateSnapshot {
    fn from(candidate: VideoCandidate) -> Self {
        Self {
            candidate_id: candidate.id,
            candidate_index: candidate.candidate_index,
            round: candidate.round,
            prompt_variant: candidate.prompt_variant,
            status: candidate.status,
            output_url: candidate.output_url,
            thumbnail_url: candidate.thumbnail_url,
            duration_seconds: candidate.duration_seconds,
            qa_scores: candidate.qa_scores,
            final_score: candidate.final_score,
            qa_passed: candidate.qa_passed,
            is_best: candidate.is_best,
            error_message: candidate.error_message,
        }
    }
}

/// Read model returned by the status interface.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct JobSnapshot {
    pub job_id: String,
    pub tenant_id: String,
    pub campaign_id: Option<String>,
    pub product_id: Option<String>,
    pub niche: String,
    pub status: JobStatus,
    pub stage: JobStage,
    pub stage_number: Option<u8>,
    pub duration_seconds: u32,
    pub variation_count: u32,
    pub enable_qa: bool,
    pub enable_fallback: bool,
    pub qa_threshold: Option<f64>,
    pub shot_plan: Option<ShotPlan>,
    pub plan_source: Option<PlanSource>,
    pub rewritten_prompt: Option<String>,
    pub cutout_url: Option<String>,
    pub retry_count: u32,
    pub best_candidate_id: Option<String>,
    pub output_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub fallback_used: bool,
    pub error_message: Option<String>,
    pub cancel_requested: bool,
    pub candidates: Vec<CandidateSnapshot>,
    pub audit_log: Vec<AuditEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    pub fn new(job: VideoJob, candidates: Vec<VideoCandidate>) -> Self {
        Self {
            stage_number: job.stage.number(),
            cutout_url: job.product_assets.as_ref().map(|a| a.cutout_url.clone()),
            job_id: job.id,
            tenant_id: job.tenant_id,
            campaign_id: job.campaign_id,
            product_id: job.product_id,
            niche: job.niche,
            status: job.status,
            stage: job.stage,
            duration_seconds: job.duration_seconds,
            variation_count: job.variation_count,
            enable_qa: job.enable_qa,
            enable_fallback: job.enable_fallback,
            qa_threshold: job.qa_threshold,
            shot_plan: job.shot_plan,
            plan_source: job.plan_source,
            rewritten_prompt: job.rewritten_prompt,
            retry_count: job.retry_count,
            best_candidate_id: job.best_candidate_id,
            output_url: job.output_url,
            thumbnail_url: job.thumbnail_url,
            fallback_used: job.fallback_used,
            error_message: job.error_message,
            cancel_requested: job.cancel_requested,
            candidates: candidates.into_iter().map(CandidateSnapshot::from).collect(),
            audit_log: job.audit_log,
            created_at: job.created_at,
            updated_at: job.updated_at,
            completed_at: job.completed_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CancelOutcome {
    Requested(JobSnapshot),
    AlreadyFinished(JobStatus),
}

/// Entry point used by request handlers: enqueue, inspect and cancel jobs.
#[derive(Clone)]
pub struct JobSubmitter {
    db: Arc<SurrealDbClient>,
    signal: JobSignal,
}

impl JobSubmitter {
    pub fn new(db: Arc<SurrealDbClient>, signal: JobSignal) -> Self {
        Self { db, signal }
    }

    /// Stores the job as pending and wakes a worker. Does not wait for processing.
    pub async fn submit(&self, input: NewVideoJob) -> Result<SubmittedJob, AppError> {
        let job = VideoJob::create_and_add_to_db(input, &self.db).await?;
        self.signal.notify();

        info!(
            job_id = %job.id,
            tenant_id = %job.tenant_id,
            niche = %job.niche,
            variation_count = job.variation_count,
            "video job submitted"
        );

        Ok(SubmittedJob {
            job_id: job.id,
            status: job.status,
        })
    }

    pub async fn status(&self, job_id: &str) -> Result<JobSnapshot, AppError> {
        let job = self
            .db
            .get_item::<VideoJob>(job_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("video job {job_id}")))?;
        let candidates = VideoCandidate::list_for_job(job_id, &self.db).await?;

        Ok(JobSnapshot::new(job, candidates))
    }

    pub async fn cancel(&self, job_id: &str) -> Result<CancelOutcome, AppError> {
        match VideoJob::request_cancel(job_id, &self.db).await? {
            Some(job) => {
                info!(%job_id, "video job cancellation requested");
                let candidates = VideoCandidate::list_for_job(job_id, &self.db).await?;
                Ok(CancelOutcome::Requested(JobSnapshot::new(job, candidates)))
            }
            None => {
                let status = self
                    .db
                    .get_item::<VideoJob>(job_id)
                    .await?
                    .map(|job| job.status)
                    .ok_or_else(|| AppError::NotFound(format!("video job {job_id}")))?;
                Ok(CancelOutcome::AlreadyFinished(status))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};
    use uuid::Uuid;

    async fn submitter() -> (JobSubmitter, JobSignal) {
        let db = SurrealDbClient::memory("submit_test", &Uuid::new_v4().to_string())
            .await
            .expect("in-memory surrealdb");
        let signal = JobSignal::new();
        (JobSubmitter::new(Arc::new(db), signal.clone()), signal)
    }

    fn input() -> NewVideoJob {
        serde_json::from_value(serde_json::json!({
            "tenant_id": "tenant-1",
            "brief": "Serum bottle on a marble vanity",
            "niche": "cosmetics"
        }))
        .expect("input")
    }

    #[tokio::test]
    async fn submit_returns_pending_and_signals_worker() {
        let (submitter, signal) = submitter().await;

        let submitted = submitter.submit(input()).await.expect("submit");
        assert_eq!(submitted.status, JobStatus::Pending);

        timeout(Duration::from_millis(200), signal.notified())
            .await
            .expect("worker woken");

        let snapshot = submitter.status(&submitted.job_id).await.expect("status");
        assert_eq!(snapshot.stage, JobStage::Pending);
        assert_eq!(snapshot.stage_number, Some(0));
        assert!(snapshot.candidates.is_empty());
        assert_eq!(snapshot.variation_count, 4);
    }

    #[tokio::test]
    async fn invalid_submission_is_rejected() {
        let (submitter, _) = submitter().await;
        let mut bad = input();
        bad.variation_count = 9;

        let err = submitter.submit(bad).await.expect_err("validation");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn status_of_unknown_job_is_not_found() {
        let (submitter, _) = submitter().await;
        let err = submitter.status("missing").await.expect_err("missing");
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_pending_then_finished_job() {
        let (submitter, _) = submitter().await;
        let submitted = submitter.submit(input()).await.expect("submit");

        match submitter.cancel(&submitted.job_id).await.expect("cancel") {
            CancelOutcome::Requested(snapshot) => assert!(snapshot.cancel_requested),
            other => panic!("unexpected outcome: {other:?}"),
        }

        let mut job = submitter
            .db
            .get_item::<VideoJob>(&submitted.job_id)
            .await
            .expect("fetch")
            .expect("exists");
        job.mark_failed("job cancelled by request", &submitter.db)
            .await
            .expect("fail");

        assert_eq!(
            submitter.cancel(&submitted.job_id).await.expect("cancel"),
            CancelOutcome::AlreadyFinished(JobStatus::Failed)
        );
    }
}
