use state_machines::state_machine;
use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::{
    category_profile::CategoryProfile,
    shot_plan::{PlanSource, PromptVariant, ShotPlan, MAX_DURATION_SECONDS, MIN_DURATION_SECONDS},
};

pub const MAX_VARIATIONS: u32 = 8;
pub const DEFAULT_DURATION_SECONDS: u32 = 6;
pub const DEFAULT_VARIATIONS: u32 = 4;
pub const CANCELLED_MESSAGE: &str = "job cancelled by request";

/// Pipeline stage. Numbering follows the order stages are entered on the happy path.
#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStage {
    #[default]
    Pending,
    Preprocess,
    Rewrite,
    GenerateCandidates,
    QaSelect,
    Retry,
    Fallback,
    Completed,
    Failed,
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Pending => "PENDING",
            JobStage::Preprocess => "PREPROCESS",
            JobStage::Rewrite => "REWRITE",
            JobStage::GenerateCandidates => "GENERATE_CANDIDATES",
            JobStage::QaSelect => "QA_SELECT",
            JobStage::Retry => "RETRY",
            JobStage::Fallback => "FALLBACK",
            JobStage::Completed => "COMPLETED",
            JobStage::Failed => "FAILED",
        }
    }

    /// Stage number as exposed on the status interface; `FAILED` has none.
    pub fn number(&self) -> Option<u8> {
        match self {
            JobStage::Pending => Some(0),
            JobStage::Preprocess => Some(1),
            JobStage::Rewrite => Some(2),
            JobStage::GenerateCandidates => Some(3),
            JobStage::QaSelect => Some(4),
            JobStage::Retry => Some(5),
            JobStage::Fallback => Some(6),
            JobStage::Completed => Some(7),
            JobStage::Failed => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStage::Completed | JobStage::Failed)
    }
}

#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy)]
enum StageEvent {
    Preprocess,
    Rewrite,
    Generate,
    Select,
    Retry,
    FallBack,
    Complete,
    Fail,
    Restart,
}

impl StageEvent {
    fn as_str(&self) -> &'static str {
        match self {
            StageEvent::Preprocess => "preprocess",
            StageEvent::Rewrite => "rewrite",
            StageEvent::Generate => "generate",
            StageEvent::Select => "select",
            StageEvent::Retry => "retry",
            StageEvent::FallBack => "fall_back",
            StageEvent::Complete => "complete",
            StageEvent::Fail => "fail",
            StageEvent::Restart => "restart",
        }
    }

    fn entering(stage: JobStage) -> Self {
        match stage {
            JobStage::Pending => StageEvent::Restart,
            JobStage::Preprocess => StageEvent::Preprocess,
            JobStage::Rewrite => StageEvent::Rewrite,
            JobStage::GenerateCandidates => StageEvent::Generate,
            JobStage::QaSelect => StageEvent::Select,
            JobStage::Retry => StageEvent::Retry,
            JobStage::Fallback => StageEvent::FallBack,
            JobStage::Completed => StageEvent::Complete,
            JobStage::Failed => StageEvent::Fail,
        }
    }
}

mod lifecycle {
    use super::state_machine;

    state_machine! {
        name: JobLifecycleMachine,
        initial: Pending,
        states: [Pending, Preprocess, Rewrite, GenerateCandidates, QaSelect, Retry, Fallback, Completed, Failed],
        events {
            preprocess {
                transition: { from: Pending, to: Preprocess }
            }
            rewrite {
                transition: { from: Preprocess, to: Rewrite }
            }
            generate {
                transition: { from: Rewrite, to: GenerateCandidates }
                transition: { from: Retry, to: GenerateCandidates }
            }
            select {
                transition: { from: GenerateCandidates, to: QaSelect }
            }
            retry {
                transition: { from: QaSelect, to: Retry }
            }
            fall_back {
                transition: { from: QaSelect, to: Fallback }
            }
            complete {
                transition: { from: QaSelect, to: Completed }
                transition: { from: Fallback, to: Completed }
            }
            fail {
                transition: { from: Pending, to: Failed }
                transition: { from: Preprocess, to: Failed }
                transition: { from: Rewrite, to: Failed }
                transition: { from: GenerateCandidates, to: Failed }
                transition: { from: QaSelect, to: Failed }
                transition: { from: Retry, to: Failed }
                transition: { from: Fallback, to: Failed }
            }
            restart {
                transition: { from: Preprocess, to: Pending }
                transition: { from: Rewrite, to: Pending }
                transition: { from: GenerateCandidates, to: Pending }
                transition: { from: QaSelect, to: Pending }
                transition: { from: Retry, to: Pending }
                transition: { from: Fallback, to: Pending }
            }
        }
    }

    pub(super) fn pending() -> JobLifecycleMachine<(), Pending> {
        JobLifecycleMachine::new(())
    }

    pub(super) fn preprocess() -> JobLifecycleMachine<(), Preprocess> {
        pending()
            .preprocess()
            .expect("preprocess transition from Pending should exist")
    }

    pub(super) fn rewrite() -> JobLifecycleMachine<(), Rewrite> {
        preprocess()
            .rewrite()
            .expect("rewrite transition from Preprocess should exist")
    }

    pub(super) fn generate_candidates() -> JobLifecycleMachine<(), GenerateCandidates> {
        rewrite()
            .generate()
            .expect("generate transition from Rewrite should exist")
    }

    pub(super) fn qa_select() -> JobLifecycleMachine<(), QaSelect> {
        generate_candidates()
            .select()
            .expect("select transition from GenerateCandidates should exist")
    }

    pub(super) fn retry() -> JobLifecycleMachine<(), Retry> {
        qa_select()
            .retry()
            .expect("retry transition from QaSelect should exist")
    }

    pub(super) fn fallback() -> JobLifecycleMachine<(), Fallback> {
        qa_select()
            .fall_back()
            .expect("fall_back transition from QaSelect should exist")
    }
}

fn invalid_transition(stage: &JobStage, event: StageEvent) -> AppError {
    AppError::Validation(format!(
        "Invalid job stage transition: {} -> {}",
        stage.as_str(),
        event.as_str()
    ))
}

fn compute_next_stage(stage: &JobStage, event: StageEvent) -> Result<JobStage, AppError> {
    use lifecycle::*;
    match (stage, event) {
        (JobStage::Pending, StageEvent::Preprocess) => pending()
            .preprocess()
            .map(|_| JobStage::Preprocess)
            .map_err(|_| invalid_transition(stage, event)),
        (JobStage::Preprocess, StageEvent::Rewrite) => preprocess()
            .rewrite()
            .map(|_| JobStage::Rewrite)
            .map_err(|_| invalid_transition(stage, event)),
        (JobStage::Rewrite, StageEvent::Generate) => rewrite()
            .generate()
            .map(|_| JobStage::GenerateCandidates)
            .map_err(|_| invalid_transition(stage, event)),
        (JobStage::Retry, StageEvent::Generate) => retry()
            .generate()
            .map(|_| JobStage::GenerateCandidates)
            .map_err(|_| invalid_transition(stage, event)),
        (JobStage::GenerateCandidates, StageEvent::Select) => generate_candidates()
            .select()
            .map(|_| JobStage::QaSelect)
            .map_err(|_| invalid_transition(stage, event)),
        (JobStage::QaSelect, StageEvent::Retry) => qa_select()
            .retry()
            .map(|_| JobStage::Retry)
            .map_err(|_| invalid_transition(stage, event)),
        (JobStage::QaSelect, StageEvent::FallBack) => qa_select()
            .fall_back()
            .map(|_| JobStage::Fallback)
            .map_err(|_| invalid_transition(stage, event)),
        (JobStage::QaSelect, StageEvent::Complete) => qa_select()
            .complete()
            .map(|_| JobStage::Completed)
            .map_err(|_| invalid_transition(stage, event)),
        (JobStage::Fallback, StageEvent::Complete) => fallback()
            .complete()
            .map(|_| JobStage::Completed)
            .map_err(|_| invalid_transition(stage, event)),
        (JobStage::Pending, StageEvent::Fail) => {
            pending().fail().map(|_| JobStage::Failed).map_err(|_| invalid_transition(stage, event))
        }
        (JobStage::Preprocess, StageEvent::Fail) => {
            preprocess().fail().map(|_| JobStage::Failed).map_err(|_| invalid_transition(stage, event))
        }
        (JobStage::Rewrite, StageEvent::Fail) => {
            rewrite().fail().map(|_| JobStage::Failed).map_err(|_| invalid_transition(stage, event))
        }
        (JobStage::GenerateCandidates, StageEvent::Fail) => generate_candidates()
            .fail()
            .map(|_| JobStage::Failed)
            .map_err(|_| invalid_transition(stage, event)),
        (JobStage::QaSelect, StageEvent::Fail) => {
            qa_select().fail().map(|_| JobStage::Failed).map_err(|_| invalid_transition(stage, event))
        }
        (JobStage::Retry, StageEvent::Fail) => {
            retry().fail().map(|_| JobStage::Failed).map_err(|_| invalid_transition(stage, event))
        }
        (JobStage::Fallback, StageEvent::Fail) => {
            fallback().fail().map(|_| JobStage::Failed).map_err(|_| invalid_transition(stage, event))
        }
        (JobStage::Preprocess, StageEvent::Restart) => preprocess()
            .restart()
            .map(|_| JobStage::Pending)
            .map_err(|_| invalid_transition(stage, event)),
        (JobStage::Rewrite, StageEvent::Restart) => {
            rewrite().restart().map(|_| JobStage::Pending).map_err(|_| invalid_transition(stage, event))
        }
        (JobStage::GenerateCandidates, StageEvent::Restart) => generate_candidates()
            .restart()
            .map(|_| JobStage::Pending)
            .map_err(|_| invalid_transition(stage, event)),
        (JobStage::QaSelect, StageEvent::Restart) => qa_select()
            .restart()
            .map(|_| JobStage::Pending)
            .map_err(|_| invalid_transition(stage, event)),
        (JobStage::Retry, StageEvent::Restart) => {
            retry().restart().map(|_| JobStage::Pending).map_err(|_| invalid_transition(stage, event))
        }
        (JobStage::Fallback, StageEvent::Restart) => fallback()
            .restart()
            .map(|_| JobStage::Pending)
            .map_err(|_| invalid_transition(stage, event)),
        _ => Err(invalid_transition(stage, event)),
    }
}

/// Submission input for a new job.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize, PartialEq)]
pub struct NewVideoJob {
    pub tenant_id: String,
    #[serde(default)]
    pub campaign_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub product_image_ref: Option<String>,
    pub brief: String,
    #[serde(default)]
    pub niche: String,
    #[serde(default = "default_duration")]
    pub duration_seconds: u32,
    #[serde(default = "default_variations")]
    pub variation_count: u32,
    #[serde(default = "default_true")]
    pub enable_qa: bool,
    #[serde(default = "default_true")]
    pub enable_fallback: bool,
}

fn default_duration() -> u32 {
    DEFAULT_DURATION_SECONDS
}

fn default_variations() -> u32 {
    DEFAULT_VARIATIONS
}

fn default_true() -> bool {
    true
}

impl NewVideoJob {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.tenant_id.trim().is_empty() {
            return Err(AppError::Validation("tenant_id is required".into()));
        }
        if self.brief.trim().is_empty() {
            return Err(AppError::Validation("brief must not be empty".into()));
        }
        if !(MIN_DURATION_SECONDS..=MAX_DURATION_SECONDS).contains(&self.duration_seconds) {
            return Err(AppError::Validation(format!(
                "duration_seconds must be between {MIN_DURATION_SECONDS} and {MAX_DURATION_SECONDS}"
            )));
        }
        if !(1..=MAX_VARIATIONS).contains(&self.variation_count) {
            return Err(AppError::Validation(format!(
                "variation_count must be between 1 and {MAX_VARIATIONS}"
            )));
        }
        if let Some(image_ref) = self.product_image_ref.as_deref() {
            url::Url::parse(image_ref).map_err(|e| {
                AppError::Validation(format!("product_image_ref is not a valid URL: {e}"))
            })?;
        }
        Ok(())
    }
}

/// References produced by the preprocessor. Locations are object-storage keys.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct ProductAssets {
    pub source_image_url: String,
    pub cutout_location: String,
    pub mask_location: String,
    pub cutout_url: String,
    pub mask_url: String,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct AuditEntry {
    #[serde(serialize_with = "serialize_datetime", deserialize_with = "deserialize_datetime")]
    pub at: chrono::DateTime<chrono::Utc>,
    pub stage: JobStage,
    pub message: String,
}

stored_object!(VideoJob, "video_job", {
    tenant_id: String,
    campaign_id: Option<String>,
    product_id: Option<String>,
    prompt: String,
    product_image_ref: Option<String>,
    niche: String,
    duration_seconds: u32,
    variation_count: u32,
    enable_qa: bool,
    enable_fallback: bool,
    stage: JobStage,
    status: JobStatus,
    profile: Option<CategoryProfile>,
    qa_threshold: Option<f64>,
    product_assets: Option<ProductAssets>,
    shot_plan: Option<ShotPlan>,
    plan_source: Option<PlanSource>,
    prompt_variant: Option<PromptVariant>,
    rewritten_prompt: Option<String>,
    retry_count: u32,
    best_candidate_id: Option<String>,
    output_url: Option<String>,
    thumbnail_url: Option<String>,
    fallback_used: bool,
    error_message: Option<String>,
    cancel_requested: bool,
    worker_id: Option<String>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    locked_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    audit_log: Vec<AuditEntry>
});

/// Pipeline-owned fields written on every transition. `cancel_requested` is deliberately absent.
#[derive(serde::Serialize)]
struct JobProgress {
    stage: JobStage,
    status: JobStatus,
    profile: Option<CategoryProfile>,
    qa_threshold: Option<f64>,
    product_assets: Option<ProductAssets>,
    shot_plan: Option<ShotPlan>,
    plan_source: Option<PlanSource>,
    prompt_variant: Option<PromptVariant>,
    rewritten_prompt: Option<String>,
    retry_count: u32,
    best_candidate_id: Option<String>,
    output_url: Option<String>,
    thumbnail_url: Option<String>,
    fallback_used: bool,
    error_message: Option<String>,
    completed_at: Option<SurrealDatetime>,
    audit_log: Vec<AuditEntry>,
    updated_at: SurrealDatetime,
}

impl VideoJob {
    pub fn new(input: NewVideoJob) -> Self {
        let now = Utc::now();

        Self {
            id: Uuid::new_v4().to_string(),
            tenant_id: input.tenant_id,
            campaign_id: input.campaign_id,
            product_id: input.product_id,
            prompt: input.brief,
            product_image_ref: input.product_image_ref,
            niche: input.niche,
            duration_seconds: input.duration_seconds,
            variation_count: input.variation_count,
            enable_qa: input.enable_qa,
            enable_fallback: input.enable_fallback,
            stage: JobStage::Pending,
            status: JobStatus::Pending,
            profile: None,
            qa_threshold: None,
            product_assets: None,
            shot_plan: None,
            plan_source: None,
            prompt_variant: None,
            rewritten_prompt: None,
            retry_count: 0,
            best_candidate_id: None,
            output_url: None,
            thumbnail_url: None,
            fallback_used: false,
            error_message: None,
            cancel_requested: false,
            worker_id: None,
            locked_at: None,
            completed_at: None,
            audit_log: vec![AuditEntry {
                at: now,
                stage: JobStage::Pending,
                message: "job submitted".into(),
            }],
            created_at: now,
            updated_at: now,
        }
    }

    pub async fn create_and_add_to_db(
        input: NewVideoJob,
        db: &SurrealDbClient,
    ) -> Result<VideoJob, AppError> {
        input.validate()?;
        let job = Self::new(input);
        db.store_item(job.clone()).await?;
        Ok(job)
    }

    /// Atomically moves the oldest pending job to `running` and assigns it to `worker_id`.
    pub async fn claim_next_pending(
        db: &SurrealDbClient,
        worker_id: &str,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Option<VideoJob>, AppError> {
        const CLAIM_QUERY: &str = r#"
            UPDATE (
                SELECT * FROM type::table($table)
                WHERE status = $pending
                ORDER BY created_at ASC
                LIMIT 1
            )
            SET status = $running,
                worker_id = $worker_id,
                locked_at = $now,
                updated_at = $now
            WHERE status = $pending
            RETURN AFTER;
        "#;

        let mut result = db
            .client
            .query(CLAIM_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("pending", JobStatus::Pending.as_str()))
            .bind(("running", JobStatus::Running.as_str()))
            .bind(("worker_id", worker_id.to_string()))
            .bind(("now", SurrealDatetime::from(now)))
            .await?;

        let job: Option<VideoJob> = result.take(0)?;
        Ok(job)
    }

    /// Validates and applies a stage transition, appends an audit entry and persists progress.
    pub async fn advance(
        &mut self,
        stage: JobStage,
        note: impl Into<String>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let next = compute_next_stage(&self.stage, StageEvent::entering(stage))?;
        debug_assert_eq!(next, stage);

        // Local state only moves once the row has.
        let mut staged = self.clone();
        staged.stage = next;
        if !next.is_terminal() && next != JobStage::Pending {
            staged.status = JobStatus::Running;
        }
        staged.record(note);
        staged.save_progress(db).await?;
        *self = staged;
        Ok(())
    }

    /// Persists the pipeline-owned fields without changing the stage.
    pub async fn save_progress(&mut self, db: &SurrealDbClient) -> Result<(), AppError> {
        let now = Utc::now();
        let patch = JobProgress {
            stage: self.stage,
            status: self.status,
            profile: self.profile.clone(),
            qa_threshold: self.qa_threshold,
            product_assets: self.product_assets.clone(),
            shot_plan: self.shot_plan.clone(),
            plan_source: self.plan_source,
            prompt_variant: self.prompt_variant,
            rewritten_prompt: self.rewritten_prompt.clone(),
            retry_count: self.retry_count,
            best_candidate_id: self.best_candidate_id.clone(),
            output_url: self.output_url.clone(),
            thumbnail_url: self.thumbnail_url.clone(),
            fallback_used: self.fallback_used,
            error_message: self.error_message.clone(),
            completed_at: self.completed_at.map(SurrealDatetime::from),
            audit_log: self.audit_log.clone(),
            updated_at: SurrealDatetime::from(now),
        };

        let updated: Option<VideoJob> = db.merge_item::<Self, _>(&self.id, patch).await?;
        let updated = updated.ok_or_else(|| AppError::NotFound(format!("video job {}", self.id)))?;

        self.updated_at = now;
        self.cancel_requested = updated.cancel_requested;
        Ok(())
    }

    pub async fn mark_completed(&mut self, db: &SurrealDbClient) -> Result<(), AppError> {
        let mut staged = self.clone();
        staged.status = JobStatus::Completed;
        staged.completed_at = Some(Utc::now());
        staged.error_message = None;
        let note = if staged.fallback_used {
            "completed with fallback composition".to_string()
        } else {
            format!(
                "completed with candidate {}",
                staged.best_candidate_id.as_deref().unwrap_or("unknown")
            )
        };
        staged.advance(JobStage::Completed, note, db).await?;
        *self = staged;
        Ok(())
    }

    pub async fn mark_failed(
        &mut self,
        message: impl Into<String>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let message = message.into();
        let mut staged = self.clone();
        staged.status = JobStatus::Failed;
        staged.completed_at = Some(Utc::now());
        staged.best_candidate_id = None;
        staged.error_message = Some(message.clone());
        staged.advance(JobStage::Failed, message, db).await?;
        *self = staged;
        Ok(())
    }

    /// Flags a non-terminal job for cancellation. Returns `None` when the job already finished.
    pub async fn request_cancel(
        id: &str,
        db: &SurrealDbClient,
    ) -> Result<Option<VideoJob>, AppError> {
        if db.get_item::<Self>(id).await?.is_none() {
            return Err(AppError::NotFound(format!("video job {id}")));
        }

        const CANCEL_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET cancel_requested = true,
                updated_at = $now
            WHERE status IN $active
            RETURN AFTER;
        "#;

        let mut result = db
            .client
            .query(CANCEL_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .bind((
                "active",
                vec![JobStatus::Pending.as_str(), JobStatus::Running.as_str()],
            ))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?;

        let updated: Option<VideoJob> = result.take(0)?;
        Ok(updated)
    }

    pub async fn is_cancel_requested(id: &str, db: &SurrealDbClient) -> Result<bool, AppError> {
        let flag: Option<bool> = db
            .client
            .query("SELECT VALUE cancel_requested FROM type::thing($table, $id)")
            .bind(("table", Self::table_name()))
            .bind(("id", id.to_string()))
            .await?
            .take(0)?;

        Ok(flag.unwrap_or(false))
    }

    /// Returns jobs left `running` without an update since `cutoff` to the pending queue.
    pub async fn requeue_stale(
        cutoff: chrono::DateTime<chrono::Utc>,
        db: &SurrealDbClient,
    ) -> Result<Vec<VideoJob>, AppError> {
        let stale: Vec<VideoJob> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                 WHERE status = $running AND updated_at < $cutoff
                 ORDER BY created_at ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("running", JobStatus::Running.as_str()))
            .bind(("cutoff", SurrealDatetime::from(cutoff)))
            .await?
            .take(0)?;

        let mut requeued = Vec::with_capacity(stale.len());
        for mut job in stale {
            if job.stage != JobStage::Pending {
                let next = compute_next_stage(&job.stage, StageEvent::Restart)?;
                job.stage = next;
            }
            job.status = JobStatus::Pending;
            job.retry_count = 0;
            job.best_candidate_id = None;
            job.record("requeued after worker interruption");
            job.save_progress(db).await?;

            let released: Option<VideoJob> = db
                .client
                .query(
                    "UPDATE type::thing($table, $id)
                     SET worker_id = NONE, locked_at = NONE
                     RETURN AFTER",
                )
                .bind(("table", Self::table_name()))
                .bind(("id", job.id.clone()))
                .await?
                .take(0)?;
            requeued.push(released.unwrap_or(job));
        }

        Ok(requeued)
    }

    /// Appends a human-readable audit entry at the current stage. Not read by control flow.
    pub fn record(&mut self, message: impl Into<String>) {
        self.audit_log.push(AuditEntry {
            at: Utc::now(),
            stage: self.stage,
            message: message.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn submission() -> NewVideoJob {
        NewVideoJob {
            tenant_id: "tenant-1".into(),
            campaign_id: None,
            product_id: None,
            product_image_ref: Some("https://img.example.com/bottle.png".into()),
            brief: "Sparkling water on a sunny picnic table".into(),
            niche: "packaged_goods".into(),
            duration_seconds: 6,
            variation_count: 4,
            enable_qa: true,
            enable_fallback: true,
        }
    }

    async fn memory_db() -> SurrealDbClient {
        let namespace = "test_ns";
        let database = Uuid::new_v4().to_string();
        SurrealDbClient::memory(namespace, &database)
            .await
            .expect("in-memory surrealdb")
    }

    #[test]
    fn test_submission_validation() {
        assert!(submission().validate().is_ok());

        let mut empty_brief = submission();
        empty_brief.brief = "  ".into();
        assert!(matches!(empty_brief.validate(), Err(AppError::Validation(_))));

        let mut too_many = submission();
        too_many.variation_count = MAX_VARIATIONS + 1;
        assert!(too_many.validate().is_err());

        let mut zero = submission();
        zero.variation_count = 0;
        assert!(zero.validate().is_err());

        let mut long = submission();
        long.duration_seconds = 61;
        assert!(long.validate().is_err());

        let mut bad_url = submission();
        bad_url.product_image_ref = Some("not a url".into());
        assert!(bad_url.validate().is_err());
    }

    #[test]
    fn test_submission_defaults_from_json() {
        let parsed: NewVideoJob = serde_json::from_value(serde_json::json!({
            "tenant_id": "t",
            "brief": "a brief"
        }))
        .expect("deserialize");

        assert_eq!(parsed.duration_seconds, DEFAULT_DURATION_SECONDS);
        assert_eq!(parsed.variation_count, DEFAULT_VARIATIONS);
        assert!(parsed.enable_qa);
        assert!(parsed.enable_fallback);
    }

    #[test]
    fn test_stage_transition_table() {
        assert_eq!(
            compute_next_stage(&JobStage::Pending, StageEvent::Preprocess).ok(),
            Some(JobStage::Preprocess)
        );
        assert_eq!(
            compute_next_stage(&JobStage::Retry, StageEvent::Generate).ok(),
            Some(JobStage::GenerateCandidates)
        );
        assert_eq!(
            compute_next_stage(&JobStage::Fallback, StageEvent::Complete).ok(),
            Some(JobStage::Completed)
        );
        assert!(compute_next_stage(&JobStage::Pending, StageEvent::Generate).is_err());
        assert!(compute_next_stage(&JobStage::Rewrite, StageEvent::Retry).is_err());
        assert!(compute_next_stage(&JobStage::Completed, StageEvent::Fail).is_err());
        assert!(compute_next_stage(&JobStage::Failed, StageEvent::Restart).is_err());
    }

    #[test]
    fn test_stage_numbers() {
        assert_eq!(JobStage::Pending.number(), Some(0));
        assert_eq!(JobStage::QaSelect.number(), Some(4));
        assert_eq!(JobStage::Completed.number(), Some(7));
        assert_eq!(JobStage::Failed.number(), None);
    }

    #[tokio::test]
    async fn test_create_and_claim() {
        let db = memory_db().await;

        let created = VideoJob::create_and_add_to_db(submission(), &db)
            .await
            .expect("create");
        assert_eq!(created.status, JobStatus::Pending);
        assert_eq!(created.stage, JobStage::Pending);

        let claimed = VideoJob::claim_next_pending(&db, "worker-1", Utc::now())
            .await
            .expect("claim")
            .expect("job claimed");
        assert_eq!(claimed.id, created.id);
        assert_eq!(claimed.status, JobStatus::Running);
        assert_eq!(claimed.worker_id.as_deref(), Some("worker-1"));

        let none_left = VideoJob::claim_next_pending(&db, "worker-2", Utc::now())
            .await
            .expect("claim");
        assert!(none_left.is_none());
    }

    #[tokio::test]
    async fn test_advance_persists_stage_and_audit() {
        let db = memory_db().await;
        let mut job = VideoJob::create_and_add_to_db(submission(), &db)
            .await
            .expect("create");

        job.advance(JobStage::Preprocess, "resolving profile", &db)
            .await
            .expect("advance");

        let stored = db
            .get_item::<VideoJob>(&job.id)
            .await
            .expect("fetch")
            .expect("exists");
        assert_eq!(stored.stage, JobStage::Preprocess);
        assert_eq!(stored.status, JobStatus::Running);
        assert_eq!(stored.audit_log.len(), 2);

        let err = job
            .advance(JobStage::QaSelect, "skipping ahead", &db)
            .await
            .expect_err("invalid transition");
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn test_mark_failed_sets_message() {
        let db = memory_db().await;
        let mut job = VideoJob::create_and_add_to_db(submission(), &db)
            .await
            .expect("create");

        job.mark_failed("fallback composition not viable", &db)
            .await
            .expect("fail");

        let stored = db
            .get_item::<VideoJob>(&job.id)
            .await
            .expect("fetch")
            .expect("exists");
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.stage, JobStage::Failed);
        assert_eq!(
            stored.error_message.as_deref(),
            Some("fallback composition not viable")
        );
        assert!(stored.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel_flag_survives_progress_writes() {
        let db = memory_db().await;
        let mut job = VideoJob::create_and_add_to_db(submission(), &db)
            .await
            .expect("create");

        let flagged = VideoJob::request_cancel(&job.id, &db)
            .await
            .expect("cancel")
            .expect("job still active");
        assert!(flagged.cancel_requested);

        job.advance(JobStage::Preprocess, "stage one", &db)
            .await
            .expect("advance");

        assert!(job.cancel_requested);
        assert!(VideoJob::is_cancel_requested(&job.id, &db)
            .await
            .expect("read flag"));
    }

    #[tokio::test]
    async fn test_cancel_terminal_and_missing_jobs() {
        let db = memory_db().await;
        let mut job = VideoJob::create_and_add_to_db(submission(), &db)
            .await
            .expect("create");
        job.mark_failed("boom", &db).await.expect("fail");

        let result = VideoJob::request_cancel(&job.id, &db)
            .await
            .expect("cancel call");
        assert!(result.is_none());

        let missing = VideoJob::request_cancel("does-not-exist", &db).await;
        assert!(matches!(missing, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_requeue_stale_running_job() {
        let db = memory_db().await;
        let created = VideoJob::create_and_add_to_db(submission(), &db)
            .await
            .expect("create");
        let mut claimed = VideoJob::claim_next_pending(&db, "worker-1", Utc::now())
            .await
            .expect("claim")
            .expect("claimed");
        claimed
            .advance(JobStage::Preprocess, "started", &db)
            .await
            .expect("advance");

        let cutoff = Utc::now() + ChronoDuration::seconds(1);
        let requeued = VideoJob::requeue_stale(cutoff, &db).await.expect("requeue");

        assert_eq!(requeued.len(), 1);
        let job = requeued.into_iter().next().expect("one job");
        assert_eq!(job.id, created.id);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.stage, JobStage::Pending);
        assert!(job.worker_id.is_none());

        let reclaimed = VideoJob::claim_next_pending(&db, "worker-2", Utc::now())
            .await
            .expect("claim")
            .expect("claimable again");
        assert_eq!(reclaimed.id, created.id);
    }

    #[test]
    fn test_every_active_stage_can_fail_and_restart() {
        let active = [
            JobStage::Preprocess,
            JobStage::Rewrite,
            JobStage::GenerateCandidates,
            JobStage::QaSelect,
            JobStage::Retry,
            JobStage::Fallback,
        ];
        for stage in active {
            assert_eq!(
                compute_next_stage(&stage, StageEvent::Fail).ok(),
                Some(JobStage::Failed),
                "{}",
                stage.as_str()
            );
            assert_eq!(
                compute_next_stage(&stage, StageEvent::Restart).ok(),
                Some(JobStage::Pending),
                "{}",
                stage.as_str()
            );
        }
        assert_eq!(
            compute_next_stage(&JobStage::Pending, StageEvent::Fail).ok(),
            Some(JobStage::Failed)
        );
        assert!(compute_next_stage(&JobStage::Pending, StageEvent::Restart).is_err());
    }

    #[tokio::test]
    async fn test_failed_terminal_write_leaves_job_untouched() {
        let db = memory_db().await;
        VideoJob::create_and_add_to_db(submission(), &db)
            .await
            .expect("create");
        let mut job = VideoJob::claim_next_pending(&db, "worker-1", Utc::now())
            .await
            .expect("claim")
            .expect("claimed");
        job.advance(JobStage::Preprocess, "started", &db)
            .await
            .expect("advance");
        let audit_len = job.audit_log.len();

        db.client
            .query("DELETE type::thing($table, $id)")
            .bind(("table", VideoJob::table_name()))
            .bind(("id", job.id.clone()))
            .await
            .expect("delete");

        let err = job.mark_completed(&db).await.expect_err("row is gone");
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(job.stage, JobStage::Preprocess);
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.completed_at.is_none());
        assert_eq!(job.audit_log.len(), audit_len);

        let err = job
            .mark_failed("store unavailable", &db)
            .await
            .expect_err("row is gone");
        assert!(matches!(err, AppError::NotFound(_)));
        assert!(!job.stage.is_terminal());
        assert!(job.error_message.is_none());
        assert_eq!(job.audit_log.len(), audit_len);
    }
}
