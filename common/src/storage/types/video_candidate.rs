use surrealdb::sql::Datetime as SurrealDatetime;
use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

use super::shot_plan::PromptVariant;

#[derive(Debug, Default, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Rejected,
    Selected,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::Pending => "pending",
            CandidateStatus::Running => "running",
            CandidateStatus::Completed => "completed",
            CandidateStatus::Failed => "failed",
            CandidateStatus::Rejected => "rejected",
            CandidateStatus::Selected => "selected",
        }
    }
}

/// Per-axis QA scores, each in [0, 1].
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct AxisScores {
    pub similarity: f64,
    pub label: f64,
    pub quality: f64,
    pub temporal: f64,
}

impl AxisScores {
    /// Clamps every axis into [0, 1]; non-finite values become 0.
    pub fn clamped(self) -> Self {
        let clamp = |v: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        Self {
            similarity: clamp(self.similarity),
            label: clamp(self.label),
            quality: clamp(self.quality),
            temporal: clamp(self.temporal),
        }
    }
}

/// A finished render as reported by the generation provider.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct RenderedClip {
    pub output_url: String,
    pub thumbnail_url: Option<String>,
    pub duration_seconds: Option<f64>,
}

stored_object!(VideoCandidate, "video_candidate", {
    job_id: String,
    candidate_index: u32,
    round: u32,
    prompt_variant: PromptVariant,
    status: CandidateStatus,
    output_url: Option<String>,
    thumbnail_url: Option<String>,
    duration_seconds: Option<f64>,
    qa_scores: Option<AxisScores>,
    final_score: Option<f64>,
    qa_passed: bool,
    is_best: bool,
    error_message: Option<String>,
    #[serde(
        serialize_with = "serialize_option_datetime",
        deserialize_with = "deserialize_option_datetime",
        default
    )]
    completed_at: Option<chrono::DateTime<chrono::Utc>>
});

/// Status change plus its side fields, applied in one guarded write.
#[derive(serde::Serialize)]
struct CandidateTransition {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    completed_at: Option<SurrealDatetime>,
    updated_at: SurrealDatetime,
    #[serde(flatten)]
    extra: serde_json::Value,
}

impl VideoCandidate {
    pub fn new(job_id: &str, candidate_index: u32, round: u32, prompt_variant: PromptVariant) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            job_id: job_id.to_string(),
            candidate_index,
            round,
            prompt_variant,
            status: CandidateStatus::Pending,
            output_url: None,
            thumbnail_url: None,
            duration_seconds: None,
            qa_scores: None,
            final_score: None,
            qa_passed: false,
            is_best: false,
            error_message: None,
            completed_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Creates `count` pending candidates for one generation round, indexed from zero.
    pub async fn create_round(
        job_id: &str,
        count: u32,
        round: u32,
        prompt_variant: PromptVariant,
        db: &SurrealDbClient,
    ) -> Result<Vec<VideoCandidate>, AppError> {
        let mut created = Vec::with_capacity(count as usize);
        for index in 0..count {
            let candidate = Self::new(job_id, index, round, prompt_variant);
            db.store_item(candidate.clone()).await?;
            created.push(candidate);
        }
        Ok(created)
    }

    pub async fn mark_running(&mut self, db: &SurrealDbClient) -> Result<(), AppError> {
        self.transition(
            &[CandidateStatus::Pending],
            CandidateStatus::Running,
            serde_json::json!({}),
            db,
        )
        .await
    }

    pub async fn mark_completed(
        &mut self,
        clip: RenderedClip,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        self.transition(
            &[CandidateStatus::Pending, CandidateStatus::Running],
            CandidateStatus::Completed,
            serde_json::json!({
                "output_url": clip.output_url,
                "thumbnail_url": clip.thumbnail_url,
                "duration_seconds": clip.duration_seconds,
            }),
            db,
        )
        .await?;
        self.output_url = Some(clip.output_url);
        self.thumbnail_url = clip.thumbnail_url;
        self.duration_seconds = clip.duration_seconds;
        Ok(())
    }

    pub async fn mark_failed(
        &mut self,
        message: impl Into<String>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let message = message.into();
        self.transition(
            &[CandidateStatus::Pending, CandidateStatus::Running],
            CandidateStatus::Failed,
            serde_json::json!({ "error_message": message }),
            db,
        )
        .await?;
        self.error_message = Some(message);
        Ok(())
    }

    /// Records QA scores once. A second write for the same candidate is rejected.
    pub async fn record_scores(
        &mut self,
        scores: AxisScores,
        final_score: f64,
        qa_passed: bool,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        const SCORE_QUERY: &str = r#"
            UPDATE type::thing($table, $id)
            SET qa_scores = $scores,
                final_score = $final_score,
                qa_passed = $qa_passed,
                updated_at = $now
            WHERE status = $completed AND qa_scores = NONE
            RETURN AFTER;
        "#;

        let updated: Option<VideoCandidate> = db
            .client
            .query(SCORE_QUERY)
            .bind(("table", Self::table_name()))
            .bind(("id", self.id.clone()))
            .bind(("scores", scores))
            .bind(("final_score", final_score))
            .bind(("qa_passed", qa_passed))
            .bind(("completed", CandidateStatus::Completed.as_str()))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .await?
            .take(0)?;

        let updated = updated.ok_or_else(|| {
            AppError::Validation(format!(
                "candidate {} is not scoreable or already has scores",
                self.id
            ))
        })?;
        *self = updated;
        Ok(())
    }

    /// Notes a scoring failure without touching scores. The candidate counts as not passing.
    pub async fn record_scoring_error(
        &mut self,
        message: impl Into<String>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let message = message.into();
        let updated: Option<VideoCandidate> = db
            .merge_item::<Self, _>(
                &self.id,
                serde_json::json!({
                    "error_message": message,
                    "qa_passed": false,
                }),
            )
            .await?;
        if let Some(updated) = updated {
            *self = updated;
        }
        Ok(())
    }

    pub async fn mark_selected(&mut self, db: &SurrealDbClient) -> Result<(), AppError> {
        self.transition(
            &[CandidateStatus::Completed],
            CandidateStatus::Selected,
            serde_json::json!({ "is_best": true }),
            db,
        )
        .await?;
        self.is_best = true;
        Ok(())
    }

    pub async fn mark_rejected(&mut self, db: &SurrealDbClient) -> Result<(), AppError> {
        self.transition(
            &[CandidateStatus::Completed],
            CandidateStatus::Rejected,
            serde_json::json!({}),
            db,
        )
        .await
    }

    pub async fn list_for_job(
        job_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<VideoCandidate>, AppError> {
        let candidates: Vec<VideoCandidate> = db
            .client
            .query(
                "SELECT * FROM type::table($table)
                 WHERE job_id = $job_id
                 ORDER BY round ASC, candidate_index ASC",
            )
            .bind(("table", Self::table_name()))
            .bind(("job_id", job_id.to_string()))
            .await?
            .take(0)?;

        Ok(candidates)
    }

    /// Closes every candidate of an interrupted job: unfinished ones fail, unselected completed ones are rejected.
    pub async fn close_open_for_job(
        job_id: &str,
        reason: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let now = SurrealDatetime::from(Utc::now());

        db.client
            .query(
                "UPDATE type::table($table)
                 SET status = $failed, error_message = $reason, updated_at = $now
                 WHERE job_id = $job_id AND status IN $open",
            )
            .query(
                "UPDATE type::table($table)
                 SET status = $rejected, is_best = false, updated_at = $now
                 WHERE job_id = $job_id AND status IN $finished",
            )
            .bind(("table", Self::table_name()))
            .bind(("job_id", job_id.to_string()))
            .bind(("reason", reason.to_string()))
            .bind(("now", now))
            .bind(("failed", CandidateStatus::Failed.as_str()))
            .bind(("rejected", CandidateStatus::Rejected.as_str()))
            .bind((
                "open",
                vec![CandidateStatus::Pending.as_str(), CandidateStatus::Running.as_str()],
            ))
            .bind((
                "finished",
                vec![
                    CandidateStatus::Completed.as_str(),
                    CandidateStatus::Selected.as_str(),
                ],
            ))
            .await?
            .check()?;

        Ok(())
    }

    async fn transition(
        &mut self,
        from: &[CandidateStatus],
        to: CandidateStatus,
        extra: serde_json::Value,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        if !from.contains(&self.status) {
            return Err(AppError::Validation(format!(
                "Invalid candidate transition: {} -> {}",
                self.status.as_str(),
                to.as_str()
            )));
        }

        let now = SurrealDatetime::from(Utc::now());
        let patch = CandidateTransition {
            status: to.as_str(),
            completed_at: matches!(to, CandidateStatus::Completed | CandidateStatus::Failed)
                .then(|| now.clone()),
            updated_at: now,
            extra,
        };

        let updated: Option<VideoCandidate> = db.merge_item::<Self, _>(&self.id, patch).await?;
        let updated =
            updated.ok_or_else(|| AppError::NotFound(format!("video candidate {}", self.id)))?;

        self.status = to;
        self.updated_at = updated.updated_at;
        self.completed_at = updated.completed_at;
        Ok(())
    }
}
