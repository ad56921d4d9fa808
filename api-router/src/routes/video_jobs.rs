use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::storage::types::video_job::NewVideoJob;
use generation_pipeline::CancelOutcome;
use tracing::info;

use crate::{api_state::ApiState, error::ApiError};

/// Enqueues a job and returns immediately; the outcome is read through the status route.
pub async fn submit_job(
    State(state): State<ApiState>,
    payload: Result<Json<NewVideoJob>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(input) = payload.map_err(|rejection| ApiError::ValidationError(rejection.body_text()))?;

    info!(
        tenant_id = %input.tenant_id,
        niche = %input.niche,
        variation_count = input.variation_count,
        has_image = input.product_image_ref.is_some(),
        "Received video job submission"
    );

    let submitted = state.submitter.submit(input).await?;

    Ok((StatusCode::OK, Json(submitted)))
}

pub async fn get_job(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let snapshot = state.submitter.status(&job_id).await?;

    Ok(Json(snapshot))
}

pub async fn cancel_job(
    State(state): State<ApiState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    match state.submitter.cancel(&job_id).await? {
        CancelOutcome::Requested(snapshot) => Ok((StatusCode::ACCEPTED, Json(snapshot))),
        CancelOutcome::AlreadyFinished(status) => Err(ApiError::Conflict(format!(
            "video job {job_id} is already {}",
            status.as_str()
        ))),
    }
}
