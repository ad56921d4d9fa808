use std::time::Duration;

use common::{
    error::AppError,
    storage::{store::StorageManager, types::video_candidate::VideoCandidate},
};
use tracing::{info, instrument, warn};

use crate::pipeline::{bounded, PipelineServices};

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedOutput {
    pub video_url: String,
    pub thumbnail_url: Option<String>,
}

pub fn video_location(job_id: &str) -> String {
    format!("jobs/{job_id}/output.mp4")
}

pub fn thumbnail_location(job_id: &str) -> String {
    format!("jobs/{job_id}/output.jpg")
}

/// Copies the selected clip into object storage. A missing thumbnail is logged, not fatal.
#[instrument(level = "trace", skip_all, fields(job_id = %job_id, candidate_id = %candidate.id))]
pub async fn publish(
    job_id: &str,
    candidate: &VideoCandidate,
    services: &dyn PipelineServices,
    storage: &StorageManager,
    timeout: Duration,
) -> Result<PublishedOutput, AppError> {
    let clip_url = candidate.output_url.as_deref().ok_or_else(|| {
        AppError::InternalError(format!("selected candidate {} has no output", candidate.id))
    })?;

    let video = bounded("clip download", timeout, services.fetch_asset(clip_url)).await?;
    if video.is_empty() {
        return Err(AppError::Provider(format!(
            "clip download for candidate {} returned no bytes",
            candidate.id
        )));
    }
    let video_location = video_location(job_id);
    storage.put(&video_location, video).await?;

    let thumbnail_url = match candidate.thumbnail_url.as_deref() {
        Some(url) => match bounded("thumbnail download", timeout, services.fetch_asset(url)).await
        {
            Ok(bytes) if !bytes.is_empty() => {
                let location = thumbnail_location(job_id);
                storage.put(&location, bytes).await?;
                Some(storage.public_url(&location))
            }
            Ok(_) => {
                warn!(%job_id, "thumbnail download returned no bytes");
                None
            }
            Err(err) => {
                warn!(%job_id, error = %err, "thumbnail not stored");
                None
            }
        },
        None => None,
    };

    info!(%job_id, %video_location, "selected clip stored");

    Ok(PublishedOutput {
        video_url: storage.public_url(&video_location),
        thumbnail_url,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_locations_are_per_job() {
        assert_eq!(video_location("j1"), "jobs/j1/output.mp4");
        assert_eq!(thumbnail_location("j1"), "jobs/j1/output.jpg");
    }
}
