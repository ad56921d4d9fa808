use std::time::Duration;

use common::{
    error::AppError,
    storage::{store::StorageManager, types::video_job::ProductAssets},
};
use sha2::{Digest, Sha256};
use tracing::{info, instrument};

use crate::pipeline::{bounded, CompositionRequest, PipelineServices};

pub const NO_CUTOUT_MESSAGE: &str = "fallback composition not viable: no product cutout available";

/// Neutral studio backdrops. The niche picks one, so reruns of a job look the same.
const BACKGROUNDS: [[u8; 3]; 6] = [
    [0xF4, 0xEF, 0xE6],
    [0xE8, 0xEC, 0xF1],
    [0xEE, 0xE9, 0xF3],
    [0xE6, 0xF0, 0xEA],
    [0xF5, 0xE9, 0xE4],
    [0xEC, 0xEC, 0xEC],
];

#[derive(Debug, Clone, PartialEq)]
pub struct FallbackOutput {
    pub video_url: String,
    pub thumbnail_url: String,
}

#[derive(Debug, Clone, Copy)]
pub struct FrameSpec {
    pub duration_seconds: u32,
    pub width: u32,
    pub height: u32,
}

pub fn background_for(niche: &str) -> [u8; 3] {
    let digest = Sha256::digest(niche.trim().to_lowercase().as_bytes());
    let slot = usize::from(digest.first().copied().unwrap_or(0)) % BACKGROUNDS.len();
    BACKGROUNDS.get(slot).copied().unwrap_or([0xEC, 0xEC, 0xEC])
}

pub fn video_location(job_id: &str) -> String {
    format!("jobs/{job_id}/fallback.mp4")
}

pub fn thumbnail_location(job_id: &str) -> String {
    format!("jobs/{job_id}/fallback.jpg")
}

/// Composites the stored product cutout over a solid backdrop and stores the result.
#[instrument(level = "trace", skip_all, fields(job_id = %job_id))]
pub async fn compose(
    job_id: &str,
    niche: &str,
    assets: Option<&ProductAssets>,
    frame: FrameSpec,
    services: &dyn PipelineServices,
    storage: &StorageManager,
    timeout: Duration,
) -> Result<FallbackOutput, AppError> {
    let assets = assets.ok_or_else(|| AppError::FallbackNotViable(NO_CUTOUT_MESSAGE.into()))?;

    let cutout_png = match storage.get(&assets.cutout_location).await {
        Ok(bytes) if !bytes.is_empty() => bytes,
        Ok(_) | Err(object_store::Error::NotFound { .. }) => {
            return Err(AppError::FallbackNotViable(NO_CUTOUT_MESSAGE.into()))
        }
        Err(err) => return Err(err.into()),
    };

    let request = CompositionRequest {
        cutout_png,
        background_rgb: background_for(niche),
        duration_seconds: frame.duration_seconds,
        width: frame.width,
        height: frame.height,
    };
    let media = bounded("compositor", timeout, services.compose_fallback(&request)).await?;

    let video_location = video_location(job_id);
    let thumbnail_location = thumbnail_location(job_id);
    storage.put(&video_location, media.video).await?;
    storage.put(&thumbnail_location, media.thumbnail).await?;

    info!(%job_id, %video_location, "fallback composition stored");

    Ok(FallbackOutput {
        video_url: storage.public_url(&video_location),
        thumbnail_url: storage.public_url(&thumbnail_location),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn background_is_stable_per_niche() {
        assert_eq!(background_for("cosmetics"), background_for(" Cosmetics "));
        assert!(BACKGROUNDS.contains(&background_for("anything")));
    }

    #[test]
    fn output_locations_are_per_job() {
        assert_eq!(video_location("j1"), "jobs/j1/fallback.mp4");
        assert_eq!(thumbnail_location("j1"), "jobs/j1/fallback.jpg");
    }
}
