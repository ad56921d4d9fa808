use common::{error::AppError, storage::types::video_candidate::AxisScores};
use serde::Serialize;

use super::{bearer, ensure_success};
use crate::pipeline::ScoreRequest;

#[derive(Serialize)]
struct ScoreBody<'a> {
    video_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_image_url: Option<&'a str>,
    category: &'a str,
    duration_seconds: u32,
}

/// Vision model returning per-axis scores for a rendered clip.
pub struct HttpVisionClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpVisionClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub async fn score(&self, request: &ScoreRequest) -> Result<AxisScores, AppError> {
        let body = ScoreBody {
            video_url: &request.clip_url,
            reference_image_url: request.reference_image_url.as_deref(),
            category: &request.niche,
            duration_seconds: request.duration_seconds,
        };

        let response = bearer(
            self.http.post(format!("{}/v1/score", self.base_url)),
            self.api_key.as_deref(),
        )
        .json(&body)
        .send()
        .await?;

        let scores: AxisScores = ensure_success("vision", response).await?.json().await?;
        Ok(scores)
    }
}
