use std::time::Duration;

use bytes::Bytes;
use common::{error::AppError, storage::types::video_candidate::RenderedClip};
use serde::{Deserialize, Serialize};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    Retry,
};
use tracing::debug;

use super::{bearer, ensure_success};
use crate::pipeline::RenderRequest;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct SubmitRenderBody<'a> {
    prompt: &'a str,
    duration_seconds: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    reference_image_url: Option<&'a str>,
    metadata: RenderMetadata<'a>,
}

#[derive(Serialize)]
struct RenderMetadata<'a> {
    job_id: &'a str,
    candidate_index: u32,
    round: u32,
}

#[derive(Deserialize)]
struct SubmittedRender {
    id: String,
}

#[derive(Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum RenderState {
    Queued,
    Running,
    Succeeded,
    Failed,
}

#[derive(Deserialize)]
struct RenderStatus {
    status: RenderState,
    output_url: Option<String>,
    thumbnail_url: Option<String>,
    duration_seconds: Option<f64>,
    error: Option<String>,
}

fn retry_strategy() -> impl Iterator<Item = Duration> {
    ExponentialBackoff::from_millis(100).map(jitter).take(3)
}

/// Text-to-video provider speaking a submit-then-poll HTTP protocol.
pub struct HttpRenderClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    poll_interval: Duration,
}

impl HttpRenderClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Submits a render and polls until it settles. The caller bounds the total wait.
    pub async fn render(&self, request: &RenderRequest) -> Result<RenderedClip, AppError> {
        let submitted = Retry::spawn(retry_strategy(), || self.submit(request)).await?;

        debug!(
            job_id = %request.job_id,
            candidate_index = request.candidate_index,
            render_id = %submitted.id,
            "render submitted"
        );

        loop {
            let status = Retry::spawn(retry_strategy(), || self.poll(&submitted.id)).await?;
            match status.status {
                RenderState::Queued | RenderState::Running => {
                    tokio::time::sleep(self.poll_interval).await;
                }
                RenderState::Succeeded => {
                    let output_url = status.output_url.filter(|u| !u.is_empty()).ok_or_else(|| {
                        AppError::Provider(format!(
                            "render {} succeeded without an output url",
                            submitted.id
                        ))
                    })?;
                    return Ok(RenderedClip {
                        output_url,
                        thumbnail_url: status.thumbnail_url,
                        duration_seconds: status.duration_seconds,
                    });
                }
                RenderState::Failed => {
                    return Err(AppError::Provider(format!(
                        "render {} failed: {}",
                        submitted.id,
                        status.error.unwrap_or_else(|| "unknown error".into())
                    )));
                }
            }
        }
    }

    /// Downloads a finished clip or thumbnail. Credentials only go to the provider's own host.
    pub async fn download(&self, url: &str) -> Result<Bytes, AppError> {
        Retry::spawn(retry_strategy(), || self.fetch(url)).await
    }

    async fn fetch(&self, url: &str) -> Result<Bytes, AppError> {
        let api_key = self
            .api_key
            .as_deref()
            .filter(|_| url.starts_with(&self.base_url));
        let response = bearer(self.http.get(url), api_key).send().await?;

        Ok(ensure_success("render", response).await?.bytes().await?)
    }

    async fn submit(&self, request: &RenderRequest) -> Result<SubmittedRender, AppError> {
        let body = SubmitRenderBody {
            prompt: &request.prompt,
            duration_seconds: request.duration_seconds,
            reference_image_url: request.reference_image_url.as_deref(),
            metadata: RenderMetadata {
                job_id: &request.job_id,
                candidate_index: request.candidate_index,
                round: request.round,
            },
        };

        let response = bearer(
            self.http.post(format!("{}/v1/renders", self.base_url)),
            self.api_key.as_deref(),
        )
        .json(&body)
        .send()
        .await?;

        Ok(ensure_success("render", response).await?.json().await?)
    }

    async fn poll(&self, render_id: &str) -> Result<RenderStatus, AppError> {
        let response = bearer(
            self.http
                .get(format!("{}/v1/renders/{render_id}", self.base_url)),
            self.api_key.as_deref(),
        )
        .send()
        .await?;

        Ok(ensure_success("render", response).await?.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_body_omits_missing_reference() {
        let body = SubmitRenderBody {
            prompt: "a bottle on marble",
            duration_seconds: 6,
            reference_image_url: None,
            metadata: RenderMetadata {
                job_id: "job-1",
                candidate_index: 2,
                round: 0,
            },
        };

        let value = serde_json::to_value(&body).expect("serialize");
        assert!(value.get("reference_image_url").is_none());
        assert_eq!(value["metadata"]["candidate_index"], 2);
    }

    #[test]
    fn status_payload_parses() {
        let status: RenderStatus = serde_json::from_value(serde_json::json!({
            "status": "succeeded",
            "output_url": "https://render.example.com/r1.mp4",
            "duration_seconds": 6.0
        }))
        .expect("parse");

        assert_eq!(status.status, RenderState::Succeeded);
        assert!(status.thumbnail_url.is_none());
        assert!(status.error.is_none());
    }
}
