use std::{future::Future, sync::Arc, time::Duration};

use async_openai::{config::OpenAIConfig, Client};
use async_trait::async_trait;
use bytes::Bytes;
use common::{
    error::AppError,
    storage::types::{
        shot_plan::PromptVariant,
        video_candidate::{AxisScores, RenderedClip},
    },
    utils::config::AppConfig,
};

use crate::providers::{
    cutout::HttpCutoutClient, ffmpeg::FfmpegCompositor, openai::OpenAiShotPlanner,
    render::HttpRenderClient, vision::HttpVisionClient,
};

/// Cutout and alpha mask returned by the segmentation provider, both PNG encoded.
#[derive(Debug, Clone)]
pub struct ProductCutout {
    pub cutout_png: Bytes,
    pub mask_png: Bytes,
}

#[derive(Debug, Clone)]
pub struct ShotPlanRequest {
    pub brief: String,
    pub niche: String,
    pub duration_seconds: u32,
    pub variant: PromptVariant,
    pub allowed_context_tokens: Vec<String>,
    pub forbidden_actions: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub job_id: String,
    pub candidate_index: u32,
    pub round: u32,
    pub prompt: String,
    pub duration_seconds: u32,
    pub reference_image_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ScoreRequest {
    pub clip_url: String,
    pub reference_image_url: Option<String>,
    pub niche: String,
    pub duration_seconds: u32,
}

#[derive(Debug, Clone)]
pub struct CompositionRequest {
    pub cutout_png: Bytes,
    pub background_rgb: [u8; 3],
    pub duration_seconds: u32,
    pub width: u32,
    pub height: u32,
}

/// Encoded fallback output: an mp4 clip and a jpg thumbnail.
#[derive(Debug, Clone)]
pub struct ComposedMedia {
    pub video: Bytes,
    pub thumbnail: Bytes,
}

/// External collaborators of the pipeline. Every call may fail or time out.
#[async_trait]
pub trait PipelineServices: Send + Sync {
    async fn segment_product(&self, image_url: &str) -> Result<ProductCutout, AppError>;

    /// Returns the raw structured-output text; parsing and validation happen in the rewriter.
    async fn plan_shots(&self, request: &ShotPlanRequest) -> Result<String, AppError>;

    async fn render_clip(&self, request: &RenderRequest) -> Result<RenderedClip, AppError>;

    /// Fetches a rendered asset by url so the job output can live in object storage.
    async fn fetch_asset(&self, url: &str) -> Result<Bytes, AppError>;

    async fn score_clip(&self, request: &ScoreRequest) -> Result<AxisScores, AppError>;

    async fn compose_fallback(
        &self,
        request: &CompositionRequest,
    ) -> Result<ComposedMedia, AppError>;
}

/// Runs a provider call under a deadline; an elapsed deadline becomes `ProviderTimeout`.
pub async fn bounded<T, F>(provider: &str, limit: Duration, call: F) -> Result<T, AppError>
where
    F: Future<Output = Result<T, AppError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(AppError::ProviderTimeout(format!(
            "{provider} did not respond within {}s",
            limit.as_secs_f32()
        ))),
    }
}

pub struct DefaultPipelineServices {
    shot_planner: OpenAiShotPlanner,
    renderer: HttpRenderClient,
    vision: Option<HttpVisionClient>,
    cutout: Option<HttpCutoutClient>,
    compositor: FfmpegCompositor,
}

impl DefaultPipelineServices {
    pub fn new(
        openai_client: Arc<Client<OpenAIConfig>>,
        http: reqwest::Client,
        config: &AppConfig,
    ) -> Self {
        let vision = config.vision_api_url.as_deref().map(|url| {
            HttpVisionClient::new(http.clone(), url, config.vision_api_key.clone())
        });
        let cutout = config.cutout_api_url.as_deref().map(|url| {
            HttpCutoutClient::new(http.clone(), url, config.cutout_api_key.clone())
        });

        Self {
            shot_planner: OpenAiShotPlanner::new(openai_client, &config.rewrite_model),
            renderer: HttpRenderClient::new(
                http,
                &config.render_api_url,
                config.render_api_key.clone(),
            ),
            vision,
            cutout,
            compositor: FfmpegCompositor::new(&config.ffmpeg_path),
        }
    }
}

#[async_trait]
impl PipelineServices for DefaultPipelineServices {
    async fn segment_product(&self, image_url: &str) -> Result<ProductCutout, AppError> {
        let client = self
            .cutout
            .as_ref()
            .ok_or_else(|| AppError::Provider("no cutout provider configured".into()))?;
        client.segment(image_url).await
    }

    async fn plan_shots(&self, request: &ShotPlanRequest) -> Result<String, AppError> {
        self.shot_planner.plan(request).await
    }

    async fn render_clip(&self, request: &RenderRequest) -> Result<RenderedClip, AppError> {
        self.renderer.render(request).await
    }

    async fn fetch_asset(&self, url: &str) -> Result<Bytes, AppError> {
        self.renderer.download(url).await
    }

    async fn score_clip(&self, request: &ScoreRequest) -> Result<AxisScores, AppError> {
        let client = self
            .vision
            .as_ref()
            .ok_or_else(|| AppError::Provider("no vision provider configured".into()))?;
        client.score(request).await
    }

    async fn compose_fallback(
        &self,
        request: &CompositionRequest,
    ) -> Result<ComposedMedia, AppError> {
        self.compositor.compose(request).await
    }
}
