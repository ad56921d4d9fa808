pub mod cutout;
pub mod ffmpeg;
pub mod openai;
pub mod render;
pub mod vision;

use common::error::AppError;

fn bearer(builder: reqwest::RequestBuilder, api_key: Option<&str>) -> reqwest::RequestBuilder {
    match api_key {
        Some(key) => builder.bearer_auth(key),
        None => builder,
    }
}

/// Maps a non-2xx provider response to `AppError::Provider`, keeping a short body excerpt.
async fn ensure_success(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(200).collect();
    Err(AppError::Provider(format!(
        "{provider} provider returned {status}: {excerpt}"
    )))
}
