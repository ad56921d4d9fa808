use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use common::error::AppError;
use serde::{Deserialize, Serialize};

use super::{bearer, ensure_success};
use crate::pipeline::ProductCutout;

#[derive(Serialize)]
struct CutoutBody<'a> {
    image_url: &'a str,
}

#[derive(Deserialize)]
struct CutoutResponse {
    cutout_png_base64: String,
    mask_png_base64: String,
}

/// Background removal provider returning a transparent cutout and its alpha mask.
pub struct HttpCutoutClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCutoutClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    pub async fn segment(&self, image_url: &str) -> Result<ProductCutout, AppError> {
        let response = bearer(
            self.http.post(format!("{}/v1/cutout", self.base_url)),
            self.api_key.as_deref(),
        )
        .json(&CutoutBody { image_url })
        .send()
        .await?;

        let payload: CutoutResponse = ensure_success("cutout", response).await?.json().await?;
        decode(payload)
    }
}

fn decode(payload: CutoutResponse) -> Result<ProductCutout, AppError> {
    let decode_field = |name: &str, value: &str| {
        STANDARD
            .decode(value.trim())
            .map(Bytes::from)
            .map_err(|e| AppError::Provider(format!("cutout provider sent invalid {name}: {e}")))
    };

    let cutout_png = decode_field("cutout", &payload.cutout_png_base64)?;
    let mask_png = decode_field("mask", &payload.mask_png_base64)?;
    if cutout_png.is_empty() || mask_png.is_empty() {
        return Err(AppError::Provider(
            "cutout provider returned an empty image".into(),
        ));
    }

    Ok(ProductCutout {
        cutout_png,
        mask_png,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_payload() {
        let payload = CutoutResponse {
            cutout_png_base64: STANDARD.encode(b"cutout-bytes"),
            mask_png_base64: STANDARD.encode(b"mask-bytes"),
        };

        let decoded = decode(payload).expect("decode");
        assert_eq!(decoded.cutout_png, Bytes::from_static(b"cutout-bytes"));
        assert_eq!(decoded.mask_png, Bytes::from_static(b"mask-bytes"));
    }

    #[test]
    fn rejects_invalid_and_empty_payloads() {
        let invalid = CutoutResponse {
            cutout_png_base64: "%%%".into(),
            mask_png_base64: STANDARD.encode(b"mask"),
        };
        assert!(matches!(decode(invalid), Err(AppError::Provider(_))));

        let empty = CutoutResponse {
            cutout_png_base64: String::new(),
            mask_png_base64: STANDARD.encode(b"mask"),
        };
        assert!(matches!(decode(empty), Err(AppError::Provider(_))));
    }
}
