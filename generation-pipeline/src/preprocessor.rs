use std::time::Duration;

use common::{
    error::AppError,
    storage::{
        db::SurrealDbClient,
        store::StorageManager,
        types::{product::Product, video_job::ProductAssets, video_job::VideoJob},
    },
};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument};

use crate::pipeline::{bounded, PipelineServices};

/// Stable storage prefix for everything derived from one product image.
pub fn asset_key(image_ref: &str) -> String {
    let digest = Sha256::digest(image_ref.trim().as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn cutout_location(image_ref: &str) -> String {
    format!("products/{}/cutout.png", asset_key(image_ref))
}

pub fn mask_location(image_ref: &str) -> String {
    format!("products/{}/mask.png", asset_key(image_ref))
}

/// The image the job should be anchored to: the explicit reference, else the catalog image.
pub async fn resolve_reference_image(
    job: &VideoJob,
    db: &SurrealDbClient,
) -> Result<Option<String>, AppError> {
    if let Some(image_ref) = job
        .product_image_ref
        .as_deref()
        .filter(|r| !r.trim().is_empty())
    {
        return Ok(Some(image_ref.to_string()));
    }

    match job.product_id.as_deref() {
        Some(product_id) => Product::image_url_for(db, &job.tenant_id, product_id).await,
        None => Ok(None),
    }
}

/// Produces the cutout and mask for `image_ref` and writes them to their deterministic locations.
///
/// Repeated calls for the same reference overwrite the same objects.
#[instrument(level = "trace", skip_all, fields(image_ref = %image_ref))]
pub async fn prepare(
    image_ref: &str,
    services: &dyn PipelineServices,
    storage: &StorageManager,
    timeout: Duration,
) -> Result<ProductAssets, AppError> {
    let cutout = bounded("cutout provider", timeout, services.segment_product(image_ref)).await?;

    let cutout_location = cutout_location(image_ref);
    let mask_location = mask_location(image_ref);
    storage.put(&cutout_location, cutout.cutout_png).await?;
    storage.put(&mask_location, cutout.mask_png).await?;

    debug!(%cutout_location, %mask_location, "product cutout stored");

    Ok(ProductAssets {
        source_image_url: image_ref.to_string(),
        cutout_url: storage.public_url(&cutout_location),
        mask_url: storage.public_url(&mask_location),
        cutout_location,
        mask_location,
    })
}
