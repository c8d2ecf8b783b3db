use std::sync::Arc;

use tracing::{debug, info};

use crate::compose::compose_instructions;
use crate::error::CaptionError;
use crate::models::{CaptionRequest, CaptionUpload};
use crate::normalize::{normalize_all, NormalizeOptions};
use crate::postprocess::{postprocess, CleanupOptions};
use crate::upstream::UpstreamCaptioner;

pub const MAX_IMAGES: usize = 9;

/// The request pipeline: validate, normalize, compose, call upstream, clean.
pub struct CaptionService {
    upstream: Arc<dyn UpstreamCaptioner>,
    normalize: NormalizeOptions,
    cleanup: CleanupOptions,
}

impl CaptionService {
    pub fn new(
        upstream: Arc<dyn UpstreamCaptioner>,
        normalize: NormalizeOptions,
        cleanup: CleanupOptions,
    ) -> Self {
        Self {
            upstream,
            normalize,
            cleanup,
        }
    }

    pub async fn generate(&self, upload: CaptionUpload) -> Result<String, CaptionError> {
        let request = self.prepare(upload).await?;
        let instructions = compose_instructions(request.prompt.as_deref());

        let raw = self
            .upstream
            .generate(
                &request.images,
                instructions.system.as_deref(),
                &instructions.user,
            )
            .await?;

        if raw.is_empty() {
            return Err(CaptionError::EmptyCaption);
        }
        debug!("raw upstream text: {} chars", raw.chars().count());

        let caption = postprocess(&raw, &self.cleanup);
        info!(chars = caption.chars().count(), "caption generated");
        Ok(caption)
    }

    /// Check the image count and normalize every upload in order.
    async fn prepare(&self, upload: CaptionUpload) -> Result<CaptionRequest, CaptionError> {
        let CaptionUpload { images, prompt } = upload;

        if images.is_empty() {
            return Err(CaptionError::InvalidInput("No images uploaded".to_string()));
        }
        if images.len() > MAX_IMAGES {
            return Err(CaptionError::InvalidInput(format!(
                "Too many images (max {})",
                MAX_IMAGES
            )));
        }

        let opts = self.normalize;
        let encoded = tokio::task::spawn_blocking(move || normalize_all(&images, &opts))
            .await
            .map_err(|e| CaptionError::Internal(format!("image normalization panicked: {}", e)))??;

        Ok(CaptionRequest {
            images: encoded,
            prompt,
        })
    }
}
