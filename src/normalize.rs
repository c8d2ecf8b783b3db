//! Image normalization: uploaded bytes → bounded JPEG → base64.
//!
//! Each upload is downscaled so its longer side fits `max_side`, then
//! re-encoded as JPEG. Anything the decoder or encoder rejects is forwarded
//! untouched; only the content type and emptiness checks can fail.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{codecs::jpeg::JpegEncoder, imageops::FilterType, DynamicImage};
use tracing::debug;

use crate::models::{EncodedImage, UploadedImage};

pub const DEFAULT_MAX_SIDE: u32 = 1280;
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Debug, thiserror::Error)]
pub enum NormalizeError {
    #[error("Unsupported file type: {}", .0.as_deref().unwrap_or("None"))]
    UnsupportedMediaType(Option<String>),
    #[error("Empty file uploaded")]
    EmptyPayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizeOptions {
    pub max_side: u32,
    pub jpeg_quality: u8,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            max_side: DEFAULT_MAX_SIDE,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

pub fn normalize_image(
    upload: &UploadedImage,
    opts: &NormalizeOptions,
) -> Result<EncodedImage, NormalizeError> {
    let is_image = upload
        .content_type
        .as_deref()
        .is_some_and(|ct| ct.starts_with("image/"));
    if !is_image {
        return Err(NormalizeError::UnsupportedMediaType(upload.content_type.clone()));
    }
    if upload.data.is_empty() {
        return Err(NormalizeError::EmptyPayload);
    }

    let bytes = compress_image_bytes(&upload.data, opts);
    Ok(EncodedImage(STANDARD.encode(bytes)))
}

/// Normalize a whole upload set in order, stopping at the first rejection.
pub fn normalize_all(
    uploads: &[UploadedImage],
    opts: &NormalizeOptions,
) -> Result<Vec<EncodedImage>, NormalizeError> {
    uploads.iter().map(|u| normalize_image(u, opts)).collect()
}

/// Downscale and re-encode to JPEG, or hand back the input on any failure.
pub fn compress_image_bytes(data: &[u8], opts: &NormalizeOptions) -> Vec<u8> {
    match try_compress(data, opts) {
        Ok(out) => {
            debug!("Compressed image {} → {} bytes", data.len(), out.len());
            out
        }
        Err(e) => {
            debug!("Image compression skipped, forwarding original bytes: {}", e);
            data.to_vec()
        }
    }
}

fn try_compress(data: &[u8], opts: &NormalizeOptions) -> Result<Vec<u8>, image::ImageError> {
    let img = image::load_from_memory(data)?;

    // JPEG takes RGB or 8-bit grayscale; everything else goes through RGB.
    let img = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => img,
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };

    let img = if img.width().max(img.height()) > opts.max_side {
        img.resize(opts.max_side, opts.max_side, FilterType::Lanczos3)
    } else {
        img
    };

    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buf, opts.jpeg_quality);
    img.write_with_encoder(encoder)?;
    Ok(buf)
}
