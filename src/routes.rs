use std::sync::Arc;

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;

use crate::caption::CaptionService;
use crate::error::CaptionError;
use crate::models::{CaptionResponse, CaptionUpload, UploadedImage};

const IMAGES_FIELD: &str = "images";
const PROMPT_FIELD: &str = "prompt";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<CaptionService>,
    pub max_upload_bytes: usize,
}

pub fn build_router(state: AppState) -> Router {
    let limit = state.max_upload_bytes;
    Router::new()
        .route("/health", get(health))
        .route("/v1/generate-caption", post(generate_caption))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

async fn generate_caption(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<CaptionResponse>, CaptionError> {
    let upload = read_upload(multipart).await?;
    tracing::info!(
        images = upload.images.len(),
        has_prompt = upload.prompt.is_some(),
        "caption request received"
    );
    let caption = state.service.generate(upload).await?;
    Ok(Json(CaptionResponse { caption }))
}

/// Collect `images` file parts and the optional `prompt` text part.
async fn read_upload(mut multipart: Multipart) -> Result<CaptionUpload, CaptionError> {
    let mut upload = CaptionUpload::default();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            IMAGES_FIELD => {
                let content_type = field.content_type().map(str::to_string);
                let data = field.bytes().await.map_err(multipart_error)?;
                upload.images.push(UploadedImage {
                    data: data.to_vec(),
                    content_type,
                });
            }
            PROMPT_FIELD => {
                let text = field.text().await.map_err(multipart_error)?;
                if !text.trim().is_empty() {
                    upload.prompt = Some(text);
                }
            }
            other => tracing::debug!("ignoring multipart field {:?}", other),
        }
    }

    Ok(upload)
}

/// Body-limit overruns keep their 413; everything else is a bad request.
fn multipart_error(e: MultipartError) -> CaptionError {
    let detail = format!("Invalid multipart body: {}", e.body_text());
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        CaptionError::PayloadTooLarge(detail)
    } else {
        CaptionError::InvalidInput(detail)
    }
}
