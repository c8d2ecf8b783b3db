use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::normalize::NormalizeError;
use crate::upstream::UpstreamError;

#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error("Upstream timeout")]
    UpstreamTimeout,
    #[error("Upstream request failed: {0}")]
    UpstreamUnavailable(String),
    #[error("Upstream error {status}: {body}")]
    UpstreamError { status: u16, body: String },
    #[error("Unexpected upstream response format")]
    MalformedUpstreamResponse,
    #[error("Empty response from upstream")]
    EmptyCaption,
    #[error("{0}")]
    Internal(String),
}

impl CaptionError {
    pub fn status(&self) -> StatusCode {
        match self {
            CaptionError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            CaptionError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            CaptionError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            CaptionError::UpstreamUnavailable(_)
            | CaptionError::UpstreamError { .. }
            | CaptionError::MalformedUpstreamResponse
            | CaptionError::EmptyCaption => StatusCode::BAD_GATEWAY,
            CaptionError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<NormalizeError> for CaptionError {
    fn from(e: NormalizeError) -> Self {
        CaptionError::InvalidInput(e.to_string())
    }
}

impl From<UpstreamError> for CaptionError {
    fn from(e: UpstreamError) -> Self {
        match e {
            UpstreamError::Timeout => CaptionError::UpstreamTimeout,
            UpstreamError::Unavailable(msg) => CaptionError::UpstreamUnavailable(msg),
            UpstreamError::Status { status, body } => CaptionError::UpstreamError { status, body },
            UpstreamError::Malformed => CaptionError::MalformedUpstreamResponse,
        }
    }
}

impl IntoResponse for CaptionError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(status = status.as_u16(), "caption request failed: {}", self);
        }
        (status, Json(json!({"detail": self.to_string()}))).into_response()
    }
}
