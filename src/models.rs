use serde::Serialize;

/// One uploaded file as received from the multipart body.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// Base64 payload of a normalized image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage(pub String);

impl EncodedImage {
    pub fn as_base64(&self) -> &str {
        &self.0
    }

    pub fn to_data_uri(&self) -> String {
        format!("data:image/jpeg;base64,{}", self.as_base64())
    }
}

/// Raw form fields of a caption request, before normalization.
#[derive(Debug, Clone, Default)]
pub struct CaptionUpload {
    pub images: Vec<UploadedImage>,
    pub prompt: Option<String>,
}

/// Normalized images plus the caller's prompt, ready for composition.
#[derive(Debug, Clone)]
pub struct CaptionRequest {
    pub images: Vec<EncodedImage>,
    pub prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CaptionResponse {
    pub caption: String,
}
