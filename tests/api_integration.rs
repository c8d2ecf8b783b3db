//! End-to-end tests for the caption endpoint.
//!
//! The router is driven in-process with `oneshot`, and the real DashScope
//! client talks to a wiremock server instead of the live API.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::{json, Value};
use tower::util::ServiceExt;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use caption_relay::caption::CaptionService;
use caption_relay::compose::ENGLISH_DIRECTIVE;
use caption_relay::normalize::NormalizeOptions;
use caption_relay::postprocess::{CleanupOptions, MAX_CAPTION_CHARS};
use caption_relay::upstream::{DashScopeClient, UpstreamSettings};
use caption_relay::{build_router, AppState};

const BOUNDARY: &str = "caption-relay-test-boundary";

// ============================================================================
// Test Helpers
// ============================================================================

enum Part {
    File {
        content_type: &'static str,
        data: Vec<u8>,
    },
    Text {
        name: &'static str,
        value: String,
    },
}

fn multipart_body(parts: &[Part]) -> Vec<u8> {
    let mut body = Vec::new();
    for (idx, part) in parts.iter().enumerate() {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match part {
            Part::File { content_type, data } => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"images\"; filename=\"img{}.bin\"\r\nContent-Type: {}\r\n\r\n",
                        idx, content_type
                    )
                    .as_bytes(),
                );
                body.extend_from_slice(data);
            }
            Part::Text { name, value } => {
                body.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes(),
                );
                body.extend_from_slice(value.as_bytes());
            }
        }
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([120, 180, 90])));
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .expect("png encode");
    buf
}

fn image_part() -> Part {
    Part::File {
        content_type: "image/png",
        data: png(32, 24),
    }
}

fn envelope(text: &str) -> Value {
    json!({
        "output": {"choices": [{"finish_reason": "stop", "message": {"role": "assistant", "content": [{"text": text}]}}]},
        "usage": {"input_tokens": 100, "output_tokens": 20},
        "request_id": "test"
    })
}

fn app_for(base_url: &str, timeout: Duration) -> Router {
    app_with_limit(base_url, timeout, 64 * 1024 * 1024)
}

fn app_with_limit(base_url: &str, timeout: Duration, max_upload_bytes: usize) -> Router {
    let client = DashScopeClient::new(UpstreamSettings {
        api_url: format!("{}/generate", base_url),
        api_key: "test-key".to_string(),
        model: "qwen-vl-plus".to_string(),
        max_tokens: 200,
        temperature: 0.2,
        timeout,
    })
    .expect("client");
    let service = CaptionService::new(
        Arc::new(client),
        NormalizeOptions::default(),
        CleanupOptions::default(),
    );
    build_router(AppState {
        service: Arc::new(service),
        max_upload_bytes,
    })
}

async fn post_caption(app: Router, parts: &[Part]) -> (StatusCode, Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/generate-caption")
                .header(
                    "content-type",
                    format!("multipart/form-data; boundary={}", BOUNDARY),
                )
                .body(Body::from(multipart_body(parts)))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    (status, json)
}

async fn mock_upstream(template: ResponseTemplate) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/generate"))
        .and(header("authorization", "Bearer test-key"))
        .respond_with(template)
        .mount(&server)
        .await;
    server
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let app = app_for("http://127.0.0.1:9", Duration::from_secs(1));
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json, json!({"status": "ok"}));
}

// ============================================================================
// Input validation
// ============================================================================

#[tokio::test]
async fn test_no_images_is_bad_request() {
    let app = app_for("http://127.0.0.1:9", Duration::from_secs(1));
    let (status, json) = post_caption(
        app,
        &[Part::Text {
            name: "prompt",
            value: "hello".to_string(),
        }],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "No images uploaded");
}

#[tokio::test]
async fn test_ten_images_is_bad_request() {
    let app = app_for("http://127.0.0.1:9", Duration::from_secs(1));
    let parts: Vec<Part> = (0..10).map(|_| image_part()).collect();
    let (status, json) = post_caption(app, &parts).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "Too many images (max 9)");
}

#[tokio::test]
async fn test_oversized_body_is_payload_too_large() {
    let app = app_with_limit("http://127.0.0.1:9", Duration::from_secs(1), 1024);
    let (status, json) = post_caption(
        app,
        &[Part::File {
            content_type: "image/jpeg",
            data: vec![0xAB; 8 * 1024],
        }],
    )
    .await;
    assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(json["detail"].as_str().unwrap().starts_with("Invalid multipart body:"));
}

#[tokio::test]
async fn test_text_file_is_rejected() {
    let app = app_for("http://127.0.0.1:9", Duration::from_secs(1));
    let (status, json) = post_caption(
        app,
        &[Part::File {
            content_type: "text/plain",
            data: b"hello".to_vec(),
        }],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["detail"].as_str().unwrap().contains("text/plain"));
}

#[tokio::test]
async fn test_empty_file_is_rejected() {
    let app = app_for("http://127.0.0.1:9", Duration::from_secs(1));
    let (status, json) = post_caption(
        app,
        &[Part::File {
            content_type: "image/jpeg",
            data: Vec::new(),
        }],
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["detail"], "Empty file uploaded");
}

// ============================================================================
// Upstream round trips
// ============================================================================

#[tokio::test]
async fn test_caption_success() {
    let server = mock_upstream(
        ResponseTemplate::new(200).set_body_json(envelope("### 景物描述\n\n- **林间**小路铺满落叶\n- 阳光斑驳")),
    )
    .await;
    let app = app_for(&server.uri(), Duration::from_secs(5));

    let (status, json) = post_caption(app, &[image_part(), image_part()]).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["caption"], "在景物方面， 林间小路铺满落叶 阳光斑驳");

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(sent["model"], "qwen-vl-plus");
    assert_eq!(sent["parameters"]["max_tokens"], 200);
    let messages = sent["input"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["role"], "user");
    let content = messages[0]["content"].as_array().unwrap();
    assert_eq!(content.len(), 3);
    assert!(content[0]["image"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));
    assert!(content[2]["text"].is_string());
}

#[tokio::test]
async fn test_nine_images_are_accepted() {
    let server = mock_upstream(ResponseTemplate::new(200).set_body_json(envelope("九张照片"))).await;
    let app = app_for(&server.uri(), Duration::from_secs(5));

    let parts: Vec<Part> = (0..9).map(|_| image_part()).collect();
    let (status, json) = post_caption(app, &parts).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["caption"], "九张照片");

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let content = sent["input"]["messages"][0]["content"].as_array().unwrap();
    assert_eq!(content.len(), 10);
}

#[tokio::test]
async fn test_long_caption_is_one_bounded_line() {
    let long = "湖面泛着微光\n".repeat(80);
    let server = mock_upstream(ResponseTemplate::new(200).set_body_json(envelope(&long))).await;
    let app = app_for(&server.uri(), Duration::from_secs(5));

    let (status, json) = post_caption(app, &[image_part()]).await;
    assert_eq!(status, StatusCode::OK);
    let caption = json["caption"].as_str().unwrap();
    assert!(caption.chars().count() <= MAX_CAPTION_CHARS);
    assert!(!caption.contains('\n'));
}

#[tokio::test]
async fn test_english_prompt_goes_first_as_system_message() {
    let server = mock_upstream(
        ResponseTemplate::new(200).set_body_json(envelope("Golden light over a quiet lake.")),
    )
    .await;
    let app = app_for(&server.uri(), Duration::from_secs(5));

    let (status, json) = post_caption(
        app,
        &[
            image_part(),
            Part::Text {
                name: "prompt",
                value: "Write it in English".to_string(),
            },
        ],
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["caption"], "Golden light over a quiet lake.");

    let requests = server.received_requests().await.unwrap();
    let sent: Value = serde_json::from_slice(&requests[0].body).unwrap();
    let messages = sent["input"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0]["role"], "system");
    let system_text = messages[0]["content"][0]["text"].as_str().unwrap();
    assert!(system_text.ends_with(ENGLISH_DIRECTIVE));
    assert_eq!(messages[1]["role"], "user");
}

#[tokio::test]
async fn test_upstream_error_body_is_passed_through() {
    let server = mock_upstream(ResponseTemplate::new(500).set_body_string("server error")).await;
    let app = app_for(&server.uri(), Duration::from_secs(5));

    let (status, json) = post_caption(app, &[image_part()]).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    let detail = json["detail"].as_str().unwrap();
    assert!(detail.contains("server error"));
    assert!(detail.contains("500"));
}

#[tokio::test]
async fn test_upstream_timeout_is_gateway_timeout() {
    let server = mock_upstream(
        ResponseTemplate::new(200)
            .set_body_json(envelope("too late"))
            .set_delay(Duration::from_secs(3)),
    )
    .await;
    let app = app_for(&server.uri(), Duration::from_millis(200));

    let (status, json) = post_caption(app, &[image_part()]).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(json["detail"], "Upstream timeout");
}

#[tokio::test]
async fn test_malformed_envelope_is_bad_gateway() {
    let server = mock_upstream(
        ResponseTemplate::new(200).set_body_json(json!({"code": "x", "message": "unexpected"})),
    )
    .await;
    let app = app_for(&server.uri(), Duration::from_secs(5));

    let (status, json) = post_caption(app, &[image_part()]).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["detail"], "Unexpected upstream response format");
}

#[tokio::test]
async fn test_empty_upstream_text_is_bad_gateway() {
    let server = mock_upstream(ResponseTemplate::new(200).set_body_json(json!({
        "output": {"choices": [{"message": {"role": "assistant", "content": ""}}]}
    })))
    .await;
    let app = app_for(&server.uri(), Duration::from_secs(5));

    let (status, json) = post_caption(app, &[image_part()]).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(json["detail"], "Empty response from upstream");
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    // Reserve a port, then close it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let uri = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);
    let app = app_for(&uri, Duration::from_secs(5));

    let (status, json) = post_caption(app, &[image_part()]).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(json["detail"]
        .as_str()
        .unwrap()
        .starts_with("Upstream request failed:"));
}
