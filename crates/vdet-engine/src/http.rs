//! HTTP client for the inference sidecar.

use std::io::Cursor;
use std::time::Duration;

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use vdet_media::Frame;
use vdet_models::{BoundingBox, Detection};

use crate::engine::DetectionEngine;
use crate::error::{EngineError, EngineResult};

/// Configuration for the sidecar client.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Base URL of the inference service
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Max in-client retries for transient failures
    pub max_retries: u32,
    /// Detections below this confidence are dropped
    pub confidence_threshold: f32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8001".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 2,
            confidence_threshold: 0.25,
        }
    }
}

impl EngineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("ENGINE_URL").unwrap_or(defaults.base_url),
            timeout: Duration::from_secs(
                std::env::var("ENGINE_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            max_retries: std::env::var("ENGINE_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            confidence_threshold: std::env::var("ENGINE_CONFIDENCE_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.confidence_threshold),
        }
    }
}

/// Wire format of one detection from the sidecar.
#[derive(Debug, Deserialize)]
struct WireDetection {
    label: String,
    confidence: f32,
    bbox: [f32; 4],
}

#[derive(Debug, Deserialize)]
struct DetectResponse {
    detections: Vec<WireDetection>,
}

#[derive(Debug, Deserialize)]
struct HealthResponse {
    status: String,
}

/// Client for the inference sidecar service.
///
/// Frames go out as JPEG over multipart; detections come back as JSON with
/// pixel-coordinate boxes.
pub struct HttpEngine {
    http: Client,
    config: EngineConfig,
}

impl HttpEngine {
    /// Create a new engine client.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(EngineError::Network)?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> EngineResult<Self> {
        Self::new(EngineConfig::from_env())
    }

    fn encode_jpeg(frame: &Frame) -> EngineResult<Vec<u8>> {
        let mut buf = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buf, 90)
            .encode(&frame.data, frame.width, frame.height, image::ColorType::Rgb8)
            .map_err(|e| EngineError::FrameEncode(e.to_string()))?;
        Ok(buf.into_inner())
    }

    async fn post_frame(&self, jpeg: Vec<u8>, frame_index: u64) -> EngineResult<DetectResponse> {
        let url = format!("{}/detect", self.config.base_url);

        let part = Part::bytes(jpeg)
            .file_name(format!("frame-{}.jpg", frame_index))
            .mime_str("image/jpeg")
            .map_err(EngineError::Network)?;
        let form = Form::new().part("frame", part);

        let response = self
            .http
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(EngineError::Network)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(EngineError::Unavailable(format!(
                "engine returned {}",
                status
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::RequestFailed(format!(
                "engine returned {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }

    /// Execute with retry logic for transient failures.
    async fn with_retry<F, Fut, T>(&self, operation: F) -> EngineResult<T>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = EngineResult<T>>,
    {
        let mut last_error = None;

        for attempt in 0..=self.config.max_retries {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt < self.config.max_retries => {
                    let delay = Duration::from_millis(500 * 2u64.pow(attempt));
                    warn!(
                        "Engine request failed (attempt {}), retrying in {:?}: {}",
                        attempt + 1,
                        delay,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| EngineError::RequestFailed("Unknown error".to_string())))
    }
}

#[async_trait]
impl DetectionEngine for HttpEngine {
    async fn detect(&self, frame: &Frame) -> EngineResult<Vec<Detection>> {
        let jpeg = Self::encode_jpeg(frame)?;
        debug!(
            frame = frame.index,
            bytes = jpeg.len(),
            "Sending frame for inference"
        );

        let response = self
            .with_retry(|| self.post_frame(jpeg.clone(), frame.index))
            .await?;

        let detections = response
            .detections
            .into_iter()
            .filter(|d| d.confidence >= self.config.confidence_threshold)
            .map(|d| {
                Detection::new(
                    d.label,
                    d.confidence,
                    BoundingBox::new(d.bbox[0], d.bbox[1], d.bbox[2], d.bbox[3]),
                )
            })
            .collect();

        Ok(detections)
    }

    async fn health_check(&self) -> bool {
        let url = format!("{}/health", self.config.base_url);

        match self.http.get(&url).send().await {
            Ok(response) if response.status().is_success() => response
                .json::<HealthResponse>()
                .await
                .map(|h| h.status == "healthy" || h.status == "ok")
                .unwrap_or(false),
            Ok(response) => {
                warn!("Engine health check failed: {}", response.status());
                false
            }
            Err(e) => {
                warn!("Engine health check error: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn engine_for(server: &MockServer, threshold: f32) -> HttpEngine {
        HttpEngine::new(EngineConfig {
            base_url: server.uri(),
            timeout: Duration::from_secs(5),
            max_retries: 1,
            confidence_threshold: threshold,
        })
        .unwrap()
    }

    fn detect_body(dets: serde_json::Value) -> serde_json::Value {
        json!({ "detections": dets })
    }

    #[test]
    fn test_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.base_url, "http://localhost:8001");
        assert_eq!(config.max_retries, 2);
        assert!((config.confidence_threshold - 0.25).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_detect_parses_and_filters() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(detect_body(json!([
                { "label": "person", "confidence": 0.92, "bbox": [10.0, 20.0, 110.0, 220.0] },
                { "label": "cat", "confidence": 0.10, "bbox": [0.0, 0.0, 5.0, 5.0] }
            ]))))
            .mount(&server)
            .await;

        let engine = engine_for(&server, 0.25);
        let frame = Frame::black(0, 8, 8);
        let dets = engine.detect(&frame).await.unwrap();

        assert_eq!(dets.len(), 1);
        assert_eq!(dets[0].label, "person");
        assert!((dets[0].bbox.x2 - 110.0).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_empty_detections_is_ok() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(detect_body(json!([]))))
            .mount(&server)
            .await;

        let engine = engine_for(&server, 0.25);
        let dets = engine.detect(&Frame::black(3, 8, 8)).await.unwrap();
        assert!(dets.is_empty());
    }

    #[tokio::test]
    async fn test_retries_after_transient_5xx() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(200).set_body_json(detect_body(json!([]))))
            .mount(&server)
            .await;

        let engine = engine_for(&server, 0.25);
        let dets = engine.detect(&Frame::black(0, 8, 8)).await.unwrap();
        assert!(dets.is_empty());
    }

    #[tokio::test]
    async fn test_4xx_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/detect"))
            .respond_with(ResponseTemplate::new(422).set_body_string("bad frame"))
            .expect(1)
            .mount(&server)
            .await;

        let engine = engine_for(&server, 0.25);
        let err = engine.detect(&Frame::black(0, 8, 8)).await.unwrap_err();
        assert!(matches!(err, EngineError::RequestFailed(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_health_check() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/health"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
            .mount(&server)
            .await;

        let engine = engine_for(&server, 0.25);
        assert!(engine.health_check().await);
    }
}
