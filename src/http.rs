//! HTTP client for the cloud vision label-detection API.
//!
//! One request per photo: the image is base64-encoded into a
//! `LABEL_DETECTION` request and the returned labels are handed to the
//! keyword classifier in the order the service ranked them. Failures are
//! terminal for the call; the user retries by taking another photo.

use base64::Engine;
use log::{debug, info, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::classify::classify_scored;
use crate::{ClassifierConfig, ClassifyMode, Label, Result, WasteCategory, WasteMapError};

// ============================================================================
// Wire Types
// ============================================================================

#[derive(Debug, Serialize)]
struct AnnotateRequest {
    requests: Vec<ImageRequest>,
}

#[derive(Debug, Serialize)]
struct ImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Feature {
    #[serde(rename = "type")]
    kind: String,
    max_results: u32,
}

/// API response for the annotate endpoint
#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    label_annotations: Vec<LabelAnnotation>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct LabelAnnotation {
    description: String,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

fn build_request(image: &[u8], max_labels: u32) -> AnnotateRequest {
    let content = base64::engine::general_purpose::STANDARD.encode(image);
    AnnotateRequest {
        requests: vec![ImageRequest {
            image: ImageContent { content },
            features: vec![Feature {
                kind: "LABEL_DETECTION".to_string(),
                max_results: max_labels,
            }],
        }],
    }
}

/// Extract labels from an annotate response body.
fn parse_response(body: &str) -> Result<Vec<Label>> {
    let parsed: AnnotateResponse = serde_json::from_str(body)?;

    let Some(first) = parsed.responses.into_iter().next() else {
        return Ok(Vec::new());
    };

    if let Some(error) = first.error {
        return Err(WasteMapError::HttpError {
            message: format!("vision API error {}: {}", error.code, error.message),
            status_code: None,
        });
    }

    Ok(first
        .label_annotations
        .into_iter()
        .map(|a| Label {
            description: a.description,
            score: a.score,
        })
        .collect())
}

// ============================================================================
// Client
// ============================================================================

/// Label-detection client
pub struct VisionClient {
    client: Client,
    api_key: String,
    config: ClassifierConfig,
}

impl VisionClient {
    /// Create a new client with the given API key
    pub fn new(api_key: &str, config: ClassifierConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WasteMapError::HttpError {
                message: format!("Failed to create HTTP client: {}", e),
                status_code: None,
            })?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            config,
        })
    }

    /// Request labels for an image.
    pub async fn annotate(&self, image: &[u8]) -> Result<Vec<Label>> {
        let request = build_request(image, self.config.max_labels);
        let start = Instant::now();

        let response = self
            .client
            .post(&self.config.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                warn!("[VisionClient] Request failed: {}", e);
                WasteMapError::HttpError {
                    message: format!("Request error: {}", e),
                    status_code: None,
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!("[VisionClient] HTTP {}", status);
            return Err(WasteMapError::HttpError {
                message: format!("HTTP {}", status),
                status_code: Some(status.as_u16()),
            });
        }

        let body = response.text().await.map_err(|e| WasteMapError::HttpError {
            message: format!("Read error: {}", e),
            status_code: Some(status.as_u16()),
        })?;

        let labels = parse_response(&body)?;
        info!(
            "[VisionClient] {} labels in {:.2}s",
            labels.len(),
            start.elapsed().as_secs_f64()
        );
        Ok(labels)
    }

    /// Request labels and categorize them.
    pub async fn classify_image(
        &self,
        image: &[u8],
        mode: ClassifyMode,
    ) -> Result<Option<WasteCategory>> {
        let labels = self.annotate(image).await?;
        debug!("[VisionClient] Labels: {:?}", labels);
        Ok(classify_scored(&labels, mode, &self.config))
    }
}

/// Synchronous wrapper for FFI - runs the async call on a tokio runtime
#[cfg(feature = "ffi")]
pub fn classify_image_sync(
    api_key: &str,
    image: &[u8],
    mode: ClassifyMode,
    config: ClassifierConfig,
) -> Result<Option<WasteCategory>> {
    use tokio::runtime::Runtime;

    let rt = Runtime::new().map_err(|e| WasteMapError::HttpError {
        message: format!("Runtime error: {}", e),
        status_code: None,
    })?;
    let client = VisionClient::new(api_key, config)?;
    rt.block_on(client.classify_image(image, mode))
}
