//! Semantic frame analyzer
//!
//! An optional external service looks at a sampled frame and reports how
//! stimulating its content is. The pipeline adds half of the reported score
//! to the engagement score as a one-shot spike.

use crate::error::{Error, Result};
use crate::features::FrameBuffer;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// JPEG quality for frames sent to the analyzer
pub const JPEG_QUALITY: u8 = 50;

/// Analyzer verdict for one frame
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub score: f64,
    pub reason: Option<String>,
}

#[async_trait]
pub trait SemanticAnalyzer: Send + Sync {
    async fn analyze(&self, frame: &FrameBuffer) -> Result<Analysis>;
}

/// Encode a frame as a `data:image/jpeg;base64,` URL (alpha dropped)
pub fn encode_data_url(frame: &FrameBuffer) -> Result<String> {
    if !frame.is_valid() {
        return Err(Error::Analyzer(format!(
            "cannot encode invalid {}x{} frame",
            frame.width(),
            frame.height()
        )));
    }

    let img = RgbImage::from_raw(frame.width(), frame.height(), frame.to_rgb())
        .ok_or_else(|| Error::Analyzer("frame buffer size mismatch".to_string()))?;

    let mut buffer = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut buffer, ImageOutputFormat::Jpeg(JPEG_QUALITY))
        .map_err(|e| Error::Analyzer(format!("JPEG encoding failed: {}", e)))?;

    Ok(format!(
        "data:image/jpeg;base64,{}",
        STANDARD.encode(buffer.into_inner())
    ))
}

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    image: &'a str,
}

#[derive(Debug, Deserialize)]
struct AnalyzeResponse {
    success: bool,
    #[serde(default)]
    data: Option<AnalyzeData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnalyzeData {
    score: f64,
    #[serde(default)]
    reason: Option<String>,
}

fn parse_response(body: AnalyzeResponse) -> Result<Analysis> {
    if !body.success {
        return Err(Error::Analyzer(
            body.error
                .unwrap_or_else(|| "analyzer reported failure".to_string()),
        ));
    }

    let data = body
        .data
        .ok_or_else(|| Error::Analyzer("analyzer response missing data".to_string()))?;

    Ok(Analysis {
        score: data.score,
        reason: data.reason,
    })
}

/// Analyzer reached over HTTP (`POST {base}/api/analyze-frame`)
pub struct HttpAnalyzer {
    http_client: reqwest::Client,
    endpoint: String,
}

impl HttpAnalyzer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Analyzer(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/api/analyze-frame", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl SemanticAnalyzer for HttpAnalyzer {
    async fn analyze(&self, frame: &FrameBuffer) -> Result<Analysis> {
        let image = encode_data_url(frame)?;
        debug!(bytes = image.len(), "Sending frame to analyzer");

        let response = self
            .http_client
            .post(&self.endpoint)
            .json(&AnalyzeRequest { image: &image })
            .send()
            .await
            .map_err(|e| Error::Analyzer(format!("Network error: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(Error::Analyzer(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_text
            )));
        }

        let body: AnalyzeResponse = response
            .json()
            .await
            .map_err(|e| Error::Analyzer(format!("Invalid analyzer response: {}", e)))?;

        parse_response(body)
    }
}
