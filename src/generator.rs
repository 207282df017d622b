//! Client for the external pattern generation service.
//!
//! The service exposes `POST /generate` (JSON parameters in, PNG bytes out)
//! and `GET /health`. Every call is attempted once and bounded by a timeout.

use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use reqwest::{Client, StatusCode, header};
use serde_json::json;
use thiserror::Error;
use tracing::{error, info};

use crate::{
    models::GenerationParams,
    utils::{is_png_content_type, sanitize_component},
};

pub const GENERATOR_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("call ml service: {0}")]
    Unreachable(String),

    #[error("ml service did not answer within {}s", GENERATOR_TIMEOUT.as_secs())]
    Timeout,

    #[error("ml service returned status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("unexpected content-type: {content_type}, body: {body}")]
    UnexpectedContentType { content_type: String, body: String },

    #[error("read response body: {0}")]
    Body(String),
}

impl From<reqwest::Error> for GeneratorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GeneratorError::Timeout
        } else {
            GeneratorError::Unreachable(err.to_string())
        }
    }
}

/// PNG bytes produced by the generator plus a suggested filename.
#[derive(Debug, Clone)]
pub struct GeneratedImage {
    pub data: Bytes,
    pub filename: String,
}

#[derive(Clone, Debug)]
pub struct PatternGenerator {
    client: Client,
    base_url: String,
}

impl PatternGenerator {
    pub fn new(base_url: &str) -> Result<Self, reqwest::Error> {
        Self::with_timeout(base_url, GENERATOR_TIMEOUT)
    }

    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Requests a pattern and validates that the answer is a PNG image.
    pub async fn generate(&self, params: &GenerationParams) -> Result<GeneratedImage, GeneratorError> {
        let response = self.client
            .post(format!("{}/generate", self.base_url))
            .header(header::ACCEPT, "image/png")
            .json(&json!({
                "grid_size": params.grid_size,
                "style": params.style,
            }))
            .send()
            .await
            .map_err(|e| {
                error!("ml service request failed: {}", e);
                GeneratorError::from(e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("ml service returned status {}: {}", status, body);
            return Err(GeneratorError::Status { status, body });
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        if !is_png_content_type(&content_type) {
            let body = response.text().await.unwrap_or_default();
            error!("ml service returned content-type {:?}", content_type);
            return Err(GeneratorError::UnexpectedContentType { content_type, body });
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| match GeneratorError::from(e) {
                GeneratorError::Timeout => GeneratorError::Timeout,
                other => GeneratorError::Body(other.to_string()),
            })?;

        let filename = suggested_filename(params, Utc::now().timestamp());
        info!("ml service generated {} ({} bytes)", filename, data.len());

        Ok(GeneratedImage { data, filename })
    }

    /// Probes the generator's own health endpoint.
    pub async fn health(&self) -> Result<(), GeneratorError> {
        let response = self.client
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GeneratorError::Status { status, body });
        }
        Ok(())
    }
}

/// `kolam_<grid>_<style>_<unix seconds>.png`
pub fn suggested_filename(params: &GenerationParams, unix_seconds: i64) -> String {
    format!(
        "kolam_{}_{}_{}.png",
        sanitize_component(&params.grid_size),
        sanitize_component(&params.style),
        unix_seconds
    )
}
