use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;
use chrono::{DateTime, Utc};
use uuid::Uuid;

pub const DEFAULT_GRID_SIZE: &str = "1-19-1";
pub const DEFAULT_STYLE: &str = "traditional";

/// Index entry for an image held in local storage.
#[derive(Debug, Serialize, Deserialize, FromRow)]
pub struct ImageRecord {
    pub id: Uuid,
    pub filename: String,
    pub url: String,
    // Never populated by the current flows
    pub width: Option<i32>,
    pub height: Option<i32>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied by the caller when inserting an `ImageRecord`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewImage {
    pub filename: String,
    pub url: String,
    pub width: Option<i32>,
    pub height: Option<i32>,
}

impl NewImage {
    pub fn new(filename: &str) -> Self {
        Self {
            filename: filename.to_string(),
            url: format!("/images/{}", filename),
            width: None,
            height: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct GenerateRequest {
    pub grid_size: Option<String>,
    pub style: Option<String>,
}

/// Generation parameters with defaults resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GenerationParams {
    pub grid_size: String,
    pub style: String,
}

impl From<GenerateRequest> for GenerationParams {
    fn from(req: GenerateRequest) -> Self {
        let or_default = |value: Option<String>, default: &str| {
            value
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        Self {
            grid_size: or_default(req.grid_size, DEFAULT_GRID_SIZE),
            style: or_default(req.style, DEFAULT_STYLE),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateResponse {
    pub url: String,
    pub public_id: String,
    pub filename: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MlHealthResponse {
    pub status: String,
    pub ml_service_url: String,
}
