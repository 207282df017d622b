// Local disk persistence for uploads and remote object storage for generated images
pub mod local;
pub mod cloudinary;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::StatusCode;
use thiserror::Error;

pub use cloudinary::CloudinaryStorage;
pub use local::LocalDiskStore;

/// Namespace for every generated image key in object storage.
pub const OBJECT_KEY_PREFIX: &str = "kolam";

// Storage error types
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid filename: {0}")]
    InvalidName(String),

    #[error("Io Error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Upload Error: {0}")]
    UploadError(String), // Network or timeout failure talking to the provider

    #[error("Provider rejected upload (status {status}): {body}")]
    Rejected { status: StatusCode, body: String },

    #[error("Provider response is missing the URL or storage key")]
    IncompleteResponse,

    #[error("Object storage is not configured")]
    NotConfigured,
}

/// Location of an object after a successful upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub secure_url: String,
    pub key: String,
}

/// Remote object storage for publicly retrievable blobs.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Upload `content` under `<OBJECT_KEY_PREFIX>/<base_name>`.
    /// Existing objects under the same key are never overwritten.
    async fn upload(&self, base_name: &str, content: Bytes) -> Result<StoredObject, StorageError>;
}

/// Full object key for a base name.
pub fn object_key(base_name: &str) -> String {
    format!("{}/{}", OBJECT_KEY_PREFIX, base_name)
}
