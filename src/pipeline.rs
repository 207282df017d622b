//! Image acquisition flows.
//!
//! Upload: bytes land on local disk first, then the metadata index is
//! updated. A failed index insert leaves the upload in place and is reported
//! as a warning.
//!
//! Generate: bytes come from the pattern generator and go straight to object
//! storage. Nothing is written locally or to the metadata index.

use tokio::io::AsyncRead;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    error::AppError,
    models::{GenerateResponse, GenerationParams, NewImage},
    state::AppState,
    storage::StorageError,
    utils::strip_extension,
};

pub const METADATA_WARNING: &str = "metadata save failed";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadOutcome {
    pub filename: String,
    pub url: String,
    pub id: Option<Uuid>,
    pub warning: Option<String>,
}

/// Stores an uploaded file locally and records its metadata.
pub async fn upload_image<R>(
    state: &AppState,
    original_name: &str,
    reader: &mut R,
) -> Result<UploadOutcome, AppError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    state.local.ensure_root().await.map_err(|e| {
        error!("Failed to create storage root {:?}: {}", state.local.root(), e);
        AppError::InternalServerError(format!("failed create storage: {}", e))
    })?;

    let filename = state.local.save(original_name, reader).await.map_err(|e| match e {
        StorageError::InvalidName(_) => AppError::from(e),
        other => {
            error!("Error saving upload {}: {}", original_name, other);
            AppError::InternalServerError(format!("failed to save file: {}", other))
        }
    })?;

    let image = NewImage::new(&filename);
    let url = image.url.clone();

    match state.metadata.insert(image).await {
        Ok(id) => {
            info!("File uploaded: {} ({})", filename, id);
            Ok(UploadOutcome { filename, url, id: Some(id), warning: None })
        }
        Err(e) => {
            // Bytes are already durable and served from `url`
            warn!("warning: failed save metadata for {}: {}", filename, e);
            Ok(UploadOutcome {
                filename,
                url,
                id: None,
                warning: Some(METADATA_WARNING.to_string()),
            })
        }
    }
}

/// Generates a pattern and hosts it in object storage.
pub async fn generate_and_host(
    state: &AppState,
    params: &GenerationParams,
) -> Result<GenerateResponse, AppError> {
    let storage = state
        .object_storage
        .as_ref()
        .ok_or(StorageError::NotConfigured)?;

    let image = state.generator.generate(params).await?;

    let base_name = strip_extension(&image.filename);
    let stored = storage.upload(base_name, image.data).await?;

    Ok(GenerateResponse {
        url: stored.secure_url,
        public_id: stored.key,
        filename: image.filename,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use axum::{Router, http::header, routing::post};
    use bytes::Bytes;

    use crate::{
        config::Config,
        database::{MetadataError, MetadataStore},
        generator::PatternGenerator,
        storage::{LocalDiskStore, ObjectStorage, StoredObject, object_key},
    };

    struct FixedIdStore(Uuid);

    #[async_trait]
    impl MetadataStore for FixedIdStore {
        async fn insert(&self, _image: NewImage) -> Result<Uuid, MetadataError> {
            Ok(self.0)
        }
    }

    struct FailingStore;

    #[async_trait]
    impl MetadataStore for FailingStore {
        async fn insert(&self, _image: NewImage) -> Result<Uuid, MetadataError> {
            Err(MetadataError::Timeout)
        }
    }

    #[derive(Default)]
    struct RecordingStorage {
        uploads: Mutex<Vec<(String, Bytes)>>,
    }

    #[async_trait]
    impl ObjectStorage for RecordingStorage {
        async fn upload(&self, base_name: &str, content: Bytes) -> Result<StoredObject, StorageError> {
            self.uploads.lock().unwrap().push((base_name.to_string(), content));
            Ok(StoredObject {
                secure_url: format!("https://res.cloudinary.com/demo/{}.png", object_key(base_name)),
                key: object_key(base_name),
            })
        }
    }

    fn config() -> Config {
        Config::from_lookup(|key| match key {
            "DATABASE_URL" => Some("postgres://localhost/kolam".to_string()),
            _ => None,
        })
        .unwrap()
    }

    fn state(
        root: &std::path::Path,
        metadata: Arc<dyn MetadataStore>,
        object_storage: Option<Arc<dyn ObjectStorage>>,
        generator_url: &str,
    ) -> AppState {
        AppState {
            metadata,
            object_storage,
            generator: PatternGenerator::new(generator_url).unwrap(),
            local: LocalDiskStore::new(root.join("ml_output")),
            http: reqwest::Client::new(),
            config: Arc::new(config()),
        }
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_upload_records_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let id = Uuid::new_v4();
        let state = state(dir.path(), Arc::new(FixedIdStore(id)), None, "http://127.0.0.1:9");

        let mut data: &[u8] = b"0123456789";
        let outcome = upload_image(&state, "a.png", &mut data).await.unwrap();

        assert_eq!(outcome.id, Some(id));
        assert!(outcome.warning.is_none());
        assert_eq!(outcome.url, format!("/images/{}", outcome.filename));
        assert_eq!(state.local.read(&outcome.filename).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_upload_survives_metadata_failure() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Arc::new(FailingStore), None, "http://127.0.0.1:9");

        let mut data: &[u8] = b"bytes";
        let outcome = upload_image(&state, "a.png", &mut data).await.unwrap();

        assert!(outcome.id.is_none());
        assert_eq!(outcome.warning.as_deref(), Some(METADATA_WARNING));
        assert_eq!(state.local.read(&outcome.filename).await.unwrap().as_ref(), b"bytes");
    }

    #[tokio::test]
    async fn test_generate_strips_extension_for_key() {
        let dir = tempfile::tempdir().unwrap();
        let generator = spawn(Router::new().route(
            "/generate",
            post(|| async { ([(header::CONTENT_TYPE, "image/png")], "png") }),
        ))
        .await;
        let storage = Arc::new(RecordingStorage::default());
        let state = state(dir.path(), Arc::new(FailingStore), Some(storage.clone() as Arc<dyn ObjectStorage>), &generator);

        let params = GenerationParams { grid_size: "1-19-1".into(), style: "traditional".into() };
        let response = generate_and_host(&state, &params).await.unwrap();

        let uploads = storage.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(format!("{}.png", uploads[0].0), response.filename);
        assert_eq!(response.public_id, format!("kolam/{}", uploads[0].0));
        // No local copy is kept
        assert!(!state.local.root().exists());
    }

    #[tokio::test]
    async fn test_generate_without_object_storage_fails_before_generating() {
        let dir = tempfile::tempdir().unwrap();
        let state = state(dir.path(), Arc::new(FailingStore), None, "http://127.0.0.1:9");

        let params = GenerationParams { grid_size: "1-19-1".into(), style: "traditional".into() };
        let err = generate_and_host(&state, &params).await.unwrap_err();
        assert!(matches!(err, AppError::InternalServerError(_)));
    }
}
