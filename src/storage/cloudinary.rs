use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use reqwest::{Client, multipart::{Form, Part}};
use serde::Deserialize;
use tracing::{error, info};

use crate::{
    config::CloudinaryCredentials,
    storage::{ObjectStorage, StorageError, StoredObject, object_key},
    utils::sha256_hex,
};

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Deserialize)]
struct UploadResult {
    secure_url: Option<String>,
    public_id: Option<String>,
}

// Cloudinary image storage
#[derive(Clone)]
pub struct CloudinaryStorage {
    client: Client,
    credentials: CloudinaryCredentials,
    api_base: String, // e.g. https://api.cloudinary.com
}

impl CloudinaryStorage {
    pub fn new(credentials: CloudinaryCredentials, api_base: &str) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(UPLOAD_TIMEOUT).build()?;

        Ok(Self {
            client,
            credentials,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    fn upload_url(&self) -> String {
        format!("{}/v1_1/{}/image/upload", self.api_base, self.credentials.cloud_name)
    }

    /// Signs upload parameters: sorted `key=value` pairs joined with `&`, followed by the secret.
    fn sign(&self, params: &[(&str, String)]) -> String {
        let mut sorted: Vec<_> = params.iter().collect();
        sorted.sort_by(|a, b| a.0.cmp(b.0));

        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        sha256_hex(&format!("{}{}", joined, self.credentials.api_secret))
    }
}

#[async_trait]
impl ObjectStorage for CloudinaryStorage {

    /// Uploads image bytes with a signed request; never overwrites an existing key
    async fn upload(&self, base_name: &str, content: Bytes) -> Result<StoredObject, StorageError> {
        let public_id = object_key(base_name);
        let params = vec![
            ("overwrite", "false".to_string()),
            ("public_id", public_id.clone()),
            ("timestamp", Utc::now().timestamp().to_string()),
        ];
        let signature = self.sign(&params);

        let file = Part::stream(content).file_name(format!("{}.png", base_name));
        let mut form = Form::new()
            .part("file", file)
            .text("api_key", self.credentials.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (key, value) in params {
            form = form.text(key, value);
        }

        let response = self.client
            .post(self.upload_url())
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                error!("Cloudinary upload request failed: {}", e);
                if e.is_timeout() {
                    StorageError::UploadError(format!("timed out after {}s", UPLOAD_TIMEOUT.as_secs()))
                } else {
                    StorageError::UploadError(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!("Cloudinary rejected upload of {}: {} {}", public_id, status, body);
            return Err(StorageError::Rejected { status, body });
        }

        let result: UploadResult = response
            .json()
            .await
            .map_err(|e| StorageError::UploadError(format!("invalid provider response: {}", e)))?;

        match (result.secure_url, result.public_id) {
            (Some(secure_url), Some(key)) if !secure_url.is_empty() && !key.is_empty() => {
                info!("Cloudinary uploaded: public_id={} secure_url={}", key, secure_url);
                Ok(StoredObject { secure_url, key })
            }
            _ => Err(StorageError::IncompleteResponse),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Json, Router, extract::Multipart, routing::post};
    use serde_json::{Value, json};
    use std::collections::HashMap;

    fn credentials() -> CloudinaryCredentials {
        CloudinaryCredentials {
            cloud_name: "demo".into(),
            api_key: "key".into(),
            api_secret: "secret".into(),
        }
    }

    async fn spawn(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{}", addr)
    }

    async fn text_fields(mut multipart: Multipart) -> HashMap<String, String> {
        let mut fields = HashMap::new();
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                let data = field.bytes().await.unwrap();
                fields.insert(name, String::from_utf8_lossy(&data).into_owned());
            } else {
                fields.insert(name, field.text().await.unwrap());
            }
        }
        fields
    }

    #[test]
    fn test_signature_over_sorted_params() {
        let storage = CloudinaryStorage::new(credentials(), "https://api.cloudinary.com").unwrap();
        let params = vec![
            ("timestamp", "1700000000".to_string()),
            ("public_id", "kolam/a".to_string()),
            ("overwrite", "false".to_string()),
        ];

        assert_eq!(
            storage.sign(&params),
            sha256_hex("overwrite=false&public_id=kolam/a&timestamp=1700000000secret")
        );
    }

    #[tokio::test]
    async fn test_upload_sends_signed_non_overwriting_request() {
        let app = Router::new().route(
            "/v1_1/demo/image/upload",
            post(|multipart: Multipart| async move {
                let fields = text_fields(multipart).await;
                Json(json!({
                    "secure_url": format!("https://res.cloudinary.com/demo/image/upload/{}.png", fields["public_id"]),
                    "public_id": fields["public_id"],
                    "overwrite": fields["overwrite"],
                    "api_key": fields["api_key"],
                    "file": fields["file"],
                    "has_signature": fields.contains_key("signature"),
                }))
            }),
        );
        let base = spawn(app).await;
        let storage = CloudinaryStorage::new(credentials(), &base).unwrap();

        let stored = storage
            .upload("kolam_1-19-1_traditional_1", Bytes::from_static(b"png-bytes"))
            .await
            .unwrap();

        assert_eq!(stored.key, "kolam/kolam_1-19-1_traditional_1");
        assert_eq!(
            stored.secure_url,
            "https://res.cloudinary.com/demo/image/upload/kolam/kolam_1-19-1_traditional_1.png"
        );
    }

    #[tokio::test]
    async fn test_upload_fields_are_forwarded() {
        let (tx, rx) = tokio::sync::oneshot::channel::<HashMap<String, String>>();
        let tx = std::sync::Arc::new(tokio::sync::Mutex::new(Some(tx)));
        let app = Router::new().route(
            "/v1_1/demo/image/upload",
            post(move |multipart: Multipart| {
                let tx = tx.clone();
                async move {
                    let fields = text_fields(multipart).await;
                    if let Some(tx) = tx.lock().await.take() {
                        let _ = tx.send(fields);
                    }
                    Json(json!({"secure_url": "https://res.cloudinary.com/x.png", "public_id": "kolam/x"}))
                }
            }),
        );
        let base = spawn(app).await;
        let storage = CloudinaryStorage::new(credentials(), &base).unwrap();

        storage.upload("x", Bytes::from_static(b"png-bytes")).await.unwrap();
        let fields = rx.await.unwrap();

        assert_eq!(fields["overwrite"], "false");
        assert_eq!(fields["public_id"], "kolam/x");
        assert_eq!(fields["api_key"], "key");
        assert_eq!(fields["signature_algorithm"], "sha256");
        assert_eq!(fields["file"], "png-bytes");
        assert_eq!(fields["signature"].len(), 64);
    }

    #[tokio::test]
    async fn test_missing_secure_url_is_failure() {
        let app = Router::new().route(
            "/v1_1/demo/image/upload",
            post(|| async { Json(json!({"public_id": "kolam/x"})) }),
        );
        let base = spawn(app).await;
        let storage = CloudinaryStorage::new(credentials(), &base).unwrap();

        let err = storage.upload("x", Bytes::from_static(b"png")).await.unwrap_err();
        assert!(matches!(err, StorageError::IncompleteResponse));
    }

    #[tokio::test]
    async fn test_provider_rejection_carries_status() {
        let app = Router::new().route(
            "/v1_1/demo/image/upload",
            post(|| async {
                (
                    axum::http::StatusCode::UNAUTHORIZED,
                    Json::<Value>(json!({"error": {"message": "Invalid Signature"}})),
                )
            }),
        );
        let base = spawn(app).await;
        let storage = CloudinaryStorage::new(credentials(), &base).unwrap();

        match storage.upload("x", Bytes::from_static(b"png")).await.unwrap_err() {
            StorageError::Rejected { status, body } => {
                assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED);
                assert!(body.contains("Invalid Signature"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
