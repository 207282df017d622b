use std::sync::Arc;

use crate::config::Config;
use crate::database::MetadataStore;
use crate::generator::PatternGenerator;
use crate::storage::{LocalDiskStore, ObjectStorage};

/// Central application state shared across all Axum handlers.
///
/// Built once at startup; nothing in here is mutated afterwards.
#[derive(Clone)]
pub struct AppState {
    /// Index of uploaded images.
    pub metadata: Arc<dyn MetadataStore>,

    /// Remote storage for generated images; `None` when no credentials were configured.
    pub object_storage: Option<Arc<dyn ObjectStorage>>,

    /// Client for the external pattern generation service.
    pub generator: PatternGenerator,

    /// Directory-backed store for uploads.
    pub local: LocalDiskStore,

    /// HTTP client used by the proxy relay.
    pub http: reqwest::Client,

    /// Application configuration loaded from environment variables or `.env`.
    pub config: Arc<Config>,
}
