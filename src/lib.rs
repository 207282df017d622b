pub mod config;
pub mod database;
pub mod error;
pub mod generator;
pub mod handlers;
pub mod models;
pub mod pipeline;
pub mod proxy;
pub mod state;
pub mod storage;
pub mod utils;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    http::{HeaderValue, Method, header},
    routing::{get, post},
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::warn;

use crate::{handlers::*, state::AppState};

/// Upper bound for a multipart upload body.
pub const MAX_UPLOAD_BYTES: usize = 32 << 20;

/// CORS policy for the configured origin list (`*` allows any origin).
pub fn cors_layer(allow_origins: &str) -> CorsLayer {
    let origin = if allow_origins.trim() == "*" {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = allow_origins
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .filter_map(|s| match HeaderValue::from_str(s) {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!("Ignoring invalid origin {:?}", s);
                    None
                }
            })
            .collect();
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

/// Builds the full HTTP surface over `state`.
pub fn app(state: AppState) -> Router {
    let cors = cors_layer(&state.config.allow_origins);

    Router::new()
        .route("/", get(health))
        .route("/images/", get(missing_image_name))
        .route("/images/{*name}", get(serve_image))
        .route(
            "/upload",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/generate-kolam", post(generate_kolam))
        .route("/ml-health", get(ml_health))
        .route("/proxy", get(proxy_image))
        .fallback(not_found)
        .method_not_allowed_fallback(method_not_allowed)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
