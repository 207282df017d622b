use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, RawQuery, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use crate::{
    error::AppError,
    generator::GeneratorError,
    models::*,
    pipeline,
    proxy,
    state::AppState,
    utils::{client_file_name, content_type_for, is_safe_name},
};

pub const SERVICE_NAME: &str = "kolam-backend-prototype";

fn multipart_error(e: MultipartError) -> AppError {
    error!("Error parsing multipart: {}", e);
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("failed parse multipart: {}", e))
    } else {
        AppError::BadRequest(format!("failed parse multipart: {}", e))
    }
}

/// Liveness probe.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        service: SERVICE_NAME.to_string(),
    })
}

/// Stream back a locally stored image by exact name.
pub async fn serve_image(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, AppError> {
    if name.is_empty() {
        return Err(AppError::BadRequest("image name required".into()));
    }
    if !is_safe_name(&name) {
        return Err(AppError::BadRequest("invalid filename".into()));
    }

    let content = state.local.read(&name).await?;

    Ok((
        [(header::CONTENT_TYPE, content_type_for(&name))],
        content,
    ).into_response())
}

/// Fallback for `/images/` with no name.
pub async fn missing_image_name() -> AppError {
    AppError::BadRequest("image name required".into())
}

/// Upload a file using multipart/form-data (field `file`).
pub async fn upload_image(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut upload: Option<(String, Bytes)> = None;

    // Every field is consumed before anything touches the disk
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") || upload.is_some() {
            continue;
        }
        let raw_name = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await.map_err(multipart_error)?;
        upload = Some((raw_name, data));
    }

    let (raw_name, data) = upload
        .ok_or_else(|| AppError::BadRequest("missing file form field 'file'".into()))?;
    let original_name = client_file_name(&raw_name)
        .ok_or_else(|| AppError::BadRequest("missing file form field 'file': no filename".into()))?;

    let mut reader: &[u8] = &data;
    let outcome = pipeline::upload_image(&state, &original_name, &mut reader).await?;

    Ok(Json(UploadResponse {
        url: outcome.url,
        id: outcome.id,
        warning: outcome.warning,
    }))
}

/// Generate a pattern and host it in object storage.
/// An empty body applies every default.
pub async fn generate_kolam(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<GenerateResponse>, AppError> {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        GenerateRequest::default()
    } else {
        serde_json::from_slice::<GenerateRequest>(&body).map_err(|e| {
            warn!("Invalid generate request body: {}", e);
            AppError::BadRequest("invalid request body".into())
        })?
    };

    let params = GenerationParams::from(request);
    let response = pipeline::generate_and_host(&state, &params).await?;
    Ok(Json(response))
}

/// Probe the pattern generator's health endpoint.
pub async fn ml_health(State(state): State<AppState>) -> Result<Json<MlHealthResponse>, AppError> {
    state.generator.health().await.map_err(|e| match e {
        GeneratorError::Status { status, .. } => {
            AppError::ServiceUnavailable(format!("ML service returned non-OK status: {}", status.as_u16()))
        }
        other => AppError::ServiceUnavailable(format!("ML service is not reachable: {}", other)),
    })?;

    Ok(Json(MlHealthResponse {
        status: "ML service is connected and healthy".to_string(),
        ml_service_url: state.generator.base_url().to_string(),
    }))
}

/// Relay bytes from an allow-listed host.
pub async fn proxy_image(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Response, AppError> {
    let raw = proxy::target_param(query.as_deref()).unwrap_or_default();
    let target = proxy::validate_target(&raw, &state.config.proxy_allowed_hosts)?;
    proxy::relay(&state.http, target).await
}

/// Plain-text 405 for known paths hit with the wrong method.
pub async fn method_not_allowed() -> AppError {
    AppError::MethodNotAllowed("method not allowed".into())
}

/// Plain-text 404 for unknown paths.
pub async fn not_found() -> AppError {
    AppError::NotFound("not found".into())
}
