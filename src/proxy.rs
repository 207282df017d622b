use std::time::Duration;

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::Response,
};
use futures::TryStreamExt;
use reqwest::redirect::{Attempt, Policy};
use tracing::{error, warn};
use url::{Url, form_urlencoded};

use crate::error::AppError;

pub const PROXY_TIMEOUT: Duration = Duration::from_secs(20);
pub const PROXY_CACHE_CONTROL: &str = "public, max-age=3600";
const MAX_REDIRECTS: usize = 10;

/// First `u` value of a raw query string; later duplicates are ignored.
pub fn target_param(query: Option<&str>) -> Option<String> {
    form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .find(|(key, _)| key == "u")
        .map(|(_, value)| value.into_owned())
}

/// Parses a relay target and enforces the host allow-list.
/// Runs before any network access.
pub fn validate_target(raw: &str, allowed_hosts: &[String]) -> Result<Url, AppError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::BadRequest("missing u param".into()));
    }

    let parsed = Url::parse(trimmed).map_err(|_| AppError::BadRequest("invalid url".into()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(AppError::BadRequest("invalid url".into()));
    }
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| AppError::BadRequest("invalid url".into()))?
        .to_ascii_lowercase();

    if !is_allowed_host(&host, allowed_hosts) {
        warn!("Proxy request to disallowed host {}", host);
        return Err(AppError::Forbidden("only cloudinary host allowed".into()));
    }

    Ok(parsed)
}

/// Exact match or a subdomain of an allowed host.
pub fn is_allowed_host(host: &str, allowed_hosts: &[String]) -> bool {
    allowed_hosts.iter().any(|allowed| {
        host == allowed
            || host
                .strip_suffix(allowed.as_str())
                .is_some_and(|prefix| prefix.ends_with('.'))
    })
}

/// True when a redirect hop stays on an http(s) allow-listed host.
pub fn is_allowed_hop(url: &Url, allowed_hosts: &[String]) -> bool {
    matches!(url.scheme(), "http" | "https")
        && url
            .host_str()
            .is_some_and(|host| is_allowed_host(&host.to_ascii_lowercase(), allowed_hosts))
}

/// Client for the relay. Every redirect hop is held to the same allow-list
/// as the initial target; a hop elsewhere fails the fetch.
pub fn client_builder(allowed_hosts: Vec<String>) -> reqwest::ClientBuilder {
    let policy = Policy::custom(move |attempt: Attempt| {
        if !is_allowed_hop(attempt.url(), &allowed_hosts) {
            let refused = format!("redirect to disallowed host {}", attempt.url());
            warn!("Proxy {}", refused);
            attempt.error(refused)
        } else if attempt.previous().len() >= MAX_REDIRECTS {
            attempt.error("too many redirects")
        } else {
            attempt.follow()
        }
    });

    reqwest::Client::builder().redirect(policy)
}

/// Fetches `target` once and streams the upstream response back.
pub async fn relay(client: &reqwest::Client, target: Url) -> Result<Response, AppError> {
    let upstream = client
        .get(target.clone())
        .timeout(PROXY_TIMEOUT)
        .send()
        .await
        .map_err(|e| {
            error!("Proxy fetch of {} failed: {}", target, e);
            AppError::BadGateway(format!("fetch failed: {}", e))
        })?;

    let status = StatusCode::from_u16(upstream.status().as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let content_type = upstream.headers().get(reqwest::header::CONTENT_TYPE).cloned();

    let stream = upstream
        .bytes_stream()
        .inspect_err(move |e| warn!("Proxy stream from {} aborted: {}", target, e));

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;

    if let Some(content_type) = content_type {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static(PROXY_CACHE_CONTROL),
    );

    Ok(response)
}
