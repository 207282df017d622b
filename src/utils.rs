use std::path::Path;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

/// Stored filename for an upload: `<UTC timestamp>_<original name>`.
pub fn timestamped_filename(now: DateTime<Utc>, original: &str) -> String {
    format!("{}_{}", now.format("%Y%m%dT%H%M%SZ"), original)
}

/// Reduces a client-supplied filename to its last path component.
/// Returns `None` for names that cannot be stored safely.
pub fn client_file_name(raw: &str) -> Option<String> {
    let last = raw.rsplit(['/', '\\']).next().unwrap_or("").trim();
    match last {
        "" | "." | ".." => None,
        name => Some(name.to_string()),
    }
}

/// True when a name may be resolved inside the storage root.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && !name.contains("..") && !name.contains('/') && !name.contains('\\')
}

/// Replaces whitespace so the value can be embedded in a file name.
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Strips the final extension, if any: `kolam_a.png` -> `kolam_a`.
pub fn strip_extension(filename: &str) -> &str {
    match filename.rfind('.') {
        Some(idx) if idx > 0 => &filename[..idx],
        _ => filename,
    }
}

/// True for a content type naming the PNG format.
pub fn is_png_content_type(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("png")
}

/// Content type to serve a stored file with, based on its extension.
pub fn content_type_for(filename: &str) -> &'static str {
    let extension = Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase());

    match extension.as_deref() {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("svg") => "image/svg+xml",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

/// Hex-encoded SHA-256 digest of the given string.
pub fn sha256_hex(data: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data.as_bytes());
    format!("{:x}", hasher.finalize())
}
