//! Content-type tokens and a small amount of content-type inference.
//!
//! Real MIME sniffing is left to applications; the inference here only
//! distinguishes the handful of types the server itself emits.

use std::path::Path;

pub const CONTENT_TYPE: &str = "Content-Type";
pub const CONTENT_LENGTH: &str = "Content-Length";

pub const APPLICATION_JSON: &str = "application/json";
pub const TEXT_HTML: &str = "text/html";
pub const TEXT_PLAIN: &str = "text/plain";
/// Marker for responses that carry no body.
pub const APPLICATION_X_EMPTY: &str = "application/x-empty";
pub const APPLICATION_OCTET_STREAM: &str = "application/octet-stream";

/// Guesses a content type from a response body.
pub fn infer(data: &[u8]) -> &'static str {
    if data.is_empty() {
        return APPLICATION_X_EMPTY;
    }

    let Ok(text) = std::str::from_utf8(data) else {
        return APPLICATION_OCTET_STREAM;
    };

    let trimmed = text.trim_start();
    if trimmed.starts_with('<') {
        TEXT_HTML
    } else if (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<serde_json::Value>(trimmed).is_ok()
    {
        APPLICATION_JSON
    } else {
        TEXT_PLAIN
    }
}

/// Guesses a content type from a file extension.
pub fn from_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("html") | Some("htm") => TEXT_HTML,
        Some("json") => APPLICATION_JSON,
        Some("txt") => TEXT_PLAIN,
        _ => APPLICATION_OCTET_STREAM,
    }
}
