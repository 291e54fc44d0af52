//! HTTP response building module
//!
//! Builds response heads (status line plus headers) and small buffered bodies. Bodies of
//! served files are streamed separately by the transport layer.

use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::StatusCode;
use serde::Serialize;

use super::cache::CachePolicy;
use super::range::RangeSpec;
use crate::logger;

/// Status line and headers of a response, sent before any body bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub headers: HeaderMap,
}

impl ResponseHead {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
        }
    }

    /// Add a header; values that are not valid header text are logged and skipped
    #[must_use]
    pub fn header(mut self, name: HeaderName, value: impl AsRef<str>) -> Self {
        match HeaderValue::from_str(value.as_ref()) {
            Ok(v) => {
                self.headers.insert(name, v);
            }
            Err(e) => {
                logger::log_error(&format!("Invalid value for header {name}: {e}"));
            }
        }
        self
    }

    /// Header value as text, for callers inspecting a built head
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Declared body length
    pub fn content_length(&self) -> Option<u64> {
        self.get("content-length").and_then(|v| v.parse().ok())
    }
}

/// Headers shared by every file response
pub struct FileHeaders<'a> {
    pub content_type: &'a str,
    pub last_modified: Option<&'a str>,
    pub server_name: &'a str,
}

impl FileHeaders<'_> {
    fn apply(&self, head: ResponseHead, content_length: u64) -> ResponseHead {
        let head = head
            .header(header::CONTENT_TYPE, self.content_type)
            .header(header::CONTENT_LENGTH, content_length.to_string())
            .header(
                header::CACHE_CONTROL,
                CachePolicy::default().to_header_value(),
            )
            .header(header::ACCEPT_RANGES, "bytes")
            .header(header::X_CONTENT_TYPE_OPTIONS, "nosniff");
        let head = match self.last_modified {
            Some(lm) => head.header(header::LAST_MODIFIED, lm),
            None => head,
        };
        with_common(head, self.server_name)
    }
}

fn with_common(head: ResponseHead, server_name: &str) -> ResponseHead {
    head.header(header::SERVER, server_name)
        .header(header::CONNECTION, "close")
}

/// 200 OK for a whole file
pub fn build_full_head(headers: &FileHeaders<'_>, file_size: u64) -> ResponseHead {
    headers.apply(ResponseHead::new(StatusCode::OK), file_size)
}

/// 206 Partial Content for one span of a file
pub fn build_partial_head(
    headers: &FileHeaders<'_>,
    range: RangeSpec,
    file_size: u64,
) -> ResponseHead {
    headers
        .apply(ResponseHead::new(StatusCode::PARTIAL_CONTENT), range.length())
        .header(header::CONTENT_RANGE, range.content_range(file_size))
}

/// 304 Not Modified (no body)
pub fn build_304_head(last_modified: &str, server_name: &str) -> ResponseHead {
    let head = ResponseHead::new(StatusCode::NOT_MODIFIED)
        .header(
            header::CACHE_CONTROL,
            CachePolicy::default().to_header_value(),
        )
        .header(header::LAST_MODIFIED, last_modified);
    with_common(head, server_name)
}

/// Self-contained HTML error page
pub fn build_error_page(status: StatusCode, message: &str, detail: Option<&str>) -> String {
    let code = status.as_u16();
    let reason = status.canonical_reason().unwrap_or("Unknown Error");
    let detail_html = detail
        .map(|d| format!("<p>Details: {}</p>", escape_html(d)))
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Error {code} - {reason}</title>
    <style>
        body {{ font-family: Arial, sans-serif; margin: 40px; }}
        .error-container {{ border: 1px solid #ddd; padding: 20px; border-radius: 5px; background-color: #f8f8f8; }}
        .error-code {{ color: #d32f2f; }}
        .error-message {{ color: #666; }}
    </style>
</head>
<body>
    <div class="error-container">
        <h1 class="error-code">Error {code} - {reason}</h1>
        <p class="error-message">{message}</p>
        {detail_html}
    </div>
</body>
</html>"#,
        message = escape_html(message),
    )
}

/// Head and body of an HTML error response
pub fn build_error_response(
    status: StatusCode,
    message: &str,
    detail: Option<&str>,
    server_name: &str,
) -> (ResponseHead, Vec<u8>) {
    let body = build_error_page(status, message, detail).into_bytes();
    let head = ResponseHead::new(status)
        .header(header::CONTENT_TYPE, "text/html; charset=utf-8")
        .header(header::CONTENT_LENGTH, body.len().to_string())
        .header(header::CACHE_CONTROL, CachePolicy::NoCache.to_header_value());
    (with_common(head, server_name), body)
}

/// JSON status body used by the mutating handlers
#[derive(Debug, Serialize)]
pub struct StatusBody<'a> {
    pub status: u16,
    pub message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<&'a str>,
}

/// Head and body of a JSON status response
pub fn build_json_response(
    status: StatusCode,
    detail: Option<&str>,
    server_name: &str,
) -> (ResponseHead, Vec<u8>) {
    let payload = StatusBody {
        status: status.as_u16(),
        message: status.canonical_reason().unwrap_or("Unknown"),
        detail,
    };
    let body = serde_json::to_vec(&payload).unwrap_or_else(|e| {
        logger::log_error(&format!("Failed to serialize response: {e}"));
        br#"{"error":"Internal server error"}"#.to_vec()
    });
    let head = ResponseHead::new(status)
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::CONTENT_LENGTH, body.len().to_string());
    (with_common(head, server_name), body)
}

/// Escape text for inclusion in HTML
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
