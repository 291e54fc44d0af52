//! MIME type detection module
//!
//! Returns the Content-Type for a file path based on its extension.

use std::path::Path;

/// Fallback for unknown or missing extensions
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream; charset=utf-8";

const CHARSET_SUFFIX: &str = "; charset=utf-8";

/// Extension table, first match wins
const MIME_TABLE: &[(&str, &str)] = &[
    // Text
    ("html", "text/html"),
    ("htm", "text/html"),
    ("css", "text/css"),
    ("txt", "text/plain"),
    ("md", "text/markdown"),
    ("csv", "text/csv"),
    ("xml", "application/xml"),
    // JavaScript/WASM
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("json", "application/json"),
    ("wasm", "application/wasm"),
    // Images
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("svg", "image/svg+xml"),
    ("ico", "image/x-icon"),
    ("webp", "image/webp"),
    // Video
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("ogv", "video/ogg"),
    ("mov", "video/quicktime"),
    ("avi", "video/x-msvideo"),
    // Audio
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("flac", "audio/flac"),
    ("ogg", "audio/ogg"),
    ("m4a", "audio/mp4"),
    // Fonts
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    // Documents and archives
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("tar", "application/x-tar"),
];

/// Resolve the Content-Type for `file_path`
///
/// # Examples
/// ```
/// use static_file_server::http::mime::resolve;
/// assert_eq!(resolve("index.HTML"), "text/html; charset=utf-8");
/// assert_eq!(resolve("clip.mp4"), "video/mp4");
/// assert_eq!(resolve("Makefile"), "application/octet-stream; charset=utf-8");
/// ```
pub fn resolve(file_path: impl AsRef<Path>) -> String {
    let ext = extension(file_path.as_ref()).to_ascii_lowercase();
    if ext.is_empty() {
        return DEFAULT_CONTENT_TYPE.to_string();
    }

    MIME_TABLE
        .iter()
        .find(|(e, _)| *e == ext)
        .map_or_else(
            || DEFAULT_CONTENT_TYPE.to_string(),
            |(_, mime)| {
                if is_text_like(mime) {
                    format!("{mime}{CHARSET_SUFFIX}")
                } else {
                    (*mime).to_string()
                }
            },
        )
}

/// Text after the last `.` of the file name; empty for dotfiles and extensionless names
fn extension(path: &Path) -> &str {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    match name.rfind('.') {
        Some(0) | None => "",
        Some(i) => &name[i + 1..],
    }
}

fn is_text_like(mime: &str) -> bool {
    mime.starts_with("text/") || mime == "application/json" || mime == "application/javascript"
}
