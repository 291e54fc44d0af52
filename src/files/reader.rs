//! File read results
//!
//! A `FileReadResult` is what the read path hands to the streaming step: the bytes of a
//! file plus its metadata, or a status describing why there are none. It either shares a
//! cache entry's buffer or owns a freshly read one, and goes back through
//! `FileCache::release` when the response is done.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use hyper::body::Bytes;
use hyper::StatusCode;
use tokio::fs;

use super::cache::CachedFile;
use crate::http::mime;

/// Where a result's buffer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Shares a cache entry's buffer and holds one of its references
    Cache,
    /// Owns its buffer (uncached read or error)
    Fresh,
}

/// Outcome of reading one file
///
/// Not `Clone`: each result accounts for at most one cache reference.
#[derive(Debug)]
pub struct FileReadResult {
    pub(super) path: PathBuf,
    pub(super) data: Bytes,
    pub(super) content_type: String,
    pub(super) status: StatusCode,
    pub(super) error_detail: Option<String>,
    pub(super) last_modified: Option<SystemTime>,
    pub(super) origin: Origin,
}

impl FileReadResult {
    /// A successful read that owns its bytes
    pub fn fresh(path: &Path, data: Bytes, last_modified: Option<SystemTime>) -> Self {
        Self {
            path: path.to_path_buf(),
            data,
            content_type: mime::resolve(path),
            status: StatusCode::OK,
            error_detail: None,
            last_modified,
            origin: Origin::Fresh,
        }
    }

    /// A result borrowing a cache entry's buffer
    pub(super) fn from_cache(entry: &CachedFile) -> Self {
        Self {
            path: entry.path().to_path_buf(),
            data: entry.data().clone(),
            content_type: entry.content_type().to_string(),
            status: StatusCode::OK,
            error_detail: None,
            last_modified: Some(entry.last_modified()),
            origin: Origin::Cache,
        }
    }

    /// A failed read with no data
    pub fn error(path: &Path, status: StatusCode, detail: Option<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            data: Bytes::new(),
            content_type: String::new(),
            status,
            error_detail: detail,
            last_modified: None,
            origin: Origin::Fresh,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub const fn status(&self) -> StatusCode {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == StatusCode::OK
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub const fn last_modified(&self) -> Option<SystemTime> {
        self.last_modified
    }

    pub const fn origin(&self) -> Origin {
        self.origin
    }
}

/// Read a whole file from disk
///
/// Missing files and directories yield 404, permission problems 403, anything else
/// (including a short read) 500.
pub async fn read_file(path: &Path) -> FileReadResult {
    let metadata = match fs::metadata(path).await {
        Ok(m) => m,
        Err(e) => return io_error_result(path, &e),
    };
    if !metadata.is_file() {
        return FileReadResult::error(
            path,
            StatusCode::NOT_FOUND,
            Some("not a regular file".to_string()),
        );
    }

    let data = match fs::read(path).await {
        Ok(d) => d,
        Err(e) => return io_error_result(path, &e),
    };

    if data.len() as u64 != metadata.len() {
        return FileReadResult::error(
            path,
            StatusCode::INTERNAL_SERVER_ERROR,
            Some(format!(
                "read {} bytes, expected {}",
                data.len(),
                metadata.len()
            )),
        );
    }

    FileReadResult::fresh(path, Bytes::from(data), metadata.modified().ok())
}

fn io_error_result(path: &Path, err: &io::Error) -> FileReadResult {
    let status = match err.kind() {
        io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
        io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    FileReadResult::error(path, status, Some(err.to_string()))
}
