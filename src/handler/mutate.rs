//! Mutating handlers (POST / PUT / DELETE)
//!
//! PUT and DELETE validate the target like a GET would; POST accepts form, JSON and
//! multipart bodies, saving uploaded files under the upload directory. Every handler
//! answers with a small JSON status body, and any cached copy of a written or deleted
//! file is dropped so later reads see the change.

use std::io;
use std::path::{Path, PathBuf};

use futures_util::{future, stream};
use hyper::body::Bytes;
use hyper::StatusCode;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::router::RequestContext;
use super::{send_response, Outcome};
use crate::config::AppState;
use crate::error::ErrorContext;
use crate::files::PathValidator;
use crate::http::build_json_response;
use crate::logger;
use crate::transport::Transport;

/// Directory under the document root that receives multipart uploads
pub const UPLOAD_DIR: &str = "uploads";

#[derive(Debug, thiserror::Error)]
enum StoreError {
    #[error("failed to create file: {0}")]
    Create(#[source] io::Error),
    #[error("failed to write file: {0}")]
    Write(#[source] io::Error),
}

/// Create or truncate `path` and write `data` into it
///
/// A file that could not be opened is left untouched; one that was opened but not
/// fully written is removed so it is never served half-written.
async fn store_file(path: &Path, data: &[u8]) -> Result<(), StoreError> {
    let mut file = fs::File::create(path).await.map_err(StoreError::Create)?;
    let written = match file.write_all(data).await {
        Ok(()) => file.flush().await,
        Err(e) => Err(e),
    };
    drop(file);

    if let Err(e) = written {
        if let Err(remove_err) = fs::remove_file(path).await {
            logger::log_error(&format!(
                "Failed to remove partially written {}: {remove_err}",
                path.display()
            ));
        }
        return Err(StoreError::Write(e));
    }
    Ok(())
}

/// Request path relative to the document root
fn relative_target(request: &RequestContext) -> &str {
    request.path.trim_start_matches('/')
}

/// Store the raw request body at the request path
pub async fn put_file<T: Transport>(
    request: &RequestContext,
    state: &AppState,
    transport: &mut T,
) -> Outcome {
    let Ok(path) = state.validator.validate(relative_target(request)) else {
        return send_json(transport, state, StatusCode::BAD_REQUEST, Some("Invalid path")).await;
    };
    let body = request.body.as_deref().unwrap_or_default();

    let stored = store_file(&path, body).await;
    // Whatever happened on disk, a cached copy may no longer match it
    let invalidated = state.cache().remove(&path);

    if let Err(e) = stored {
        logger::log_error_context(&ErrorContext::with_detail(
            500,
            "PUT failed",
            format!("{}: {e}", request.path),
        ));
        let detail = match e {
            StoreError::Create(_) => "Failed to create file",
            StoreError::Write(_) => "Failed to write file",
        };
        return send_json(
            transport,
            state,
            StatusCode::INTERNAL_SERVER_ERROR,
            Some(detail),
        )
        .await;
    }

    if invalidated {
        logger::log_debug(&format!("Invalidated cache entry for {}", path.display()));
    }
    logger::log_info(&format!("Wrote {} bytes to {}", body.len(), request.path));
    let detail = format!("Successfully wrote {} bytes to {}", body.len(), request.path);
    send_json(transport, state, StatusCode::CREATED, Some(&detail)).await
}

/// Accept a url-encoded form, a JSON object or a multipart upload
pub async fn post_form<T: Transport>(
    request: &RequestContext,
    state: &AppState,
    transport: &mut T,
) -> Outcome {
    let Some(content_type) = request.header("content-type") else {
        return send_json(
            transport,
            state,
            StatusCode::BAD_REQUEST,
            Some("Missing Content-Type header"),
        )
        .await;
    };
    let body = request.body.clone().unwrap_or_default();
    let media_type = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    let processed = match media_type.as_str() {
        "application/x-www-form-urlencoded" => {
            count_form_fields(&body).map(|n| format!("Received {n} form parameters"))
        }
        "application/json" => {
            count_json_fields(&body).map(|n| format!("Processed {n} JSON fields"))
        }
        "multipart/form-data" => save_uploads(content_type, body, state).await,
        _ => {
            logger::log_warning(&format!("Unsupported Content-Type: {content_type}"));
            return send_json(transport, state, StatusCode::UNSUPPORTED_MEDIA_TYPE, None).await;
        }
    };

    match processed {
        Ok(detail) => {
            logger::log_info(&format!("POST {}: {detail}", request.path));
            send_json(transport, state, StatusCode::OK, Some(&detail)).await
        }
        Err(detail) => {
            logger::log_warning(&format!("POST {}: {detail}", request.path));
            send_json(transport, state, StatusCode::BAD_REQUEST, Some(&detail)).await
        }
    }
}

fn count_form_fields(body: &[u8]) -> Result<usize, String> {
    let params: Vec<(String, String)> =
        serde_urlencoded::from_bytes(body).map_err(|e| format!("Malformed form body: {e}"))?;
    for (name, value) in &params {
        logger::log_debug(&format!("Form parameter {name}={value}"));
    }
    Ok(params.len())
}

fn count_json_fields(body: &[u8]) -> Result<usize, String> {
    match serde_json::from_slice::<serde_json::Value>(body) {
        Ok(serde_json::Value::Object(fields)) => Ok(fields.len()),
        Ok(_) => Err("JSON body must be an object".to_string()),
        Err(e) => Err(format!("Malformed JSON body: {e}")),
    }
}

/// Save every file part of a multipart body into the upload directory
///
/// Parts without a file name are plain form fields and are skipped. A file whose name
/// fails validation, or that cannot be written, is counted as received but not saved.
async fn save_uploads(content_type: &str, body: Bytes, state: &AppState) -> Result<String, String> {
    let boundary = multer::parse_boundary(content_type)
        .map_err(|e| format!("Invalid multipart boundary: {e}"))?;

    let upload_dir = state.validator.root().join(UPLOAD_DIR);
    if let Err(e) = fs::create_dir_all(&upload_dir).await {
        logger::log_error(&format!(
            "Failed to create upload directory {}: {e}",
            upload_dir.display()
        ));
    }

    let source = stream::once(future::ready(Ok::<_, io::Error>(body)));
    let mut multipart = multer::Multipart::new(source, boundary);
    let (mut received, mut saved) = (0usize, 0usize);

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| format!("Malformed multipart body: {e}"))?
    {
        let Some(file_name) = field.file_name().map(ToString::to_string) else {
            continue;
        };
        received += 1;
        let data = field
            .bytes()
            .await
            .map_err(|e| format!("Malformed multipart body: {e}"))?;

        let Some(target) = upload_target(&state.validator, &file_name) else {
            logger::log_warning(&format!("Rejected upload file name '{file_name}'"));
            continue;
        };
        match store_file(&target, &data).await {
            Ok(()) => {
                state.cache().remove(&target);
                logger::log_info(&format!(
                    "Saved upload {file_name} ({} bytes) to {}",
                    data.len(),
                    target.display()
                ));
                saved += 1;
            }
            Err(e) => logger::log_error_context(&ErrorContext::with_detail(
                500,
                "Upload failed",
                format!("{file_name}: {e}"),
            )),
        }
    }

    Ok(format!("Successfully saved {saved} of {received} files"))
}

/// Resolve an uploaded file name to a file directly inside the upload directory
fn upload_target(validator: &PathValidator, file_name: &str) -> Option<PathBuf> {
    if file_name.is_empty() || file_name.contains(['/', '\\']) {
        return None;
    }
    let target = validator.validate(&format!("{UPLOAD_DIR}/{file_name}")).ok()?;
    let upload_dir = validator.root().canonicalize().ok()?.join(UPLOAD_DIR);
    (target.parent() == Some(upload_dir.as_path())).then_some(target)
}

/// Delete the regular file at the request path
pub async fn delete_file<T: Transport>(
    request: &RequestContext,
    state: &AppState,
    transport: &mut T,
) -> Outcome {
    let Ok(path) = state.validator.validate(relative_target(request)) else {
        return send_json(transport, state, StatusCode::BAD_REQUEST, Some("Invalid path")).await;
    };

    let (status, detail) = match remove_regular_file(&path).await {
        Ok(()) => {
            state.cache().remove(&path);
            logger::log_info(&format!("Deleted {}", request.path));
            (
                StatusCode::OK,
                format!("Successfully deleted file: {}", request.path),
            )
        }
        Err(status @ StatusCode::NOT_FOUND) => (status, request.path.clone()),
        Err(status @ StatusCode::FORBIDDEN) => (status, "Access denied".to_string()),
        Err(status) => (status, "Delete failed".to_string()),
    };
    send_json(transport, state, status, Some(&detail)).await
}

async fn remove_regular_file(path: &Path) -> Result<(), StatusCode> {
    let metadata = fs::metadata(path).await.map_err(|_| StatusCode::NOT_FOUND)?;
    if metadata.is_dir() || metadata.permissions().readonly() {
        return Err(StatusCode::FORBIDDEN);
    }
    fs::remove_file(path).await.map_err(|e| {
        logger::log_error_context(&ErrorContext::with_detail(
            500,
            "Delete failed",
            format!("{}: {e}", path.display()),
        ));
        match e.kind() {
            io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            io::ErrorKind::PermissionDenied => StatusCode::FORBIDDEN,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    })
}

pub(super) async fn send_json<T: Transport>(
    transport: &mut T,
    state: &AppState,
    status: StatusCode,
    detail: Option<&str>,
) -> Outcome {
    let (head, body) = build_json_response(status, detail, &state.config.http.server_name);
    send_response(transport, &head, &body, &state.stream, true).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::{request, state_for};
    use crate::handler::StaticFileServer;
    use crate::transport::mock::MockTransport;
    use hyper::body::Bytes;
    use hyper::Method;
    use std::fs as stdfs;

    fn json(transport: &MockTransport) -> serde_json::Value {
        serde_json::from_slice(&transport.body).unwrap()
    }

    #[tokio::test]
    async fn test_put_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());
        let req = request(Method::PUT, "/new.txt").with_body(Bytes::from_static(b"hello"));

        let mut t = MockTransport::default();
        let outcome = put_file(&req, &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::CREATED);
        assert_eq!(json(&t)["status"], 201);
        assert_eq!(stdfs::read(dir.path().join("new.txt")).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_failed_put_keeps_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("keep.txt");
        stdfs::write(&target, b"original").unwrap();
        let mut perms = stdfs::metadata(&target).unwrap().permissions();
        perms.set_readonly(true);
        stdfs::set_permissions(&target, perms).unwrap();
        // Privileged users can still open a read-only file for writing
        if stdfs::OpenOptions::new().write(true).open(&target).is_ok() {
            return;
        }
        let state = state_for(dir.path());
        let req = request(Method::PUT, "/keep.txt").with_body(Bytes::from_static(b"new"));

        let mut t = MockTransport::default();
        let outcome = put_file(&req, &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(&t)["detail"], "Failed to create file");
        assert_eq!(stdfs::read(&target).unwrap(), b"original");
    }

    #[tokio::test]
    async fn test_put_without_parent_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());
        let req = request(Method::PUT, "/missing/dir/file.txt").with_body(Bytes::from_static(b"x"));

        let mut t = MockTransport::default();
        let outcome = put_file(&req, &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json(&t)["detail"], "Failed to create file");
        assert!(!dir.path().join("missing").exists());
    }

    #[tokio::test]
    async fn test_put_to_root_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());
        let req = request(Method::PUT, "/").with_body(Bytes::from_static(b"x"));

        let mut t = MockTransport::default();
        let outcome = put_file(&req, &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert!(dir.path().is_dir());
    }

    #[tokio::test]
    async fn test_store_file_replaces_contents() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a.bin");
        stdfs::write(&target, b"a much longer original body").unwrap();
        store_file(&target, b"short").await.unwrap();
        assert_eq!(stdfs::read(&target).unwrap(), b"short");
    }

    #[tokio::test]
    async fn test_put_invalidates_cached_copy() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::write(dir.path().join("a.txt"), b"old").unwrap();
        let state = state_for(dir.path());

        let mut t = MockTransport::default();
        StaticFileServer::new(&state)
            .serve(&request(Method::GET, "/a.txt"), &mut t)
            .await;
        assert_eq!(state.cache().len(), 1);

        let req = request(Method::PUT, "/a.txt").with_body(Bytes::from_static(b"new"));
        put_file(&req, &state, &mut MockTransport::default()).await;
        assert!(state.cache().is_empty());

        let mut t = MockTransport::default();
        StaticFileServer::new(&state)
            .serve(&request(Method::GET, "/a.txt"), &mut t)
            .await;
        assert_eq!(t.body, b"new");
    }

    #[tokio::test]
    async fn test_put_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());
        let req = request(Method::PUT, "/../escape.txt").with_body(Bytes::from_static(b"x"));

        let mut t = MockTransport::default();
        let outcome = put_file(&req, &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&t)["detail"], "Invalid path");
    }

    #[tokio::test]
    async fn test_delete_removes_file_and_cache_entry() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::write(dir.path().join("gone.txt"), b"bye").unwrap();
        let state = state_for(dir.path());
        StaticFileServer::new(&state)
            .serve(&request(Method::GET, "/gone.txt"), &mut MockTransport::default())
            .await;
        assert_eq!(state.cache().len(), 1);

        let mut t = MockTransport::default();
        let outcome = delete_file(&request(Method::DELETE, "/gone.txt"), &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::OK);
        assert!(!dir.path().join("gone.txt").exists());
        assert!(state.cache().is_empty());
    }

    #[tokio::test]
    async fn test_delete_missing_and_directory() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::create_dir(dir.path().join("sub")).unwrap();
        let state = state_for(dir.path());

        let mut t = MockTransport::default();
        let outcome = delete_file(&request(Method::DELETE, "/missing.txt"), &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::NOT_FOUND);
        assert_eq!(json(&t)["detail"], "/missing.txt");

        let outcome = delete_file(
            &request(Method::DELETE, "/sub"),
            &state,
            &mut MockTransport::default(),
        )
        .await;
        assert_eq!(outcome.status, StatusCode::FORBIDDEN);
        assert!(dir.path().join("sub").is_dir());
    }

    fn post(content_type: Option<&str>, body: &'static [u8]) -> RequestContext {
        let req = request(Method::POST, "/submit").with_body(Bytes::from_static(body));
        match content_type {
            Some(value) => req.with_header("content-type", value),
            None => req,
        }
    }

    const MULTIPART: &[u8] = b"--XBOUNDARY\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"report.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
quarterly numbers\r\n\
--XBOUNDARY\r\n\
Content-Disposition: form-data; name=\"evil\"; filename=\"../escape.txt\"\r\n\
Content-Type: text/plain\r\n\
\r\n\
nope\r\n\
--XBOUNDARY\r\n\
Content-Disposition: form-data; name=\"note\"\r\n\
\r\n\
plain field\r\n\
--XBOUNDARY--\r\n";

    #[tokio::test]
    async fn test_post_counts_form_parameters() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());
        let req = post(
            Some("application/x-www-form-urlencoded"),
            b"name=ada&lang=rust&empty=",
        );

        let mut t = MockTransport::default();
        let outcome = post_form(&req, &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(json(&t)["detail"], "Received 3 form parameters");
    }

    #[tokio::test]
    async fn test_post_counts_json_fields() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());
        let req = post(
            Some("application/json; charset=utf-8"),
            br#"{"a":"x","b":1.5,"c":true,"d":null}"#,
        );

        let mut t = MockTransport::default();
        let outcome = post_form(&req, &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(json(&t)["detail"], "Processed 4 JSON fields");

        let mut t = MockTransport::default();
        let outcome = post_form(&post(Some("application/json"), b"{oops"), &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_post_content_type_errors() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());

        let mut t = MockTransport::default();
        let outcome = post_form(&post(None, b"a=1"), &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert_eq!(json(&t)["detail"], "Missing Content-Type header");

        let mut t = MockTransport::default();
        let outcome = post_form(&post(Some("text/plain"), b"a=1"), &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::UNSUPPORTED_MEDIA_TYPE);
        assert_eq!(json(&t)["status"], 415);
    }

    #[tokio::test]
    async fn test_post_multipart_saves_safe_uploads() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());
        let req = post(Some("multipart/form-data; boundary=XBOUNDARY"), MULTIPART);

        let mut t = MockTransport::default();
        let outcome = post_form(&req, &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(json(&t)["detail"], "Successfully saved 1 of 2 files");
        assert_eq!(
            stdfs::read(dir.path().join(UPLOAD_DIR).join("report.txt")).unwrap(),
            b"quarterly numbers"
        );
        assert!(!dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn test_post_multipart_without_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let state = state_for(dir.path());

        let mut t = MockTransport::default();
        let outcome = post_form(&post(Some("multipart/form-data"), MULTIPART), &state, &mut t).await;
        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_upload_target_stays_in_upload_dir() {
        let dir = tempfile::tempdir().unwrap();
        stdfs::create_dir(dir.path().join(UPLOAD_DIR)).unwrap();
        let validator = PathValidator::new(dir.path());
        let upload_dir = dir.path().canonicalize().unwrap().join(UPLOAD_DIR);

        assert_eq!(
            upload_target(&validator, "photo.png"),
            Some(upload_dir.join("photo.png"))
        );
        assert_eq!(upload_target(&validator, "../photo.png"), None);
        assert_eq!(upload_target(&validator, "nested/photo.png"), None);
        assert_eq!(upload_target(&validator, ".hidden"), None);
        assert_eq!(upload_target(&validator, ""), None);
    }
}
