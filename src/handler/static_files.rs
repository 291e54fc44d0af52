//! Static file serving module
//!
//! Resolves a request path to a file under the document root, reads it through the file
//! cache and streams it back as a full, partial (Range) or conditional (304) response.

use std::path::Path;

use hyper::{Method, StatusCode};

use super::router::RequestContext;
use super::{send_response, Outcome};
use crate::config::AppState;
use crate::error::{ErrorContext, ServeError};
use crate::files::{self, FileReadResult};
use crate::http::cache::{format_http_date, is_not_modified};
use crate::http::{
    build_304_head, build_error_response, build_full_head, build_partial_head, range,
    FileHeaders, RangeSpec,
};
use crate::logger;
use crate::transport::Transport;

/// Serves files from the document root of an [`AppState`]
pub struct StaticFileServer<'a> {
    state: &'a AppState,
}

impl<'a> StaticFileServer<'a> {
    pub const fn new(state: &'a AppState) -> Self {
        Self { state }
    }

    /// Answer a GET or HEAD request
    ///
    /// Every read result obtained here is released back to the cache exactly once,
    /// whatever the response turned out to be.
    pub async fn serve<T: Transport>(&self, request: &RequestContext, transport: &mut T) -> Outcome {
        let request_path = match request.path.as_str() {
            "" | "/" => self.state.config.static_files.index_file.as_str(),
            path => path,
        };

        let file_path = match self.state.validator.validate(request_path) {
            Ok(path) => path,
            Err(rejection) => {
                let err = ServeError::PathRejected {
                    reason: rejection.reason.to_string(),
                };
                logger::log_error_context(&ErrorContext::with_detail(
                    err.code(),
                    err.to_string(),
                    request_path,
                ));
                return self
                    .send_error(
                        request,
                        transport,
                        StatusCode::FORBIDDEN,
                        "Access denied",
                        Some(request_path),
                    )
                    .await;
            }
        };

        let file = self.read_through_cache(&file_path).await;
        let outcome = self.respond(request, request_path, &file, transport).await;
        self.state.cache().release(file);
        outcome
    }

    async fn read_through_cache(&self, path: &Path) -> FileReadResult {
        let cached = self.state.cache().get(path);
        if let Some(hit) = cached {
            return hit;
        }
        let fresh = files::read_file(path).await;
        if !fresh.is_ok() {
            return fresh;
        }
        self.state.cache().put(path, fresh)
    }

    async fn respond<T: Transport>(
        &self,
        request: &RequestContext,
        request_path: &str,
        file: &FileReadResult,
        transport: &mut T,
    ) -> Outcome {
        let server_name = self.state.config.http.server_name.as_str();

        if !file.is_ok() {
            return self.send_read_failure(request, request_path, file, transport).await;
        }

        let last_modified = file.last_modified().map(format_http_date);
        if let (Some(mtime), Some(lm)) = (file.last_modified(), last_modified.as_deref()) {
            if is_not_modified(request.header("if-modified-since"), mtime) {
                logger::log_debug(&format!("Not modified: {request_path}"));
                let head = build_304_head(lm, server_name);
                return send_response(transport, &head, &[], &self.state.stream, false).await;
            }
        }

        let headers = FileHeaders {
            content_type: file.content_type(),
            last_modified: last_modified.as_deref(),
            server_name,
        };
        let size = file.size();
        let requested = request
            .header("range")
            .and_then(|h| range::parse(h, size, self.state.config.static_files.max_range_parts));

        let (head, body) = match requested {
            Some(ranges) => {
                let first = ranges.first();
                logger::log_debug(&format!(
                    "Range request: {}-{}/{size} for {request_path}",
                    first.start, first.end
                ));
                (build_partial_head(&headers, first, size), span(file.data(), first))
            }
            None => (build_full_head(&headers, size), file.data().as_ref()),
        };

        send_response(
            transport,
            &head,
            body,
            &self.state.stream,
            request.method != Method::HEAD,
        )
        .await
    }

    async fn send_read_failure<T: Transport>(
        &self,
        request: &RequestContext,
        request_path: &str,
        file: &FileReadResult,
        transport: &mut T,
    ) -> Outcome {
        let status = file.status();
        let (err, message, page_detail) = match status {
            StatusCode::NOT_FOUND => (
                ServeError::NotFound(request_path.to_string()),
                "The requested file was not found",
                Some(request_path),
            ),
            StatusCode::FORBIDDEN => (
                ServeError::PathRejected {
                    reason: "permission denied".to_string(),
                },
                "Access denied",
                Some(request_path),
            ),
            _ => (
                ServeError::Internal(file.error_detail().unwrap_or("read failed").to_string()),
                "Failed to read file",
                None,
            ),
        };
        let context = match file.error_detail() {
            Some(detail) => ErrorContext::with_detail(err.code(), err.to_string(), detail),
            None => ErrorContext::from_error(&err),
        };
        logger::log_error_context(&context);
        self.send_error(request, transport, status, message, page_detail)
            .await
    }

    async fn send_error<T: Transport>(
        &self,
        request: &RequestContext,
        transport: &mut T,
        status: StatusCode,
        message: &str,
        detail: Option<&str>,
    ) -> Outcome {
        let (head, body) =
            build_error_response(status, message, detail, &self.state.config.http.server_name);
        send_response(
            transport,
            &head,
            &body,
            &self.state.stream,
            request.method != Method::HEAD,
        )
        .await
    }
}

/// Bytes covered by a validated range
fn span(data: &[u8], range: RangeSpec) -> &[u8] {
    let (Ok(start), Ok(end)) = (usize::try_from(range.start), usize::try_from(range.end)) else {
        return &[];
    };
    data.get(start..=end).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::{request, state_for};
    use crate::transport::mock::{MockTransport, Step};
    use std::fs;
    use std::io;
    use std::path::PathBuf;

    fn docroot() -> (tempfile::TempDir, AppState) {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("index.html"), b"0123456789").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/data.json"), br#"{"a":1}"#).unwrap();
        let state = state_for(dir.path());
        (dir, state)
    }

    fn canonical(dir: &tempfile::TempDir, name: &str) -> PathBuf {
        dir.path().canonicalize().unwrap().join(name)
    }

    async fn get(state: &AppState, req: &RequestContext) -> (Outcome, MockTransport) {
        let mut transport = MockTransport::default();
        let outcome = StaticFileServer::new(state).serve(req, &mut transport).await;
        (outcome, transport)
    }

    #[tokio::test]
    async fn test_root_serves_index() {
        let (_dir, state) = docroot();
        let (outcome, t) = get(&state, &request(Method::GET, "/")).await;
        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(outcome.body_bytes, 10);
        assert_eq!(t.head().content_length(), Some(10));
        assert_eq!(t.head().get("content-type"), Some("text/html; charset=utf-8"));
        assert_eq!(t.head().get("accept-ranges"), Some("bytes"));
        assert_eq!(t.head().get("cache-control"), Some("public, max-age=86400"));
        assert!(t.head().get("last-modified").is_some());
        assert_eq!(t.body, b"0123456789");
    }

    #[tokio::test]
    async fn test_range_serves_partial_content() {
        let (_dir, state) = docroot();
        let req = request(Method::GET, "/index.html").with_header("range", "bytes=0-4");
        let (outcome, t) = get(&state, &req).await;
        assert_eq!(outcome.status, StatusCode::PARTIAL_CONTENT);
        assert_eq!(t.head().get("content-range"), Some("bytes 0-4/10"));
        assert_eq!(t.head().content_length(), Some(5));
        assert_eq!(t.body, b"01234");
    }

    #[tokio::test]
    async fn test_unsatisfiable_range_serves_whole_file() {
        let (_dir, state) = docroot();
        let req = request(Method::GET, "/index.html").with_header("range", "bytes=50-60");
        let (outcome, t) = get(&state, &req).await;
        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(t.body, b"0123456789");
    }

    #[tokio::test]
    async fn test_traversal_is_forbidden() {
        let (_dir, state) = docroot();
        let (outcome, t) = get(&state, &request(Method::GET, "/../../etc/passwd")).await;
        assert_eq!(outcome.status, StatusCode::FORBIDDEN);
        let body = String::from_utf8(t.body).unwrap();
        assert!(body.contains("Error 403"));
        assert!(state.cache().is_empty());
    }

    #[tokio::test]
    async fn test_missing_file_is_not_found() {
        let (_dir, state) = docroot();
        let (outcome, t) = get(&state, &request(Method::GET, "/nope.txt")).await;
        assert_eq!(outcome.status, StatusCode::NOT_FOUND);
        assert_eq!(t.head().get("content-type"), Some("text/html; charset=utf-8"));
        let body = String::from_utf8(t.body).unwrap();
        assert!(body.contains("The requested file was not found"));
        assert!(body.contains("/nope.txt"));
        assert!(state.cache().is_empty());
    }

    #[tokio::test]
    async fn test_directory_is_not_found() {
        let (_dir, state) = docroot();
        let (outcome, _) = get(&state, &request(Method::GET, "/sub")).await;
        assert_eq!(outcome.status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_if_modified_since_yields_304() {
        let (_dir, state) = docroot();
        let (_, first) = get(&state, &request(Method::GET, "/index.html")).await;
        let lm = first.head().get("last-modified").unwrap().to_string();

        let req = request(Method::GET, "/index.html").with_header("if-modified-since", &lm);
        let (outcome, t) = get(&state, &req).await;
        assert_eq!(outcome.status, StatusCode::NOT_MODIFIED);
        assert!(t.body.is_empty());
        assert_eq!(t.send_calls, 0);
        assert_eq!(t.head().get("last-modified"), Some(lm.as_str()));

        let req = request(Method::GET, "/index.html")
            .with_header("if-modified-since", "Thu, 01 Jan 1970 00:00:00 GMT");
        let (outcome, _) = get(&state, &req).await;
        assert_eq!(outcome.status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_head_sends_headers_only() {
        let (_dir, state) = docroot();
        let (_, full) = get(&state, &request(Method::GET, "/sub/data.json")).await;
        let (outcome, head_only) = get(&state, &request(Method::HEAD, "/sub/data.json")).await;
        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(outcome.body_bytes, 0);
        assert!(head_only.body.is_empty());
        assert_eq!(head_only.head(), full.head());
        assert_eq!(
            head_only.head().get("content-type"),
            Some("application/json; charset=utf-8")
        );
    }

    #[tokio::test]
    async fn test_hit_and_miss_are_identical_and_released() {
        let (dir, state) = docroot();
        let path = canonical(&dir, "index.html");

        let (_, miss) = get(&state, &request(Method::GET, "/index.html")).await;
        assert_eq!(state.cache().ref_count(&path), Some(0));
        let (_, hit) = get(&state, &request(Method::GET, "/index.html")).await;
        assert_eq!(state.cache().ref_count(&path), Some(0));

        assert_eq!(miss.body, hit.body);
        assert_eq!(miss.head(), hit.head());
        assert_eq!(state.cache().len(), 1);
    }

    #[tokio::test]
    async fn test_changed_file_is_served_fresh() {
        let (dir, state) = docroot();
        get(&state, &request(Method::GET, "/index.html")).await;

        let path = dir.path().join("index.html");
        fs::write(&path, b"abcdefghijklmnop").unwrap();
        let file = fs::File::options().write(true).open(&path).unwrap();
        file.set_modified(std::time::SystemTime::now() + std::time::Duration::from_secs(5))
            .unwrap();

        let (_, t) = get(&state, &request(Method::GET, "/index.html")).await;
        assert_eq!(t.body, b"abcdefghijklmnop");
    }

    #[tokio::test]
    async fn test_exhausted_retries_truncate_body_and_release() {
        let (dir, state) = docroot();
        let mut transport = MockTransport::scripted([
            Step::Accept(3),
            Step::Fail(io::ErrorKind::ConnectionReset),
            Step::Fail(io::ErrorKind::ConnectionReset),
            Step::Fail(io::ErrorKind::ConnectionReset),
            Step::Fail(io::ErrorKind::ConnectionReset),
        ]);
        let outcome = StaticFileServer::new(&state)
            .serve(&request(Method::GET, "/index.html"), &mut transport)
            .await;

        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(outcome.body_bytes, 3);
        assert_eq!(transport.head().content_length(), Some(10));
        assert_eq!(transport.body, b"012");
        let path = canonical(&dir, "index.html");
        assert_eq!(state.cache().ref_count(&path), Some(0));
    }

    #[tokio::test]
    async fn test_would_block_is_waited_out() {
        let (_dir, state) = docroot();
        let mut transport = MockTransport::scripted(
            (0..5).map(|_| Step::Fail(io::ErrorKind::WouldBlock)),
        );
        let outcome = StaticFileServer::new(&state)
            .serve(&request(Method::GET, "/index.html"), &mut transport)
            .await;
        assert_eq!(outcome.body_bytes, 10);
        assert_eq!(transport.body, b"0123456789");
    }

    #[test]
    fn test_span() {
        let data = b"0123456789";
        assert_eq!(span(data, RangeSpec { start: 2, end: 4 }), b"234");
        assert_eq!(span(data, RangeSpec { start: 9, end: 20 }), b"");
    }
}
