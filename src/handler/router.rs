//! Request routing dispatch module
//!
//! Entry point for HTTP request processing: body size checks, building the request
//! context, dispatching by method and writing one access log line per request.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};
use hyper::header::{self, HeaderMap, HeaderName, HeaderValue};
use hyper::{Method, Request, Response, StatusCode};

use super::mutate::{self, send_json};
use super::static_files::StaticFileServer;
use super::{send_response, Outcome};
use crate::config::AppState;
use crate::http::build_json_response;
use crate::logger::{self, AccessLogEntry};
use crate::transport::{self, ChannelBody, Transport};

/// Methods answered by this server
const ALLOWED_METHODS: &str = "GET, HEAD, POST, PUT, DELETE";

/// Everything a handler needs to know about a request
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub method: Method,
    /// Path component of the request target, still percent-encoded
    pub path: String,
    pub headers: HeaderMap,
    /// Raw request body, if one was sent
    pub body: Option<Bytes>,
}

impl RequestContext {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Add a header; invalid names or values are ignored
    #[must_use]
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Main entry point for HTTP request handling
///
/// The handler runs as a local task writing into a channel transport; this returns as soon
/// as it has sent the response head, and hyper streams the body from the channel.
pub async fn handle_request<B>(
    req: Request<B>,
    state: Arc<AppState>,
    peer_addr: SocketAddr,
) -> Result<Response<ChannelBody>, Infallible>
where
    B: Body + 'static,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    let started = Instant::now();
    let mut entry = AccessLogEntry::new(
        peer_addr.to_string(),
        req.method().to_string(),
        req.uri().path().to_string(),
    );
    entry.user_agent = req
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(ToString::to_string);

    let request = read_request(req, state.config.http.max_body_size).await;
    let (mut transport, receiver) = transport::channel();

    tokio::task::spawn_local(async move {
        let outcome = match request {
            Ok(request) => dispatch(&request, &state, &mut transport).await,
            Err(status) => send_json(&mut transport, &state, status, None).await,
        };
        drop(transport);

        if state.config.logging.access_log {
            entry.status = outcome.status.as_u16();
            entry.body_bytes = outcome.body_bytes;
            entry.request_time_us = u64::try_from(started.elapsed().as_micros()).unwrap_or(u64::MAX);
            logger::log_access(&entry, &state.config.logging.access_log_format);
        }
    });

    Ok(receiver.recv().await.unwrap_or_else(|| {
        logger::log_error("Handler finished without sending a response");
        let mut response = Response::new(ChannelBody::empty());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    }))
}

/// Route a request to the handler for its method
pub async fn dispatch<T: Transport>(
    request: &RequestContext,
    state: &AppState,
    transport: &mut T,
) -> Outcome {
    match request.method {
        Method::GET | Method::HEAD => StaticFileServer::new(state).serve(request, transport).await,
        Method::POST => mutate::post_form(request, state, transport).await,
        Method::PUT => mutate::put_file(request, state, transport).await,
        Method::DELETE => mutate::delete_file(request, state, transport).await,
        _ => {
            logger::log_warning(&format!("Method not allowed: {}", request.method));
            let detail = format!("Supported methods: {ALLOWED_METHODS}");
            let (head, body) = build_json_response(
                StatusCode::METHOD_NOT_ALLOWED,
                Some(&detail),
                &state.config.http.server_name,
            );
            let head = head.header(header::ALLOW, ALLOWED_METHODS);
            send_response(transport, &head, &body, &state.stream, true).await
        }
    }
}

/// Collect the request into a [`RequestContext`], enforcing the body size limit
async fn read_request<B>(req: Request<B>, max_body_size: u64) -> Result<RequestContext, StatusCode>
where
    B: Body,
    B::Error: std::error::Error + Send + Sync + 'static,
{
    if let Some(status) = check_body_size(req.headers(), max_body_size) {
        return Err(status);
    }

    let (parts, body) = req.into_parts();
    let limit = usize::try_from(max_body_size).unwrap_or(usize::MAX);
    let collected = Limited::new(body, limit).collect().await.map_err(|e| {
        if e.is::<LengthLimitError>() {
            logger::log_error(&format!(
                "Request body too large (max: {max_body_size} bytes)"
            ));
            StatusCode::PAYLOAD_TOO_LARGE
        } else {
            logger::log_warning(&format!("Failed to read request body: {e}"));
            StatusCode::BAD_REQUEST
        }
    })?;
    let body = collected.to_bytes();

    Ok(RequestContext {
        method: parts.method,
        path: parts.uri.path().to_string(),
        headers: parts.headers,
        body: (!body.is_empty()).then_some(body),
    })
}

/// Validate Content-Length header and return 413 if exceeded
fn check_body_size(headers: &HeaderMap, max_body_size: u64) -> Option<StatusCode> {
    let content_length = headers.get(header::CONTENT_LENGTH)?;
    content_length.to_str().map_or_else(
        |_| {
            logger::log_warning("Content-Length header contains non-ASCII characters");
            None
        },
        |size_str| match size_str.parse::<u64>() {
            Ok(size) if size > max_body_size => {
                logger::log_error(&format!(
                    "Request body too large: {size} bytes (max: {max_body_size})"
                ));
                Some(StatusCode::PAYLOAD_TOO_LARGE)
            }
            Err(_) => {
                logger::log_warning(&format!(
                    "Invalid Content-Length value: '{size_str}', skipping size check"
                ));
                None
            }
            _ => None,
        },
    )
}
