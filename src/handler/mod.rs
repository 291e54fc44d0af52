//! Request handler module
//!
//! Method dispatch, static file delivery and the mutating POST/PUT/DELETE handlers. Handlers
//! write their response through a [`Transport`] and report what they sent as an
//! [`Outcome`] for the access log.

pub mod mutate;
pub mod router;
pub mod static_files;

pub use router::{dispatch, handle_request, RequestContext};
pub use static_files::StaticFileServer;

use hyper::StatusCode;

use crate::error::{ErrorContext, ServeError};
use crate::http::ResponseHead;
use crate::logger;
use crate::transport::{self, StreamSettings, Transport};

/// What a handler put on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    pub status: StatusCode,
    /// Body bytes accepted by the transport (less than declared if the transfer aborted)
    pub body_bytes: usize,
}

/// Send a head and, unless `with_body` is false, stream `body` after it
///
/// Send failures are logged here; the returned outcome records how far the response got.
pub(crate) async fn send_response<T: Transport>(
    transport: &mut T,
    head: &ResponseHead,
    body: &[u8],
    settings: &StreamSettings,
    with_body: bool,
) -> Outcome {
    let status = head.status;
    if let Err(source) = transport.send_head(head).await {
        let err = ServeError::SocketFatal { sent: 0, source };
        logger::log_error_context(&ErrorContext::from_error(&err));
        return Outcome {
            status,
            body_bytes: 0,
        };
    }
    if !with_body || body.is_empty() {
        return Outcome {
            status,
            body_bytes: 0,
        };
    }

    match transport::send_all(transport, body, settings).await {
        Ok(sent) => Outcome {
            status,
            body_bytes: sent,
        },
        Err(err) => {
            logger::log_error_context(&ErrorContext::from_error(&err));
            let body_bytes = match err {
                ServeError::SocketFatal { sent, .. } => sent,
                _ => 0,
            };
            Outcome { status, body_bytes }
        }
    }
}
