//! Connection handling module
//!
//! Serves a single accepted TCP connection with hyper

use std::net::SocketAddr;
use std::sync::Arc;

use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;

use crate::config::AppState;
use crate::handler;
use crate::logger;

/// Serve one connection to completion.
///
/// Each connection carries exactly one request: keep-alive is disabled and every
/// response advertises `Connection: close`. Must run inside a `LocalSet`, since request
/// handlers are spawned as local tasks.
pub async fn serve_connection(stream: TcpStream, peer_addr: SocketAddr, state: &Arc<AppState>) {
    logger::log_connection_accepted(&peer_addr);

    let io = TokioIo::new(stream);
    let state = Arc::clone(state);
    let service = service_fn(move |req| handler::handle_request(req, Arc::clone(&state), peer_addr));

    let mut builder = http1::Builder::new();
    builder.keep_alive(false);

    if let Err(err) = builder.serve_connection(io, service).await {
        logger::log_connection_error(&err);
    }
}
