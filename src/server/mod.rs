//! Server module entry point
//!
//! Listener setup, the sequential accept loop and graceful shutdown

pub mod connection;
pub mod listener;

pub use listener::create_reusable_listener;

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::net::TcpListener;

use crate::config::{AppState, Config};
use crate::logger;

/// Bind the configured address and serve until Ctrl-C
///
/// Must be driven inside a `LocalSet`.
pub async fn run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = config.get_socket_addr()?;
    let listener = create_reusable_listener(addr)?;
    let state = Arc::new(AppState::new(config));

    if !Path::new(&config.static_files.document_root).is_dir() {
        logger::log_warning(&format!(
            "Document root '{}' is not a directory; every request will be refused",
            config.static_files.document_root
        ));
    }
    logger::log_server_start(&addr, config);

    serve_until(listener, state, shutdown_signal()).await;
    Ok(())
}

/// Accept and serve connections one at a time until `shutdown` completes
///
/// A connection in progress is always finished before shutdown is observed. The file
/// cache is cleared once the loop stops.
pub async fn serve_until<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F)
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer_addr)) => {
                    connection::serve_connection(stream, peer_addr, &state).await;
                }
                Err(e) => logger::log_error(&format!("Failed to accept connection: {e}")),
            },
            () = &mut shutdown => {
                logger::log_info("Shutdown requested, no longer accepting connections");
                break;
            }
        }
    }

    let released = {
        let mut cache = state.cache();
        let count = cache.len();
        cache.clear();
        count
    };
    logger::log_info(&format!("Server stopped, released {released} cached files"));
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        logger::log_error(&format!("Failed to listen for Ctrl-C: {e}"));
        std::future::pending::<()>().await;
    }
}
