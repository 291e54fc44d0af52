//! Static file server
//!
//! Serves files from a document root over HTTP/1.1 with path confinement, an in-memory
//! file cache, conditional requests and single-range partial content, plus PUT/DELETE for
//! managing the files themselves.

pub mod config;
pub mod error;
pub mod files;
pub mod handler;
pub mod http;
pub mod logger;
pub mod server;
pub mod transport;
