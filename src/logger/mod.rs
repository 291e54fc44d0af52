//! Logger module
//!
//! Logging utilities for the file server:
//! - Server lifecycle logging
//! - Access logging with multiple formats
//! - Located error records
//! - Transfer progress and throughput
//! - File-based logging support

mod format;
pub mod writer;

pub use format::{format_error, AccessLogEntry};
pub use writer::Level;

use crate::config::Config;
use crate::error::ErrorContext;
use chrono::Local;
use std::net::SocketAddr;
use std::time::Duration;

/// Initialize the logger with configuration
///
/// Should be called once at application startup.
pub fn init(config: &Config) -> std::io::Result<()> {
    writer::init(
        Level::parse(&config.logging.level),
        config.logging.access_log_file.as_deref(),
        config.logging.error_log_file.as_deref(),
    )
}

fn write(level: Level, message: &str) {
    if let Some(w) = writer::get() {
        w.write(level, message);
    } else if level >= Level::Warn {
        eprintln!("{message}");
    } else if level == Level::Info {
        println!("{message}");
    }
}

pub fn enabled(level: Level) -> bool {
    writer::get().map_or(level >= Level::Info, |w| w.enabled(level))
}

pub fn log_debug(message: &str) {
    write(Level::Debug, &format!("[DEBUG] {message}"));
}

pub fn log_info(message: &str) {
    write(Level::Info, &format!("[INFO] {message}"));
}

pub fn log_warning(message: &str) {
    write(Level::Warn, &format!("[WARN] {message}"));
}

pub fn log_error(message: &str) {
    write(Level::Error, &format!("[ERROR] {message}"));
}

/// Log a located error record
pub fn log_error_context(err: &ErrorContext) {
    write(Level::Error, &format_error(err, &Local::now()));
}

pub fn log_server_start(addr: &SocketAddr, config: &Config) {
    log_info("======================================");
    log_info(&format!("Static file server listening on: http://{addr}"));
    log_info(&format!(
        "Document root: {}",
        config.static_files.document_root
    ));
    log_info(&format!(
        "Cache: {} entries, TTL {}s",
        config.static_files.cache_capacity, config.static_files.cache_ttl_secs
    ));
    log_info(&format!(
        "Streaming: {} byte chunks, {} send retries",
        config.static_files.chunk_size, config.static_files.send_retries
    ));
    log_info(&format!("Log level: {}", config.logging.level));
    if let Some(ref path) = config.logging.access_log_file {
        log_info(&format!("Access log: {path}"));
    }
    if let Some(ref path) = config.logging.error_log_file {
        log_info(&format!("Error log: {path}"));
    }
    log_info("======================================");
}

pub fn log_connection_accepted(peer_addr: &SocketAddr) {
    log_debug(&format!("[Connection] Accepted from: {peer_addr}"));
}

pub fn log_connection_error(err: &impl std::fmt::Display) {
    log_error(&format!("Failed to serve connection: {err}"));
}

/// Log formatted access log entry
pub fn log_access(entry: &AccessLogEntry, format: &str) {
    let line = entry.format(format);
    match writer::get() {
        Some(w) => w.write_access(&line),
        None => println!("{line}"),
    }
}

/// Progress observation during a body transfer
pub fn log_transfer_progress(percent: u8, sent: usize, total: usize, elapsed: Duration) {
    if !enabled(Level::Debug) {
        return;
    }
    log_debug(&format!(
        "Progress: {percent:3}% ({sent}/{total} bytes), {:.2} MB/s",
        throughput_mbps(sent, elapsed)
    ));
}

pub fn log_transfer_complete(sent: usize, elapsed: Duration) {
    log_info(&format!(
        "Transfer completed: {sent} bytes sent in {} ms ({:.2} MB/s)",
        elapsed.as_millis(),
        throughput_mbps(sent, elapsed)
    ));
}

#[allow(clippy::cast_precision_loss)]
fn throughput_mbps(bytes: usize, elapsed: Duration) -> f64 {
    let secs = elapsed.as_secs_f64();
    if secs > 0.0 {
        bytes as f64 / (1024.0 * 1024.0) / secs
    } else {
        0.0
    }
}
