// Configuration types module
// Defines all configuration-related data structures

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub static_files: StaticFilesConfig,
    pub logging: LoggingConfig,
    pub http: HttpConfig,
}

/// Listen address
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Static file delivery: document root, cache and streaming parameters
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StaticFilesConfig {
    pub document_root: String,
    /// Served for `/` and the empty path
    pub index_file: String,
    pub cache_capacity: usize,
    pub cache_ttl_secs: u64,
    pub chunk_size: usize,
    pub max_range_parts: usize,
    pub send_retries: u32,
    pub retry_delay_ms: u64,
    pub would_block_pause_ms: u64,
}

impl StaticFilesConfig {
    pub const fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub const fn would_block_pause(&self) -> Duration {
        Duration::from_millis(self.would_block_pause_ms)
    }
}

impl Default for StaticFilesConfig {
    fn default() -> Self {
        Self {
            document_root: "./static".to_string(),
            index_file: "/index.html".to_string(),
            cache_capacity: 100,
            cache_ttl_secs: 300,
            chunk_size: 64 * 1024,
            max_range_parts: 10,
            send_retries: 3,
            retry_delay_ms: 1000,
            would_block_pause_ms: 1,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub access_log: bool,
    /// Access log format (combined, common, json, or custom pattern)
    #[serde(default = "default_access_log_format")]
    pub access_log_format: String,
    /// Access log file path (optional, stdout if not set)
    #[serde(default)]
    pub access_log_file: Option<String>,
    /// Error log file path (optional, stderr if not set)
    #[serde(default)]
    pub error_log_file: Option<String>,
}

#[allow(clippy::missing_const_for_fn)]
fn default_access_log_format() -> String {
    "combined".to_string()
}

/// HTTP configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HttpConfig {
    /// Value of the `Server` response header
    pub server_name: String,
    /// Largest accepted request body (PUT uploads)
    pub max_body_size: u64,
}
