//! Configuration module entry point
//!
//! Loads, validates and exposes application configuration and runtime state

mod state;
mod types;

use std::net::SocketAddr;

pub use state::AppState;
pub use types::{Config, HttpConfig, LoggingConfig, ServerConfig, StaticFilesConfig};

/// Config file used when no path is given on the command line
pub const DEFAULT_CONFIG_PATH: &str = "config";

impl Config {
    /// Load configuration from the specified file path (extension optional)
    ///
    /// The file is not required; environment variables such as
    /// `SERVER__STATIC_FILES__DOCUMENT_ROOT` override it and built-in defaults fill the rest.
    pub fn load_from(config_path: &str) -> Result<Self, config::ConfigError> {
        let defaults = StaticFilesConfig::default();
        let settings = config::Config::builder()
            .add_source(config::File::with_name(config_path).required(false))
            .add_source(config::Environment::with_prefix("SERVER").separator("__"))
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 8080)?
            .set_default("static_files.document_root", defaults.document_root)?
            .set_default("static_files.index_file", defaults.index_file)?
            .set_default("static_files.cache_capacity", to_i64(defaults.cache_capacity))?
            .set_default("static_files.cache_ttl_secs", to_i64(defaults.cache_ttl_secs))?
            .set_default("static_files.chunk_size", to_i64(defaults.chunk_size))?
            .set_default("static_files.max_range_parts", to_i64(defaults.max_range_parts))?
            .set_default("static_files.send_retries", to_i64(defaults.send_retries))?
            .set_default("static_files.retry_delay_ms", to_i64(defaults.retry_delay_ms))?
            .set_default("static_files.would_block_pause_ms", to_i64(defaults.would_block_pause_ms))?
            .set_default("logging.level", "info")?
            .set_default("logging.access_log", true)?
            .set_default("http.server_name", "static-file-server/0.1")?
            .set_default("http.max_body_size", 10_485_760)? // 10MB
            .build()?;

        let cfg: Self = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let invalid = |msg: &str| Err(config::ConfigError::Message(msg.to_string()));

        if self.server.port == 0 {
            return invalid("server.port must be between 1 and 65535");
        }
        if self.static_files.cache_capacity == 0 {
            return invalid("static_files.cache_capacity must be at least 1");
        }
        if self.static_files.chunk_size < 1024 {
            return invalid("static_files.chunk_size must be at least 1024 bytes");
        }
        if self.static_files.max_range_parts == 0 {
            return invalid("static_files.max_range_parts must be at least 1");
        }
        if self.static_files.document_root.is_empty() {
            return invalid("static_files.document_root must not be empty");
        }
        Ok(())
    }

    pub fn get_socket_addr(&self) -> Result<SocketAddr, String> {
        format!("{}:{}", self.server.host, self.server.port)
            .parse()
            .map_err(|e| format!("Invalid address: {e}"))
    }
}

fn to_i64<T: TryInto<i64>>(value: T) -> i64 {
    value.try_into().unwrap_or(i64::MAX)
}
