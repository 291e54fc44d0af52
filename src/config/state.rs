//! Application state module
//!
//! Process-scoped context shared by every request: configuration, path validator, file cache

use std::sync::{Mutex, MutexGuard, PoisonError};

use super::types::Config;
use crate::files::{FileCache, PathValidator};
use crate::transport::StreamSettings;

/// Application state
pub struct AppState {
    pub config: Config,
    pub validator: PathValidator,
    pub stream: StreamSettings,
    cache: Mutex<FileCache>,
}

impl AppState {
    pub fn new(config: &Config) -> Self {
        let files = &config.static_files;
        Self {
            config: config.clone(),
            validator: PathValidator::new(&files.document_root),
            stream: StreamSettings::from_config(files),
            cache: Mutex::new(FileCache::new(files.cache_capacity, files.cache_ttl())),
        }
    }

    /// Lock the file cache
    ///
    /// Guards must not be held across an await point. A panic while holding the lock
    /// leaves the cache usable: every operation keeps it consistent between statements.
    pub fn cache(&self) -> MutexGuard<'_, FileCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
