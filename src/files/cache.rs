//! In-memory file cache
//!
//! Bounded store of whole-file buffers keyed by resolved path. Entries expire after a TTL
//! and are dropped as soon as the file on disk is newer than the cached copy. Each entry
//! counts the read results currently borrowing it; when the store is full the oldest
//! entry is evicted (FIFO, regardless of use).

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use hyper::body::Bytes;

use super::reader::{FileReadResult, Origin};
use crate::logger;

/// One cached file
#[derive(Debug)]
pub struct CachedFile {
    path: PathBuf,
    data: Bytes,
    content_type: String,
    last_modified: SystemTime,
    cached_at: Instant,
    ref_count: usize,
}

impl CachedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub const fn data(&self) -> &Bytes {
        &self.data
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    pub fn content_type(&self) -> &str {
        &self.content_type
    }

    pub const fn last_modified(&self) -> SystemTime {
        self.last_modified
    }

    pub const fn cached_at(&self) -> Instant {
        self.cached_at
    }

    /// Read results currently borrowing this buffer
    pub const fn ref_count(&self) -> usize {
        self.ref_count
    }

    fn is_buffer_of(&self, result: &FileReadResult) -> bool {
        self.path == result.path
            && self.data.as_ptr() == result.data.as_ptr()
            && self.data.len() == result.data.len()
    }
}

/// Bounded FIFO cache of file buffers
#[derive(Debug)]
pub struct FileCache {
    entries: Vec<CachedFile>,
    capacity: usize,
    ttl: Duration,
}

impl FileCache {
    pub fn new(capacity: usize, ttl: Duration) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            ttl,
        }
    }

    /// Look up a file and take a reference on it
    ///
    /// Expired entries, entries whose file changed on disk, and entries whose file can
    /// no longer be inspected are evicted and reported as misses.
    pub fn get(&mut self, path: &Path) -> Option<FileReadResult> {
        let idx = self.entries.iter().position(|e| e.path == path)?;
        let entry = &self.entries[idx];

        if entry.cached_at.elapsed() > self.ttl {
            logger::log_debug(&format!("Cache entry expired: {}", path.display()));
            self.entries.remove(idx);
            return None;
        }

        match current_mtime(path) {
            Some(mtime) if mtime <= entry.last_modified => {}
            Some(_) => {
                logger::log_debug(&format!("Cache entry stale: {}", path.display()));
                self.entries.remove(idx);
                return None;
            }
            None => {
                logger::log_debug(&format!("Cache entry unreadable on disk: {}", path.display()));
                self.entries.remove(idx);
                return None;
            }
        }

        let entry = &mut self.entries[idx];
        entry.ref_count += 1;
        logger::log_debug(&format!(
            "Cache hit: {} (refs {})",
            path.display(),
            entry.ref_count
        ));
        Some(FileReadResult::from_cache(entry))
    }

    /// Store a freshly read file and hand back a result that borrows the cached copy
    ///
    /// Unsuccessful or already cached results are returned untouched, as are files whose
    /// modification time cannot be determined. An existing entry for the same path is
    /// replaced.
    pub fn put(&mut self, path: &Path, result: FileReadResult) -> FileReadResult {
        if !result.is_ok() || result.origin == Origin::Cache {
            return result;
        }
        let Some(last_modified) = current_mtime(path).or(result.last_modified) else {
            return result;
        };

        self.remove(path);
        if self.entries.len() >= self.capacity {
            let evicted = self.entries.remove(0);
            logger::log_debug(&format!(
                "Cache full, evicted {} (refs {})",
                evicted.path.display(),
                evicted.ref_count
            ));
        }

        let entry = CachedFile {
            path: path.to_path_buf(),
            data: result.data,
            content_type: result.content_type,
            last_modified,
            cached_at: Instant::now(),
            ref_count: 1,
        };
        logger::log_debug(&format!(
            "Cached {} ({} bytes)",
            entry.path.display(),
            entry.data.len()
        ));
        let borrowed = FileReadResult::from_cache(&entry);
        self.entries.push(entry);
        borrowed
    }

    /// Return a result's reference
    ///
    /// Results that own their buffer, or whose entry is gone, are simply dropped.
    pub fn release(&mut self, result: FileReadResult) {
        if result.origin != Origin::Cache {
            return;
        }
        if let Some(entry) = self.entries.iter_mut().find(|e| e.is_buffer_of(&result)) {
            entry.ref_count = entry.ref_count.saturating_sub(1);
        }
    }

    /// Drop the entry for a path; outstanding results keep their bytes
    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.path != path);
        before != self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Whether a path is resident, without TTL or freshness checks
    pub fn contains(&self, path: &Path) -> bool {
        self.entries.iter().any(|e| e.path == path)
    }

    pub fn ref_count(&self, path: &Path) -> Option<usize> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .map(|e| e.ref_count)
    }
}

fn current_mtime(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}
