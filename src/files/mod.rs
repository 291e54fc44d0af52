//! File access layer
//!
//! Confines request paths to the document root, reads files from disk and keeps recently
//! served files in memory.

pub mod cache;
pub mod reader;
pub mod validator;

pub use cache::{CachedFile, FileCache};
pub use reader::{read_file, FileReadResult, Origin};
pub use validator::{PathRejection, PathValidator};
