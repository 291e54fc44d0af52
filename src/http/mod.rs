//! HTTP protocol layer module
//!
//! Protocol helpers decoupled from file handling: MIME lookup, Range parsing,
//! conditional-request dates and response heads.

pub mod cache;
pub mod mime;
pub mod range;
pub mod response;

// Re-export commonly used types
pub use range::{RangeRequest, RangeSpec};
pub use response::{
    build_304_head, build_error_response, build_full_head, build_json_response,
    build_partial_head, FileHeaders, ResponseHead,
};
