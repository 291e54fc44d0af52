//! HTTP Range request parsing module
//!
//! Parses `bytes=` Range headers (RFC 7233 syntax) into inclusive byte spans. Only the
//! first satisfiable span is served; the rest are kept for callers that want them.

/// Maximum number of comma-separated specs considered by default
pub const DEFAULT_MAX_RANGE_PARTS: usize = 10;

/// Inclusive byte span `[start, end]` with `start <= end < file_size`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeSpec {
    pub start: u64,
    pub end: u64,
}

impl RangeSpec {
    /// Number of bytes covered by this span
    #[inline]
    pub const fn length(&self) -> u64 {
        self.end - self.start + 1
    }

    /// Value for the `Content-Range` header
    pub fn content_range(&self, file_size: u64) -> String {
        format!("bytes {}-{}/{file_size}", self.start, self.end)
    }
}

/// The satisfiable specs of one Range header, in request order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeRequest {
    specs: Vec<RangeSpec>,
}

impl RangeRequest {
    /// The span the server acts on
    pub fn first(&self) -> RangeSpec {
        // parse() never builds an empty request
        self.specs[0]
    }

    pub fn specs(&self) -> &[RangeSpec] {
        &self.specs
    }
}

/// Parse a Range header against a file of `file_size` bytes
///
/// Supported token formats:
/// - `start-end` - specific range, `end` clamped to the last byte
/// - `start-` - from start to end of file
/// - `-suffix` - last `suffix` bytes
///
/// Unsatisfiable or malformed tokens are dropped; `None` means no usable span remains.
///
/// # Examples
/// ```
/// use static_file_server::http::range::parse;
///
/// let ranges = parse("bytes=-100", 1000, 10).unwrap();
/// assert_eq!((ranges.first().start, ranges.first().end), (900, 999));
///
/// assert!(parse("bytes=2000-3000", 1000, 10).is_none());
/// ```
pub fn parse(range_header: &str, file_size: u64, max_parts: usize) -> Option<RangeRequest> {
    let specs_str = range_header.trim().strip_prefix("bytes=")?;

    let specs: Vec<RangeSpec> = specs_str
        .split(',')
        .take(max_parts)
        .filter_map(|token| parse_spec(token.trim(), file_size))
        .collect();

    if specs.is_empty() {
        None
    } else {
        Some(RangeRequest { specs })
    }
}

fn parse_spec(token: &str, file_size: u64) -> Option<RangeSpec> {
    let (start_str, end_str) = token.split_once('-')?;
    let (start_str, end_str) = (start_str.trim(), end_str.trim());
    let last = file_size.checked_sub(1)?;

    let (start, end) = if start_str.is_empty() {
        // Suffix range: "-500" means the last 500 bytes
        let suffix = end_str.parse::<u64>().ok()?;
        (file_size.saturating_sub(suffix), last)
    } else {
        let start = start_str.parse::<u64>().ok()?;
        let end = if end_str.is_empty() {
            last
        } else {
            end_str.parse::<u64>().ok()?.min(last)
        };
        (start, end)
    };

    if start > end || start >= file_size {
        return None;
    }
    Some(RangeSpec { start, end })
}
