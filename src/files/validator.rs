//! Request path validation
//!
//! Confines request paths to the document root. A path is accepted only after it survives
//! a denylist of encoded traversal markers, fixed-point percent/unicode decoding, per-token
//! checks, and a final containment check on the resolved filesystem path. Every rejection
//! is logged with its reason.

use std::fmt;
use std::io;
use std::path::{Component, Path, PathBuf};

use crate::logger;

/// Encoded traversal and separator markers, compared against the lowercased raw path
const DENYLIST: &[&str] = &[
    "%2e%2e", "%2e.", ".%2e", "%u002e", "%c0%2e", "%c0%ae", "%00", "%2f", "%5c", "%252e",
    "%252f", "%255c", "%c0%af", "%c1%9c", "%u2215", "%u2216", "%uff0e",
];

/// Why a request path was refused
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRejection {
    pub reason: &'static str,
    /// The offending path or token
    pub subject: String,
}

impl fmt::Display for PathRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.subject)
    }
}

impl std::error::Error for PathRejection {}

/// Validates request paths against a document root
#[derive(Debug, Clone)]
pub struct PathValidator {
    root: PathBuf,
}

impl PathValidator {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Whether `request_path` resolves to a file inside the document root
    pub fn is_safe(&self, request_path: &str) -> bool {
        self.validate(request_path).is_ok()
    }

    /// Validate `request_path` and return its canonical location under the root
    ///
    /// Paths that do not exist yet resolve through their deepest existing ancestor, so a
    /// missing file still validates and can be reported as not found.
    pub fn validate(&self, request_path: &str) -> Result<PathBuf, PathRejection> {
        self.check(request_path).inspect_err(|rejection| {
            logger::log_warning(&format!(
                "Path rejected ({}): '{}' [{}]",
                rejection.reason, request_path, rejection.subject
            ));
        })
    }

    fn check(&self, request_path: &str) -> Result<PathBuf, PathRejection> {
        if request_path.is_empty() {
            return Err(reject("empty path", request_path));
        }

        let lowered = request_path.to_ascii_lowercase();
        if lowered.contains("..") {
            return Err(reject("traversal sequence", request_path));
        }
        if let Some(marker) = DENYLIST.iter().find(|m| lowered.contains(*m)) {
            return Err(reject("encoded traversal marker", marker));
        }

        let root = self
            .root
            .canonicalize()
            .map_err(|_| reject("document root unresolvable", &self.root.display().to_string()))?;

        let decoded = decode_to_fixed_point(request_path)
            .ok_or_else(|| reject("decoded path is not valid UTF-8", request_path))?;

        let tokens = check_tokens(&decoded)?;
        let relative = collapse_separators(&tokens);

        let resolved = resolve(&root.join(&relative))
            .map_err(|_| reject("path unresolvable", &relative))?;

        // Path::starts_with compares whole components, so "/root-evil" never matches "/root"
        if resolved != root && !resolved.starts_with(&root) {
            return Err(reject(
                "resolved path escapes document root",
                &resolved.display().to_string(),
            ));
        }

        if resolved != root {
            if let Some(name) = resolved.file_name().and_then(|n| n.to_str()) {
                if name.starts_with('.') {
                    return Err(reject("hidden file", name));
                }
            }
        }

        Ok(resolved)
    }
}

/// Canonicalize `path`; for a path that does not exist yet, canonicalize its deepest
/// existing ancestor and append the remaining components
fn resolve(path: &Path) -> io::Result<PathBuf> {
    let err = match path.canonicalize() {
        Ok(p) => return Ok(p),
        Err(e) if e.kind() == io::ErrorKind::NotFound => e,
        Err(e) => return Err(e),
    };

    let mut tail = Vec::new();
    let mut current = path;
    while let (Some(parent), Some(name)) = (current.parent(), current.file_name()) {
        tail.push(name);
        match parent.canonicalize() {
            Ok(base) => return Ok(tail.iter().rev().fold(base, |acc, n| acc.join(n))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => current = parent,
            Err(e) => return Err(e),
        }
    }
    Err(err)
}

fn reject(reason: &'static str, subject: &str) -> PathRejection {
    PathRejection {
        reason,
        subject: subject.to_string(),
    }
}

/// Percent- and `%uXXXX`-decode repeatedly until the output stops changing
///
/// Returns `None` when the final bytes are not UTF-8.
pub fn decode_to_fixed_point(input: &str) -> Option<String> {
    let mut current = input.as_bytes().to_vec();
    loop {
        let next = decode_once(&current);
        // Each productive pass strictly shortens the input, so this terminates
        if next == current {
            break;
        }
        current = next;
    }
    String::from_utf8(current).ok()
}

fn decode_once(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(input.len());
    let mut i = 0;
    while i < input.len() {
        if input[i] == b'%' {
            if let Some((ch, used)) = unicode_escape(&input[i + 1..]) {
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
                i += 1 + used;
                continue;
            }
            if let (Some(hi), Some(lo)) = (
                input.get(i + 1).and_then(|b| hex_value(*b)),
                input.get(i + 2).and_then(|b| hex_value(*b)),
            ) {
                out.push((hi << 4) | lo);
                i += 3;
                continue;
            }
        }
        out.push(input[i]);
        i += 1;
    }
    out
}

/// Parse `uXXXX` following a `%`
fn unicode_escape(rest: &[u8]) -> Option<(char, usize)> {
    if !matches!(rest.first(), Some(b'u' | b'U')) || rest.len() < 5 {
        return None;
    }
    let code = rest[1..5]
        .iter()
        .try_fold(0u32, |acc, b| hex_value(*b).map(|v| (acc << 4) | u32::from(v)))?;
    char::from_u32(code).map(|ch| (ch, 5))
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Split on both separators and check every token; returns the kept tokens
fn check_tokens(decoded: &str) -> Result<Vec<&str>, PathRejection> {
    let mut depth: i32 = 0;
    let mut kept = Vec::new();

    for token in decoded.split(['/', '\\']) {
        if token.is_empty() || token == "." {
            continue;
        }
        if token == ".." {
            depth -= 1;
            if depth < 0 {
                return Err(reject("path climbs above document root", token));
            }
        }
        if token.contains("..") {
            return Err(reject("traversal token", token));
        }

        let total = token.chars().count();
        let unusual = token
            .chars()
            .filter(|c| !(c.is_alphanumeric() || matches!(c, '.' | '-' | '_')))
            .count();
        if unusual * 2 > total {
            return Err(reject("too many special characters in token", token));
        }

        if Path::new(token)
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(reject("token is not a plain file name", token));
        }

        depth += 1;
        kept.push(token);
    }

    Ok(kept)
}

/// Join tokens with the platform separator, collapsing runs of separators
fn collapse_separators(tokens: &[&str]) -> String {
    tokens.join(std::path::MAIN_SEPARATOR_STR)
}
