//! Validated znode paths.
//!
//! Paths are canonical, absolute, slash-separated names. Validation
//! follows ZooKeeper's `PathUtils` rules and runs when the field is
//! decoded, so handlers test [`Path::is_valid`] instead of re-parsing.
//! An invalid path is not a decode error: the request still parses and
//! the handler answers with `BAD_ARGUMENTS`.

use bytes::BytesMut;

use crate::error::WireResult;
use crate::record::{get_string, put_string};

/// A znode path with its validity computed at decode time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    value: String,
    valid: bool,
}

impl Path {
    /// Wraps a raw string, computing the validity flag.
    #[must_use]
    pub fn new(value: impl Into<String>) -> Self {
        let value = value.into();
        let valid = validate(&value);
        Self { value, valid }
    }

    /// Decodes a path field (a length-prefixed string on the wire).
    ///
    /// # Errors
    /// Propagates string decode errors; validation itself cannot fail.
    pub fn decode(buf: &mut &[u8]) -> WireResult<Self> {
        Ok(Self::new(get_string(buf)?))
    }

    /// Encodes the path as a plain string field.
    pub fn encode(&self, buf: &mut BytesMut) {
        put_string(buf, &self.value);
    }

    /// Whether the path satisfies all validation rules.
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    /// The raw path string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Applies the `PathUtils` rules: non-empty, absolute, no trailing slash
/// (except root), no NUL, no empty or relative segments, no code points
/// from the reserved ranges.
fn validate(path: &str) -> bool {
    let mut chars = path.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if first != '/' {
        return false;
    }
    if chars.next().is_none() {
        // Just the root.
        return true;
    }
    if path.ends_with('/') {
        return false;
    }

    let mut last = '\0';
    for c in path.chars() {
        if c == '\0' {
            return false;
        }
        if c == '/' && last == '/' {
            return false;
        }
        if forbidden(c) {
            return false;
        }
        last = c;
    }

    // The leading '/' guarantees split() yields one empty head segment;
    // every later segment is non-empty because of the `//` check above.
    path.split('/').skip(1).all(|seg| seg != "." && seg != "..")
}

/// Code points ZooKeeper forbids in paths.
const fn forbidden(c: char) -> bool {
    let cp = c as u32;
    (cp >= 0x0001 && cp <= 0x001f)
        || (cp >= 0x007f && cp <= 0x009f)
        || (cp >= 0xd8f3 && cp <= 0xf8ff)
        || (cp >= 0xfff0 && cp <= 0xffff)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid(s: &str) -> bool {
        Path::new(s).is_valid()
    }

    #[test]
    fn test_valid_paths() {
        assert!(valid("/"));
        assert!(valid("/a"));
        assert!(valid("/a/b"));
        assert!(valid("/a.b/c..d"));
        assert!(valid("/..."));
        assert!(valid("/deeply/nested/path/with/many/segments"));
    }

    #[test]
    fn test_empty_and_relative_rejected() {
        assert!(!valid(""));
        assert!(!valid("a"));
        assert!(!valid("a/b"));
    }

    #[test]
    fn test_trailing_slash_rejected() {
        assert!(!valid("/a/"));
        assert!(!valid("/a/b/"));
    }

    #[test]
    fn test_empty_segment_rejected() {
        assert!(!valid("/a//b"));
        assert!(!valid("//"));
    }

    #[test]
    fn test_dot_segments_rejected() {
        assert!(!valid("/./"));
        assert!(!valid("/../"));
        assert!(!valid("/a/./b"));
        assert!(!valid("/a/../b"));
        assert!(!valid("/a/.."));
        assert!(!valid("/."));
    }

    #[test]
    fn test_nul_rejected() {
        assert!(!valid("/a\u{0}b"));
    }

    #[test]
    fn test_control_ranges_rejected() {
        assert!(!valid("/a\u{1}b"));
        assert!(!valid("/a\u{1f}b"));
        assert!(!valid("/a\u{7f}b"));
        assert!(!valid("/a\u{9f}b"));
        assert!(!valid("/a\u{f8ff}b"));
        assert!(!valid("/a\u{fff0}b"));
        assert!(!valid("/a\u{ffff}b"));
    }

    #[test]
    fn test_boundary_code_points_allowed() {
        assert!(valid("/a\u{20}b"));
        assert!(valid("/a\u{a0}b"));
        assert!(valid("/a\u{f900}b"));
        assert!(valid("/züri/节点"));
    }

    #[test]
    fn test_decode_keeps_invalid_path() {
        let mut buf = BytesMut::new();
        put_string(&mut buf, "/a//b");

        let mut cursor = &buf[..];
        let path = Path::decode(&mut cursor).unwrap();
        assert_eq!(path.as_str(), "/a//b");
        assert!(!path.is_valid());
    }
}
