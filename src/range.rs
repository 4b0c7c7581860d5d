//! Parsing of the `Range` request header.
//!
//! This is deliberately not an RFC 7233 parser. Only a single
//! `bytes=<start>-<end>` interval is understood:
//!
//! * an empty start means offset 0, so `bytes=-500` is *not* a suffix range,
//! * an empty end means the last byte of the file,
//! * non-numeric offsets count as 0,
//! * anything after the first `start-end` pair (extra comma separated ranges)
//!   is silently ignored.

use std::borrow::Cow;

/// Inclusive byte interval into a file, `start <= end <= size - 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    pub fn new(start: u64, end: u64) -> Self {
        ByteRange { start, end }
    }

    /// Number of bytes covered, both ends included.
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// A requested interval that cannot be served, carrying the offsets exactly as
/// the client asked for them (before clamping).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnsatisfiableRange {
    pub start: u64,
    pub end: u64,
    pub size: u64,
}

/// Outcome of checking a `Range` header against a file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No `Range` header, the whole file is served.
    Full,
    /// A satisfiable interval, already clamped to the file size.
    Partial(ByteRange),
    Unsatisfiable(UnsatisfiableRange),
}

impl RangeRequest {
    pub fn parse(header: Option<&str>, size: u64) -> RangeRequest {
        let Some(header) = header else {
            return RangeRequest::Full;
        };

        let spec = strip_unit(header);
        let mut parts = spec.split('-');

        let start = parts.next().map(lenient_offset).unwrap_or(0);
        let requested_end = parts.next().filter(|end| !end.is_empty()).map(lenient_offset);

        let Some(max_offset) = size.checked_sub(1) else {
            // an empty file has no byte to point at
            let end = requested_end.unwrap_or(0);
            return RangeRequest::Unsatisfiable(UnsatisfiableRange { start, end, size });
        };

        let end = requested_end.unwrap_or(max_offset);
        let clamped_end = end.min(max_offset);

        if start > clamped_end || start > max_offset {
            return RangeRequest::Unsatisfiable(UnsatisfiableRange { start, end, size });
        }

        RangeRequest::Partial(ByteRange::new(start, clamped_end))
    }
}

/// Removes the first `bytes=` marker, wherever it appears, ignoring case.
fn strip_unit(header: &str) -> Cow<'_, str> {
    const UNIT: &str = "bytes=";

    // ascii lowercasing keeps byte offsets intact
    match header.to_ascii_lowercase().find(UNIT) {
        Some(at) => {
            let mut stripped = String::with_capacity(header.len() - UNIT.len());
            stripped.push_str(&header[..at]);
            stripped.push_str(&header[at + UNIT.len()..]);
            Cow::Owned(stripped)
        }
        None => Cow::Borrowed(header),
    }
}

/// Reads the leading decimal digits of `fragment`, skipping leading
/// whitespace and an optional `+`. Yields 0 when there are no digits and
/// saturates on overflow.
fn lenient_offset(fragment: &str) -> u64 {
    let fragment = fragment.trim_start();
    let fragment = fragment.strip_prefix('+').unwrap_or(fragment);

    let digits = fragment
        .find(|c: char| !c.is_ascii_digit())
        .map_or(fragment, |end| &fragment[..end]);

    if digits.is_empty() {
        return 0;
    }

    digits.parse().unwrap_or(u64::MAX)
}
