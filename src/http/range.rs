//! HTTP Range request parsing module
//!
//! Single byte-range parsing for resumable asset downloads (RFC 9110 §14).

/// Inclusive byte range resolved against a file size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: usize,
    pub end: usize,
}

/// What a `Range` header asks of a file
#[derive(Debug, PartialEq, Eq)]
pub enum RangeOutcome {
    /// No usable Range header, send the whole file
    Full,
    /// Send the given part with 206
    Partial(ByteRange),
    /// Range lies outside the file, answer 416
    Unsatisfiable,
}

/// Parse a `Range` header (single range, `bytes` unit only)
///
/// Supported formats:
/// - `bytes=start-end` - Specific range
/// - `bytes=start-` - From start to end
/// - `bytes=-suffix` - Last suffix bytes
///
/// Multi-range and malformed headers fall back to [`RangeOutcome::Full`].
pub fn parse_range_header(range_header: Option<&str>, file_size: usize) -> RangeOutcome {
    let Some(spec) = range_header.and_then(|h| h.trim().strip_prefix("bytes=")) else {
        return RangeOutcome::Full;
    };

    if spec.contains(',') {
        return RangeOutcome::Full;
    }

    let Some((start_str, end_str)) = spec.split_once('-') else {
        return RangeOutcome::Full;
    };
    let (start_str, end_str) = (start_str.trim(), end_str.trim());

    if start_str.is_empty() {
        return suffix_range(end_str, file_size);
    }
    bounded_range(start_str, end_str, file_size)
}

/// `-500` means the last 500 bytes
fn suffix_range(suffix_str: &str, file_size: usize) -> RangeOutcome {
    let Ok(suffix) = suffix_str.parse::<usize>() else {
        return RangeOutcome::Full;
    };
    if suffix == 0 || file_size == 0 {
        return RangeOutcome::Unsatisfiable;
    }
    RangeOutcome::Partial(ByteRange {
        start: file_size.saturating_sub(suffix),
        end: file_size - 1,
    })
}

/// `100-` or `0-99`; the end is clamped to the last byte
fn bounded_range(start_str: &str, end_str: &str, file_size: usize) -> RangeOutcome {
    let Ok(start) = start_str.parse::<usize>() else {
        return RangeOutcome::Full;
    };
    if start >= file_size {
        return RangeOutcome::Unsatisfiable;
    }

    let last = file_size - 1;
    let end = if end_str.is_empty() {
        last
    } else {
        match end_str.parse::<usize>() {
            Ok(e) => e.min(last),
            Err(_) => return RangeOutcome::Full,
        }
    };

    if start > end {
        return RangeOutcome::Unsatisfiable;
    }
    RangeOutcome::Partial(ByteRange { start, end })
}
