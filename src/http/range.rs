//! HTTP `Range` header parsing for ranged media streaming (spec §4.3
//! "Ranged GET").

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeError {
    Malformed,
    Unsatisfiable,
}

/// Parses a single-range `Range: bytes=...` header against a known file
/// size, returning the inclusive `[start, end]` byte range to serve.
///
/// Multiple comma-separated ranges are rejected as malformed rather than
/// collapsed to the first one — spec §4.3 requires a single `206` response
/// per request, and multipart/byteranges is out of scope.
pub fn parse_range_header(value: &str, file_size: u64) -> Result<(u64, u64), RangeError> {
    let spec = value.strip_prefix("bytes=").ok_or(RangeError::Malformed)?;
    if spec.contains(',') {
        return Err(RangeError::Malformed);
    }

    let (start_str, end_str) = spec.split_once('-').ok_or(RangeError::Malformed)?;

    if start_str.is_empty() {
        let suffix_len: u64 = end_str.parse().map_err(|_| RangeError::Malformed)?;
        if suffix_len == 0 {
            return Err(RangeError::Unsatisfiable);
        }
        let start = file_size.saturating_sub(suffix_len);
        return Ok((start, file_size.saturating_sub(1)));
    }

    let start: u64 = start_str.parse().map_err(|_| RangeError::Malformed)?;
    if start >= file_size {
        return Err(RangeError::Unsatisfiable);
    }

    let end = if end_str.is_empty() {
        file_size.saturating_sub(1)
    } else {
        let parsed: u64 = end_str.parse().map_err(|_| RangeError::Malformed)?;
        parsed.min(file_size.saturating_sub(1))
    };

    if start > end {
        return Err(RangeError::Unsatisfiable);
    }

    Ok((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_bounded_range() {
        assert_eq!(parse_range_header("bytes=100-199", 1000), Ok((100, 199)));
    }

    #[test]
    fn parses_an_open_ended_range() {
        assert_eq!(parse_range_header("bytes=900-", 1000), Ok((900, 999)));
    }

    #[test]
    fn parses_a_suffix_range() {
        assert_eq!(parse_range_header("bytes=-500", 1000), Ok((500, 999)));
    }

    #[test]
    fn clamps_an_end_beyond_the_file_size() {
        assert_eq!(parse_range_header("bytes=0-99999", 1000), Ok((0, 999)));
    }

    #[test]
    fn rejects_a_start_at_or_past_eof() {
        assert_eq!(
            parse_range_header("bytes=1000-", 1000),
            Err(RangeError::Unsatisfiable)
        );
    }

    #[test]
    fn rejects_a_suffix_longer_than_zero_bytes_requested() {
        assert_eq!(
            parse_range_header("bytes=-0", 1000),
            Err(RangeError::Unsatisfiable)
        );
    }

    #[test]
    fn rejects_malformed_headers() {
        assert_eq!(parse_range_header("nonsense", 1000), Err(RangeError::Malformed));
        assert_eq!(parse_range_header("bytes=abc-def", 1000), Err(RangeError::Malformed));
        assert_eq!(
            parse_range_header("bytes=0-10,20-30", 1000),
            Err(RangeError::Malformed)
        );
    }
}
