//! Shared utility functions used across multiple modules.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

use crate::error::{Error, Result};

/// Normalize optional text by trimming whitespace and removing empties.
///
/// Returns `None` when the input is `None` or the trimmed value is empty.
pub fn normalize_text_option(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Check if a string starts with `http://` or `https://`.
pub fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

/// Truncate text to at most 180 characters for error messages.
pub fn compact_text(value: &str) -> String {
    value.trim().chars().take(180).collect()
}

/// Validate and normalize an HTTP base URL (trailing slashes stripped).
pub fn normalize_http_base(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::InvalidInput("base URL must not be empty".to_string()));
    }
    if !is_http_url(trimmed) {
        return Err(Error::InvalidInput(
            "base URL must include http:// or https://".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Current UTC time, truncated to microseconds.
///
/// All timestamps in the system carry at most microsecond precision so that
/// a value survives a write/read round trip through the database unchanged.
pub fn utc_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Render a timestamp in the fixed-width RFC 3339 form used for storage.
///
/// Fixed width keeps lexicographic order identical to chronological order,
/// which the note listing relies on.
pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a timestamp previously written with [`format_timestamp`].
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|error| Error::LocalWrite(format!("invalid stored timestamp {raw:?}: {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_text_option_rejects_empty() {
        assert_eq!(normalize_text_option(None), None);
        assert_eq!(normalize_text_option(Some("   ".to_string())), None);
    }

    #[test]
    fn normalize_text_option_trims_value() {
        assert_eq!(
            normalize_text_option(Some(" https://example.com ".to_string())),
            Some("https://example.com".to_string())
        );
    }

    #[test]
    fn is_http_url_accepts_valid_schemes() {
        assert!(is_http_url("http://localhost"));
        assert!(is_http_url("https://example.com"));
        assert!(!is_http_url("ftp://example.com"));
        assert!(!is_http_url("example.com"));
    }

    #[test]
    fn normalize_http_base_strips_trailing_slash() {
        assert_eq!(
            normalize_http_base("https://api.example.com/ ").unwrap(),
            "https://api.example.com"
        );
        assert!(normalize_http_base("").is_err());
        assert!(normalize_http_base("api.example.com").is_err());
    }

    #[test]
    fn timestamp_round_trip_is_lossless() {
        let now = utc_now();
        let parsed = parse_timestamp(&format_timestamp(&now)).unwrap();
        assert_eq!(parsed, now);
    }

    #[test]
    fn timestamp_order_is_lexicographic() {
        let earlier = parse_timestamp("2024-03-01T10:00:00.000000Z").unwrap();
        let later = parse_timestamp("2024-03-01T10:00:01.500000Z").unwrap();
        assert!(format_timestamp(&earlier) < format_timestamp(&later));
    }

    #[test]
    fn parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("yesterday").is_err());
    }
}
