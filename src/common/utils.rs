//! Utility functions for ringmend

use std::time::Duration;

/// One week, the fallback when a cluster interval string fails to parse
pub const WEEK: Duration = Duration::from_secs(7 * 24 * 3600);

/// Parse duration string (e.g., "500ms", "30s", "5m", "1h", "7d", "2w")
pub fn parse_duration(s: &str) -> crate::Result<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return Err(crate::Error::InvalidConfig("empty duration".into()));
    }

    let (num_str, unit) = if s.ends_with("ms") {
        (&s[..s.len() - 2], "ms")
    } else {
        (&s[..s.len() - 1], &s[s.len() - 1..])
    };

    let num: u64 = num_str
        .parse()
        .map_err(|_| crate::Error::InvalidConfig(format!("invalid duration: {}", s)))?;

    let duration = match unit {
        "ms" => Duration::from_millis(num),
        "s" => Duration::from_secs(num),
        "m" => Duration::from_secs(num * 60),
        "h" => Duration::from_secs(num * 3600),
        "d" => Duration::from_secs(num * 86400),
        "w" => Duration::from_secs(num * 7 * 86400),
        _ => {
            return Err(crate::Error::InvalidConfig(format!(
                "unknown duration unit: {}",
                unit
            )))
        }
    };

    Ok(duration)
}

/// Parse a duration string, falling back to `default` with a warning.
///
/// Cluster intervals come from operator-edited config; a typo must not kill
/// the scheduling loop.
pub fn parse_duration_or(s: &str, default: Duration) -> Duration {
    match parse_duration(s) {
        Ok(d) => d,
        Err(e) => {
            tracing::warn!("Duration parsing error for {:?}: {}, using {:?}", s, e, default);
            default
        }
    }
}

/// Format a duration compactly for log fields
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
    } else if secs >= 60 {
        format!("{}m{}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", d.as_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("500ms").unwrap(), Duration::from_millis(500));
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("168h").unwrap(), Duration::from_secs(604800));
        assert_eq!(parse_duration("7d").unwrap(), Duration::from_secs(604800));
        assert_eq!(parse_duration("1w").unwrap(), Duration::from_secs(604800));
    }

    #[test]
    fn test_parse_duration_invalid() {
        assert!(parse_duration("").is_err());
        assert!(parse_duration("abc").is_err());
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("s").is_err());
    }

    #[test]
    fn test_parse_duration_or_falls_back() {
        assert_eq!(parse_duration_or("1h", WEEK), Duration::from_secs(3600));
        assert_eq!(parse_duration_or("junk", WEEK), WEEK);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(42)), "42s");
        assert_eq!(format_duration(Duration::from_secs(90)), "1m30s");
        assert_eq!(format_duration(Duration::from_secs(3720)), "1h2m");
    }
}
