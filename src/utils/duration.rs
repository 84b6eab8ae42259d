//! Duration parsing utilities.
//!
//! Command-line durations ("30s", "40ms", "2.5m") are parsed into
//! [`std::time::Duration`] values.

use std::time::Duration;

/// Parse a duration string such as "30", "30s", "40ms", "1.5m" or "2h".
///
/// A bare number is taken as seconds. Fractional values are accepted.
///
/// # Examples
/// ```
/// use schedprobe::utils::duration::parse_duration;
/// use std::time::Duration;
///
/// assert_eq!(parse_duration("30"), Ok(Duration::from_secs(30)));
/// assert_eq!(parse_duration("40ms"), Ok(Duration::from_millis(40)));
/// assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
/// assert!(parse_duration("soon").is_err());
/// ```
pub fn parse_duration(duration: &str) -> Result<Duration, String> {
    let duration = duration.trim();
    let split = duration
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(duration.len());
    let (number, unit) = duration.split_at(split);

    let value: f64 = number
        .parse()
        .map_err(|_| format!("Invalid duration format: {}", duration))?;

    let scale = match unit.trim() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "ms" | "msec" | "millis" => 1e-3,
        "us" | "usec" => 1e-6,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        "h" | "hr" | "hrs" | "hour" | "hours" => 3600.0,
        other => return Err(format!("Unknown duration unit '{}' in {}", other, duration)),
    };

    let nanos = (value * scale * 1e9).round();
    if !nanos.is_finite() || nanos >= u64::MAX as f64 {
        return Err(format!("Duration out of range: {}", duration));
    }
    Ok(Duration::from_nanos(nanos as u64))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("1800"), Ok(Duration::from_secs(1800)));
        assert_eq!(parse_duration("0"), Ok(Duration::ZERO));
        assert_eq!(parse_duration("30s"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("30 seconds"), Ok(Duration::from_secs(30)));
        assert_eq!(parse_duration("1ms"), Ok(Duration::from_millis(1)));
        assert_eq!(parse_duration("250us"), Ok(Duration::from_micros(250)));
        assert_eq!(parse_duration("30min"), Ok(Duration::from_secs(1800)));
        assert_eq!(parse_duration("5h"), Ok(Duration::from_secs(18000)));
        assert_eq!(parse_duration("0.5"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("1.5m"), Ok(Duration::from_secs(90)));

        assert!(parse_duration("").is_err());
        assert!(parse_duration("invalid").is_err());
        assert!(parse_duration("5x").is_err());
        assert!(parse_duration("5minutesx").is_err());
        assert!(parse_duration("1.2.3s").is_err());
    }
}
