//! Duration text helpers
//!
//! Parses operator-entered durations ("45s", "10m", "2h", "7d") and renders
//! millisecond spans for display. Persisted values never go through these
//! helpers; they always store raw instants.

use std::time::Duration;

const SECOND_MS: u64 = 1_000;
const MINUTE_MS: u64 = 60 * SECOND_MS;
const HOUR_MS: u64 = 60 * MINUTE_MS;
const DAY_MS: u64 = 24 * HOUR_MS;

/// Errors produced while parsing duration text
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FormatError {
    #[error("Invalid duration format: {0:?} (expected e.g. 45s, 10m, 2h, 7d)")]
    InvalidFormat(String),
}

/// Parse a duration such as `"10m"` into a [`Duration`].
///
/// Accepts a non-negative integer immediately followed by one unit letter:
/// `s`, `m`, `h` or `d`. Surrounding whitespace is ignored and the unit is
/// case-insensitive.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use flash_sale::domain::parse_duration;
///
/// assert_eq!(parse_duration("10m").unwrap(), Duration::from_secs(600));
/// assert!(parse_duration("10 minutes").is_err());
/// ```
pub fn parse_duration(text: &str) -> Result<Duration, FormatError> {
    let invalid = || FormatError::InvalidFormat(text.to_string());

    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    let unit = chars.next_back().ok_or_else(invalid)?;
    let digits = chars.as_str();

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }

    let unit_ms = match unit.to_ascii_lowercase() {
        's' => SECOND_MS,
        'm' => MINUTE_MS,
        'h' => HOUR_MS,
        'd' => DAY_MS,
        _ => return Err(invalid()),
    };

    let value: u64 = digits.parse().map_err(|_| invalid())?;
    let millis = value.checked_mul(unit_ms).ok_or_else(invalid)?;

    Ok(Duration::from_millis(millis))
}

/// Render a millisecond span for humans.
///
/// - `"Dd Hh Mm"` when at least one day
/// - `"HH:MM:SS"` when at least one hour
/// - `"MM:SS"` otherwise
pub fn format_duration(millis: u64) -> String {
    let days = millis / DAY_MS;
    let hours = (millis % DAY_MS) / HOUR_MS;
    let minutes = (millis % HOUR_MS) / MINUTE_MS;
    let seconds = (millis % MINUTE_MS) / SECOND_MS;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// Convenience wrapper over [`format_duration`] for [`Duration`] values.
pub fn format_std_duration(duration: Duration) -> String {
    format_duration(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}
