//! Timestamp helpers shared by file lists and the operation log.
//!
//! All text timestamps use `yyyy-MM-dd HH:mm:ss` in UTC, so every value is
//! truncated to whole seconds before it is stored or compared.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, NaiveDateTime, Timelike, Utc};
use std::time::SystemTime;

/// Point in time with one-second resolution.
pub type Timestamp = DateTime<Utc>;

/// `strftime` pattern of every text timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Formats a timestamp as `yyyy-MM-dd HH:mm:ss`.
pub fn format_timestamp(timestamp: &Timestamp) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Parses a `yyyy-MM-dd HH:mm:ss` timestamp.
pub fn parse_timestamp(value: &str) -> ProtocolResult<Timestamp> {
    NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| ProtocolError::InvalidTimestamp {
            value: value.to_string(),
        })
}

/// Current time, truncated to whole seconds.
pub fn now() -> Timestamp {
    truncate(Utc::now())
}

/// Converts a filesystem time, truncated to whole seconds.
pub fn from_system_time(time: SystemTime) -> Timestamp {
    truncate(DateTime::<Utc>::from(time))
}

/// Converts back to a filesystem time.
pub fn to_system_time(timestamp: &Timestamp) -> SystemTime {
    SystemTime::from(*timestamp)
}

fn truncate(timestamp: Timestamp) -> Timestamp {
    timestamp.with_nanosecond(0).unwrap_or(timestamp)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;

    #[test]
    fn format_and_parse() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 17, 5, 42).unwrap();
        let text = format_timestamp(&ts);
        assert_eq!(text, "2024-03-09 17:05:42");
        assert_eq!(parse_timestamp(&text).unwrap(), ts);
    }

    #[test]
    fn formats_24_hour_clock() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 9, 23, 0, 0).unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-09 23:00:00");
    }

    #[test]
    fn rejects_garbage() {
        assert!(matches!(
            parse_timestamp("yesterday"),
            Err(ProtocolError::InvalidTimestamp { .. })
        ));
        assert!(parse_timestamp("2024-03-09T17:05:42").is_err());
    }

    #[test]
    fn system_time_is_truncated() {
        let time = SystemTime::UNIX_EPOCH + Duration::from_millis(1_700_000_000_750);
        let ts = from_system_time(time);
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.nanosecond(), 0);
        assert_eq!(
            to_system_time(&ts),
            SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000)
        );
    }
}
