//! Timestamp Helpers
//!
//! The ledger speaks integer nanoseconds; everything user-facing speaks
//! calendar dates. These helpers convert between the two and render dates the
//! way the client displays them (US English month abbreviations).

use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};

use crate::models::Timestamp;

/// Nanoseconds per millisecond
pub const NS_PER_MS: i64 = 1_000_000;

/// Nanoseconds per second
pub const NS_PER_SECOND: i64 = 1_000_000_000;

/// Nanoseconds per day (86,400,000,000,000)
pub const NS_PER_DAY: i64 = 86_400_000_000_000;

impl Timestamp {
    /// Current wall-clock time
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Convert from a chrono instant (millisecond precision, like the wire format's producers)
    #[must_use]
    pub fn from_datetime<Tz: TimeZone>(at: DateTime<Tz>) -> Self {
        Self(at.timestamp_millis().saturating_mul(NS_PER_MS))
    }

    /// Convert to a UTC instant
    #[must_use]
    pub fn to_datetime(self) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(self.0 / NS_PER_MS)
            .single()
            .unwrap_or_default()
    }

    /// Nanoseconds elapsed from `self` until `now` (negative if in the future)
    #[must_use]
    pub fn elapsed_until(self, now: Timestamp) -> i64 {
        now.0.saturating_sub(self.0)
    }
}

/// Render a timestamp as a `YYYY-MM-DD` string in the local timezone
#[must_use]
pub fn to_local_date_string(ts: Timestamp) -> String {
    ts.to_datetime()
        .with_timezone(&Local)
        .format("%Y-%m-%d")
        .to_string()
}

/// Parse a `YYYY-MM-DD` string as local midnight
///
/// Returns `None` for malformed input or a local midnight that does not exist.
#[must_use]
pub fn from_local_date_string(date: &str) -> Option<Timestamp> {
    let day = NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()?;
    let midnight = day.and_hms_opt(0, 0, 0)?;
    let local = Local.from_local_datetime(&midnight).earliest()?;
    Some(Timestamp::from_datetime(local))
}

/// Today as a `YYYY-MM-DD` string in the local timezone
#[must_use]
pub fn today_local_date_string() -> String {
    Local::now().format("%Y-%m-%d").to_string()
}

/// Short date, e.g. `Jan 5, 2025`
#[must_use]
pub fn format_date(ts: Timestamp) -> String {
    ts.to_datetime()
        .with_timezone(&Local)
        .format("%b %-d, %Y")
        .to_string()
}

/// Short date with time, e.g. `Jan 5, 2025, 03:04 PM`
#[must_use]
pub fn format_date_time(ts: Timestamp) -> String {
    ts.to_datetime()
        .with_timezone(&Local)
        .format("%b %-d, %Y, %I:%M %p")
        .to_string()
}

/// Relative phrase for how long ago `ts` was, measured from `now`
#[must_use]
pub fn format_relative_time(ts: Timestamp, now: DateTime<Utc>) -> String {
    let diff_ms = now.timestamp_millis() - ts.to_datetime().timestamp_millis();
    let days = diff_ms.div_euclid(1000 * 60 * 60 * 24);

    match days {
        d if d <= 0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        d if d < 7 => format!("{d} days ago"),
        d if d < 30 => format!("{} weeks ago", d / 7),
        d if d < 365 => format!("{} months ago", d / 30),
        d => format!("{} years ago", d / 365),
    }
}
