//! Temporal storage encoding for note data.
//!
//! Dates are persisted as integer epoch seconds and booleans as integer
//! 0/1, so every date-like value crosses exactly one pair of functions on
//! its way in and out of the database. The query literal rewriter and the
//! attribute value codec both go through here.

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Encode an instant as epoch seconds, rounding sub-second precision.
pub fn encode_timestamp(dt: DateTime<Utc>) -> i64 {
    ((dt.timestamp_millis() as f64) / 1000.0).round() as i64
}

/// Decode epoch seconds back into an instant.
pub fn decode_timestamp(secs: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| Error::InvalidInput(format!("timestamp out of range: {secs}")))
}

/// The UTC midnight at the start of the given instant's day.
pub fn utc_midnight(dt: DateTime<Utc>) -> DateTime<Utc> {
    // and_hms_opt(0, 0, 0) cannot fail for a midnight
    dt.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|naive| naive.and_utc())
        .unwrap_or(dt)
}

/// Total seconds of a day/hour/minute/second timespan.
pub fn timespan_seconds(days: i64, hours: i64, minutes: i64, seconds: i64) -> i64 {
    days * 86_400 + hours * 3_600 + minutes * 60 + seconds
}
