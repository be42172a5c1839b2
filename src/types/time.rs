//! Time windows and element timestamps.
//!
//! All timestamps are epoch milliseconds (UTC).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::element::Attributes;

/// Attribute names probed for an element's effective timestamp, in priority order.
pub const TIME_FIELDS: [&str; 6] = ["start", "end", "time", "date", "from", "to"];

/// Inclusive `[min, max]` time window in epoch milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    /// Lower bound (inclusive).
    pub min: i64,
    /// Upper bound (inclusive).
    pub max: i64,
}

impl TimeWindow {
    /// Create a window; bounds are reordered if given backwards.
    pub fn new(a: i64, b: i64) -> Self {
        Self { min: a.min(b), max: a.max(b) }
    }

    /// Create a window from two UTC datetimes.
    pub fn between(a: DateTime<Utc>, b: DateTime<Utc>) -> Self {
        Self::new(a.timestamp_millis(), b.timestamp_millis())
    }

    /// Whether `ts` lies inside the window (inclusive on both ends).
    pub fn contains(&self, ts: i64) -> bool {
        self.min <= ts && ts <= self.max
    }
}

/// Parse a JSON value into an epoch-millisecond timestamp.
///
/// Numbers are taken as milliseconds. Strings may be numeric, a four digit year,
/// RFC 3339, a naive `YYYY-MM-DD[ T]HH:MM:SS` datetime, or a `YYYY-MM-DD` date.
/// Naive forms are read as UTC.
pub fn parse_timestamp(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => finite_ms(n.as_f64()?),
        Value::String(s) => parse_timestamp_str(s.trim()),
        _ => None,
    }
}

fn parse_timestamp_str(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    if s.len() == 4 && s.bytes().all(|b| b.is_ascii_digit()) {
        let year: i32 = s.parse().ok()?;
        return midnight_ms(NaiveDate::from_ymd_opt(year, 1, 1)?);
    }
    if let Ok(n) = s.parse::<f64>() {
        return finite_ms(n);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.timestamp_millis());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d").ok().and_then(midnight_ms)
}

fn finite_ms(n: f64) -> Option<i64> {
    n.is_finite().then(|| n.round() as i64)
}

fn midnight_ms(date: NaiveDate) -> Option<i64> {
    Some(date.and_hms_opt(0, 0, 0)?.and_utc().timestamp_millis())
}

/// First parseable timestamp among [`TIME_FIELDS`].
pub fn element_timestamp(attrs: &Attributes) -> Option<i64> {
    TIME_FIELDS
        .iter()
        .filter_map(|field| attrs.get(*field))
        .find_map(parse_timestamp)
}
