//! Timestamp handling for the sync protocol.
//!
//! Every timestamp on the wire is ISO-8601 UTC with millisecond
//! precision (`2024-01-02T00:00:00.000Z`). The epoch value doubles as
//! the "never synced" watermark.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// A UTC timestamp with millisecond wire precision.
///
/// Wraps [`chrono::DateTime<Utc>`] and pins the serialized form to
/// ISO-8601 with exactly three fractional digits and a `Z` suffix, so
/// watermarks and server timestamps round-trip byte-for-byte.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// The Unix epoch (`1970-01-01T00:00:00.000Z`).
    ///
    /// Used as the initial sync watermark: a pull from the epoch
    /// returns the complete account state.
    pub fn epoch() -> Self {
        Self(DateTime::UNIX_EPOCH)
    }

    /// The current wall-clock time.
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Parse an RFC-3339 timestamp (`Z` or numeric offset).
    pub fn parse(s: &str) -> Result<Self, TimestampError> {
        DateTime::parse_from_rfc3339(s)
            .map(|dt| Self(dt.with_timezone(&Utc)))
            .map_err(|e| TimestampError::new(s, e))
    }

    /// Absolute difference from another timestamp, in milliseconds.
    pub fn abs_diff_millis(&self, other: &Timestamp) -> i64 {
        (self.0 - other.0).num_milliseconds().abs()
    }

    /// This timestamp shifted by the given number of milliseconds.
    pub fn add_millis(&self, ms: i64) -> Self {
        Self(self.0 + Duration::milliseconds(ms))
    }

    /// The inner [`DateTime<Utc>`].
    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }
}

impl Default for Timestamp {
    fn default() -> Self {
        Self::epoch()
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({self})")
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Error returned when a timestamp string fails to parse.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid timestamp {value:?}: {reason}")]
pub struct TimestampError {
    value: String,
    reason: String,
}

impl TimestampError {
    fn new(value: &str, source: chrono::ParseError) -> Self {
        Self {
            value: value.to_string(),
            reason: source.to_string(),
        }
    }
}
