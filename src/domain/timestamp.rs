//! Stored timestamp encoding.
//!
//! Timestamps are written as RFC 3339 UTC strings with exactly three
//! fractional digits, so string order matches time order in both stores.
//! Reading accepts any RFC 3339 string.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Formats a timestamp the way it is stored.
#[must_use]
pub fn format(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Drops precision below a millisecond.
#[must_use]
pub fn to_millis(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp.trunc_subsecs(3)
}

/// Serializes with [`format`].
///
/// # Errors
///
/// Propagates the serializer's error.
pub fn serialize<S: Serializer>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&format(timestamp))
}

/// Deserializes an RFC 3339 timestamp.
///
/// # Errors
///
/// Fails if the value is not an RFC 3339 string.
pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    DateTime::<Utc>::deserialize(deserializer)
}

/// The same encoding for optional timestamps.
pub mod option {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// # Errors
    ///
    /// Propagates the serializer's error.
    pub fn serialize<S: Serializer>(
        timestamp: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match timestamp {
            Some(timestamp) => super::serialize(timestamp, serializer),
            None => serializer.serialize_none(),
        }
    }

    /// # Errors
    ///
    /// Fails if a present value is not an RFC 3339 string.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        Option::<DateTime<Utc>>::deserialize(deserializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rstest::rstest;

    fn at(millis: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2030, 1, 15, 12, 0, 0).unwrap()
            + chrono::Duration::milliseconds(i64::from(millis))
    }

    #[rstest]
    #[case(at(0), "2030-01-15T12:00:00.000Z")]
    #[case(at(500), "2030-01-15T12:00:00.500Z")]
    #[case(at(7), "2030-01-15T12:00:00.007Z")]
    fn test_format_has_fixed_precision(#[case] timestamp: DateTime<Utc>, #[case] expected: &str) {
        assert_eq!(format(&timestamp), expected);
    }

    #[rstest]
    fn test_string_order_matches_time_order() {
        let earlier = format(&at(0));
        let later = format(&at(500));
        assert!(earlier < later);
    }

    #[rstest]
    fn test_to_millis_truncates() {
        let precise = at(500) + chrono::Duration::nanoseconds(123_456);
        assert_eq!(to_millis(precise), at(500));
    }
}
