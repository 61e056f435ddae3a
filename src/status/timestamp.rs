//! Serde helpers for record timestamps.
//!
//! Written as RFC 3339 in UTC. Reading also accepts the naive local form
//! (`2024-05-01T12:00:00.123456`) produced by older wrapper versions.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serializer};

const LEGACY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// 9999-12-31T23:59:59Z, the last instant with a four-digit RFC 3339 year.
const LATEST_RFC3339_SECS: i64 = 253_402_300_799;

/// Pull `dt` back to the latest instant `parse` can read again.
pub fn clamp_to_rfc3339(dt: DateTime<Utc>) -> DateTime<Utc> {
    match DateTime::<Utc>::from_timestamp(LATEST_RFC3339_SECS, 0) {
        Some(latest) if dt > latest => latest,
        _ => dt,
    }
}

pub fn parse(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(s, LEGACY_FORMAT).ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

pub fn serialize<S>(dt: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&dt.to_rfc3339())
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse(&s).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{s}'")))
}

pub mod option {
    use super::*;

    pub fn serialize<S>(dt: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match dt {
            Some(dt) => super::serialize(dt, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<String>::deserialize(deserializer)? {
            Some(s) => parse(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{s}'"))),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rfc3339() {
        let dt = parse("2024-05-01T12:00:00.5+02:00").unwrap();
        assert_eq!(dt.to_rfc3339(), "2024-05-01T10:00:00.500+00:00");
    }

    #[test]
    fn test_parse_legacy_local() {
        let dt = parse("2024-05-01T12:00:00.123456").unwrap();
        let expected = Local
            .with_ymd_and_hms(2024, 5, 1, 12, 0, 0)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(dt.timestamp(), expected.timestamp());
        assert_eq!(dt.timestamp_subsec_micros(), 123_456);
    }

    #[test]
    fn test_clamp_keeps_far_future_readable() {
        let clamped = clamp_to_rfc3339(DateTime::<Utc>::MAX_UTC);
        assert_eq!(clamped.to_rfc3339(), "9999-12-31T23:59:59+00:00");
        assert_eq!(parse(&clamped.to_rfc3339()), Some(clamped));

        let ordinary = parse("2024-05-01T10:00:00+00:00").unwrap();
        assert_eq!(clamp_to_rfc3339(ordinary), ordinary);
    }

    #[test]
    fn test_parse_garbage() {
        assert!(parse("yesterday").is_none());
    }
}
