//! ISO-8601 timestamps as used on the wire and in acknowledgments
//!
//! Always UTC, always millisecond precision, always a literal `Z`:
//! `2024-03-01T10:15:00.000Z`. Parsing accepts any RFC 3339 offset and
//! normalises to UTC so acknowledgments from collectors that format
//! differently still match.
//!
//! Usable as a serde `with` module.

use alloc::string::String;
use chrono::{DateTime, ParseError, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serializer};

/// Format an instant the way the wire format expects
pub fn format(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse an RFC 3339 timestamp into UTC
pub fn parse(text: &str) -> Result<DateTime<Utc>, ParseError> {
    DateTime::parse_from_rfc3339(text).map(|dt| dt.with_timezone(&Utc))
}

pub fn serialize<S>(timestamp: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format(timestamp))
}

pub fn deserialize<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let text = String::deserialize(deserializer)?;
    parse(&text).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn formats_with_millis_and_z() {
        let t = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap();
        assert_eq!(format(&t), "2024-03-01T10:15:00.000Z");
    }

    #[test]
    fn parses_offsets_into_utc() {
        let a = parse("2024-03-01T10:15:00.000Z").unwrap();
        let b = parse("2024-03-01T12:15:00+02:00").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("yesterday").is_err());
    }
}
