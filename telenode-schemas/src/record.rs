//! Persisted record names
//!
//! ```text
//! 20240301101500.json    trusted, ready to publish
//! x20000101000030.json   written before the first time sync
//! ```
//!
//! The prefix is the only marker of an untrusted record. It is checked as
//! the very first character, before anything else about the name is
//! interpreted, so a record can never be published by accident while its
//! timestamps are still wrong.

use core::fmt;
use core::str::FromStr;

use chrono::{DateTime, Duration, NaiveDateTime, SubsecRound, Utc};

use crate::SchemaError;

/// Marks a record written while the clock was untrusted
pub const UNTRUSTED_PREFIX: char = 'x';

pub const RECORD_EXTENSION: &str = ".json";

const STAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const STAMP_LEN: usize = 14;

/// Name of a persisted record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordName {
    untrusted: bool,
    stamp: NaiveDateTime,
}

impl RecordName {
    /// Name for a batch written with a trusted clock
    pub fn trusted(at: DateTime<Utc>) -> Self {
        Self::new(at, false)
    }

    /// Name for a batch written before the clock could be trusted
    pub fn untrusted(at: DateTime<Utc>) -> Self {
        Self::new(at, true)
    }

    pub fn new(at: DateTime<Utc>, untrusted: bool) -> Self {
        Self {
            untrusted,
            stamp: at.naive_utc().trunc_subsecs(0),
        }
    }

    pub fn is_untrusted(&self) -> bool {
        self.untrusted
    }

    /// Second-resolution instant encoded in the name
    pub fn stamp(&self) -> DateTime<Utc> {
        self.stamp.and_utc()
    }

    /// The same name one second later, used when a name is already taken
    pub fn next_second(&self) -> Self {
        Self {
            untrusted: self.untrusted,
            stamp: self.stamp + Duration::seconds(1),
        }
    }

    /// Parse a file name, `None` for anything that is not a record
    pub fn from_file_name(name: &str) -> Option<Self> {
        name.parse().ok()
    }
}

impl fmt::Display for RecordName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.untrusted {
            write!(f, "{}", UNTRUSTED_PREFIX)?;
        }
        write!(f, "{}{}", self.stamp.format(STAMP_FORMAT), RECORD_EXTENSION)
    }
}

impl FromStr for RecordName {
    type Err = SchemaError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let invalid = || SchemaError::InvalidRecordName(name.to_string());

        let (untrusted, rest) = match name.strip_prefix(UNTRUSTED_PREFIX) {
            Some(rest) => (true, rest),
            None => (false, name),
        };
        let digits = rest.strip_suffix(RECORD_EXTENSION).ok_or_else(invalid)?;
        if digits.len() != STAMP_LEN || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let stamp = NaiveDateTime::parse_from_str(digits, STAMP_FORMAT).map_err(|_| invalid())?;

        Ok(Self { untrusted, stamp })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap() + Duration::milliseconds(640)
    }

    #[test]
    fn trusted_name_has_no_prefix() {
        assert_eq!(RecordName::trusted(at()).to_string(), "20240301101500.json");
    }

    #[test]
    fn untrusted_name_has_prefix() {
        assert_eq!(RecordName::untrusted(at()).to_string(), "x20240301101500.json");
    }

    #[test]
    fn parse_recognises_prefix() {
        let name: RecordName = "x20000101000030.json".parse().unwrap();
        assert!(name.is_untrusted());
        assert_eq!(name.stamp(), Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 30).unwrap());

        let name: RecordName = "20240301101500.json".parse().unwrap();
        assert!(!name.is_untrusted());
    }

    #[test]
    fn foreign_files_are_rejected() {
        for name in [
            "20240301101500.json.tmp",
            ".20240301101500.json.tmp",
            "y20240301101500.json",
            "2024030110150.json",
            "20241301101500.json",
            "notes.txt",
            "",
        ] {
            assert!(RecordName::from_file_name(name).is_none(), "{name}");
        }
    }

    #[test]
    fn next_second_keeps_trust() {
        let name = RecordName::untrusted(at()).next_second();
        assert_eq!(name.to_string(), "x20240301101501.json");
    }

    #[test]
    fn display_and_parse_agree() {
        let name = RecordName::trusted(at());
        assert_eq!(name.to_string().parse::<RecordName>().unwrap(), name);
    }
}
