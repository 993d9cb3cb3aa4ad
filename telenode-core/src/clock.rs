//! Wall-Clock Sources and Trust Tracking
//!
//! The node has no battery-backed RTC. After boot its clock starts from some
//! arbitrary point and only becomes correct once a network time sync
//! succeeds. Measurements taken before that carry wrong timestamps and must
//! be re-dated later.
//!
//! Two pieces live here:
//!
//! - [`Clock`]: where "now" comes from. Production uses [`SystemClock`],
//!   tests use [`FixedClock`] or [`ManualClock`].
//! - [`ClockTrust`]: whether "now" can be believed, and by how much it was
//!   wrong the last time it could not.
//!
//! ## Correction Offset
//!
//! ```text
//! untrusted clock:  ──●────────────────●  sync starts (last_known_bad)
//!                                       \
//! trusted clock:                         ●─────  sync succeeds (now)
//!
//! offset = now - last_known_bad
//! ```
//!
//! Adding `offset` to a timestamp taken on the bad clock approximates the
//! instant it would have had on the good one. The error is bounded by how
//! long the sync itself took.

use chrono::{DateTime, Duration, Utc};

/// A source of wall-clock time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;
}

/// The operating system clock
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[cfg(feature = "std")]
impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A clock that only moves when told to
///
/// Shared between a test and the tasks under test.
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct ManualClock {
    now: std::sync::RwLock<DateTime<Utc>>,
}

#[cfg(feature = "std")]
impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self { now: std::sync::RwLock::new(start) }
    }

    /// Jump to an absolute instant, e.g. to simulate a time sync
    pub fn set(&self, instant: DateTime<Utc>) {
        if let Ok(mut now) = self.now.write() {
            *now = instant;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.write() {
            *now = *now + by;
        }
    }
}

#[cfg(feature = "std")]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.now.read() {
            Ok(now) => *now,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Whether the device clock can be believed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockTrust {
    trusted: bool,
    last_known_bad: DateTime<Utc>,
    correction_offset: Duration,
}

impl ClockTrust {
    /// State at boot: untrusted, no correction known yet
    pub fn untrusted(now: DateTime<Utc>) -> Self {
        Self {
            trusted: false,
            last_known_bad: now,
            correction_offset: Duration::zero(),
        }
    }

    /// State for a device whose clock is known good from the start
    pub fn trusted(now: DateTime<Utc>) -> Self {
        Self {
            trusted: true,
            last_known_bad: now,
            correction_offset: Duration::zero(),
        }
    }

    /// A time sync is about to run
    ///
    /// Records the last instant read from the unsynced clock. A resync of an
    /// already trusted clock leaves the previous reference untouched.
    pub fn sync_started(&mut self, now: DateTime<Utc>) {
        if !self.trusted {
            self.last_known_bad = now;
        }
    }

    /// The sync completed and `now` is correct
    ///
    /// Returns the correction offset to apply to records taken before.
    pub fn sync_succeeded(&mut self, now: DateTime<Utc>) -> Duration {
        if !self.trusted {
            self.correction_offset = now - self.last_known_bad;
            self.trusted = true;
        }
        self.correction_offset
    }

    /// The sync failed; stop trusting the clock
    pub fn sync_failed(&mut self, now: DateTime<Utc>) {
        self.trusted = false;
        self.last_known_bad = now;
    }

    pub fn is_trusted(&self) -> bool {
        self.trusted
    }

    pub fn last_known_bad(&self) -> DateTime<Utc> {
        self.last_known_bad
    }

    /// Offset that turns an untrusted timestamp into a trusted one
    pub fn correction_offset(&self) -> Duration {
        self.correction_offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn boot() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 30).unwrap()
    }

    #[test]
    fn starts_untrusted_without_offset() {
        let trust = ClockTrust::untrusted(boot());
        assert!(!trust.is_trusted());
        assert_eq!(trust.correction_offset(), Duration::zero());
    }

    #[test]
    fn successful_sync_computes_offset() {
        let mut trust = ClockTrust::untrusted(boot());
        trust.sync_started(boot() + Duration::seconds(10));

        let synced = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let offset = trust.sync_succeeded(synced);

        assert!(trust.is_trusted());
        assert_eq!(offset, synced - (boot() + Duration::seconds(10)));
        assert_eq!(trust.correction_offset(), offset);
    }

    #[test]
    fn resync_keeps_previous_offset() {
        let mut trust = ClockTrust::untrusted(boot());
        let synced = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        trust.sync_started(boot());
        let first = trust.sync_succeeded(synced);

        trust.sync_started(synced + Duration::hours(1));
        let second = trust.sync_succeeded(synced + Duration::hours(1));
        assert_eq!(first, second);
        assert_eq!(trust.last_known_bad(), boot());
    }

    #[test]
    fn failed_sync_revokes_trust() {
        let mut trust = ClockTrust::trusted(boot());
        trust.sync_failed(boot() + Duration::minutes(5));
        assert!(!trust.is_trusted());
        assert_eq!(trust.last_known_bad(), boot() + Duration::minutes(5));
    }

    #[test]
    fn manual_clock_moves_on_request() {
        let clock = ManualClock::new(boot());
        clock.advance(Duration::seconds(20));
        assert_eq!(clock.now(), boot() + Duration::seconds(20));

        clock.set(boot());
        assert_eq!(clock.now(), boot());
    }
}
