//! Measurement Value Objects
//!
//! A [`Measurement`] is one value from one sensor channel at one instant. A
//! [`MeasurementBatch`] is the unit that gets persisted, published and
//! acknowledged: everything the buffer held at flush time, stamped with the
//! flush instant and the device identity.
//!
//! Serde attributes here define the wire format shared with the collector:
//!
//! ```json
//! { "version": 2, "device_id": "FEZ26",
//!   "iso_timestamp": "2024-03-01T10:15:00.000Z",
//!   "measurements": [
//!     {"sensor_id": 0, "iso_timestamp": "2024-03-01T10:14:40.000Z",
//!      "value": 22.3, "status": "OK"} ] }
//! ```
//!
//! Timestamps are kept at millisecond precision, the resolution of the wire
//! format, so a measurement survives a write/read cycle unchanged.

use alloc::string::String;
use alloc::vec::Vec;
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::buffers::MAX_CHANNELS;
use crate::constants::sensors::FAIL_VALUE;

/// Identifies a sensor channel on the device
pub type SensorId = u8;

/// Outcome of a single reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    /// Value is a real reading
    #[serde(rename = "OK")]
    Ok,
    /// Reading failed; value is [`FAIL_VALUE`]
    #[serde(rename = "FAIL")]
    Fail,
}

/// A single sensor reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    sensor_id: SensorId,
    #[serde(rename = "iso_timestamp", with = "crate::iso8601")]
    timestamp: DateTime<Utc>,
    value: f32,
    status: Status,
}

impl Measurement {
    /// Successful reading
    pub fn ok(sensor_id: SensorId, value: f32, timestamp: DateTime<Utc>) -> Self {
        Self {
            sensor_id,
            timestamp: timestamp.trunc_subsecs(3),
            value,
            status: Status::Ok,
        }
    }

    /// Failed reading, carrying the failure marker value
    pub fn fail(sensor_id: SensorId, timestamp: DateTime<Utc>) -> Self {
        Self {
            sensor_id,
            timestamp: timestamp.trunc_subsecs(3),
            value: FAIL_VALUE,
            status: Status::Fail,
        }
    }

    pub fn sensor_id(&self) -> SensorId {
        self.sensor_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// Move the timestamp by `offset`
    ///
    /// The only mutation a measurement allows. Used to re-date readings taken
    /// while the device clock was wrong.
    pub fn shift(&mut self, offset: Duration) {
        self.timestamp = self.timestamp + offset;
    }

    /// Consuming variant of [`shift`](Self::shift)
    pub fn shifted(mut self, offset: Duration) -> Self {
        self.shift(offset);
        self
    }
}

/// Measurements produced by one sampling tick, one slot per channel
///
/// `None` marks a channel whose value was suppressed as redundant.
pub type SampleSet = heapless::Vec<Option<Measurement>, MAX_CHANNELS>;

/// A timestamped group of measurements persisted and published as one unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementBatch {
    #[serde(rename = "version")]
    pub schema_version: u32,
    pub device_id: String,
    #[serde(rename = "iso_timestamp", with = "crate::iso8601")]
    pub timestamp: DateTime<Utc>,
    pub measurements: Vec<Measurement>,
}

impl MeasurementBatch {
    /// Wrap flushed measurements into a batch created at `timestamp`
    pub fn new(
        schema_version: u32,
        device_id: impl Into<String>,
        timestamp: DateTime<Utc>,
        measurements: Vec<Measurement>,
    ) -> Self {
        Self {
            schema_version,
            device_id: device_id.into(),
            timestamp: timestamp.trunc_subsecs(3),
            measurements,
        }
    }

    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn fail_measurement_carries_marker() {
        let m = Measurement::fail(1, at(10, 0, 0));
        assert_eq!(m.value(), -999.0);
        assert_eq!(m.status(), Status::Fail);
        assert!(!m.is_ok());
    }

    #[test]
    fn timestamps_are_truncated_to_millis() {
        let t = at(10, 0, 0) + Duration::nanoseconds(1_234_567);
        let m = Measurement::ok(0, 22.3, t);
        assert_eq!(m.timestamp(), at(10, 0, 0) + Duration::milliseconds(1));
    }

    #[test]
    fn shift_moves_timestamp_only() {
        let m = Measurement::ok(0, 22.3, at(10, 0, 0)).shifted(Duration::hours(3));
        assert_eq!(m.timestamp(), at(13, 0, 0));
        assert_eq!(m.value(), 22.3);
        assert_eq!(m.sensor_id(), 0);
    }

    #[test]
    fn wire_field_names() {
        let batch = MeasurementBatch::new(
            2,
            "FEZ26",
            at(10, 15, 0),
            alloc::vec![Measurement::ok(0, 22.3, at(10, 14, 40))],
        );
        let json = serde_json::to_string(&batch).unwrap();
        assert_eq!(
            json,
            r#"{"version":2,"device_id":"FEZ26","iso_timestamp":"2024-03-01T10:15:00.000Z","measurements":[{"sensor_id":0,"iso_timestamp":"2024-03-01T10:14:40.000Z","value":22.3,"status":"OK"}]}"#
        );
    }
}
