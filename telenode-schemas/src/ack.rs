//! Acknowledgments
//!
//! After persisting a batch, the collector answers on the acknowledgment
//! topic with the batch identity:
//!
//! ```json
//! {"device_id": "FEZ26", "iso_timestamp": "2024-03-01T10:15:00.000Z"}
//! ```
//!
//! The node keeps at most one publish in flight and remembers its
//! [`AckKey`]. An acknowledgment releases the wait only if both fields
//! match; anything else (a late answer for an earlier publish, another
//! device on a shared topic) is ignored.
//!
//! Timestamps are compared as instants, so `...10:15:00Z` and
//! `...10:15:00.000+00:00` are the same acknowledgment.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use telenode_core::MeasurementBatch;

use crate::SchemaResult;

/// Identity of the batch awaiting acknowledgment
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AckKey {
    device_id: String,
    timestamp: DateTime<Utc>,
}

impl AckKey {
    pub fn new(device_id: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Acknowledgment payload sent by the collector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub device_id: String,
    #[serde(rename = "iso_timestamp", with = "telenode_core::iso8601")]
    pub timestamp: DateTime<Utc>,
}

impl Ack {
    /// The acknowledgment a collector returns for `batch`
    pub fn for_batch(batch: &MeasurementBatch) -> Self {
        Self {
            device_id: batch.device_id.clone(),
            timestamp: batch.timestamp,
        }
    }

    pub fn from_slice(bytes: &[u8]) -> SchemaResult<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_vec(&self) -> SchemaResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Whether this acknowledgment releases the publish identified by `key`
    pub fn matches(&self, key: &AckKey) -> bool {
        self.device_id == key.device_id && self.timestamp == key.timestamp
    }

    pub fn key(&self) -> AckKey {
        AckKey::new(self.device_id.clone(), self.timestamp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap()
    }

    #[test]
    fn parses_collector_payload() {
        let ack = Ack::from_slice(
            br#"{"device_id":"FEZ26","iso_timestamp":"2024-03-01T10:15:00.000Z"}"#,
        )
        .unwrap();
        assert!(ack.matches(&AckKey::new("FEZ26", at())));
    }

    #[test]
    fn equivalent_timestamp_spellings_match() {
        let ack = Ack::from_slice(
            br#"{"device_id":"FEZ26","iso_timestamp":"2024-03-01T11:15:00+01:00"}"#,
        )
        .unwrap();
        assert!(ack.matches(&AckKey::new("FEZ26", at())));
    }

    #[test]
    fn other_device_does_not_match() {
        let ack = Ack { device_id: "FEZ27".into(), timestamp: at() };
        assert!(!ack.matches(&AckKey::new("FEZ26", at())));
    }

    #[test]
    fn other_batch_does_not_match() {
        let ack = Ack { device_id: "FEZ26".into(), timestamp: at() };
        let key = AckKey::new("FEZ26", at() + Duration::milliseconds(1));
        assert!(!ack.matches(&key));
    }

    #[test]
    fn for_batch_round_trips_through_json() {
        let batch = MeasurementBatch::new(2, "FEZ26", at(), vec![]);
        let ack = Ack::for_batch(&batch);
        let back = Ack::from_slice(&ack.to_vec().unwrap()).unwrap();
        assert_eq!(back, ack);
        assert_eq!(back.key(), AckKey::new("FEZ26", at()));
    }

    #[test]
    fn rejects_payload_without_timestamp() {
        assert!(Ack::from_slice(br#"{"device_id":"FEZ26"}"#).is_err());
    }
}
