//! Batch and measurement-array encoding
//!
//! Encoding is compact JSON (no whitespace), the format the collector parses.
//! Publishing sends the stored bytes unchanged, so what was written is
//! exactly what goes on the wire.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use telenode_core::{iso8601, Measurement, MeasurementBatch};

use crate::{AckKey, SchemaError, SchemaResult};

/// Serialize a full batch envelope
pub fn encode_batch(batch: &MeasurementBatch) -> SchemaResult<Vec<u8>> {
    Ok(serde_json::to_vec(batch)?)
}

pub fn decode_batch(bytes: &[u8]) -> SchemaResult<MeasurementBatch> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Serialize only the measurement array (untrusted-clock records)
pub fn encode_measurements(measurements: &[Measurement]) -> SchemaResult<Vec<u8>> {
    Ok(serde_json::to_vec(measurements)?)
}

pub fn decode_measurements(bytes: &[u8]) -> SchemaResult<Vec<Measurement>> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Just the identifying fields of an envelope, ignoring the measurements
#[derive(Deserialize)]
struct EnvelopeHead {
    #[serde(default)]
    device_id: String,
    iso_timestamp: Option<String>,
}

fn parse_timestamp(text: Option<String>) -> SchemaResult<DateTime<Utc>> {
    let text = text.ok_or(SchemaError::MissingTimestamp)?;
    iso8601::parse(&text).map_err(|_| SchemaError::InvalidTimestamp(text))
}

/// Read the batch creation instant embedded in a stored envelope
pub fn extract_timestamp(bytes: &[u8]) -> SchemaResult<DateTime<Utc>> {
    let head: EnvelopeHead = serde_json::from_slice(bytes)?;
    parse_timestamp(head.iso_timestamp)
}

/// Build the acknowledgment key for a stored envelope before publishing it
pub fn extract_key(bytes: &[u8]) -> SchemaResult<AckKey> {
    let head: EnvelopeHead = serde_json::from_slice(bytes)?;
    let timestamp = parse_timestamp(head.iso_timestamp)?;
    Ok(AckKey::new(head.device_id, timestamp))
}
