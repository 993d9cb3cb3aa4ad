//! Wire Format for the Telemetry Node
//!
//! ## Overview
//!
//! Everything that leaves the device, or survives a reboot on its storage, is
//! defined here:
//!
//! - **Batches** ([`wire`]): the JSON envelope published to the collector and
//!   the bare measurement array kept while the clock is untrusted
//! - **Acknowledgments** ([`ack`]): what the collector sends back and how it
//!   is matched against the batch in flight
//! - **Record names** ([`record`]): `[x]YYYYMMDDHHmmss.json`, where the `x`
//!   marks a record whose timestamps still need correcting
//! - **Validation** ([`validation`]): the checks the collector applies before
//!   accepting a batch, so the node can report problems before publishing
//!
//! ## Two Formats On Disk
//!
//! A batch written with a trusted clock is stored exactly as it will be
//! published:
//!
//! ```json
//! {"version":2,"device_id":"FEZ26","iso_timestamp":"2024-03-01T10:15:00.000Z",
//!  "measurements":[{"sensor_id":0,"iso_timestamp":"2024-03-01T10:14:40.000Z",
//!                   "value":22.3,"status":"OK"}]}
//! ```
//!
//! A batch written before the first time sync only keeps the measurement
//! array. Its envelope timestamp would be wrong, and the measurements are fed
//! back through the buffer once the clock is corrected, where they get a new
//! envelope anyway.
//!
//! ## Usage Example
//!
//! ```rust
//! use telenode_core::{Measurement, MeasurementBatch};
//! use telenode_schemas::{wire, Ack, RecordName};
//! use chrono::{TimeZone, Utc};
//!
//! let at = Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap();
//! let batch = MeasurementBatch::new(2, "FEZ26", at, vec![Measurement::ok(0, 22.3, at)]);
//!
//! let bytes = wire::encode_batch(&batch)?;
//! let name = RecordName::trusted(at);
//! assert_eq!(name.to_string(), "20240301101500.json");
//!
//! let pending = wire::extract_key(&bytes)?;
//! assert!(Ack::for_batch(&batch).matches(&pending));
//! # Ok::<(), telenode_schemas::SchemaError>(())
//! ```

pub mod ack;
pub mod record;
pub mod validation;
pub mod wire;

pub use ack::{Ack, AckKey};
pub use record::RecordName;
pub use validation::{validate_batch, IssueType, Severity, ValidationIssue, ValidationReport};

/// Envelope version this node writes and the collector accepts
pub const SCHEMA_VERSION: u32 = 2;

/// Wire-format errors
#[derive(Debug, thiserror_no_std::Error)]
pub enum SchemaError {
    #[error("Malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Payload carries no iso_timestamp")]
    MissingTimestamp,

    #[error("Invalid timestamp {0:?}")]
    InvalidTimestamp(String),

    #[error("Not a record name: {0:?}")]
    InvalidRecordName(String),
}

/// Result type for wire-format operations
pub type SchemaResult<T> = Result<T, SchemaError>;
