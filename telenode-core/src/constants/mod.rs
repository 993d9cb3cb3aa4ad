//! Constants for telenode Core
//!
//! Centralised numeric values used throughout the node. Protocol timings come
//! from the DHT22 datasheet, retention and scheduling values from the field
//! firmware this node replaces.
//!
//! ## Organization
//!
//! - **Sensors**: single-wire protocol timings, channel ids, failure marker
//! - **Time**: sampling, flush, publish and reconciliation intervals
//! - **Buffers**: in-memory retention limits and capture sizes
//!
//! Always use these constants instead of magic numbers; include the unit in
//! the name.

/// Sensor protocol timings and channel identifiers.
pub mod sensors;

/// Intervals and timeouts for the worker tasks.
pub mod time;

/// Buffer sizes and retention policy.
pub mod buffers;

pub use sensors::{
    SENSOR_ID_TEMPERATURE, SENSOR_ID_HUMIDITY, SENSOR_ID_BRIGHTNESS,
    MAX_KNOWN_SENSOR_ID, FAIL_VALUE, PULSE_THRESHOLD_US,
};

pub use time::{
    DEFAULT_SAMPLE_INTERVAL_SECS, DEFAULT_ACK_TIMEOUT_SECS, DEFAULT_REFRESH_EVERY_TICKS,
};

pub use buffers::{BUFFER_CAPACITY, EVICT_BATCH, CAPTURE_LEN, MAX_CHANNELS};
