//! Buffer Sizes and Retention Policy

/// Capacity of the in-memory measurement buffer (measurements).
///
/// At three channels every 20 seconds this holds a little under an hour of
/// data while storage is unavailable.
pub const BUFFER_CAPACITY: usize = 500;

/// Number of oldest measurements dropped at once when the buffer is full.
///
/// Dropping several at a time keeps eviction off the per-sample path.
pub const EVICT_BATCH: usize = 3;

/// Length of the pulse-capture buffer (samples).
///
/// A full 40-bit frame needs 81 edges plus the response handshake.
pub const CAPTURE_LEN: usize = 84;

/// Channels produced per sampling tick (temperature, humidity, brightness).
pub const MAX_CHANNELS: usize = 3;
