//! Time-Related Constants
//!
//! Default intervals for the worker tasks. All of them can be overridden
//! through the node configuration.

/// Sensor sampling interval (seconds).
pub const DEFAULT_SAMPLE_INTERVAL_SECS: u64 = 20;

/// Number of ticks after which an unchanged value is emitted anyway.
///
/// Keeps a heartbeat of each channel flowing to the collector even when
/// the environment is perfectly stable.
pub const DEFAULT_REFRESH_EVERY_TICKS: u32 = 15;

/// Pause between persistence flushes (seconds).
///
/// Record names have one-second resolution, so flushing faster only creates
/// name collisions.
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 1;

/// Skip-timer: how long a publish waits for its acknowledgment (seconds).
pub const DEFAULT_ACK_TIMEOUT_SECS: u64 = 10;

/// Pause between two publish passes over the queue (seconds).
pub const DEFAULT_CYCLE_PAUSE_SECS: u64 = 2;

/// Back-off after a failed broker connection attempt (seconds).
pub const DEFAULT_CONNECT_BACKOFF_SECS: u64 = 5;

/// MQTT keep-alive (seconds).
pub const DEFAULT_KEEP_ALIVE_SECS: u64 = 60;

/// Period of the time reconciler's safety re-scan (seconds).
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;
