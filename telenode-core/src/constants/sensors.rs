//! Sensor Specifications and Protocol Timings
//!
//! Values for the DHT22 (AM2302) single-wire temperature/humidity sensor and
//! the analog light-dependent resistor wired next to it.

// ===== SINGLE-WIRE PROTOCOL =====

/// Idle time the line must be held high after power-up (ms).
///
/// The sensor is in an unstable state for the first second and ignores
/// requests sent during it.
///
/// Source: AM2302 datasheet, section 7
pub const STARTUP_IDLE_MS: u32 = 1000;

/// Minimum time the host holds the line low to request a reading (ms).
///
/// Source: AM2302 datasheet ("at least 1ms")
pub const REQUEST_LOW_MS: u32 = 1;

/// Capture timeout while waiting for the sensor's answer (ms).
pub const CAPTURE_TIMEOUT_MS: u32 = 500;

/// High-pulse duration separating a 0 bit from a 1 bit (µs).
///
/// A 0 bit is signalled by a ~26µs high pulse, a 1 bit by ~70µs.
pub const PULSE_THRESHOLD_US: u32 = 35;

/// Nominal durations used when synthesising frames (µs).
pub const PULSE_LOW_US: u32 = 50;
pub const PULSE_ZERO_US: u32 = 26;
pub const PULSE_ONE_US: u32 = 70;
pub const HANDSHAKE_US: u32 = 80;

/// Width of the checksum field (bits).
pub const CHECKSUM_BITS: u8 = 8;

/// Width of the temperature field (bits).
pub const TEMPERATURE_BITS: u8 = 16;

/// Humidity field width of the full datasheet frame (bits).
///
/// Earlier board revisions only decoded the low 10 or 11 bits.
pub const HUMIDITY_BITS_FULL: u8 = 16;

// ===== CHANNELS =====

/// Sensor id of the temperature channel.
pub const SENSOR_ID_TEMPERATURE: u8 = 0;

/// Sensor id of the humidity channel.
pub const SENSOR_ID_HUMIDITY: u8 = 1;

/// Sensor id of the brightness channel.
pub const SENSOR_ID_BRIGHTNESS: u8 = 2;

/// Highest sensor id the collector stores; larger ids are ignored remotely.
pub const MAX_KNOWN_SENSOR_ID: u8 = 3;

/// Value recorded for a failed reading.
pub const FAIL_VALUE: f32 = -999.0;

// ===== LIGHT SENSOR =====

/// ADC reference voltage (V).
pub const ADC_REFERENCE_V: f64 = 3.3;

/// Full-scale raw value of the 12-bit ADC.
pub const ADC_FULL_SCALE: f64 = 4095.0;

/// Fixed divider resistor in series with the LDR (Ω).
pub const LDR_DIVIDER_OHMS: f64 = 10_000.0;

/// LDR calibration constant: lux = K / R².
pub const LDR_LUX_CONSTANT: f64 = 5.0e8;
