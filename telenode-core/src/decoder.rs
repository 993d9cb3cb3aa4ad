//! Single-Wire Frame Decoder
//!
//! ## Overview
//!
//! The DHT22 answers a request with a burst of pulses on one bidirectional
//! line. The capture hardware records the duration of every level between two
//! edges, so a response arrives as an array of durations in microseconds:
//!
//! ```text
//!  handshake   bit 39        bit 38              bit 0     trailer
//! ┌────┬────┬────┬────┬────┬────┬─ ... ─┬────┬────┬────┐
//! │ 80 │ 80 │ 50 │ 70 │ 50 │ 26 │       │ 50 │ 70 │ 50 │
//! └────┴────┴────┴────┴────┴────┴─ ... ─┴────┴────┴────┘
//!              low  high  low  high          low  high  low
//! ```
//!
//! Every bit is a ~50µs low level followed by a high level whose length
//! carries the value: ~26µs for 0, ~70µs for 1. Only the high level matters.
//!
//! ## Decoding From the End
//!
//! The beginning of a capture is unreliable (the handshake may be partially
//! missed depending on how fast the capture starts), but the end is always
//! the trailing low level. The decoder therefore skips that last sample and
//! walks backwards two samples at a time, collecting bits least significant
//! first:
//!
//! 1. 8 checksum bits
//! 2. 16 temperature bits (sign-magnitude, tenths of °C)
//! 3. `humidity_bits` humidity bits (unsigned, tenths of %RH)
//!
//! The checksum is the low byte of the sum of the four payload bytes.
//!
//! ## Humidity Width
//!
//! The datasheet frame carries 16 humidity bits. Earlier firmware revisions
//! decoded only the low 10 or 11 bits, which works for any humidity below
//! 102.4% but needs fewer captured edges. [`Framing`] makes the width
//! explicit; [`Framing::DHT22`] is the full datasheet framing and the
//! default.

use heapless::Vec;

use crate::constants::buffers::CAPTURE_LEN;
use crate::constants::sensors::{
    CHECKSUM_BITS, HANDSHAKE_US, HUMIDITY_BITS_FULL, PULSE_LOW_US, PULSE_ONE_US,
    PULSE_THRESHOLD_US, PULSE_ZERO_US, TEMPERATURE_BITS,
};
use crate::errors::{DecodeError, DecodeResult};

/// Layout of a sensor frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Framing {
    /// Number of humidity bits decoded (10, 11 or 16 on known revisions)
    pub humidity_bits: u8,
    /// High pulses longer than this are 1 bits (µs)
    pub pulse_threshold_us: u32,
}

impl Framing {
    /// Full 40-bit datasheet frame
    pub const DHT22: Framing = Framing {
        humidity_bits: HUMIDITY_BITS_FULL,
        pulse_threshold_us: PULSE_THRESHOLD_US,
    };

    /// Create a framing with a specific humidity width
    ///
    /// Returns `None` for widths outside 8..=16, which no sensor revision uses.
    pub const fn with_humidity_bits(humidity_bits: u8) -> Option<Self> {
        if humidity_bits < 8 || humidity_bits > HUMIDITY_BITS_FULL {
            return None;
        }
        Some(Self {
            humidity_bits,
            pulse_threshold_us: PULSE_THRESHOLD_US,
        })
    }

    /// Override the bit threshold
    pub const fn with_threshold(mut self, pulse_threshold_us: u32) -> Self {
        self.pulse_threshold_us = pulse_threshold_us;
        self
    }

    /// Number of bits decoded from a frame
    pub const fn total_bits(&self) -> usize {
        (CHECKSUM_BITS + TEMPERATURE_BITS + self.humidity_bits) as usize
    }

    /// Minimum captured edges for a decodable frame
    ///
    /// Two samples per bit plus the trailing low level. Anything shorter is a
    /// handshake failure.
    pub const fn min_edges(&self) -> usize {
        2 * self.total_bits() + 1
    }
}

impl Default for Framing {
    fn default() -> Self {
        Self::DHT22
    }
}

/// A decoded temperature/humidity pair
///
/// Stored in the sensor's raw fixed-point encoding so that comparisons are
/// exact and a reading can be turned back into a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Reading {
    raw_temperature: u16,
    raw_humidity: u16,
}

impl Reading {
    /// Build a reading from tenths of a degree and tenths of a percent
    pub fn from_tenths(temperature_tenths: i16, humidity_tenths: u16) -> Self {
        let magnitude = temperature_tenths.unsigned_abs() & 0x7FFF;
        let sign = if temperature_tenths < 0 { 0x8000 } else { 0 };
        Self {
            raw_temperature: sign | magnitude,
            raw_humidity: humidity_tenths,
        }
    }

    /// Build a reading from the raw sensor words
    pub const fn from_raw(raw_temperature: u16, raw_humidity: u16) -> Self {
        Self { raw_temperature, raw_humidity }
    }

    /// Temperature in tenths of a degree Celsius
    pub fn temperature_tenths(&self) -> i16 {
        let magnitude = (self.raw_temperature & 0x7FFF) as i16;
        if self.raw_temperature & 0x8000 != 0 {
            -magnitude
        } else {
            magnitude
        }
    }

    /// Relative humidity in tenths of a percent
    pub fn humidity_tenths(&self) -> u16 {
        self.raw_humidity
    }

    /// Temperature in degrees Celsius
    pub fn temperature_c(&self) -> f32 {
        let magnitude = (self.raw_temperature & 0x7FFF) as f32;
        let sign = if self.raw_temperature & 0x8000 != 0 { -1.0 } else { 1.0 };
        magnitude * sign / 10.0
    }

    /// Relative humidity in percent
    pub fn humidity_pct(&self) -> f32 {
        self.raw_humidity as f32 / 10.0
    }

    /// Checksum the sensor sends for this payload
    pub fn checksum(&self) -> u8 {
        checksum(self.raw_temperature, self.raw_humidity)
    }

    /// Raw sign-magnitude temperature word
    pub fn raw_temperature(&self) -> u16 {
        self.raw_temperature
    }

    /// Raw humidity word
    pub fn raw_humidity(&self) -> u16 {
        self.raw_humidity
    }
}

fn checksum(raw_temperature: u16, raw_humidity: u16) -> u8 {
    let [t_high, t_low] = raw_temperature.to_be_bytes();
    let [h_high, h_low] = raw_humidity.to_be_bytes();
    h_low
        .wrapping_add(h_high)
        .wrapping_add(t_low)
        .wrapping_add(t_high)
}

/// Decode a captured pulse buffer into a reading
///
/// `samples` holds only the captured durations (the capture count, not the
/// whole backing array). No retries are attempted; the caller decides when
/// to ask the sensor again.
pub fn decode(samples: &[u32], framing: &Framing) -> DecodeResult<Reading> {
    let required = framing.min_edges();
    if samples.len() < required {
        return Err(DecodeError::InsufficientSamples {
            captured: samples.len(),
            required,
        });
    }

    // Skip the trailing low level, then every other sample is a high level.
    let threshold = framing.pulse_threshold_us;
    let mut bits = samples.iter().rev().skip(1).step_by(2).map(|&d| d > threshold);

    let expected = read_field(&mut bits, CHECKSUM_BITS) as u8;
    let raw_temperature = read_field(&mut bits, TEMPERATURE_BITS);
    let raw_humidity = read_field(&mut bits, framing.humidity_bits);

    let computed = checksum(raw_temperature, raw_humidity);
    if computed != expected {
        return Err(DecodeError::ChecksumMismatch { expected, computed });
    }

    Ok(Reading::from_raw(raw_temperature, raw_humidity))
}

/// Accumulate `width` bits, least significant first
fn read_field(bits: &mut impl Iterator<Item = bool>, width: u8) -> u16 {
    let mut value = 0u16;
    for i in 0..width {
        if bits.next().unwrap_or(false) {
            value |= 1 << i;
        }
    }
    value
}

/// Produce the capture a healthy sensor would return for `reading`
///
/// Used by simulated buses and tests. The frame starts with the response
/// handshake and ends with the trailing low level.
pub fn synthesize_frame(reading: Reading, framing: &Framing) -> Vec<u32, CAPTURE_LEN> {
    let mut frame: Vec<u32, CAPTURE_LEN> = Vec::new();
    frame.extend([HANDSHAKE_US, HANDSHAKE_US]);

    let fields = [
        (reading.raw_humidity, framing.humidity_bits),
        (reading.raw_temperature, TEMPERATURE_BITS),
        (reading.checksum() as u16, CHECKSUM_BITS),
    ];
    for (value, width) in fields {
        for i in (0..width).rev() {
            let high = if value & (1 << i) != 0 { PULSE_ONE_US } else { PULSE_ZERO_US };
            frame.extend([PULSE_LOW_US, high]);
        }
    }

    frame.extend([PULSE_LOW_US]);
    frame
}
