//! Capture generators for driver-level tests
//!
//! Real sensors do not produce the nominal 26/70 µs pulses the synthesiser
//! emits. These helpers add bounded, deterministic jitter so tests exercise
//! the threshold decision the way field captures do.

#![allow(dead_code)]

use telenode_core::constants::PULSE_THRESHOLD_US;
use telenode_core::{synthesize_frame, Framing, Reading};

/// Largest deviation applied to a pulse, in µs
pub const MAX_JITTER_US: u32 = 8;

/// Small linear congruential generator; reproducible across runs
pub struct Jitter {
    seed: u32,
}

impl Jitter {
    pub fn new(seed: u32) -> Self {
        Self { seed }
    }

    fn next(&mut self) -> u32 {
        self.seed = self.seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
        (self.seed >> 16) & 0x7FFF
    }

    /// `value` moved by up to ±`MAX_JITTER_US`
    pub fn apply(&mut self, value: u32) -> u32 {
        let offset = self.next() % (2 * MAX_JITTER_US + 1);
        (value + offset).saturating_sub(MAX_JITTER_US)
    }
}

/// Capture for `reading` with every pulse jittered
pub fn jittered_frame(reading: Reading, framing: &Framing, seed: u32) -> Vec<u32> {
    let mut jitter = Jitter::new(seed);
    synthesize_frame(reading, framing)
        .iter()
        .map(|&pulse| jitter.apply(pulse))
        .collect()
}

/// Invert the high pulse carrying `bit` (0 = checksum LSB)
pub fn flip_bit(frame: &mut [u32], bit: usize) {
    let idx = frame.len() - 2 - 2 * bit;
    frame[idx] = if frame[idx] > PULSE_THRESHOLD_US { 26 } else { 70 };
}

/// Readings spanning the sensor's documented range
pub fn field_readings() -> Vec<Reading> {
    vec![
        Reading::from_tenths(-400, 0),
        Reading::from_tenths(-101, 300),
        Reading::from_tenths(0, 1000),
        Reading::from_tenths(223, 551),
        Reading::from_tenths(800, 999),
        Reading::from_tenths(1250, 5),
    ]
}
