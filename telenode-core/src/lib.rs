//! Domain core for the telenode telemetry node
//!
//! Everything between the sensor pins and the persistence layer:
//! decoding single-wire frames, the measurement model, the bounded
//! in-memory buffer and the clock-trust bookkeeping that lets readings taken
//! before a time sync be re-dated afterwards.
//!
//! Key constraints:
//! - Builds without `std` (needs `alloc`) so the decoder and buffer can run
//!   on the microcontroller itself
//! - No heap allocation while decoding
//! - Nothing here blocks except the sensor drivers, and those only on the
//!   bus they own
//!
//! ```no_run
//! use telenode_core::{decode, Framing, MeasurementBuffer, Measurement};
//! use chrono::Utc;
//!
//! # let samples = [0u32; 84];
//! let reading = decode(&samples, &Framing::DHT22)?;
//!
//! let mut buffer = MeasurementBuffer::new();
//! buffer.add([Measurement::ok(0, reading.temperature_c(), Utc::now())]);
//! # Ok::<(), telenode_core::DecodeError>(())
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

pub mod buffer;
pub mod clock;
pub mod constants;
pub mod decoder;
pub mod errors;
pub mod iso8601;
pub mod measurement;
pub mod sensor;

// Public API
pub use buffer::MeasurementBuffer;
pub use clock::{Clock, ClockTrust, FixedClock};
#[cfg(feature = "std")]
pub use clock::{ManualClock, SystemClock};
pub use decoder::{decode, synthesize_frame, Framing, Reading};
pub use errors::{DecodeError, DecodeResult};
pub use measurement::{Measurement, MeasurementBatch, SampleSet, SensorId, Status};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
