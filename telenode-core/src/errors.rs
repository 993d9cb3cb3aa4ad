//! Error Types for Sensor Protocol Failures
//!
//! ## Design Philosophy
//!
//! Decode errors are returned from the sampling hot path on small devices, so
//! they follow the same rules as everything else in this crate:
//!
//! 1. **Small Size**: every variant is a few machine words.
//! 2. **No Heap Allocation**: no `String` payloads, only integers.
//! 3. **Copy Semantics**: errors are cheap to return, log and store.
//!
//! ## Error Categories
//!
//! A read from the single-wire sensor can fail in exactly three ways, each of
//! which maps to a different physical cause:
//!
//! - `WiringFault`: the loopback self-test before transmission failed. The
//!   output and capture pins are not tied together (installation problem).
//! - `InsufficientSamples`: fewer edges were captured than a full frame needs.
//!   The sensor timed out or is disconnected.
//! - `ChecksumMismatch`: a full frame arrived but its checksum byte does not
//!   match the payload. The transmission was corrupted.
//!
//! None of these are fatal. The acquisition loop records a `FAIL` measurement
//! and tries again on the next tick; the decoder itself never retries.
//!
//! ```rust
//! use telenode_core::{decode, DecodeError, Framing};
//!
//! match decode(&[], &Framing::DHT22) {
//!     Err(DecodeError::InsufficientSamples { captured, required }) => {
//!         assert_eq!(captured, 0);
//!         assert!(required > 80);
//!     }
//!     _ => unreachable!(),
//! }
//! ```

use thiserror_no_std::Error;

/// Result type for decode operations
pub type DecodeResult<T> = Result<T, DecodeError>;

/// Reasons a sensor frame could not be turned into a reading
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// Loopback self-test failed before the request was sent
    #[error("Wiring fault: output and capture pins are not connected")]
    WiringFault,

    /// Not enough edges captured for a full frame
    #[error("Insufficient samples: captured {captured}, need {required}")]
    InsufficientSamples {
        /// Number of pulse durations the capture returned
        captured: usize,
        /// Minimum number the configured framing requires
        required: usize,
    },

    /// The checksum carried in the frame disagrees with the payload
    #[error("Checksum mismatch: frame carries {expected:#04x}, payload sums to {computed:#04x}")]
    ChecksumMismatch {
        /// Checksum byte decoded from the trailing bits
        expected: u8,
        /// Checksum computed over the decoded temperature and humidity
        computed: u8,
    },
}

impl DecodeError {
    /// Short identifier used in logs and on the status page
    pub fn kind(&self) -> &'static str {
        match self {
            Self::WiringFault => "wiring-fault",
            Self::InsufficientSamples { .. } => "insufficient-samples",
            Self::ChecksumMismatch { .. } => "checksum-mismatch",
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for DecodeError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::WiringFault =>
                defmt::write!(fmt, "Wiring fault"),
            Self::InsufficientSamples { captured, required } =>
                defmt::write!(fmt, "Captured {} samples, need {}", captured, required),
            Self::ChecksumMismatch { expected, computed } =>
                defmt::write!(fmt, "Checksum {:x} != {:x}", expected, computed),
        }
    }
}
