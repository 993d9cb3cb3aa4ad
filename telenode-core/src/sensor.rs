//! Sensor Drivers
//!
//! Hardware is reached through two small traits so the drivers run unchanged
//! on a board, on a host with a simulated bus, and in tests:
//!
//! - [`SingleWireBus`]: one bidirectional line plus a pulse-capture unit, as
//!   used by the DHT22.
//! - [`AnalogInput`]: a 12-bit ADC channel, as used by the light sensor.
//!
//! ## Wiring
//!
//! The capture unit cannot listen on the pin that drives the request, so the
//! board ties an output pin to a capture pin. [`Dht22::read`] checks that
//! link before every request: with the line driven high the capture pin must
//! read high, and with it driven low it must read low. Anything else is a
//! [`DecodeError::WiringFault`].
//!
//! ```rust
//! use telenode_core::sensor::{Dht22, SimulatedBus};
//! use telenode_core::{Framing, Reading};
//!
//! let bus = SimulatedBus::new(Reading::from_tenths(223, 551), Framing::DHT22);
//! let mut sensor = Dht22::new(bus, Framing::DHT22);
//! let reading = sensor.read().unwrap();
//! assert_eq!(reading.temperature_tenths(), 223);
//! ```

use heapless::Vec;

use crate::constants::buffers::CAPTURE_LEN;
use crate::constants::sensors::{
    ADC_FULL_SCALE, ADC_REFERENCE_V, CAPTURE_TIMEOUT_MS, LDR_DIVIDER_OHMS, LDR_LUX_CONSTANT,
    REQUEST_LOW_MS, STARTUP_IDLE_MS,
};
use crate::decoder::{decode, synthesize_frame, Framing, Reading};
use crate::errors::{DecodeError, DecodeResult};

/// A single-wire line with an attached pulse-capture unit
pub trait SingleWireBus {
    /// Drive the line to `high` (switches the pin to output if needed)
    fn set_output(&mut self, high: bool);

    /// Level currently seen on the capture pin
    fn read_input(&mut self) -> bool;

    /// Stop driving the line so the sensor can answer
    fn release(&mut self);

    /// Record level durations in microseconds until `buf` is full or
    /// `timeout_ms` elapses; returns how many were written
    fn capture(&mut self, buf: &mut [u32], timeout_ms: u32) -> usize;

    /// Block for `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);
}

/// Anything that yields a temperature/humidity reading
///
/// Blocking; the agent calls it from a blocking thread.
pub trait ClimateSensor: Send {
    fn read(&mut self) -> DecodeResult<Reading>;
}

/// DHT22 / AM2302 driver
#[derive(Debug)]
pub struct Dht22<B> {
    bus: B,
    framing: Framing,
    capture_timeout_ms: u32,
}

impl<B: SingleWireBus> Dht22<B> {
    /// Take ownership of the bus and let the sensor settle
    ///
    /// Blocks for one second with the line idle high.
    pub fn new(mut bus: B, framing: Framing) -> Self {
        bus.set_output(true);
        bus.delay_ms(STARTUP_IDLE_MS);
        Self {
            bus,
            framing,
            capture_timeout_ms: CAPTURE_TIMEOUT_MS,
        }
    }

    pub fn with_capture_timeout(mut self, timeout_ms: u32) -> Self {
        self.capture_timeout_ms = timeout_ms;
        self
    }

    pub fn framing(&self) -> &Framing {
        &self.framing
    }

    /// Check the output/capture loopback without sending a request
    ///
    /// Leaves the line idle high whatever the outcome.
    pub fn self_test(&mut self) -> DecodeResult<()> {
        let high_seen = self.bus.read_input();
        self.bus.set_output(false);
        let low_seen = !self.bus.read_input();
        self.bus.set_output(true);

        if high_seen && low_seen {
            Ok(())
        } else {
            Err(DecodeError::WiringFault)
        }
    }

    /// Request one reading and decode the answer
    pub fn read(&mut self) -> DecodeResult<Reading> {
        if !self.bus.read_input() {
            return Err(DecodeError::WiringFault);
        }
        self.bus.set_output(false);
        if self.bus.read_input() {
            self.bus.set_output(true);
            return Err(DecodeError::WiringFault);
        }

        self.bus.delay_ms(REQUEST_LOW_MS);
        self.bus.set_output(true);
        self.bus.release();

        let mut samples = [0u32; CAPTURE_LEN];
        let captured = self
            .bus
            .capture(&mut samples, self.capture_timeout_ms)
            .min(CAPTURE_LEN);
        self.bus.set_output(true);

        decode(&samples[..captured], &self.framing)
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    pub fn into_bus(self) -> B {
        self.bus
    }
}

impl<B: SingleWireBus + Send> ClimateSensor for Dht22<B> {
    fn read(&mut self) -> DecodeResult<Reading> {
        Dht22::read(self)
    }
}

/// Failure modes a [`SimulatedBus`] can reproduce
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusFault {
    /// Output and capture pins not tied together
    Miswired,
    /// Sensor never answers
    Disconnected,
}

/// In-memory bus that answers like a healthy sensor
///
/// Used on hosts without the hardware and throughout the tests. The answer
/// can be changed between reads and faults injected at will.
#[derive(Debug, Clone)]
pub struct SimulatedBus {
    level: bool,
    driving: bool,
    frame: Vec<u32, CAPTURE_LEN>,
    fault: Option<BusFault>,
    requests: u32,
    slept_ms: u64,
}

impl SimulatedBus {
    pub fn new(reading: Reading, framing: Framing) -> Self {
        Self {
            level: true,
            driving: false,
            frame: synthesize_frame(reading, &framing),
            fault: None,
            requests: 0,
            slept_ms: 0,
        }
    }

    /// A bus whose sensor never answers
    pub fn disconnected() -> Self {
        let mut bus = Self::new(Reading::from_raw(0, 0), Framing::DHT22);
        bus.fault = Some(BusFault::Disconnected);
        bus
    }

    /// A bus whose loopback wire is missing
    pub fn miswired() -> Self {
        let mut bus = Self::new(Reading::from_raw(0, 0), Framing::DHT22);
        bus.fault = Some(BusFault::Miswired);
        bus
    }

    /// Answer subsequent requests with `reading`
    pub fn set_reading(&mut self, reading: Reading, framing: &Framing) {
        self.frame = synthesize_frame(reading, framing);
    }

    /// Answer subsequent requests with an arbitrary capture
    pub fn set_frame(&mut self, samples: &[u32]) {
        self.frame.clear();
        let n = samples.len().min(CAPTURE_LEN);
        // n never exceeds the capacity
        let _ = self.frame.extend_from_slice(&samples[..n]);
    }

    pub fn set_fault(&mut self, fault: Option<BusFault>) {
        self.fault = fault;
    }

    /// Number of captures performed so far
    pub fn requests(&self) -> u32 {
        self.requests
    }

    /// Total time the driver asked to sleep
    pub fn slept_ms(&self) -> u64 {
        self.slept_ms
    }

    pub fn is_idle_high(&self) -> bool {
        self.driving && self.level
    }
}

impl SingleWireBus for SimulatedBus {
    fn set_output(&mut self, high: bool) {
        self.driving = true;
        self.level = high;
    }

    fn read_input(&mut self) -> bool {
        match self.fault {
            // Floating capture pin sits at the pull-up level
            Some(BusFault::Miswired) => true,
            _ => self.level,
        }
    }

    fn release(&mut self) {
        self.driving = false;
    }

    fn capture(&mut self, buf: &mut [u32], _timeout_ms: u32) -> usize {
        self.requests += 1;
        if self.fault == Some(BusFault::Disconnected) {
            return 0;
        }
        let n = self.frame.len().min(buf.len());
        buf[..n].copy_from_slice(&self.frame[..n]);
        n
    }

    fn delay_ms(&mut self, ms: u32) {
        self.slept_ms += u64::from(ms);
    }
}

/// A 12-bit analog input channel
pub trait AnalogInput: Send {
    fn read_raw(&mut self) -> u16;
}

impl<A: AnalogInput + ?Sized> AnalogInput for alloc::boxed::Box<A> {
    fn read_raw(&mut self) -> u16 {
        (**self).read_raw()
    }
}

/// An analog input stuck at one value
#[derive(Debug, Clone, Copy)]
pub struct FixedAnalog(pub u16);

impl AnalogInput for FixedAnalog {
    fn read_raw(&mut self) -> u16 {
        self.0
    }
}

/// Light-dependent resistor on a voltage divider
#[derive(Debug)]
pub struct LightSensor<A> {
    input: A,
}

impl<A: AnalogInput> LightSensor<A> {
    pub fn new(input: A) -> Self {
        Self { input }
    }

    /// Current illuminance in lux; never fails
    pub fn read_lux(&mut self) -> u32 {
        illuminance_from_raw(self.input.read_raw())
    }
}

/// Convert a raw ADC value from the LDR divider into lux
///
/// A raw value at full scale means zero resistance; the result saturates to
/// `u32::MAX`.
pub fn illuminance_from_raw(raw: u16) -> u32 {
    let voltage = f64::from(raw) * ADC_REFERENCE_V / ADC_FULL_SCALE;
    let resistance = LDR_DIVIDER_OHMS * (ADC_REFERENCE_V - voltage) / ADC_REFERENCE_V;
    let lux = LDR_LUX_CONSTANT / (resistance * resistance);
    lux as u32
}
