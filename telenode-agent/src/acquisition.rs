//! Acquisition loop
//!
//! On every tick the sampler reads the climate sensor (on the blocking pool,
//! the single-wire exchange busy-waits for microsecond timing) and, when
//! fitted, the light sensor. Readings pass the [`Deduplicator`] before they
//! reach the buffer, so an unchanged value is stored only every
//! `refresh_every` ticks.
//!
//! A failed decode is never fatal: it yields `FAIL` measurements for the
//! temperature and humidity channels and a line on the status page.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use telenode_core::constants::{MAX_CHANNELS, SENSOR_ID_BRIGHTNESS, SENSOR_ID_HUMIDITY, SENSOR_ID_TEMPERATURE};
use telenode_core::sensor::{AnalogInput, ClimateSensor, Dht22, FixedAnalog, LightSensor, SimulatedBus};
use telenode_core::{Clock, DecodeResult, Measurement, Reading, SampleSet};
use tokio::sync::watch;

use crate::buffer::BufferHandle;
use crate::config::SensorConfig;
use crate::errors::{NodeError, NodeResult};
use crate::status::StatusPage;

/// Suppresses values that did not change
///
/// Each channel counts the ticks since it last emitted. A value is emitted
/// when it differs from the last emitted one or the count reaches
/// `refresh_every`. A `FAIL` is always emitted and forgets the last value,
/// so the first good reading after a failure is emitted too.
#[derive(Debug, Clone)]
pub struct Deduplicator {
    last: [Option<f32>; MAX_CHANNELS],
    ticks: [u32; MAX_CHANNELS],
    refresh_every: u32,
}

impl Deduplicator {
    pub fn new(refresh_every: u32) -> Self {
        Self {
            last: [None; MAX_CHANNELS],
            ticks: [0; MAX_CHANNELS],
            refresh_every: refresh_every.max(1),
        }
    }

    pub fn filter(&mut self, measurement: Measurement) -> Option<Measurement> {
        let channel = usize::from(measurement.sensor_id());
        if channel >= MAX_CHANNELS {
            return Some(measurement);
        }
        if !measurement.is_ok() {
            self.last[channel] = None;
            self.ticks[channel] = 0;
            return Some(measurement);
        }

        self.ticks[channel] = self.ticks[channel].saturating_add(1);
        let changed = self.last[channel] != Some(measurement.value());
        if changed || self.ticks[channel] >= self.refresh_every {
            self.last[channel] = Some(measurement.value());
            self.ticks[channel] = 0;
            Some(measurement)
        } else {
            None
        }
    }
}

/// Hardware the sampler reads
pub struct Sensors {
    pub climate: Box<dyn ClimateSensor>,
    pub light: Option<LightSensor<Box<dyn AnalogInput>>>,
}

impl Sensors {
    /// Sensors backed by the in-memory bus, answering the configured values
    ///
    /// Runs the wiring self-test like real hardware would.
    pub fn simulated(config: &SensorConfig) -> NodeResult<Self> {
        let framing = config.framing()?;
        let values = &config.simulated;
        let reading = Reading::from_tenths(
            (values.temperature_c * 10.0).round() as i16,
            (values.humidity_pct * 10.0).round() as u16,
        );

        let mut dht = Dht22::new(SimulatedBus::new(reading, framing), framing)
            .with_capture_timeout(config.capture_timeout_ms);
        dht.self_test().map_err(NodeError::SensorInit)?;

        let light = config.brightness.then(|| {
            let input: Box<dyn AnalogInput> = Box::new(FixedAnalog(values.brightness_raw));
            LightSensor::new(input)
        });
        Ok(Self {
            climate: Box::new(dht),
            light,
        })
    }
}

pub struct Sampler {
    climate: Option<Box<dyn ClimateSensor>>,
    light: Option<LightSensor<Box<dyn AnalogInput>>>,
    dedup: Deduplicator,
    clock: Arc<dyn Clock>,
    buffer: BufferHandle,
    page: StatusPage,
    status: watch::Sender<String>,
}

impl Sampler {
    pub fn new(
        sensors: Sensors,
        refresh_every: u32,
        clock: Arc<dyn Clock>,
        buffer: BufferHandle,
        page: StatusPage,
        status: watch::Sender<String>,
    ) -> Self {
        Self {
            climate: Some(sensors.climate),
            light: sensors.light,
            dedup: Deduplicator::new(refresh_every),
            clock,
            buffer,
            page,
            status,
        }
    }

    pub async fn run(mut self, interval: Duration) -> NodeResult<()> {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.sample_once().await?;
        }
    }

    /// One tick: read, suppress, buffer and refresh the status page
    ///
    /// Returns the per-channel result; `None` slots were suppressed.
    pub async fn sample_once(&mut self) -> NodeResult<SampleSet> {
        let now = self.clock.now();
        let mut set = SampleSet::new();

        match self.read_climate().await? {
            Ok(reading) => {
                self.page.record_reading(&reading);
                self.push(&mut set, Measurement::ok(SENSOR_ID_TEMPERATURE, reading.temperature_c(), now));
                self.push(&mut set, Measurement::ok(SENSOR_ID_HUMIDITY, reading.humidity_pct(), now));
            }
            Err(e) => {
                warn!("climate sensor read failed: {}", e);
                self.page.record_error(e);
                self.push(&mut set, Measurement::fail(SENSOR_ID_TEMPERATURE, now));
                self.push(&mut set, Measurement::fail(SENSOR_ID_HUMIDITY, now));
            }
        }

        if let Some(lux) = self.light.as_mut().map(LightSensor::read_lux) {
            self.page.record_brightness(lux);
            let measurement = Measurement::ok(SENSOR_ID_BRIGHTNESS, lux as f32, now);
            self.push(&mut set, measurement);
        }

        let emitted: Vec<Measurement> = set.iter().flatten().cloned().collect();
        if !emitted.is_empty() {
            let added = self.buffer.add(emitted).await?;
            debug!("buffered {} measurements", added);
        }
        self.status.send_replace(self.page.render());
        Ok(set)
    }

    fn push(&mut self, set: &mut SampleSet, measurement: Measurement) {
        // one slot per channel, never more than MAX_CHANNELS
        let _ = set.push(self.dedup.filter(measurement));
    }

    async fn read_climate(&mut self) -> NodeResult<DecodeResult<Reading>> {
        let mut sensor = self
            .climate
            .take()
            .ok_or_else(|| NodeError::TaskFailed("climate sensor lost".into()))?;
        let (sensor, result) = tokio::task::spawn_blocking(move || {
            let result = sensor.read();
            (sensor, result)
        })
        .await
        .map_err(|e| NodeError::TaskFailed(format!("climate sensor read: {}", e)))?;
        self.climate = Some(sensor);
        Ok(result)
    }
}
