//! Node configuration
//!
//! Loaded from a TOML file; every key is optional and falls back to the
//! values the field firmware shipped with:
//!
//! ```toml
//! [device]
//! id = "FEZ26"
//!
//! [storage]
//! dir = "/var/lib/telenode"
//!
//! [broker]
//! host = "10.0.0.2"
//!
//! [publish]
//! ack_timeout_secs = 10
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use telenode_core::constants::buffers::{BUFFER_CAPACITY, EVICT_BATCH};
use telenode_core::constants::sensors::{CAPTURE_TIMEOUT_MS, HUMIDITY_BITS_FULL, PULSE_THRESHOLD_US};
use telenode_core::constants::time::{
    DEFAULT_ACK_TIMEOUT_SECS, DEFAULT_CONNECT_BACKOFF_SECS, DEFAULT_CYCLE_PAUSE_SECS,
    DEFAULT_FLUSH_INTERVAL_SECS, DEFAULT_KEEP_ALIVE_SECS, DEFAULT_RECONCILE_INTERVAL_SECS,
    DEFAULT_REFRESH_EVERY_TICKS, DEFAULT_SAMPLE_INTERVAL_SECS,
};
use telenode_core::Framing;
use telenode_schemas::SCHEMA_VERSION;

use crate::errors::ConfigError;

/// Humidity widths used by known sensor revisions
const SUPPORTED_HUMIDITY_BITS: [u8; 3] = [10, 11, 16];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub device: DeviceConfig,
    pub sensor: SensorConfig,
    pub buffer: BufferConfig,
    pub storage: StorageConfig,
    pub broker: BrokerConfig,
    pub publish: PublishConfig,
    pub reconcile: ReconcileConfig,
    pub status: StatusConfig,
    pub network: NetworkConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    pub id: String,
    pub schema_version: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            id: "FEZ26".to_string(),
            schema_version: SCHEMA_VERSION,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub sample_interval_secs: u64,
    /// Re-emit an unchanged value after this many ticks
    pub refresh_every: u32,
    pub humidity_bits: u8,
    pub pulse_threshold_us: u32,
    pub capture_timeout_ms: u32,
    /// Read the light sensor as a third channel
    pub brightness: bool,
    /// Values answered by the simulated bus on hosts without the hardware
    pub simulated: SimulatedSensorConfig,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            sample_interval_secs: DEFAULT_SAMPLE_INTERVAL_SECS,
            refresh_every: DEFAULT_REFRESH_EVERY_TICKS,
            humidity_bits: HUMIDITY_BITS_FULL,
            pulse_threshold_us: PULSE_THRESHOLD_US,
            capture_timeout_ms: CAPTURE_TIMEOUT_MS,
            brightness: true,
            simulated: SimulatedSensorConfig::default(),
        }
    }
}

impl SensorConfig {
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    /// Frame layout for the configured sensor revision
    pub fn framing(&self) -> Result<Framing, ConfigError> {
        Framing::with_humidity_bits(self.humidity_bits)
            .map(|f| f.with_threshold(self.pulse_threshold_us))
            .ok_or_else(|| {
                ConfigError::Invalid(format!("unsupported humidity width {}", self.humidity_bits))
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SimulatedSensorConfig {
    pub temperature_c: f32,
    pub humidity_pct: f32,
    /// Raw 12-bit ADC value of the light sensor
    pub brightness_raw: u16,
}

impl Default for SimulatedSensorConfig {
    fn default() -> Self {
        Self {
            temperature_c: 22.3,
            humidity_pct: 55.1,
            brightness_raw: 2048,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    pub capacity: usize,
    pub evict_batch: usize,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: BUFFER_CAPACITY,
            evict_batch: EVICT_BATCH,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub dir: PathBuf,
    pub flush_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./spool"),
            flush_interval_secs: DEFAULT_FLUSH_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub keep_alive_secs: u64,
    pub connect_backoff_secs: u64,
    /// Defaults to `<device id>/data`
    pub data_topic: Option<String>,
    /// Defaults to `<device id>/ack`
    pub ack_topic: Option<String>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            keep_alive_secs: DEFAULT_KEEP_ALIVE_SECS,
            connect_backoff_secs: DEFAULT_CONNECT_BACKOFF_SECS,
            data_topic: None,
            ack_topic: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub ack_timeout_secs: u64,
    pub cycle_pause_secs: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            ack_timeout_secs: DEFAULT_ACK_TIMEOUT_SECS,
            cycle_pause_secs: DEFAULT_CYCLE_PAUSE_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReconcileConfig {
    pub interval_secs: u64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    pub enabled: bool,
    pub bind: String,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Treat the network link as up from the start
    pub assume_link_up: bool,
    /// Trust the system clock from the start
    pub assume_clock_synced: bool,
    /// Interface whose operational state drives the link signal
    pub interface: Option<String>,
    pub link_poll_secs: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            assume_link_up: true,
            assume_clock_synced: true,
            interface: None,
            link_poll_secs: 2,
        }
    }
}

impl NetworkConfig {
    /// `/sys/class/net/<interface>/operstate`, if an interface is configured
    pub fn operstate_path(&self) -> Option<PathBuf> {
        self.interface
            .as_ref()
            .map(|iface| Path::new("/sys/class/net").join(iface).join("operstate"))
    }

    pub fn link_poll(&self) -> Duration {
        Duration::from_secs(self.link_poll_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl NodeConfig {
    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Reject settings the node cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.device.id.trim().is_empty() {
            return invalid("device.id must not be empty".into());
        }
        if !SUPPORTED_HUMIDITY_BITS.contains(&self.sensor.humidity_bits) {
            return invalid(format!(
                "sensor.humidity_bits must be one of {:?}, got {}",
                SUPPORTED_HUMIDITY_BITS, self.sensor.humidity_bits
            ));
        }
        for (name, value) in [
            ("sensor.sample_interval_secs", self.sensor.sample_interval_secs),
            ("storage.flush_interval_secs", self.storage.flush_interval_secs),
            ("publish.ack_timeout_secs", self.publish.ack_timeout_secs),
            ("reconcile.interval_secs", self.reconcile.interval_secs),
            ("network.link_poll_secs", self.network.link_poll_secs),
        ] {
            if value == 0 {
                return invalid(format!("{} must be greater than zero", name));
            }
        }
        if self.sensor.refresh_every == 0 {
            return invalid("sensor.refresh_every must be greater than zero".into());
        }
        if self.buffer.evict_batch == 0 || self.buffer.capacity < self.buffer.evict_batch {
            return invalid(format!(
                "buffer.capacity ({}) must be at least buffer.evict_batch ({}), which must be positive",
                self.buffer.capacity, self.buffer.evict_batch
            ));
        }
        Ok(())
    }

    pub fn device_id(mut self, id: impl Into<String>) -> Self {
        self.device.id = id.into();
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage.dir = dir.into();
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    pub fn broker(mut self, host: impl Into<String>, port: u16) -> Self {
        self.broker.host = host.into();
        self.broker.port = port;
        self
    }

    pub fn ack_timeout_secs(mut self, secs: u64) -> Self {
        self.publish.ack_timeout_secs = secs;
        self
    }

    pub fn status_bind(mut self, bind: impl Into<String>) -> Self {
        self.status.bind = bind.into();
        self
    }

    pub fn clock_synced(mut self, synced: bool) -> Self {
        self.network.assume_clock_synced = synced;
        self
    }

    pub fn interface(mut self, name: impl Into<String>) -> Self {
        self.network.interface = Some(name.into());
        self
    }

    pub fn data_topic(&self) -> String {
        self.broker
            .data_topic
            .clone()
            .unwrap_or_else(|| format!("{}/data", self.device.id))
    }

    pub fn ack_topic(&self) -> String {
        self.broker
            .ack_topic
            .clone()
            .unwrap_or_else(|| format!("{}/ack", self.device.id))
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.storage.flush_interval_secs)
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.publish.ack_timeout_secs)
    }

    pub fn cycle_pause(&self) -> Duration {
        Duration::from_secs(self.publish.cycle_pause_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile.interval_secs)
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_secs(self.broker.connect_backoff_secs)
    }
}
