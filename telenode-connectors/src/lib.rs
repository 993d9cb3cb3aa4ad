//! Network Edges of the Telemetry Node
//!
//! ## Overview
//!
//! Two protocols leave the device:
//!
//! ### MQTT
//!
//! Batches go to the collector over MQTT at QoS 1 ("at least once"), and the
//! collector answers on a second topic once a batch is stored:
//!
//! ```text
//! node ── <device>/data ──▶ broker ──▶ collector
//!  ▲                                      │
//!  └──────── <device>/ack ◀── broker ◀────┘
//! ```
//!
//! The broker session is owned by a background task ([`mqtt::MqttEventLoop`])
//! that waits for the network link, connects, subscribes to the
//! acknowledgment topic after every successful connect, and forwards
//! acknowledgments into a channel. Publishing goes through the
//! [`AsyncConnector`] handle ([`mqtt::MqttConnector`]), which is cheap to
//! clone and never blocks on the network.
//!
//! ### HTTP
//!
//! A hyper service ([`http::StatusServer`]) serves the latest readings
//! as a small HTML page to anyone on the local network. It answers every
//! `GET` and nothing else.
//!
//! ## Failure Handling
//!
//! Nothing here retries a publish. A failed connect is logged, the session
//! task sleeps for the configured backoff and tries again; a failed publish
//! is returned to the caller, who keeps the record for the next pass.
//!
//! ## Example Usage
//!
//! ```no_run
//! use telenode_connectors::{AsyncConnector, mqtt::{MqttConfig, MqttConnector}};
//! use tokio::sync::{mpsc, watch};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (_link_tx, link_up) = watch::channel(true);
//! let (ack_tx, mut acks) = mpsc::channel(16);
//!
//! let config = MqttConfig::new("broker.local", 1883)
//!     .device_id("FEZ26")
//!     .keep_alive_secs(60);
//! let (mut mqtt, session) = MqttConnector::new(config, link_up, ack_tx);
//! tokio::spawn(session.run());
//!
//! mqtt.send("FEZ26/data", br#"{"version":2}"#).await?;
//! let ack = acks.recv().await;
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "http")]
pub mod http;

// Re-export common types
#[cfg(feature = "mqtt")]
pub use mqtt::{MqttConfig, MqttConnector, MqttError, MqttEventLoop};

#[cfg(feature = "http")]
pub use http::{HttpError, StatusConfig, StatusServer};

use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

/// Common connector errors
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Not connected")]
    NotConnected,

    #[error("Timeout")]
    Timeout,

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// A channel that can publish a payload on a topic
///
/// Implemented by the MQTT connector and by test doubles.
#[async_trait::async_trait]
pub trait AsyncConnector: Send {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Publish `data` on `topic`; `Ok` once the transport accepted it
    async fn send(&mut self, topic: &str, data: &[u8]) -> Result<(), Self::Error>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Get connection statistics
    fn stats(&self) -> ConnectionStats;
}

/// Connection statistics common to all connectors
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Total messages sent successfully
    pub messages_sent: u64,
    /// Total messages failed to send
    pub messages_failed: u64,
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Number of reconnections
    pub reconnections: u32,
    /// Last error message
    pub last_error: Option<String>,
}

/// Statistics shared between a connector handle and its background task
#[derive(Debug, Clone, Default)]
pub struct SharedStats(Arc<Mutex<ConnectionStats>>);

impl SharedStats {
    pub fn update(&self, f: impl FnOnce(&mut ConnectionStats)) {
        let mut stats = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut stats);
    }

    pub fn snapshot(&self) -> ConnectionStats {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn record_sent(&self, bytes: usize) {
        self.update(|s| {
            s.messages_sent += 1;
            s.bytes_sent += bytes as u64;
        });
    }

    pub fn record_failure(&self, error: &dyn std::fmt::Display) {
        let message = error.to_string();
        self.update(|s| {
            s.messages_failed += 1;
            s.last_error = Some(message);
        });
    }
}
