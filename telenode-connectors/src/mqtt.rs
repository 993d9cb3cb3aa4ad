//! MQTT connector
//!
//! Split the way rumqttc splits a client: [`MqttConnector`] is the handle
//! used to publish, [`MqttEventLoop`] owns the network session and must be
//! spawned. The session task publishes its state on a `watch` channel so the
//! publish pipeline can wait for "connected" instead of polling.
//!
//! Session lifecycle:
//!
//! ```text
//! WAIT_LINK_UP ─▶ CONNECT ─▶ SUBSCRIBE_ACK_TOPIC ─▶ CONNECTED
//!      ▲             │ error                           │ error / link down
//!      └── backoff ◀─┘◀────────────────────────────────┘
//! ```

use std::time::Duration;

use log::{debug, info, warn};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use telenode_core::constants::time::{DEFAULT_CONNECT_BACKOFF_SECS, DEFAULT_KEEP_ALIVE_SECS};
use telenode_schemas::Ack;
use thiserror::Error;
use tokio::sync::{mpsc, watch};

use crate::{AsyncConnector, ConnectionStats, SharedStats};

/// Brokers disagree on the lower bound; rumqttc refuses anything below this
const MIN_KEEP_ALIVE_SECS: u64 = 5;

/// MQTT-specific errors
#[derive(Debug, Error)]
pub enum MqttError {
    /// The request could not be handed to the session task
    #[error("Client error: {0}")]
    Client(#[from] rumqttc::ClientError),

    /// No broker session is established
    #[error("Not connected to broker")]
    NotConnected,
}

/// MQTT configuration
#[derive(Debug, Clone)]
pub struct MqttConfig {
    /// Broker host name or address
    pub host: String,
    /// Broker port
    pub port: u16,
    /// Client id; generated from the device id when not set
    pub client_id: Option<String>,
    /// Topic batches are published on
    pub data_topic: String,
    /// Topic the collector acknowledges on
    pub ack_topic: String,
    /// Keep-alive interval announced to the broker
    pub keep_alive: Duration,
    /// Pause after a failed connect
    pub connect_backoff: Duration,
    /// Capacity of the request queue between handle and session
    pub request_capacity: usize,
}

impl MqttConfig {
    /// Create new configuration for a broker
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            client_id: None,
            data_topic: "telenode/data".to_string(),
            ack_topic: "telenode/ack".to_string(),
            keep_alive: Duration::from_secs(DEFAULT_KEEP_ALIVE_SECS),
            connect_backoff: Duration::from_secs(DEFAULT_CONNECT_BACKOFF_SECS),
            request_capacity: 10,
        }
    }

    /// Derive topics from the device id: `<id>/data` and `<id>/ack`
    pub fn device_id(mut self, device_id: &str) -> Self {
        self.data_topic = format!("{}/data", device_id);
        self.ack_topic = format!("{}/ack", device_id);
        if self.client_id.is_none() {
            self.client_id = Some(generate_client_id(device_id));
        }
        self
    }

    pub fn client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn topics(mut self, data: impl Into<String>, ack: impl Into<String>) -> Self {
        self.data_topic = data.into();
        self.ack_topic = ack.into();
        self
    }

    /// Set keep-alive in seconds
    pub fn keep_alive_secs(mut self, secs: u64) -> Self {
        self.keep_alive = Duration::from_secs(secs);
        self
    }

    /// Set connect backoff in seconds
    pub fn backoff_secs(mut self, secs: u64) -> Self {
        self.connect_backoff = Duration::from_secs(secs);
        self
    }

    fn options(&self) -> MqttOptions {
        let client_id = self
            .client_id
            .clone()
            .unwrap_or_else(|| generate_client_id("telenode"));
        let mut options = MqttOptions::new(client_id, self.host.clone(), self.port);
        options.set_keep_alive(self.keep_alive.max(Duration::from_secs(MIN_KEEP_ALIVE_SECS)));
        options.set_clean_session(true);
        options
    }
}

/// `<device>-<8 hex chars>`: unique per boot, short enough for MQTT 3.1 brokers
fn generate_client_id(device_id: &str) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("{}-{}", device_id, &suffix[..8])
}

/// Publishing handle
#[derive(Clone)]
pub struct MqttConnector {
    client: AsyncClient,
    connected: watch::Receiver<bool>,
    stats: SharedStats,
    data_topic: String,
}

impl MqttConnector {
    /// Create the handle and the session task that drives it
    ///
    /// The session only touches the network while `link_up` is true.
    /// Acknowledgments arriving on the configured topic are parsed and sent
    /// to `acks`.
    pub fn new(
        config: MqttConfig,
        link_up: watch::Receiver<bool>,
        acks: mpsc::Sender<Ack>,
    ) -> (Self, MqttEventLoop) {
        let (client, eventloop) = AsyncClient::new(config.options(), config.request_capacity);
        let (connected_tx, connected_rx) = watch::channel(false);
        let stats = SharedStats::default();

        let connector = Self {
            client: client.clone(),
            connected: connected_rx,
            stats: stats.clone(),
            data_topic: config.data_topic.clone(),
        };
        let session = MqttEventLoop {
            eventloop,
            client,
            config,
            link_up,
            connected: connected_tx,
            acks,
            stats,
            sessions: 0,
        };
        (connector, session)
    }

    /// Broker-connected signal
    pub fn connected(&self) -> watch::Receiver<bool> {
        self.connected.clone()
    }

    pub fn data_topic(&self) -> &str {
        &self.data_topic
    }
}

#[async_trait::async_trait]
impl AsyncConnector for MqttConnector {
    type Error = MqttError;

    async fn send(&mut self, topic: &str, data: &[u8]) -> Result<(), Self::Error> {
        if !*self.connected.borrow() {
            self.stats.record_failure(&MqttError::NotConnected);
            return Err(MqttError::NotConnected);
        }
        match self
            .client
            .publish(topic, QoS::AtLeastOnce, false, data.to_vec())
            .await
        {
            Ok(()) => {
                self.stats.record_sent(data.len());
                Ok(())
            }
            Err(e) => {
                self.stats.record_failure(&e);
                Err(e.into())
            }
        }
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }

    fn stats(&self) -> ConnectionStats {
        self.stats.snapshot()
    }
}

/// Broker session task
pub struct MqttEventLoop {
    eventloop: EventLoop,
    client: AsyncClient,
    config: MqttConfig,
    link_up: watch::Receiver<bool>,
    connected: watch::Sender<bool>,
    acks: mpsc::Sender<Ack>,
    stats: SharedStats,
    sessions: u32,
}

impl MqttEventLoop {
    /// Drive the session until the link signal goes away
    pub async fn run(mut self) {
        info!(
            "broker session for {}:{} (data {}, ack {})",
            self.config.host, self.config.port, self.config.data_topic, self.config.ack_topic
        );
        loop {
            if self.link_up.wait_for(|up| *up).await.is_err() {
                debug!("link signal closed, ending broker session");
                self.set_connected(false);
                return;
            }

            tokio::select! {
                event = self.eventloop.poll() => match event {
                    Ok(event) => self.handle_event(event),
                    Err(e) => {
                        self.set_connected(false);
                        warn!("broker connection failed: {}", e);
                        let message = e.to_string();
                        self.stats.update(|s| s.last_error = Some(message));
                        tokio::time::sleep(self.config.connect_backoff).await;
                    }
                },
                closed = link_lost(&mut self.link_up) => {
                    self.set_connected(false);
                    if closed {
                        debug!("link signal closed, ending broker session");
                        return;
                    }
                    info!("link down, broker session suspended");
                }
            }
        }
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Incoming(Packet::ConnAck(_)) => {
                if self.sessions > 0 {
                    self.stats.update(|s| s.reconnections += 1);
                }
                self.sessions += 1;

                // Subscriptions do not survive a clean session
                if let Err(e) = self.client.try_subscribe(self.config.ack_topic.clone(), QoS::AtLeastOnce) {
                    warn!("could not subscribe to {}: {}", self.config.ack_topic, e);
                    return;
                }
                info!("connected to broker, listening on {}", self.config.ack_topic);
                self.set_connected(true);
            }
            Event::Incoming(Packet::Publish(publish)) if publish.topic == self.config.ack_topic => {
                match Ack::from_slice(&publish.payload) {
                    Ok(ack) => {
                        debug!("acknowledgment for {} at {}", ack.device_id, ack.timestamp);
                        if let Err(e) = self.acks.try_send(ack) {
                            warn!("dropping acknowledgment: {}", e);
                        }
                    }
                    Err(e) => warn!("ignoring malformed acknowledgment: {}", e),
                }
            }
            Event::Incoming(Packet::Disconnect) => {
                self.set_connected(false);
            }
            _ => {}
        }
    }

    fn set_connected(&self, connected: bool) {
        self.connected.send_if_modified(|current| {
            let changed = *current != connected;
            *current = connected;
            changed
        });
    }
}

/// Resolves once the link goes down; `true` if the signal was dropped instead
async fn link_lost(link_up: &mut watch::Receiver<bool>) -> bool {
    link_up.wait_for(|up| !*up).await.is_err()
}
