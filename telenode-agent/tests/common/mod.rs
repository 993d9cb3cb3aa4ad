//! Shared fixtures for the store-and-forward integration tests
//!
//! - [`FakeCollector`]: an [`AsyncConnector`] that records every publish and
//!   answers like the remote collector would (or deliberately does not)
//! - [`Harness`]: a spool in a temporary directory with the buffer and store
//!   actors running and all signals raised

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use telenode_agent::buffer::{BufferActor, BufferHandle};
use telenode_agent::publish::PublishPipeline;
use telenode_agent::store::{StoreActor, StoreHandle};
use telenode_agent::NodeSignals;
use telenode_connectors::{AsyncConnector, ConnectionStats, ConnectorError};
use telenode_core::{ClockTrust, MeasurementBuffer};
use telenode_schemas::{wire, Ack};
use tempfile::TempDir;
use tokio::sync::{mpsc, watch};

pub const DEVICE_ID: &str = "FEZ26";
pub const DATA_TOPIC: &str = "FEZ26/data";
pub const ACK_TIMEOUT: Duration = Duration::from_secs(10);

/// How the fake collector answers a publish
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckMode {
    /// Acknowledge with the batch identity
    Matching,
    /// Never answer (lost acknowledgment)
    Silent,
    /// Answer for another device
    WrongDevice,
    /// Answer with a timestamp one second off
    WrongTimestamp,
}

#[derive(Clone)]
pub struct FakeCollector {
    mode: Arc<Mutex<AckMode>>,
    published: Arc<Mutex<Vec<Vec<u8>>>>,
    acks: mpsc::Sender<Ack>,
}

impl FakeCollector {
    pub fn new(mode: AckMode, acks: mpsc::Sender<Ack>) -> Self {
        Self {
            mode: Arc::new(Mutex::new(mode)),
            published: Arc::new(Mutex::new(Vec::new())),
            acks,
        }
    }

    pub fn set_mode(&self, mode: AckMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn published(&self) -> Vec<Vec<u8>> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AsyncConnector for FakeCollector {
    type Error = ConnectorError;

    async fn send(&mut self, _topic: &str, data: &[u8]) -> Result<(), Self::Error> {
        self.published.lock().unwrap().push(data.to_vec());

        let batch = wire::decode_batch(data).map_err(|e| ConnectorError::ProtocolError(e.to_string()))?;
        let mut ack = Ack::for_batch(&batch);
        let mode = *self.mode.lock().unwrap();
        match mode {
            AckMode::Matching => {}
            AckMode::Silent => return Ok(()),
            AckMode::WrongDevice => ack.device_id = "FEZ27".to_string(),
            AckMode::WrongTimestamp => ack.timestamp = ack.timestamp + chrono::Duration::seconds(1),
        }

        let acks = self.acks.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let _ = acks.send(ack).await;
        });
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }

    fn stats(&self) -> ConnectionStats {
        ConnectionStats::default()
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub store: StoreHandle,
    pub buffer: BufferHandle,
    pub signals: NodeSignals,
    pub connected: watch::Sender<bool>,
}

impl Harness {
    /// Spool, buffer and signals with link up and storage ready
    pub async fn new(trust: ClockTrust) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreActor::spawn(dir.path()).await.unwrap();
        let buffer = BufferActor::spawn(MeasurementBuffer::new());
        let signals = NodeSignals::new(true, trust);
        signals.mark_storage_ready();
        let (connected, _) = watch::channel(true);
        Self {
            dir,
            store,
            buffer,
            signals,
            connected,
        }
    }

    /// Publish pipeline talking to a fake collector
    pub fn pipeline(&self, mode: AckMode) -> (PublishPipeline<FakeCollector>, FakeCollector) {
        let (ack_tx, ack_rx) = mpsc::channel(8);
        let collector = FakeCollector::new(mode, ack_tx);
        let pipeline = PublishPipeline::new(
            collector.clone(),
            self.store.clone(),
            self.signals.clone(),
            self.connected.subscribe(),
            ack_rx,
            DATA_TOPIC,
        )
        .ack_timeout(ACK_TIMEOUT)
        .cycle_pause(Duration::from_millis(10));
        (pipeline, collector)
    }

    /// Names of every file in the spool directory
    pub fn spool_files(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }
}

/// An instant on a device that booted without a real-time clock
pub fn boot(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap() + chrono::Duration::seconds(secs)
}

/// A correct wall-clock instant
pub fn wall(secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap() + chrono::Duration::seconds(secs)
}
