//! Publish Pipeline
//!
//! ## Overview
//!
//! Drains the durable queue to the collector, one record at a time:
//!
//! ```text
//! wait storage ready ─► wait link up ─► wait broker connected
//!        ▲                                      │
//!        │                                      ▼
//!      pause ◄─── for each publishable record: publish ─► ack? ─► delete
//!                                                     └► timeout ─► end cycle
//! ```
//!
//! ## Single Outstanding Publish
//!
//! Only one record is in flight. Its [`AckKey`] (device id and embedded
//! timestamp) is the only thing an incoming acknowledgment is compared
//! with, so a late answer for an earlier record can never release the
//! current one. Acknowledgments left over from a previous wait are dropped
//! before each publish.
//!
//! ## Skip Timer
//!
//! An acknowledgment may be lost. Every wait is bounded by the ack timeout;
//! when it expires the record is left in place, the cycle ends and the
//! record is offered again on the next pass. Delivery is therefore
//! at-least-once: the collector may see a batch twice.
//!
//! Nothing is ever deleted without a matching acknowledgment.

use std::time::Duration;

use log::{debug, info, warn};
use telenode_connectors::AsyncConnector;
use telenode_schemas::{validate_batch, wire, Ack, AckKey, RecordName};
use tokio::sync::{mpsc, watch};

use crate::errors::{NodeError, NodeResult, StoreError};
use crate::signals::NodeSignals;
use crate::store::StoreHandle;

/// Counters kept across cycles
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishStats {
    pub published: u64,
    pub acknowledged: u64,
    pub timed_out: u64,
    pub failed: u64,
}

/// Result of offering one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Acknowledged and deleted
    Acknowledged,
    /// No acknowledgment in time; record kept
    TimedOut,
    /// Publish refused or failed; record kept
    Failed,
    /// Broker session dropped while waiting; record kept
    Disconnected,
    /// Record vanished or could not be parsed; left alone
    Skipped,
}

enum AckWait {
    Matched,
    TimedOut,
    Disconnected,
}

pub struct PublishPipeline<C> {
    connector: C,
    store: StoreHandle,
    signals: NodeSignals,
    connected: watch::Receiver<bool>,
    acks: mpsc::Receiver<Ack>,
    topic: String,
    ack_timeout: Duration,
    cycle_pause: Duration,
    stats: PublishStats,
}

impl<C: AsyncConnector> PublishPipeline<C> {
    pub fn new(
        connector: C,
        store: StoreHandle,
        signals: NodeSignals,
        connected: watch::Receiver<bool>,
        acks: mpsc::Receiver<Ack>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            connector,
            store,
            signals,
            connected,
            acks,
            topic: topic.into(),
            ack_timeout: Duration::from_secs(10),
            cycle_pause: Duration::from_secs(2),
            stats: PublishStats::default(),
        }
    }

    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    pub fn cycle_pause(mut self, pause: Duration) -> Self {
        self.cycle_pause = pause;
        self
    }

    pub fn stats(&self) -> PublishStats {
        self.stats
    }

    pub async fn run(mut self) -> NodeResult<()> {
        loop {
            self.wait_ready().await?;
            let before = self.stats;
            self.run_cycle().await?;
            if self.stats != before {
                info!(
                    "publish cycle done: {} published, {} acknowledged, {} timed out, {} failed",
                    self.stats.published,
                    self.stats.acknowledged,
                    self.stats.timed_out,
                    self.stats.failed
                );
                let link = self.connector.stats();
                debug!(
                    "connector: {} sent ({} bytes), {} failed, {} reconnections",
                    link.messages_sent, link.bytes_sent, link.messages_failed, link.reconnections
                );
            }
            tokio::time::sleep(self.cycle_pause).await;
        }
    }

    /// Block until storage is ready, the link is up and the broker connected
    pub async fn wait_ready(&mut self) -> NodeResult<()> {
        let mut storage = self.signals.storage_ready();
        let mut link = self.signals.link_up();
        wait_true(&mut storage, "storage-ready signal").await?;
        loop {
            wait_true(&mut link, "link signal").await?;
            wait_true(&mut self.connected, "broker-connected signal").await?;
            if *link.borrow() {
                return Ok(());
            }
        }
    }

    /// Offer every publishable record once
    ///
    /// The cycle ends early on the first record that was not acknowledged.
    pub async fn run_cycle(&mut self) -> NodeResult<()> {
        let names = match self.store.list_publishable().await {
            Ok(names) => names,
            Err(StoreError::Closed) => return Err(StoreError::Closed.into()),
            Err(e) => {
                warn!("cannot list spool: {}", e);
                return Ok(());
            }
        };
        if !names.is_empty() {
            debug!("{} records to publish", names.len());
        }

        for name in names {
            match self.publish_record(name).await? {
                Outcome::Acknowledged | Outcome::Skipped => {}
                Outcome::TimedOut | Outcome::Failed | Outcome::Disconnected => break,
            }
        }
        Ok(())
    }

    /// Publish one record and wait for its acknowledgment
    pub async fn publish_record(&mut self, name: RecordName) -> NodeResult<Outcome> {
        let bytes = match self.store.read(name).await {
            Ok(bytes) => bytes,
            Err(StoreError::Closed) => return Err(StoreError::Closed.into()),
            Err(e) => {
                warn!("cannot read {}: {}", name, e);
                return Ok(Outcome::Skipped);
            }
        };

        let key = match wire::extract_key(&bytes) {
            Ok(key) => key,
            Err(e) => {
                warn!("skipping unreadable record {}: {}", name, e);
                return Ok(Outcome::Skipped);
            }
        };
        if let Ok(batch) = wire::decode_batch(&bytes) {
            for issue in validate_batch(&batch).issues() {
                warn!("{}: {:?} {}", name, issue.severity, issue.message);
            }
        }

        while let Ok(stale) = self.acks.try_recv() {
            debug!("dropping stale acknowledgment for {}", stale.timestamp);
        }

        if let Err(e) = self.connector.send(&self.topic, &bytes).await {
            warn!("publish of {} failed: {}", name, e);
            self.stats.failed += 1;
            return Ok(Outcome::Failed);
        }
        self.stats.published += 1;
        debug!("published {} ({} bytes)", name, bytes.len());

        match self.await_ack(&key).await? {
            AckWait::Matched => {
                self.stats.acknowledged += 1;
                match self.store.delete(name).await {
                    Ok(()) | Err(StoreError::NotFound(_)) => {}
                    Err(StoreError::Closed) => return Err(StoreError::Closed.into()),
                    Err(e) => warn!("cannot delete acknowledged {}: {}", name, e),
                }
                Ok(Outcome::Acknowledged)
            }
            AckWait::TimedOut => {
                warn!(
                    "no acknowledgment for {} within {}s, keeping it for the next pass",
                    name,
                    self.ack_timeout.as_secs()
                );
                self.stats.timed_out += 1;
                Ok(Outcome::TimedOut)
            }
            AckWait::Disconnected => {
                warn!("broker connection lost while waiting for {}", name);
                Ok(Outcome::Disconnected)
            }
        }
    }

    async fn await_ack(&mut self, key: &AckKey) -> NodeResult<AckWait> {
        let mut connected = self.connected.clone();
        let deadline = tokio::time::sleep(self.ack_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                _ = &mut deadline => return Ok(AckWait::TimedOut),
                ack = self.acks.recv() => match ack {
                    Some(ack) if ack.matches(key) => return Ok(AckWait::Matched),
                    Some(ack) => debug!(
                        "ignoring acknowledgment for {} at {}",
                        ack.device_id, ack.timestamp
                    ),
                    None => return Err(NodeError::ChannelClosed("acknowledgment stream")),
                },
                changed = connected.changed() => {
                    if changed.is_err() || !*connected.borrow() {
                        return Ok(AckWait::Disconnected);
                    }
                }
            }
        }
    }
}

async fn wait_true(rx: &mut watch::Receiver<bool>, what: &'static str) -> NodeResult<()> {
    rx.wait_for(|value| *value)
        .await
        .map(|_| ())
        .map_err(|_| NodeError::ChannelClosed(what))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreActor;
    use chrono::{DateTime, TimeZone, Utc};
    use std::sync::{Arc, Mutex};
    use telenode_connectors::{ConnectionStats, ConnectorError};
    use telenode_core::{ClockTrust, Measurement, MeasurementBatch};

    #[derive(Clone, Default)]
    struct Recorder {
        sent: Arc<Mutex<Vec<Vec<u8>>>>,
        refuse: bool,
    }

    #[async_trait::async_trait]
    impl AsyncConnector for Recorder {
        type Error = ConnectorError;

        async fn send(&mut self, _topic: &str, data: &[u8]) -> Result<(), Self::Error> {
            if self.refuse {
                return Err(ConnectorError::NotConnected);
            }
            self.sent.lock().unwrap().push(data.to_vec());
            Ok(())
        }

        fn is_connected(&self) -> bool {
            !self.refuse
        }

        fn stats(&self) -> ConnectionStats {
            ConnectionStats::default()
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, 15, 0).unwrap()
    }

    fn batch() -> MeasurementBatch {
        MeasurementBatch::new(2, "FEZ26", at(), vec![Measurement::ok(0, 22.3, at())])
    }

    async fn pipeline(
        dir: &std::path::Path,
        connector: Recorder,
    ) -> (PublishPipeline<Recorder>, StoreHandle, mpsc::Sender<Ack>, watch::Sender<bool>) {
        let store = StoreActor::spawn(dir).await.unwrap();
        let signals = NodeSignals::new(true, ClockTrust::trusted(at()));
        signals.mark_storage_ready();
        let (ack_tx, ack_rx) = mpsc::channel(8);
        let (connected_tx, connected_rx) = watch::channel(true);
        let pipeline = PublishPipeline::new(connector, store.clone(), signals, connected_rx, ack_rx, "FEZ26/data")
            .ack_timeout(Duration::from_secs(10));
        (pipeline, store, ack_tx, connected_tx)
    }

    #[tokio::test]
    async fn matching_ack_deletes_record() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::default();
        let (mut pipeline, store, acks, _connected) = pipeline(dir.path(), recorder.clone()).await;
        let name = store.write(batch(), true).await.unwrap();

        let collector = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            acks.send(Ack::for_batch(&batch())).await.unwrap();
            acks
        });

        assert_eq!(pipeline.publish_record(name).await.unwrap(), Outcome::Acknowledged);
        assert!(store.list_publishable().await.unwrap().is_empty());
        assert_eq!(recorder.sent.lock().unwrap().len(), 1);
        assert_eq!(pipeline.stats().acknowledged, 1);
        drop(collector.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn mismatched_acks_never_release() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, store, acks, _connected) = pipeline(dir.path(), Recorder::default()).await;
        let name = store.write(batch(), true).await.unwrap();

        let wrong_device = Ack { device_id: "FEZ27".into(), timestamp: at() };
        let wrong_time = Ack { device_id: "FEZ26".into(), timestamp: at() + chrono::Duration::seconds(1) };
        let collector = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            acks.send(wrong_device).await.unwrap();
            acks.send(wrong_time).await.unwrap();
            acks
        });

        assert_eq!(pipeline.publish_record(name).await.unwrap(), Outcome::TimedOut);
        assert_eq!(store.list_publishable().await.unwrap(), vec![name]);
        assert_eq!(pipeline.stats().timed_out, 1);
        drop(collector.await.unwrap());
    }

    #[tokio::test]
    async fn refused_publish_keeps_record() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder { refuse: true, ..Recorder::default() };
        let (mut pipeline, store, _acks, _connected) = pipeline(dir.path(), recorder).await;
        let name = store.write(batch(), true).await.unwrap();

        assert_eq!(pipeline.publish_record(name).await.unwrap(), Outcome::Failed);
        assert_eq!(store.list_publishable().await.unwrap(), vec![name]);
        assert_eq!(pipeline.stats().failed, 1);
    }

    #[tokio::test]
    async fn refused_publish_ends_cycle() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder { refuse: true, ..Recorder::default() };
        let (mut pipeline, store, _acks, _connected) = pipeline(dir.path(), recorder).await;
        let later = at() + chrono::Duration::minutes(1);
        let first = store.write(batch(), true).await.unwrap();
        let second = store
            .write(MeasurementBatch::new(2, "FEZ26", later, vec![Measurement::ok(0, 22.4, later)]), true)
            .await
            .unwrap();

        pipeline.run_cycle().await.unwrap();
        assert_eq!(pipeline.stats().failed, 1);
        let mut kept = store.list_publishable().await.unwrap();
        kept.sort();
        assert_eq!(kept, vec![first, second]);
    }

    #[tokio::test]
    async fn disconnect_ends_wait_without_delete() {
        let dir = tempfile::tempdir().unwrap();
        let (mut pipeline, store, _acks, connected) = pipeline(dir.path(), Recorder::default()).await;
        let name = store.write(batch(), true).await.unwrap();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            connected.send_replace(false);
            connected
        });

        assert_eq!(pipeline.publish_record(name).await.unwrap(), Outcome::Disconnected);
        assert_eq!(store.list_publishable().await.unwrap(), vec![name]);
    }

    #[tokio::test]
    async fn unreadable_record_is_skipped_not_deleted() {
        let dir = tempfile::tempdir().unwrap();
        let recorder = Recorder::default();
        let (mut pipeline, store, _acks, _connected) = pipeline(dir.path(), recorder.clone()).await;
        std::fs::write(dir.path().join("20240301101500.json"), b"not json").unwrap();
        let name: RecordName = "20240301101500.json".parse().unwrap();

        assert_eq!(pipeline.publish_record(name).await.unwrap(), Outcome::Skipped);
        assert!(recorder.sent.lock().unwrap().is_empty());
        assert_eq!(store.list_publishable().await.unwrap(), vec![name]);
    }
}
