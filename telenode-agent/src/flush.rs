//! Persistence flush task
//!
//! Periodically drains the buffer into one durable record. The record is
//! written trusted or untrusted according to the clock state at the moment
//! of the write. Nothing is written until the startup cleanup has finished,
//! otherwise the cleanup could delete a fresh untrusted record.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, warn};
use telenode_core::{Clock, MeasurementBatch};
use telenode_schemas::RecordName;

use crate::buffer::BufferHandle;
use crate::errors::{NodeError, NodeResult};
use crate::signals::NodeSignals;
use crate::store::StoreHandle;

#[derive(Clone)]
pub struct FlushTask {
    buffer: BufferHandle,
    store: StoreHandle,
    signals: NodeSignals,
    clock: Arc<dyn Clock>,
    device_id: String,
    schema_version: u32,
    interval: Duration,
}

impl FlushTask {
    pub fn new(
        buffer: BufferHandle,
        store: StoreHandle,
        signals: NodeSignals,
        clock: Arc<dyn Clock>,
        device_id: impl Into<String>,
        schema_version: u32,
    ) -> Self {
        Self {
            buffer,
            store,
            signals,
            clock,
            device_id: device_id.into(),
            schema_version,
            interval: Duration::from_secs(1),
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run(self) -> NodeResult<()> {
        let mut ready = self.signals.storage_ready();
        ready
            .wait_for(|ready| *ready)
            .await
            .map_err(|_| NodeError::ChannelClosed("storage-ready signal"))?;

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.flush_once().await?;
        }
    }

    /// Write whatever is buffered as one record
    ///
    /// Returns the record name, or `None` when the buffer was empty or the
    /// write failed. A failed write puts the measurements back.
    pub async fn flush_once(&self) -> NodeResult<Option<RecordName>> {
        let measurements = self.buffer.flush().await?;
        if measurements.is_empty() {
            return Ok(None);
        }

        let trusted = self.signals.trust().is_trusted();
        let batch = MeasurementBatch::new(
            self.schema_version,
            self.device_id.as_str(),
            self.clock.now(),
            measurements,
        );
        let retained = batch.measurements.clone();

        match self.store.write(batch, trusted).await {
            Ok(name) => {
                debug!("flushed {} measurements to {}", retained.len(), name);
                Ok(Some(name))
            }
            Err(e) => {
                warn!("cannot persist {} measurements: {}", retained.len(), e);
                self.buffer.restore(retained).await?;
                Ok(None)
            }
        }
    }
}
