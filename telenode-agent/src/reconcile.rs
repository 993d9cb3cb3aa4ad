//! Time Reconciler
//!
//! Records written before the clock was trusted hold bare measurement arrays
//! with wrong timestamps. Once the clock is trusted, each of them is read
//! back, every timestamp is moved by the correction offset, the measurements
//! go back into the buffer to be flushed as a normal record, and the
//! unverified record is deleted.
//!
//! A pass runs when the clock becomes trusted and then on a fixed interval,
//! which also catches records written in the window just before a sync.

use std::time::Duration;

use log::{debug, info, warn};
use telenode_schemas::wire;

use crate::buffer::BufferHandle;
use crate::errors::{NodeError, NodeResult, StoreError};
use crate::signals::NodeSignals;
use crate::store::StoreHandle;

pub struct Reconciler {
    store: StoreHandle,
    buffer: BufferHandle,
    signals: NodeSignals,
    interval: Duration,
}

impl Reconciler {
    pub fn new(store: StoreHandle, buffer: BufferHandle, signals: NodeSignals) -> Self {
        Self {
            store,
            buffer,
            signals,
            interval: Duration::from_secs(60),
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

        let mut clock = self.signals.clock();
        loop {
            clock
                .wait_for(|trust| trust.is_trusted())
                .await
                .map(|_| ())
                .map_err(|_| NodeError::ChannelClosed("clock signal"))?;

            self.reconcile_once().await?;

            tokio::select! {
                changed = clock.changed() => {
                    changed.map_err(|_| NodeError::ChannelClosed("clock signal"))?;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    /// Move every unverified record back into the buffer
    ///
    /// Does nothing while the clock is untrusted. Returns the number of
    /// records reconciled.
    pub async fn reconcile_once(&self) -> NodeResult<usize> {
        let trust = self.signals.trust();
        if !trust.is_trusted() {
            return Ok(0);
        }
        let offset = trust.correction_offset();

        let names = match self.store.list_unverified().await {
            Ok(names) => names,
            Err(StoreError::Closed) => return Err(StoreError::Closed.into()),
            Err(e) => {
                warn!("cannot list unverified records: {}", e);
                return Ok(0);
            }
        };

        let mut reconciled = 0;
        for name in names {
            let bytes = match self.store.read(name).await {
                Ok(bytes) => bytes,
                Err(StoreError::NotFound(_)) => continue,
                Err(StoreError::Closed) => return Err(StoreError::Closed.into()),
                Err(e) => {
                    warn!("cannot read {}: {}", name, e);
                    continue;
                }
            };

            match wire::decode_measurements(&bytes) {
                Ok(measurements) => {
                    let count = self.buffer.add_with_offset(measurements, offset).await?;
                    debug!("{}: {} measurements shifted by {}s", name, count, offset.num_seconds());
                }
                Err(e) => warn!("discarding unreadable unverified record {}: {}", name, e),
            }

            match self.store.delete(name).await {
                Ok(()) | Err(StoreError::NotFound(_)) => reconciled += 1,
                Err(StoreError::Closed) => return Err(StoreError::Closed.into()),
                Err(e) => warn!("cannot delete reconciled {}: {}", name, e),
            }
        }

        if reconciled > 0 {
            info!("reconciled {} records (offset {}s)", reconciled, offset.num_seconds());
        }
        Ok(reconciled)
    }
}
