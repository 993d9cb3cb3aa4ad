//! Buffer actor
//!
//! The in-memory [`MeasurementBuffer`] is fed by the sampler and the
//! reconciler and drained by the flush task. One task owns it; the others
//! hold a [`BufferHandle`].

use chrono::Duration;
use log::debug;
use telenode_core::{Measurement, MeasurementBuffer};
use tokio::sync::{mpsc, oneshot};

use crate::errors::{NodeError, NodeResult};

#[derive(Debug)]
pub enum BufferCommand {
    Add {
        measurements: Vec<Measurement>,
        offset: Option<Duration>,
        response: oneshot::Sender<usize>,
    },
    Flush {
        response: oneshot::Sender<Vec<Measurement>>,
    },
    Restore {
        measurements: Vec<Measurement>,
        response: oneshot::Sender<()>,
    },
    Len {
        response: oneshot::Sender<usize>,
    },
}

pub struct BufferActor {
    buffer: MeasurementBuffer,
}

impl BufferActor {
    pub fn new(buffer: MeasurementBuffer) -> Self {
        Self { buffer }
    }

    pub fn spawn(buffer: MeasurementBuffer) -> BufferHandle {
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(Self::new(buffer).run(rx));
        BufferHandle { tx }
    }

    pub async fn run(mut self, mut rx: mpsc::Receiver<BufferCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                BufferCommand::Add { measurements, offset, response } => {
                    let added = match offset {
                        Some(offset) => self.buffer.add_with_offset(measurements, offset),
                        None => self.buffer.add(measurements),
                    };
                    let _ = response.send(added);
                }
                BufferCommand::Flush { response } => {
                    let _ = response.send(self.buffer.flush());
                }
                BufferCommand::Restore { measurements, response } => {
                    self.buffer.restore(measurements);
                    let _ = response.send(());
                }
                BufferCommand::Len { response } => {
                    let _ = response.send(self.buffer.len());
                }
            }
        }
        debug!("buffer actor stopped with {} measurements", self.buffer.len());
    }
}

#[derive(Debug, Clone)]
pub struct BufferHandle {
    tx: mpsc::Sender<BufferCommand>,
}

impl BufferHandle {
    async fn request<T>(&self, command: BufferCommand, rx: oneshot::Receiver<T>) -> NodeResult<T> {
        self.tx
            .send(command)
            .await
            .map_err(|_| NodeError::ChannelClosed("buffer actor"))?;
        rx.await.map_err(|_| NodeError::ChannelClosed("buffer actor"))
    }

    /// Append measurements as they are
    pub async fn add(&self, measurements: Vec<Measurement>) -> NodeResult<usize> {
        let (response, rx) = oneshot::channel();
        self.request(BufferCommand::Add { measurements, offset: None, response }, rx)
            .await
    }

    /// Append measurements with their timestamps moved by `offset`
    pub async fn add_with_offset(&self, measurements: Vec<Measurement>, offset: Duration) -> NodeResult<usize> {
        let (response, rx) = oneshot::channel();
        self.request(
            BufferCommand::Add { measurements, offset: Some(offset), response },
            rx,
        )
        .await
    }

    /// Take everything buffered
    pub async fn flush(&self) -> NodeResult<Vec<Measurement>> {
        let (response, rx) = oneshot::channel();
        self.request(BufferCommand::Flush { response }, rx).await
    }

    /// Hand back measurements that could not be persisted
    pub async fn restore(&self, measurements: Vec<Measurement>) -> NodeResult<()> {
        let (response, rx) = oneshot::channel();
        self.request(BufferCommand::Restore { measurements, response }, rx).await
    }

    pub async fn len(&self) -> NodeResult<usize> {
        let (response, rx) = oneshot::channel();
        self.request(BufferCommand::Len { response }, rx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn sample(s: u32) -> Measurement {
        Measurement::ok(0, s as f32, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, s).unwrap())
    }

    #[tokio::test]
    async fn handles_share_one_buffer() {
        let buffer = BufferActor::spawn(MeasurementBuffer::new());
        let other = buffer.clone();

        buffer.add(vec![sample(0)]).await.unwrap();
        other.add(vec![sample(1)]).await.unwrap();
        assert_eq!(buffer.len().await.unwrap(), 2);

        let flushed = other.flush().await.unwrap();
        assert_eq!(flushed, vec![sample(0), sample(1)]);
        assert_eq!(buffer.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn offset_is_applied_inside_actor() {
        let buffer = BufferActor::spawn(MeasurementBuffer::new());
        buffer
            .add_with_offset(vec![sample(0)], Duration::hours(1))
            .await
            .unwrap();

        let flushed = buffer.flush().await.unwrap();
        assert_eq!(flushed[0].timestamp(), sample(0).timestamp() + Duration::hours(1));
    }

    #[tokio::test]
    async fn restore_goes_to_the_front() {
        let buffer = BufferActor::spawn(MeasurementBuffer::with_capacity(10, 3));
        buffer.add(vec![sample(2)]).await.unwrap();
        buffer.restore(vec![sample(0), sample(1)]).await.unwrap();

        assert_eq!(
            buffer.flush().await.unwrap(),
            vec![sample(0), sample(1), sample(2)]
        );
    }
}
