//! Durable Queue
//!
//! ## Overview
//!
//! Flushed batches are written to a spool directory, one file per batch, and
//! stay there until the collector acknowledges them. The directory is the
//! queue: there is no index, a restart just lists it again.
//!
//! ```text
//! spool/
//! ├── 20240301101500.json    publishable
//! ├── 20240301101501.json    publishable
//! └── x20000101000030.json   waiting for a clock correction
//! ```
//!
//! ## Single Owner
//!
//! All file operations run inside one actor task and are processed in the
//! order they were requested. Writers, the publisher, the reconciler and the
//! startup cleanup talk to it through a cloneable [`StoreHandle`]; none of
//! them ever touches the directory directly, so no two operations on the
//! spool can overlap.
//!
//! ## Durability
//!
//! - A record is written to a hidden temporary file, synced, renamed into
//!   place and the directory is synced. A crash leaves either the complete
//!   record or a temporary file that enumeration ignores.
//! - A delete is followed by a directory sync, so an acknowledged record
//!   cannot reappear after a power loss and be published again.
//!
//! ## Ordering
//!
//! Listings come back in directory order, which is not creation order on
//! most file systems. The publisher works through them in that order.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use telenode_core::MeasurementBatch;
use telenode_schemas::{wire, RecordName};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};

use crate::errors::StoreError;

const TEMP_SUFFIX: &str = ".tmp";

/// Requests understood by the store actor
#[derive(Debug)]
pub enum StoreCommand {
    /// Persist a batch; untrusted batches keep only their measurements
    Write {
        batch: MeasurementBatch,
        trusted: bool,
        response: oneshot::Sender<Result<RecordName, StoreError>>,
    },
    /// Raw bytes of a record
    Read {
        name: RecordName,
        response: oneshot::Sender<Result<Vec<u8>, StoreError>>,
    },
    /// Records ready to publish, in directory order
    ListPublishable {
        response: oneshot::Sender<Result<Vec<RecordName>, StoreError>>,
    },
    /// Records written with an untrusted clock, in directory order
    ListUnverified {
        response: oneshot::Sender<Result<Vec<RecordName>, StoreError>>,
    },
    /// Remove a record durably
    Delete {
        name: RecordName,
        response: oneshot::Sender<Result<(), StoreError>>,
    },
    /// Remove temporary files left by an interrupted write
    PurgeTemporary {
        response: oneshot::Sender<Result<usize, StoreError>>,
    },
}

/// Owner of the spool directory
pub struct StoreActor {
    dir: PathBuf,
}

impl StoreActor {
    /// Open (and create if needed) the spool directory
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await?;
        info!("spool directory {}", dir.display());
        Ok(Self { dir })
    }

    /// Open the directory and spawn the actor
    pub async fn spawn(dir: impl Into<PathBuf>) -> Result<StoreHandle, StoreError> {
        let actor = Self::open(dir).await?;
        let (tx, rx) = mpsc::channel(32);
        tokio::spawn(actor.run(rx));
        Ok(StoreHandle { tx })
    }

    /// Process commands until every handle is dropped
    pub async fn run(self, mut rx: mpsc::Receiver<StoreCommand>) {
        while let Some(command) = rx.recv().await {
            match command {
                StoreCommand::Write { batch, trusted, response } => {
                    let _ = response.send(self.write(&batch, trusted).await);
                }
                StoreCommand::Read { name, response } => {
                    let _ = response.send(self.read(&name).await);
                }
                StoreCommand::ListPublishable { response } => {
                    let _ = response.send(self.list(false).await);
                }
                StoreCommand::ListUnverified { response } => {
                    let _ = response.send(self.list(true).await);
                }
                StoreCommand::Delete { name, response } => {
                    let _ = response.send(self.delete(&name).await);
                }
                StoreCommand::PurgeTemporary { response } => {
                    let _ = response.send(self.purge_temporary().await);
                }
            }
        }
        debug!("store actor stopped");
    }

    fn path(&self, name: &RecordName) -> PathBuf {
        self.dir.join(name.to_string())
    }

    async fn write(&self, batch: &MeasurementBatch, trusted: bool) -> Result<RecordName, StoreError> {
        let bytes = if trusted {
            wire::encode_batch(batch)?
        } else {
            wire::encode_measurements(&batch.measurements)?
        };

        let mut name = RecordName::new(batch.timestamp, !trusted);
        while fs::try_exists(self.path(&name)).await? {
            name = name.next_second();
        }

        let temp_path = self.dir.join(format!(".{}{}", name, TEMP_SUFFIX));
        persist(&temp_path, &self.path(&name), &bytes).await?;
        sync_dir(&self.dir).await?;

        debug!("wrote {} ({} measurements, {} bytes)", name, batch.len(), bytes.len());
        Ok(name)
    }

    async fn read(&self, name: &RecordName) -> Result<Vec<u8>, StoreError> {
        match fs::read(self.path(name)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(name.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, untrusted: bool) -> Result<Vec<RecordName>, StoreError> {
        let mut names = Vec::new();
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(RecordName::from_file_name) else {
                continue;
            };
            if name.is_untrusted() == untrusted {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn delete(&self, name: &RecordName) -> Result<(), StoreError> {
        match fs::remove_file(self.path(name)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(name.to_string()))
            }
            Err(e) => return Err(e.into()),
        }
        sync_dir(&self.dir).await?;
        debug!("deleted {}", name);
        Ok(())
    }

    async fn purge_temporary(&self) -> Result<usize, StoreError> {
        let mut removed = 0;
        let mut entries = fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_name = entry.file_name();
            let is_temp = file_name
                .to_str()
                .map_or(false, |n| n.starts_with('.') && n.ends_with(TEMP_SUFFIX));
            if is_temp {
                match fs::remove_file(entry.path()).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!("cannot remove {}: {}", entry.path().display(), e),
                }
            }
        }
        if removed > 0 {
            sync_dir(&self.dir).await?;
        }
        Ok(removed)
    }
}

/// Write `bytes` to `temp`, sync it and rename it to `target`
///
/// On failure `temp` is removed again.
async fn persist(temp: &Path, target: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let result = async {
        let mut file = fs::File::create(temp).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
        drop(file);
        fs::rename(temp, target).await
    }
    .await;
    if result.is_err() {
        if let Err(e) = fs::remove_file(temp).await {
            if e.kind() != ErrorKind::NotFound {
                warn!("cannot remove {}: {}", temp.display(), e);
            }
        }
    }
    result
}

/// Make directory entry changes durable
#[cfg(unix)]
async fn sync_dir(dir: &Path) -> Result<(), StoreError> {
    fs::File::open(dir).await?.sync_all().await?;
    Ok(())
}

#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> Result<(), StoreError> {
    Ok(())
}

/// Cloneable handle to the store actor
#[derive(Debug, Clone)]
pub struct StoreHandle {
    tx: mpsc::Sender<StoreCommand>,
}

impl StoreHandle {
    async fn request<T>(
        &self,
        command: StoreCommand,
        rx: oneshot::Receiver<Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        self.tx.send(command).await.map_err(|_| StoreError::Closed)?;
        rx.await.map_err(|_| StoreError::Closed)?
    }

    /// Persist `batch`; returns the record name actually used
    pub async fn write(&self, batch: MeasurementBatch, trusted: bool) -> Result<RecordName, StoreError> {
        let (response, rx) = oneshot::channel();
        self.request(StoreCommand::Write { batch, trusted, response }, rx).await
    }

    pub async fn read(&self, name: RecordName) -> Result<Vec<u8>, StoreError> {
        let (response, rx) = oneshot::channel();
        self.request(StoreCommand::Read { name, response }, rx).await
    }

    pub async fn list_publishable(&self) -> Result<Vec<RecordName>, StoreError> {
        let (response, rx) = oneshot::channel();
        self.request(StoreCommand::ListPublishable { response }, rx).await
    }

    pub async fn list_unverified(&self) -> Result<Vec<RecordName>, StoreError> {
        let (response, rx) = oneshot::channel();
        self.request(StoreCommand::ListUnverified { response }, rx).await
    }

    pub async fn delete(&self, name: RecordName) -> Result<(), StoreError> {
        let (response, rx) = oneshot::channel();
        self.request(StoreCommand::Delete { name, response }, rx).await
    }

    pub async fn purge_temporary(&self) -> Result<usize, StoreError> {
        let (response, rx) = oneshot::channel();
        self.request(StoreCommand::PurgeTemporary { response }, rx).await
    }
}
