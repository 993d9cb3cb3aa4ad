//! Startup cleanup
//!
//! Unverified records left by a previous run cannot be reconciled: the
//! instant they were measured relative to is gone with the process. They are
//! deleted, together with any half-written temporary file, before anything
//! else touches the spool. Completing this raises the storage-ready signal.

use std::time::Duration;

use log::{info, warn};

use crate::errors::StoreError;
use crate::signals::NodeSignals;
use crate::store::StoreHandle;

/// What the cleanup removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub temporary: usize,
    pub unverified: usize,
}

/// Delete stale records once
pub async fn clean_spool(store: &StoreHandle) -> Result<CleanupReport, StoreError> {
    let temporary = store.purge_temporary().await?;
    let mut unverified = 0;
    for name in store.list_unverified().await? {
        match store.delete(name).await {
            Ok(()) => unverified += 1,
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(CleanupReport { temporary, unverified })
}

/// Clean the spool, retrying until it succeeds, then mark storage ready
pub async fn run_startup_cleanup(store: StoreHandle, signals: NodeSignals, retry: Duration) {
    loop {
        match clean_spool(&store).await {
            Ok(report) => {
                info!(
                    "spool ready ({} stale unverified records, {} temporary files removed)",
                    report.unverified, report.temporary
                );
                signals.mark_storage_ready();
                return;
            }
            Err(StoreError::Closed) => {
                warn!("store stopped before startup cleanup finished");
                return;
            }
            Err(e) => {
                warn!("startup cleanup failed, retrying in {}s: {}", retry.as_secs(), e);
                tokio::time::sleep(retry).await;
            }
        }
    }
}
