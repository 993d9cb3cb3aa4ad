//! Node-wide state signals
//!
//! Every condition a worker may have to wait for is a `watch` channel:
//! waiting is `wait_for`, which composes with `select!` and timeouts, and a
//! late subscriber always sees the current state.
//!
//! | Signal          | Set by                          | Waited on by              |
//! |-----------------|---------------------------------|---------------------------|
//! | `link_up`       | [`watch_link`] or the embedder  | broker session, publisher |
//! | `storage_ready` | startup cleanup                 | flush, publisher, reconciler |
//! | `clock`         | time-sync events                | flush, reconciler         |
//!
//! The broker-connected signal belongs to the MQTT session and the status
//! page to the sampler; they are created there.
//!
//! ## Correction Offset
//!
//! The offset applied to unverified records is the clock jump of the sync:
//! the corrected time minus what the unsynced clock would read at that very
//! moment. The last unsynced reading is carried forward on the monotonic
//! clock, so uptime spent untrusted is not mistaken for part of the jump.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use telenode_core::ClockTrust;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::config::NetworkConfig;

/// Shared handle to the node signals; clones refer to the same channels
#[derive(Debug, Clone)]
pub struct NodeSignals {
    inner: Arc<Senders>,
}

#[derive(Debug)]
struct Senders {
    link_up: watch::Sender<bool>,
    storage_ready: watch::Sender<bool>,
    clock: watch::Sender<ClockTrust>,
    /// Monotonic instant at which `ClockTrust::last_known_bad` was read
    bad_read_at: Mutex<Instant>,
}

impl NodeSignals {
    pub fn new(link_up: bool, trust: ClockTrust) -> Self {
        Self {
            inner: Arc::new(Senders {
                link_up: watch::Sender::new(link_up),
                storage_ready: watch::Sender::new(false),
                clock: watch::Sender::new(trust),
                bad_read_at: Mutex::new(Instant::now()),
            }),
        }
    }

    /// Initial state of a booting node; `now` is the first clock reading
    pub fn at_boot(network: &NetworkConfig, now: DateTime<Utc>) -> Self {
        let trust = if network.assume_clock_synced {
            ClockTrust::trusted(now)
        } else {
            ClockTrust::untrusted(now)
        };
        Self::new(network.assume_link_up, trust)
    }

    pub fn link_up(&self) -> watch::Receiver<bool> {
        self.inner.link_up.subscribe()
    }

    pub fn storage_ready(&self) -> watch::Receiver<bool> {
        self.inner.storage_ready.subscribe()
    }

    pub fn clock(&self) -> watch::Receiver<ClockTrust> {
        self.inner.clock.subscribe()
    }

    pub fn trust(&self) -> ClockTrust {
        *self.inner.clock.borrow()
    }

    /// Network interface came up or went down
    pub fn set_link(&self, up: bool) {
        let changed = self.inner.link_up.send_if_modified(|current| {
            let changed = *current != up;
            *current = up;
            changed
        });
        if changed {
            info!("network link {}", if up { "up" } else { "down" });
        }
    }

    pub fn mark_storage_ready(&self) {
        self.inner.storage_ready.send_replace(true);
    }

    /// A time sync is about to run; `now` is the last unsynced reading
    pub fn clock_sync_started(&self, now: DateTime<Utc>) {
        self.inner.clock.send_modify(|trust| trust.sync_started(now));
        self.mark_bad_read();
    }

    /// Time sync completed and `now` is correct; returns the correction offset
    pub fn clock_synced(&self, now: DateTime<Utc>) -> Duration {
        let since_bad_read = Duration::from_std(self.bad_read_elapsed()).unwrap_or_else(|_| Duration::zero());
        let mut offset = Duration::zero();
        self.inner.clock.send_modify(|trust| {
            if !trust.is_trusted() {
                trust.sync_started(trust.last_known_bad() + since_bad_read);
            }
            offset = trust.sync_succeeded(now);
        });
        info!("clock synchronized, correction offset {}s", offset.num_seconds());
        offset
    }

    pub fn clock_sync_failed(&self, now: DateTime<Utc>) {
        self.inner.clock.send_modify(|trust| trust.sync_failed(now));
        self.mark_bad_read();
        warn!("clock synchronization failed, timestamps untrusted");
    }

    fn mark_bad_read(&self) {
        *self.inner.bad_read_at.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn bad_read_elapsed(&self) -> std::time::Duration {
        self.inner.bad_read_at.lock().unwrap_or_else(PoisonError::into_inner).elapsed()
    }
}

/// Drive the link signal from a `sysfs` operstate file
///
/// `up` and `unknown` (reported by some wireless drivers and by loopback)
/// count as up; anything else, including an unreadable file, as down.
pub async fn watch_link(signals: NodeSignals, operstate: PathBuf, every: std::time::Duration) {
    info!("following link state in {}", operstate.display());
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let up = match tokio::fs::read_to_string(&operstate).await {
            Ok(state) => matches!(state.trim(), "up" | "unknown"),
            Err(e) => {
                debug!("cannot read {}: {}", operstate.display(), e);
                false
            }
        };
        signals.set_link(up);
    }
}

/// Map Unix signals to node events
///
/// `SIGUSR1` reports a completed time sync, `SIGUSR2` a failed one. Meant to
/// be sent by the time daemon's hook script.
#[cfg(unix)]
pub async fn forward_clock_signals(
    signals: NodeSignals,
    clock: Arc<dyn telenode_core::Clock>,
) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut synced = signal(SignalKind::user_defined1())?;
    let mut failed = signal(SignalKind::user_defined2())?;
    loop {
        tokio::select! {
            Some(()) = synced.recv() => {
                signals.clock_synced(clock.now());
            }
            Some(()) = failed.recv() => {
                signals.clock_sync_failed(clock.now());
            }
            else => return Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn boot() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn clock_sync_wakes_waiters() {
        let signals = NodeSignals::new(true, ClockTrust::untrusted(boot()));
        let mut clock = signals.clock();

        let waiter = tokio::spawn(async move {
            clock.wait_for(|t| t.is_trusted()).await.map(|t| t.correction_offset()).unwrap()
        });

        signals.clock_sync_started(boot() + Duration::seconds(5));
        let offset = signals.clock_synced(Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 5).unwrap());

        assert_eq!(waiter.await.unwrap(), offset);
        assert!(signals.trust().is_trusted());
    }

    #[tokio::test(start_paused = true)]
    async fn offset_excludes_unsynced_uptime() {
        let signals = NodeSignals::new(true, ClockTrust::untrusted(boot()));

        // An hour on the unsynced clock, then the sync lands on real time
        tokio::time::advance(std::time::Duration::from_secs(3600)).await;
        let real = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let offset = signals.clock_synced(real);

        // A reading taken just before the sync maps onto the real instant
        assert_eq!(boot() + Duration::hours(1) + offset, real);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_sync_restarts_the_reference() {
        let real = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let signals = NodeSignals::new(true, ClockTrust::trusted(real));

        tokio::time::advance(std::time::Duration::from_secs(600)).await;
        let drifted = real + Duration::seconds(590);
        signals.clock_sync_failed(drifted);
        assert!(!signals.trust().is_trusted());

        tokio::time::advance(std::time::Duration::from_secs(60)).await;
        let offset = signals.clock_synced(real + Duration::seconds(660));
        assert_eq!(offset, Duration::seconds(10));
    }

    #[test]
    fn boot_state_follows_network_config() {
        let mut network = NetworkConfig::default();
        let signals = NodeSignals::at_boot(&network, boot());
        assert!(signals.trust().is_trusted());
        assert!(*signals.link_up().borrow());

        network.assume_clock_synced = false;
        network.assume_link_up = false;
        let signals = NodeSignals::at_boot(&network, boot());
        assert!(!signals.trust().is_trusted());
        assert_eq!(signals.trust().last_known_bad(), boot());
        assert!(!*signals.link_up().borrow());
    }

    #[tokio::test]
    async fn operstate_file_drives_link() {
        let dir = tempfile::tempdir().unwrap();
        let operstate = dir.path().join("operstate");
        std::fs::write(&operstate, "down\n").unwrap();

        let signals = NodeSignals::new(false, ClockTrust::trusted(boot()));
        let mut link = signals.link_up();
        let task = tokio::spawn(watch_link(
            signals.clone(),
            operstate.clone(),
            std::time::Duration::from_millis(10),
        ));

        std::fs::write(&operstate, "up\n").unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), link.wait_for(|up| *up))
            .await
            .unwrap()
            .unwrap();

        std::fs::remove_file(&operstate).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(5), link.wait_for(|up| !*up))
            .await
            .unwrap()
            .unwrap();
        task.abort();
    }

    #[tokio::test]
    async fn link_changes_are_visible() {
        let signals = NodeSignals::new(false, ClockTrust::trusted(boot()));
        let link = signals.link_up();
        assert!(!*link.borrow());

        signals.set_link(true);
        assert!(*link.borrow());
    }

    #[test]
    fn storage_starts_not_ready() {
        let signals = NodeSignals::new(true, ClockTrust::trusted(boot()));
        let ready = signals.storage_ready();
        assert!(!*ready.borrow());
        signals.mark_storage_ready();
        assert!(*ready.borrow());
    }
}
