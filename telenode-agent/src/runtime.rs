//! Node runtime
//!
//! Builds every worker from the configuration and runs them until shutdown:
//!
//! ```text
//!  Sampler ──► BufferActor ◄── Reconciler
//!                 │                ▲
//!              FlushTask           │
//!                 ▼                │
//!             StoreActor ◄─────────┘
//!              ▲      ▲
//!   startup cleanup   PublishPipeline ──► MqttConnector ──► broker
//!                            ▲                 │
//!                            └──── acks ◄──────┘
//! ```
//!
//! All workers are spawned once. Any worker returning an error stops the
//! node; the supervisor outside (systemd, a watchdog) restarts it.
//!
//! The caller owns the [`NodeSignals`]: link and time-sync events from the
//! host are reported through them. With `network.interface` set the node
//! follows the interface's operstate itself, and on Unix `SIGUSR1`/`SIGUSR2`
//! report time syncs.

use std::future::Future;
use std::sync::Arc;

use log::{error, info, warn};
use telenode_connectors::http::{StatusConfig as HttpStatusConfig, StatusServer};
use telenode_connectors::mqtt::{MqttConfig, MqttConnector};
use telenode_core::{Clock, MeasurementBuffer};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;

use crate::acquisition::{Sampler, Sensors};
use crate::buffer::BufferActor;
use crate::cleanup::run_startup_cleanup;
use crate::config::NodeConfig;
use crate::errors::{NodeError, NodeResult};
use crate::flush::FlushTask;
use crate::publish::PublishPipeline;
use crate::reconcile::Reconciler;
use crate::signals::{watch_link, NodeSignals};
use crate::status::StatusPage;
use crate::store::StoreActor;

const ACK_QUEUE_DEPTH: usize = 16;

/// Run the node until `shutdown` completes or a worker fails
///
/// `signals` is usually [`NodeSignals::at_boot`]; keep a clone to report
/// link and clock events. On a clean shutdown whatever is still buffered is
/// written to the spool.
pub async fn run_node<F>(
    config: NodeConfig,
    sensors: Sensors,
    clock: Arc<dyn Clock>,
    signals: NodeSignals,
    shutdown: F,
) -> NodeResult<()>
where
    F: Future<Output = ()>,
{
    let (mut tasks, final_flush) = start(config, sensors, clock, signals.clone()).await?;

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => break,
            joined = tasks.join_next() => match joined {
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    error!("worker stopped: {}", e);
                    return Err(e);
                }
                Some(Err(e)) => return Err(NodeError::TaskFailed(e.to_string())),
                None => break,
            },
        }
    }

    info!("shutting down");
    if *signals.storage_ready().borrow() {
        if let Some(name) = final_flush.flush_once().await? {
            info!("buffered measurements saved to {}", name);
        }
    }
    tasks.shutdown().await;
    Ok(())
}

async fn start(
    config: NodeConfig,
    sensors: Sensors,
    clock: Arc<dyn Clock>,
    signals: NodeSignals,
) -> NodeResult<(JoinSet<NodeResult<()>>, FlushTask)> {
    let mut tasks = JoinSet::new();

    if let Some(operstate) = config.network.operstate_path() {
        let signals = signals.clone();
        let every = config.network.link_poll();
        tasks.spawn(async move {
            watch_link(signals, operstate, every).await;
            Ok(())
        });
    }

    let buffer = BufferActor::spawn(MeasurementBuffer::with_capacity(
        config.buffer.capacity,
        config.buffer.evict_batch,
    ));
    let store = StoreActor::spawn(&config.storage.dir).await?;

    {
        let store = store.clone();
        let signals = signals.clone();
        let retry = config.connect_backoff();
        tasks.spawn(async move {
            run_startup_cleanup(store, signals, retry).await;
            Ok(())
        });
    }

    let mqtt = MqttConfig::new(config.broker.host.clone(), config.broker.port)
        .device_id(&config.device.id)
        .topics(config.data_topic(), config.ack_topic())
        .keep_alive_secs(config.broker.keep_alive_secs)
        .backoff_secs(config.broker.connect_backoff_secs);
    let (ack_tx, ack_rx) = mpsc::channel(ACK_QUEUE_DEPTH);
    let (connector, session) = MqttConnector::new(mqtt, signals.link_up(), ack_tx);
    tasks.spawn(async move {
        session.run().await;
        Ok(())
    });

    let connected = connector.connected();
    let pipeline = PublishPipeline::new(
        connector,
        store.clone(),
        signals.clone(),
        connected,
        ack_rx,
        config.data_topic(),
    )
    .ack_timeout(config.ack_timeout())
    .cycle_pause(config.cycle_pause());
    tasks.spawn(pipeline.run());

    let reconciler = Reconciler::new(store.clone(), buffer.clone(), signals.clone())
        .interval(config.reconcile_interval());
    tasks.spawn(reconciler.run());

    let flush = FlushTask::new(
        buffer.clone(),
        store,
        signals.clone(),
        clock.clone(),
        config.device.id.as_str(),
        config.device.schema_version,
    )
    .interval(config.flush_interval());
    let final_flush = flush.clone();
    tasks.spawn(flush.run());

    let page = StatusPage::new(config.device.id.as_str());
    let (status_tx, status_rx) = watch::channel(page.render());
    let sampler = Sampler::new(
        sensors,
        config.sensor.refresh_every,
        clock.clone(),
        buffer,
        page,
        status_tx,
    );
    let interval = config.sensor.sample_interval();
    tasks.spawn(sampler.run(interval));

    if config.status.enabled {
        let server = StatusServer::bind(HttpStatusConfig::new(config.status.bind.clone()), status_rx).await?;
        tasks.spawn(async move {
            server.run().await;
            Ok(())
        });
    }

    #[cfg(unix)]
    {
        let signals = signals.clone();
        tasks.spawn(async move {
            if let Err(e) = crate::signals::forward_clock_signals(signals, clock).await {
                warn!("time-sync signals unavailable: {}", e);
            }
            Ok(())
        });
    }

    info!(
        "node {} started (clock {}, link {})",
        config.device.id,
        if signals.trust().is_trusted() { "trusted" } else { "untrusted" },
        if *signals.link_up().borrow() { "up" } else { "down" }
    );
    Ok((tasks, final_flush))
}
