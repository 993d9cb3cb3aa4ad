//! Whole-node run without a broker
//!
//! The link stays down, so nothing is published: the first sample must end
//! up in the spool, written at the latest by the flush on shutdown.

mod common;

use std::sync::Arc;
use std::time::Duration;

use telenode_agent::acquisition::Sensors;
use telenode_agent::{run_node, NodeConfig, NodeSignals};
use telenode_core::{Clock, Measurement, Status, SystemClock};
use telenode_schemas::wire;

/// Measurements of every trusted record in `dir`
fn spooled(dir: &std::path::Path) -> Vec<Measurement> {
    let mut measurements = Vec::new();
    for entry in std::fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(!name.starts_with('x'), "clock is trusted, got {}", name);

        let batch = wire::decode_batch(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(batch.device_id, common::DEVICE_ID);
        measurements.extend(batch.measurements);
    }
    measurements
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn first_sample_reaches_the_spool() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = NodeConfig::default().data_dir(dir.path()).device_id(common::DEVICE_ID);
    config.status.enabled = false;
    config.network.assume_link_up = false;
    config.validate().unwrap();

    let sensors = Sensors::simulated(&config.sensor).unwrap();
    let signals = NodeSignals::at_boot(&config.network, SystemClock.now());
    run_node(config, sensors, Arc::new(SystemClock), signals, async {
        tokio::time::sleep(Duration::from_millis(500)).await;
    })
    .await
    .unwrap();

    let measurements = spooled(dir.path());
    let values: Vec<(u8, f32)> = measurements.iter().map(|m| (m.sensor_id(), m.value())).collect();
    assert_eq!(values, vec![(0, 22.3), (1, 55.1), (2, 20.0)]);
    assert!(measurements.iter().all(|m| m.status() == Status::Ok));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn clock_sync_reported_by_the_host_is_applied() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = NodeConfig::default()
        .data_dir(dir.path())
        .device_id(common::DEVICE_ID)
        .clock_synced(false);
    config.status.enabled = false;
    config.network.assume_link_up = false;

    let sensors = Sensors::simulated(&config.sensor).unwrap();
    let signals = NodeSignals::at_boot(&config.network, SystemClock.now());
    assert!(!signals.trust().is_trusted());

    let host = signals.clone();
    run_node(config, sensors, Arc::new(SystemClock), signals, async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        host.clock_synced(SystemClock.now());
        tokio::time::sleep(Duration::from_millis(500)).await;
    })
    .await
    .unwrap();

    // Everything ends up trusted, stamped close to the real time
    let measurements = spooled(dir.path());
    let mut values: Vec<(u8, f32)> = measurements.iter().map(|m| (m.sensor_id(), m.value())).collect();
    values.sort_by_key(|(id, _)| *id);
    assert_eq!(values, vec![(0, 22.3), (1, 55.1), (2, 20.0)]);

    let now = SystemClock.now();
    for m in &measurements {
        let skew = (now - m.timestamp()).num_milliseconds().abs();
        assert!(skew < 5_000, "timestamp {} is {} ms off", m.timestamp(), skew);
    }
}

#[tokio::test]
async fn invalid_sensor_framing_is_rejected_before_start() {
    let mut config = NodeConfig::default();
    config.sensor.humidity_bits = 20;
    assert!(config.validate().is_err());
    assert!(Sensors::simulated(&config.sensor).is_err());
}
