//! Store-and-Forward Runtime of the Telemetry Node
//!
//! ## Overview
//!
//! Measurements travel through four stages, each owned by one task:
//!
//! 1. **Acquisition** ([`acquisition::Sampler`]): reads the sensors on a
//!    fixed interval and appends changed values to the buffer.
//! 2. **Buffer** ([`buffer::BufferActor`]): bounded in memory; the oldest
//!    entries are evicted in small batches when it is full.
//! 3. **Durable queue** ([`store::StoreActor`]): the flush task turns the
//!    buffer into one file per batch. Files written before the clock was
//!    synchronised carry an `x` prefix and wait for the
//!    [`reconcile::Reconciler`].
//! 4. **Publish** ([`publish::PublishPipeline`]): offers each file to the
//!    collector and deletes it only on a matching acknowledgment.
//!
//! Tasks never share mutable state. Resources are actors reached through
//! cloneable handles, and conditions (link up, storage ready, clock trusted,
//! broker connected) are `watch` channels, see [`signals`].
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use telenode_agent::{acquisition::Sensors, config::NodeConfig, runtime::run_node, NodeSignals};
//! use telenode_core::{Clock, SystemClock};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = NodeConfig::default().data_dir("/var/lib/telenode");
//! config.validate()?;
//! let sensors = Sensors::simulated(&config.sensor)?;
//! let signals = NodeSignals::at_boot(&config.network, SystemClock.now());
//!
//! // Keep a clone of `signals` to report link changes from the host
//! run_node(config, sensors, Arc::new(SystemClock), signals, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod acquisition;
pub mod buffer;
pub mod cleanup;
pub mod config;
pub mod errors;
pub mod flush;
pub mod publish;
pub mod reconcile;
pub mod runtime;
pub mod signals;
pub mod status;
pub mod store;

pub use config::NodeConfig;
pub use errors::{ConfigError, NodeError, NodeResult, StoreError};
pub use runtime::run_node;
pub use signals::NodeSignals;
