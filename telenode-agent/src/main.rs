//! telenode
//!
//! Runs the telemetry node: samples the sensors, keeps the readings in a
//! spool directory and forwards them to the collector over MQTT.
//!
//! # Usage
//!
//! ```bash
//! # Defaults for everything (spool in ./spool, broker on localhost)
//! telenode
//!
//! # Configuration file, spool elsewhere, chatty logs
//! telenode --config /etc/telenode.toml --data-dir /var/lib/telenode --log-level debug
//! ```
//!
//! `RUST_LOG` takes precedence over the configured level.
//!
//! On Unix the time daemon reports sync results with `SIGUSR1` (synced) and
//! `SIGUSR2` (failed).

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use log::{error, LevelFilter};
use telenode_agent::acquisition::Sensors;
use telenode_agent::{run_node, NodeConfig, NodeError, NodeSignals};
use telenode_core::{Clock, SystemClock};

/// Telemetry node with store-and-forward delivery
#[derive(Parser, Debug)]
#[command(name = "telenode")]
#[command(version)]
#[command(about = "Sample, spool and forward sensor readings", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Spool directory, overrides storage.dir
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace), overrides logging.level
    #[arg(long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            init_logging("info");
            error!("{}", e);
            process::exit(1);
        }
    };
    init_logging(&config.logging.level);

    if let Err(e) = run(config).await {
        error!("{}", e);
        process::exit(1);
    }
}

fn load_config(args: &Args) -> Result<NodeConfig, NodeError> {
    let mut config = match &args.config {
        Some(path) => NodeConfig::load(path)?,
        None => NodeConfig::default(),
    };
    if let Some(dir) = &args.data_dir {
        config = config.data_dir(dir);
    }
    if let Some(level) = &args.log_level {
        config = config.log_level(level);
    }
    config.validate()?;
    Ok(config)
}

async fn run(config: NodeConfig) -> Result<(), NodeError> {
    let sensors = Sensors::simulated(&config.sensor)?;
    let signals = NodeSignals::at_boot(&config.network, SystemClock.now());
    run_node(config, sensors, Arc::new(SystemClock), signals, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    })
    .await
}

fn init_logging(level: &str) {
    let level = level.parse().unwrap_or(LevelFilter::Info);
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}
