//! Error types for the node runtime
//!
//! Only [`ConfigError`] and a failed sensor check at startup are fatal; everything else
//! is logged by the task that hit it and retried on its next cycle.

use std::path::PathBuf;

use telenode_connectors::HttpError;
use telenode_core::DecodeError;
use telenode_schemas::SchemaError;
use thiserror::Error;

/// Durable queue failures
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record encoding error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Store actor stopped")]
    Closed,
}

/// Invalid or unreadable configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Cannot parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level node error
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Status page: {0}")]
    Http(#[from] HttpError),

    #[error("Sensor initialisation failed: {0}")]
    SensorInit(DecodeError),

    #[error("{0} stopped")]
    ChannelClosed(&'static str),

    #[error("Task failed: {0}")]
    TaskFailed(String),
}

pub type NodeResult<T> = Result<T, NodeError>;
