//! Error types for pdplog-core.

use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by a power distribution device for a single read.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct HardwareError(pub String);

impl HardwareError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

#[derive(Error, Debug)]
pub enum LoggerError {
    /// Missing log directory, no removable storage, or an unusable device.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("hardware read failed on channel {channel}: {source}")]
    HardwareRead {
        channel: usize,
        #[source]
        source: HardwareError,
    },

    #[error("write to {} failed: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("log sink is closed")]
    SinkClosed,

    #[error("could not resolve log identifier: {0}")]
    Identifier(String),

    #[error("malformed record {line:?}: {reason}")]
    MalformedRecord { line: String, reason: String },

    #[error("sampling worker failed: {0}")]
    Worker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, LoggerError>;
