//! pdplog-core: power distribution current logger.
//!
//! A [`SamplingEngine`] reads every channel of a power distribution device on
//! a fixed period and appends one quoted CSV line per tick to a session log
//! file on removable storage. Sampling runs on a background tokio task;
//! `start()` returns immediately and `stop()` returns once the file is closed.

pub mod config;
pub mod encoder;
pub mod engine;
pub mod error;
pub mod models;
pub mod naming;
pub mod sampler;
pub mod sink;

pub use config::{LoggerConfig, MIN_PERIOD_MS};
pub use encoder::{decode_record, DecodedRecord, RecordEncoder};
pub use engine::SamplingEngine;
pub use error::{HardwareError, LoggerError};
pub use models::{ChannelLayout, EngineState, LogRecord, Reading, SessionEnd, SessionSummary};
pub use naming::{log_file_name, FixedIdentifier, HostnameIdentifier, IdentifierProvider};
pub use sampler::{ChannelSampler, PowerDistribution, SimulatedPanel, PDP_CHANNELS};
pub use sink::BufferedLogSink;
