//! Data models for pdplog.

use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::LoggerError;

/// Current values for every channel, captured at one instant.
///
/// Index `i` holds the reading of channel `i`; the last index is the
/// device's maximum channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    values: Vec<f64>,
}

impl Reading {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn channel_count(&self) -> usize {
        self.values.len()
    }

    pub fn channel(&self, index: usize) -> Option<f64> {
        self.values.get(index).copied()
    }
}

impl From<Vec<f64>> for Reading {
    fn from(values: Vec<f64>) -> Self {
        Reading::new(values)
    }
}

/// One encoded, newline-terminated CSV line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    line: String,
    fields: usize,
}

impl LogRecord {
    pub(crate) fn new(line: String, fields: usize) -> Self {
        Self { line, fields }
    }

    pub fn as_str(&self) -> &str {
        &self.line
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.line.as_bytes()
    }

    /// Number of CSV fields, timestamp included.
    pub fn field_count(&self) -> usize {
        self.fields
    }

    pub fn into_string(self) -> String {
        self.line
    }
}

impl std::fmt::Display for LogRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.line)
    }
}

/// Which channels are written into each record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    /// Every channel from 0 to the maximum channel.
    #[default]
    All,
    /// Channel 0 is omitted. Matches files produced by the legacy robot logger.
    SkipFirst,
}

impl ChannelLayout {
    pub fn first_channel(self) -> usize {
        match self {
            ChannelLayout::All => 0,
            ChannelLayout::SkipFirst => 1,
        }
    }
}

/// Lifecycle state of the sampling engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Idle => write!(f, "IDLE"),
            EngineState::Running => write!(f, "RUNNING"),
        }
    }
}

/// How a session came to an end.
#[derive(Debug)]
pub enum SessionEnd {
    /// Stopped on request; every record reached the file.
    Stopped,
    /// Ended itself after a hardware or write failure.
    Failed(LoggerError),
}

impl SessionEnd {
    pub fn is_failure(&self) -> bool {
        matches!(self, SessionEnd::Failed(_))
    }
}

/// What a finished session produced.
#[derive(Debug)]
pub struct SessionSummary {
    pub path: PathBuf,
    pub started_at: NaiveDateTime,
    pub records: u64,
    pub end: SessionEnd,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reading_indexes_by_channel() {
        let reading = Reading::from(vec![0.5, 1.25, 3.0]);
        assert_eq!(reading.channel_count(), 3);
        assert_eq!(reading.channel(1), Some(1.25));
        assert_eq!(reading.channel(3), None);
    }

    #[test]
    fn channel_layout_serializes_snake_case() {
        let yaml = serde_yaml::to_string(&ChannelLayout::SkipFirst).unwrap();
        assert_eq!(yaml.trim(), "skip_first");
        let parsed: ChannelLayout = serde_yaml::from_str("all").unwrap();
        assert_eq!(parsed, ChannelLayout::All);
    }
}
