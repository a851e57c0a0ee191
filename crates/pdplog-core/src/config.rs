//! Logger configuration.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::ChannelLayout;
use crate::naming;

/// Shortest allowed polling period. Requests below this are raised to it.
pub const MIN_PERIOD_MS: u64 = 25;

/// Smallest write buffer the sink will use.
pub const MIN_BUFFER_CAPACITY: usize = 8 * 1024;

/// USB drives on the controller are symlinked to `/U`, then `/V`.
pub const USB_MOUNT_POINTS: [&str; 2] = ["/U", "/V"];

/// Clamp a requested polling period to the supported minimum.
pub fn clamp_period_ms(period_ms: u64) -> u64 {
    period_ms.max(MIN_PERIOD_MS)
}

/// Configuration for a current logger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Directory for log files. When unset, `mount_points` are probed in order.
    pub directory: Option<PathBuf>,
    /// Polling period in milliseconds (default: 25)
    pub period_ms: u64,
    /// Channels written into each record (default: all)
    pub channels: ChannelLayout,
    /// Write buffer size in bytes (default and minimum: 8 KiB)
    pub buffer_capacity: usize,
    /// Removable storage mount points, probed in order
    pub mount_points: Vec<PathBuf>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            directory: None,
            period_ms: MIN_PERIOD_MS,
            channels: ChannelLayout::All,
            buffer_capacity: MIN_BUFFER_CAPACITY,
            mount_points: USB_MOUNT_POINTS.iter().map(PathBuf::from).collect(),
        }
    }
}

impl LoggerConfig {
    /// Configuration that logs into an explicit directory.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: Some(directory.into()),
            ..Default::default()
        }
    }

    /// Configuration that logs onto the first removable drive found.
    pub fn removable_storage() -> Self {
        Self::default()
    }

    pub fn with_period_ms(mut self, period_ms: u64) -> Self {
        self.period_ms = period_ms;
        self
    }

    pub fn with_channels(mut self, channels: ChannelLayout) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_buffer_capacity(mut self, capacity: usize) -> Self {
        self.buffer_capacity = capacity;
        self
    }

    pub fn with_mount_points<I, P>(mut self, mount_points: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        self.mount_points = mount_points.into_iter().map(Into::into).collect();
        self
    }

    /// Load a configuration from a YAML file. Missing keys take their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }

    pub fn effective_period_ms(&self) -> u64 {
        clamp_period_ms(self.period_ms)
    }

    pub fn effective_buffer_capacity(&self) -> usize {
        self.buffer_capacity.max(MIN_BUFFER_CAPACITY)
    }

    /// The directory log files go into: the configured one if it exists,
    /// otherwise the first mount point that does.
    pub fn resolve_directory(&self) -> Result<PathBuf> {
        match &self.directory {
            Some(dir) => naming::require_directory(dir),
            None => naming::discover_log_directory(&self.mount_points),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LoggerError;
    use tempfile::TempDir;

    #[test]
    fn period_is_clamped_to_minimum() {
        assert_eq!(clamp_period_ms(0), 25);
        assert_eq!(clamp_period_ms(24), 25);
        assert_eq!(clamp_period_ms(25), 25);
        assert_eq!(clamp_period_ms(100), 100);
        for p in [25u64, 26, 40, 1000, 60_000] {
            assert_eq!(clamp_period_ms(p), p.max(25));
        }
    }

    #[test]
    fn defaults_match_robot_setup() {
        let config = LoggerConfig::default();
        assert_eq!(config.period_ms, 25);
        assert_eq!(config.channels, ChannelLayout::All);
        assert_eq!(config.effective_buffer_capacity(), 8192);
        assert_eq!(
            config.mount_points,
            vec![PathBuf::from("/U"), PathBuf::from("/V")]
        );
    }

    #[test]
    fn small_buffer_is_raised_to_minimum() {
        let config = LoggerConfig::new("/tmp").with_buffer_capacity(512);
        assert_eq!(config.effective_buffer_capacity(), MIN_BUFFER_CAPACITY);
    }

    #[test]
    fn yaml_fills_missing_keys_with_defaults() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("logger.yaml");
        fs::write(&path, "period_ms: 10\nchannels: skip_first\n").unwrap();

        let config = LoggerConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.period_ms, 10);
        assert_eq!(config.effective_period_ms(), 25);
        assert_eq!(config.channels, ChannelLayout::SkipFirst);
        assert!(config.directory.is_none());
        assert_eq!(config.mount_points.len(), 2);
    }

    #[test]
    fn explicit_directory_must_exist() {
        let tmp = TempDir::new().unwrap();
        let config = LoggerConfig::new(tmp.path());
        assert_eq!(config.resolve_directory().unwrap(), tmp.path());

        let missing = LoggerConfig::new(tmp.path().join("nope"));
        assert!(matches!(
            missing.resolve_directory(),
            Err(LoggerError::Configuration(_))
        ));
    }

    #[test]
    fn fallback_probes_mount_points_in_order() {
        let tmp = TempDir::new().unwrap();
        let secondary = tmp.path().join("V");
        fs::create_dir(&secondary).unwrap();

        let config = LoggerConfig::removable_storage()
            .with_mount_points([tmp.path().join("U"), secondary.clone()]);
        assert_eq!(config.resolve_directory().unwrap(), secondary);
    }
}
