//! Channel sampling over a power distribution device.

use crate::error::{HardwareError, LoggerError, Result};
use crate::models::Reading;

/// Channels on the robot's power distribution panel.
pub const PDP_CHANNELS: usize = 16;

/// Hardware access to a power distribution device.
pub trait PowerDistribution: Send {
    /// Number of monitored channels.
    fn channel_count(&self) -> usize;

    /// Current draw of `channel`, in amps.
    fn current(&mut self, channel: usize) -> std::result::Result<f64, HardwareError>;
}

impl<D: PowerDistribution + ?Sized> PowerDistribution for Box<D> {
    fn channel_count(&self) -> usize {
        (**self).channel_count()
    }

    fn current(&mut self, channel: usize) -> std::result::Result<f64, HardwareError> {
        (**self).current(channel)
    }
}

/// Reads every channel of a device, in channel order.
pub struct ChannelSampler<D> {
    device: D,
    max_channel: usize,
}

impl<D: PowerDistribution> ChannelSampler<D> {
    /// Wrap a device. The maximum channel is read from it once, here.
    pub fn new(device: D) -> Result<Self> {
        let count = device.channel_count();
        if count == 0 {
            return Err(LoggerError::Configuration(
                "power distribution device reports no channels".to_string(),
            ));
        }
        Ok(Self {
            device,
            max_channel: count - 1,
        })
    }

    pub fn max_channel(&self) -> usize {
        self.max_channel
    }

    /// Read channels `0..=max_channel`. The first failing channel aborts the
    /// whole reading.
    pub fn sample(&mut self) -> Result<Reading> {
        let mut values = Vec::with_capacity(self.max_channel + 1);
        for channel in 0..=self.max_channel {
            let value = self
                .device
                .current(channel)
                .map_err(|source| LoggerError::HardwareRead { channel, source })?;
            values.push(value);
        }
        Ok(Reading::new(values))
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }
}

/// Deterministic stand-in for a real panel, for bench runs without a robot.
///
/// Each channel draws a slow sinusoid around a per-channel base load. The
/// waveform advances one step every time channel 0 is read.
#[derive(Debug, Clone)]
pub struct SimulatedPanel {
    channels: usize,
    step: u64,
}

impl SimulatedPanel {
    pub fn new(channels: usize) -> Self {
        Self { channels, step: 0 }
    }
}

impl Default for SimulatedPanel {
    fn default() -> Self {
        Self::new(PDP_CHANNELS)
    }
}

impl PowerDistribution for SimulatedPanel {
    fn channel_count(&self) -> usize {
        self.channels
    }

    fn current(&mut self, channel: usize) -> std::result::Result<f64, HardwareError> {
        if channel >= self.channels {
            return Err(HardwareError::new(format!(
                "channel {channel} out of range (0..{})",
                self.channels
            )));
        }
        if channel == 0 {
            self.step += 1;
        }
        let base = 0.5 + channel as f64 * 0.25;
        let phase = self.step as f64 * 0.1 + channel as f64;
        // Hardware reports to 1/8 A resolution.
        let amps = (base + 2.0 * phase.sin()).abs();
        Ok((amps * 8.0).round() / 8.0)
    }
}
