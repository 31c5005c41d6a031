//! Runtime configuration file format and operations.

use std::path::Path;
use std::time::Duration;

use kiln_core::RuntimeSettings;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Runtime configuration.
///
/// Every field has a default, and a missing section falls back to its
/// defaults, so an empty file is a valid configuration.
///
/// # TOML Format
///
/// ```toml
/// [audio]
/// sample_rate = 48000
/// block_frames = 256
/// channels = 2
/// event_capacity = 1024
///
/// [control]
/// tick_hz = 60.0
///
/// [reload]
/// watch = true
/// poll_ms = 250
///
/// [diagnostics]
/// load_warn_threshold = 0.8
/// report_secs = 5.0
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Audio engine sizing.
    pub audio: AudioConfig,
    /// Control loop rate.
    pub control: ControlConfig,
    /// Source-change polling.
    pub reload: ReloadConfig,
    /// Health reporting.
    pub diagnostics: DiagnosticsConfig,
}

/// `[audio]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Frames per processing block.
    pub block_frames: usize,
    /// Interleaved output channels.
    pub channels: usize,
    /// Event channel capacity.
    pub event_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            block_frames: 256,
            channels: 2,
            event_capacity: kiln_core::DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// `[control]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    /// Control ticks per second.
    pub tick_hz: f64,
}

impl Default for ControlConfig {
    fn default() -> Self {
        Self { tick_hz: 60.0 }
    }
}

/// `[reload]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    /// Reload automatically when the source changes.
    pub watch: bool,
    /// Interval between source checks, in milliseconds.
    pub poll_ms: u64,
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            watch: true,
            poll_ms: 250,
        }
    }
}

/// `[diagnostics]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Smoothed audio load at which a warning is logged.
    pub load_warn_threshold: f32,
    /// Seconds between health reports. Zero disables reporting.
    pub report_secs: f64,
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            load_warn_threshold: 0.8,
            report_secs: 5.0,
        }
    }
}

impl RuntimeConfig {
    /// Load and validate a configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;
        Self::from_toml(&content)
    }

    /// Parse and validate a configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Save the configuration to a TOML file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }

        let content = self.to_toml()?;
        std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))?;
        Ok(())
    }

    /// Convert the configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check every field against what the runtime can run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(ConfigError::invalid("audio.sample_rate", "must be non-zero"));
        }
        if audio.block_frames == 0 {
            return Err(ConfigError::invalid("audio.block_frames", "must be non-zero"));
        }
        if audio.channels == 0 {
            return Err(ConfigError::invalid("audio.channels", "must be non-zero"));
        }
        if audio.event_capacity == 0 {
            return Err(ConfigError::invalid("audio.event_capacity", "must be non-zero"));
        }
        if !(self.control.tick_hz.is_finite() && self.control.tick_hz > 0.0) {
            return Err(ConfigError::invalid(
                "control.tick_hz",
                format!("must be positive, got {}", self.control.tick_hz),
            ));
        }
        if self.reload.poll_ms == 0 {
            return Err(ConfigError::invalid("reload.poll_ms", "must be non-zero"));
        }
        let threshold = self.diagnostics.load_warn_threshold;
        if !(threshold > 0.0 && threshold <= 4.0) {
            return Err(ConfigError::invalid(
                "diagnostics.load_warn_threshold",
                format!("must be in (0, 4], got {threshold}"),
            ));
        }
        if !(self.diagnostics.report_secs.is_finite() && self.diagnostics.report_secs >= 0.0) {
            return Err(ConfigError::invalid(
                "diagnostics.report_secs",
                "must be zero or positive",
            ));
        }
        Ok(())
    }

    /// Settings for [`kiln_core::Runtime::new`].
    pub fn runtime_settings(&self) -> RuntimeSettings {
        RuntimeSettings {
            sample_rate: self.audio.sample_rate as f32,
            block_frames: self.audio.block_frames,
            channels: self.audio.channels,
            event_capacity: self.audio.event_capacity,
        }
    }

    /// Wall-clock period of one control tick.
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.control.tick_hz)
    }

    /// Wall-clock period of one audio block.
    pub fn block_period(&self) -> Duration {
        Duration::from_secs_f64(self.audio.block_frames as f64 / f64::from(self.audio.sample_rate))
    }

    /// Interval between source checks.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.reload.poll_ms)
    }

    /// Interval between health reports, `None` when disabled.
    pub fn report_interval(&self) -> Option<Duration> {
        (self.diagnostics.report_secs > 0.0)
            .then(|| Duration::from_secs_f64(self.diagnostics.report_secs))
    }
}
