//! Runtime configuration for kiln.
//!
//! Loads the TOML file that sizes the audio engine, paces the control loop,
//! and tunes source polling and health reporting, then converts it into
//! [`kiln_core::RuntimeSettings`].
//!
//! # Example
//!
//! ```rust,no_run
//! use kiln_config::RuntimeConfig;
//!
//! let config = RuntimeConfig::load("kiln.toml").unwrap();
//! let settings = config.runtime_settings();
//! assert!(settings.block_frames > 0);
//!
//! // Write the defaults for a new project
//! RuntimeConfig::default().save("project/kiln.toml").unwrap();
//! ```

mod config;
mod error;

pub use config::{AudioConfig, ControlConfig, DiagnosticsConfig, ReloadConfig, RuntimeConfig};
pub use error::ConfigError;
