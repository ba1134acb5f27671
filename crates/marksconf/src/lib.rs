//! Minimal configuration loading for the Marksman range daemon.
//!
//! # Config File Locations
//!
//! Files are loaded in order (later wins, key by key):
//! 1. `/etc/marksman/config.toml` (system)
//! 2. `~/.config/marksman/config.toml` (user)
//! 3. `./marksman.toml` (local override, replaced by `--config` when given)
//! 4. Environment variables (`MARKSMAN_*`)
//!
//! # Example Config
//!
//! ```toml
//! [paths]
//! captures_dir = "~/range/captures"
//!
//! [telemetry]
//! log_level = "debug"
//!
//! [session]
//! total_ammo = 16
//! duration_secs = 87
//! backpressure = "block"
//!
//! [achievement]
//! high_value_marker = "commander"
//!
//! [trigger]
//! device_name = "AB Shutter"
//! key_name = "KEY_VOLUMEDOWN"
//! ```

pub mod infra;
pub mod loader;
pub mod range;

pub use infra::{CameraConfig, PathsConfig, TelemetryConfig};
pub use loader::{discover_config_files_with_override, ConfigSources};
pub use range::{AchievementConfig, Backpressure, SessionConfig, TriggerConfig};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {field}: {message}")]
    Invalid { field: &'static str, message: String },

    #[error("Failed to render config: {0}")]
    Render(String),
}

/// Complete range configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RangeConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub camera: CameraConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub achievement: AchievementConfig,

    #[serde(default)]
    pub trigger: TriggerConfig,
}

impl RangeConfig {
    /// Load configuration with `config_path` standing in for `./marksman.toml`.
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config, _sources) = Self::load_with_sources_from(config_path)?;
        Ok(config)
    }

    /// Load configuration and report which files and variables contributed.
    pub fn load_with_sources_from(
        config_path: Option<&Path>,
    ) -> Result<(Self, ConfigSources), ConfigError> {
        let mut sources = ConfigSources::default();
        let files = loader::discover_config_files_with_override(config_path);

        let mut merged = toml::Table::new();
        for path in files {
            let table = loader::load_table(&path)?;
            loader::merge_tables(&mut merged, table);
            sources.files.push(path);
        }

        let mut config = loader::table_to_config(merged, Path::new("<merged>"))?;
        loader::apply_env_overrides(&mut config, &mut sources);

        Ok((config, sources))
    }

    /// Reject settings the daemon cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let session = &self.session;
        if session.total_ammo == 0 {
            return Err(invalid("session.total_ammo", "must be at least 1"));
        }
        if session.duration_secs == 0 {
            return Err(invalid("session.duration_secs", "must be at least 1"));
        }
        if session.pipeline_capacity == 0 {
            return Err(invalid("session.pipeline_capacity", "must be at least 1"));
        }
        if session.shot_interval_ms == 0 {
            return Err(invalid("session.shot_interval_ms", "must be at least 1"));
        }
        if session.timeout_poll_ms == 0 {
            return Err(invalid("session.timeout_poll_ms", "must be at least 1"));
        }
        if session.status_interval_secs == 0 {
            return Err(invalid("session.status_interval_secs", "must be at least 1"));
        }

        let achievement = &self.achievement;
        if achievement.third_hits > achievement.second_hits
            || achievement.second_hits > achievement.top_hits
        {
            return Err(invalid(
                "achievement",
                format!(
                    "thresholds must satisfy third <= second <= top (got {} / {} / {})",
                    achievement.third_hits, achievement.second_hits, achievement.top_hits
                ),
            ));
        }
        if achievement.high_value_marker.trim().is_empty() {
            return Err(invalid("achievement.high_value_marker", "must not be empty"));
        }

        if self.camera.capture_width == 0 || self.camera.capture_height == 0 {
            return Err(invalid("camera", "capture size must be non-zero"));
        }
        if self.camera.fps == 0 {
            return Err(invalid("camera.fps", "must be at least 1"));
        }
        if self.trigger.key_name.trim().is_empty() {
            return Err(invalid("trigger.key_name", "must not be empty"));
        }

        Ok(())
    }

    /// Serialize config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        let body = toml::to_string_pretty(self).map_err(|e| ConfigError::Render(e.to_string()))?;
        Ok(format!("# Marksman Configuration\n\n{}", body))
    }
}

fn invalid(field: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        message: message.into(),
    }
}
