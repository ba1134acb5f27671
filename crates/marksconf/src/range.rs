//! Session, scoring and trigger settings.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What the shot pipeline does when it is full.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Backpressure {
    /// The producer waits for the consumer to free a slot.
    #[default]
    Block,
    /// The record being put is discarded and a warning is logged.
    DropNewest,
}

/// Timing and ammunition for one training session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Rounds loaded at session start.
    #[serde(default = "SessionConfig::default_total_ammo")]
    pub total_ammo: u32,

    /// Session length from `start` to expiry.
    #[serde(default = "SessionConfig::default_duration_secs")]
    pub duration_secs: u64,

    /// Pause between shots while the trigger is held.
    #[serde(default = "SessionConfig::default_shot_interval_ms")]
    pub shot_interval_ms: u64,

    /// Slots in the shot pipeline.
    #[serde(default = "SessionConfig::default_pipeline_capacity")]
    pub pipeline_capacity: usize,

    #[serde(default)]
    pub backpressure: Backpressure,

    /// How often the timeout monitor looks at the session.
    #[serde(default = "SessionConfig::default_timeout_poll_ms")]
    pub timeout_poll_ms: u64,

    /// How often device health is reported.
    #[serde(default = "SessionConfig::default_status_interval_secs")]
    pub status_interval_secs: u64,
}

impl SessionConfig {
    fn default_total_ammo() -> u32 {
        16
    }

    fn default_duration_secs() -> u64 {
        87
    }

    fn default_shot_interval_ms() -> u64 {
        100
    }

    fn default_pipeline_capacity() -> usize {
        30
    }

    fn default_timeout_poll_ms() -> u64 {
        1000
    }

    fn default_status_interval_secs() -> u64 {
        2
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn shot_interval(&self) -> Duration {
        Duration::from_millis(self.shot_interval_ms)
    }

    pub fn timeout_poll(&self) -> Duration {
        Duration::from_millis(self.timeout_poll_ms)
    }

    pub fn status_interval(&self) -> Duration {
        Duration::from_secs(self.status_interval_secs)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            total_ammo: Self::default_total_ammo(),
            duration_secs: Self::default_duration_secs(),
            shot_interval_ms: Self::default_shot_interval_ms(),
            pipeline_capacity: Self::default_pipeline_capacity(),
            backpressure: Backpressure::default(),
            timeout_poll_ms: Self::default_timeout_poll_ms(),
            status_interval_secs: Self::default_status_interval_secs(),
        }
    }
}

/// Hit-count thresholds for the final rating.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AchievementConfig {
    /// Distinct targets needed for the top rank.
    #[serde(default = "AchievementConfig::default_top_hits")]
    pub top_hits: usize,

    /// Distinct targets needed for the second rank, one of which must be
    /// the high-value target.
    #[serde(default = "AchievementConfig::default_second_hits")]
    pub second_hits: usize,

    /// Distinct targets needed for the third rank.
    #[serde(default = "AchievementConfig::default_third_hits")]
    pub third_hits: usize,

    /// Substring identifying the high-value target label.
    #[serde(default = "AchievementConfig::default_high_value_marker")]
    pub high_value_marker: String,
}

impl AchievementConfig {
    fn default_top_hits() -> usize {
        5
    }

    fn default_second_hits() -> usize {
        4
    }

    fn default_third_hits() -> usize {
        3
    }

    fn default_high_value_marker() -> String {
        "priority".to_string()
    }
}

impl Default for AchievementConfig {
    fn default() -> Self {
        Self {
            top_hits: Self::default_top_hits(),
            second_hits: Self::default_second_hits(),
            third_hits: Self::default_third_hits(),
            high_value_marker: Self::default_high_value_marker(),
        }
    }
}

/// Bluetooth shutter remote used as the trigger.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TriggerConfig {
    /// Matched case-insensitively as a substring of the input device name.
    #[serde(default = "TriggerConfig::default_device_name")]
    pub device_name: String,

    /// Linux input key name of the button, e.g. `KEY_VOLUMEDOWN`.
    #[serde(default = "TriggerConfig::default_key_name")]
    pub key_name: String,

    /// Wait between discovery attempts while no device is present.
    #[serde(default = "TriggerConfig::default_rediscover_backoff_secs")]
    pub rediscover_backoff_secs: u64,

    /// Wait after losing a connected device.
    #[serde(default = "TriggerConfig::default_reconnect_backoff_secs")]
    pub reconnect_backoff_secs: u64,
}

impl TriggerConfig {
    fn default_device_name() -> String {
        "AB Shutter".to_string()
    }

    fn default_key_name() -> String {
        "KEY_VOLUMEDOWN".to_string()
    }

    fn default_rediscover_backoff_secs() -> u64 {
        5
    }

    fn default_reconnect_backoff_secs() -> u64 {
        2
    }

    pub fn rediscover_backoff(&self) -> Duration {
        Duration::from_secs(self.rediscover_backoff_secs)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_secs(self.reconnect_backoff_secs)
    }
}

impl Default for TriggerConfig {
    fn default() -> Self {
        Self {
            device_name: Self::default_device_name(),
            key_name: Self::default_key_name(),
            rediscover_backoff_secs: Self::default_rediscover_backoff_secs(),
            reconnect_backoff_secs: Self::default_reconnect_backoff_secs(),
        }
    }
}
