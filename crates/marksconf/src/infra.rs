//! Infrastructure configuration - things that cannot change at runtime.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Filesystem paths for range state and captured shots.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathsConfig {
    /// Root directory for processed shot images, one subdirectory per burst.
    /// Default: ./captures
    #[serde(default = "PathsConfig::default_captures_dir")]
    pub captures_dir: PathBuf,
}

impl PathsConfig {
    fn default_captures_dir() -> PathBuf {
        PathBuf::from("captures")
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            captures_dir: Self::default_captures_dir(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryConfig {
    /// Log filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` expression). `RUST_LOG` still wins when set.
    /// Default: info
    #[serde(default = "TelemetryConfig::default_log_level")]
    pub log_level: String,
}

impl TelemetryConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
        }
    }
}

/// Camera geometry.
///
/// Frames are captured landscape and rotated a quarter turn clockwise before
/// analysis, so the normalized frame is `capture_height` wide.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CameraConfig {
    #[serde(default = "CameraConfig::default_capture_width")]
    pub capture_width: u32,

    #[serde(default = "CameraConfig::default_capture_height")]
    pub capture_height: u32,

    /// Live-view frames per second
    #[serde(default = "CameraConfig::default_fps")]
    pub fps: u32,
}

impl CameraConfig {
    fn default_capture_width() -> u32 {
        640
    }

    fn default_capture_height() -> u32 {
        480
    }

    fn default_fps() -> u32 {
        25
    }

    /// Time between live-view frames.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }

    /// Width of a frame after orientation normalization.
    pub fn frame_width(&self) -> u32 {
        self.capture_height
    }

    /// Height of a frame after orientation normalization.
    pub fn frame_height(&self) -> u32 {
        self.capture_width
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            capture_width: Self::default_capture_width(),
            capture_height: Self::default_capture_height(),
            fps: Self::default_fps(),
        }
    }
}
