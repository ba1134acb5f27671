//! Aim point and digital zoom state
//!
//! Coordinates are in the orientation-normalized frame (portrait). A
//! `center` command arrives as relative coordinates inside whatever the
//! operator currently sees, i.e. the zoom crop, and is mapped back onto the
//! full frame here.

use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::info;

/// Point of impact on the full normalized frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AimPoint {
    pub x: i32,
    pub y: i32,
}

impl AimPoint {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// Visible window of the full frame at a given zoom
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl CropRegion {
    /// Centered window of a `width` x `height` frame at `zoom`. Zoom at or
    /// below 1.0 shows the full frame.
    pub fn centered(width: u32, height: u32, zoom: f64) -> Self {
        if zoom <= 1.0 {
            return Self {
                x: 0,
                y: 0,
                width,
                height,
            };
        }
        let crop_w = ((width as f64 / zoom) as u32).max(1);
        let crop_h = ((height as f64 / zoom) as u32).max(1);
        Self {
            x: (width - crop_w) / 2,
            y: (height - crop_h) / 2,
            width: crop_w,
            height: crop_h,
        }
    }

    pub fn contains(&self, point: AimPoint) -> bool {
        let (x, y) = (i64::from(point.x), i64::from(point.y));
        let (x0, y0) = (i64::from(self.x), i64::from(self.y));
        x >= x0 && x < x0 + i64::from(self.width) && y >= y0 && y < y0 + i64::from(self.height)
    }
}

/// Zoom level and calibrated aim point captured with each shot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AimState {
    pub zoom: f64,
    pub center: AimPoint,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum AimError {
    #[error("zoom must be a finite value >= 1.0, got {0}")]
    InvalidZoom(f64),

    #[error("relative center must lie in [0, 1], got ({0}, {1})")]
    InvalidCenter(f64, f64),
}

/// Owns the aim state behind its own lock, separate from the session.
pub struct AimController {
    frame_width: u32,
    frame_height: u32,
    state: Mutex<AimState>,
}

impl AimController {
    /// Start at 1x zoom aiming at the middle of the frame.
    pub fn new(frame_width: u32, frame_height: u32) -> Self {
        Self {
            frame_width,
            frame_height,
            state: Mutex::new(AimState {
                zoom: 1.0,
                center: AimPoint::new((frame_width / 2) as i32, (frame_height / 2) as i32),
            }),
        }
    }

    pub fn snapshot(&self) -> AimState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set_zoom(&self, zoom: f64) -> Result<(), AimError> {
        if !zoom.is_finite() || zoom < 1.0 {
            return Err(AimError::InvalidZoom(zoom));
        }
        self.state.lock().unwrap_or_else(|e| e.into_inner()).zoom = zoom;
        info!("Zoom set to {}x", zoom);
        Ok(())
    }

    /// Move the aim point to `(x, y)` relative to the current zoom window.
    pub fn set_center_relative(&self, x: f64, y: f64) -> Result<AimPoint, AimError> {
        if !(0.0..=1.0).contains(&x) || !(0.0..=1.0).contains(&y) {
            return Err(AimError::InvalidCenter(x, y));
        }

        let center = {
            let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
            let crop = CropRegion::centered(self.frame_width, self.frame_height, state.zoom);
            let center = AimPoint::new(
                (crop.x as f64 + x * crop.width as f64) as i32,
                (crop.y as f64 + y * crop.height as f64) as i32,
            );
            state.center = center;
            center
        };

        info!("Aim point moved to ({}, {})", center.x, center.y);
        Ok(center)
    }
}
