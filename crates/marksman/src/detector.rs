//! Hit detection
//!
//! The model itself lives outside this crate. [`TargetDetector`] is what the
//! shot processor calls; [`BoxHitDetector`] turns any bounding-box model into
//! one by testing the aim point against each box.

use image::RgbImage;
use tracing::{debug, info};

use crate::aim::AimPoint;

#[derive(Debug, thiserror::Error)]
pub enum DetectorError {
    #[error("Inference failed: {0}")]
    Inference(String),
}

/// Decides which target, if any, a shot struck. May be slow; always called
/// off the async workers.
pub trait TargetDetector: Send + Sync {
    fn analyze(&self, frame: &RgbImage, aim: AimPoint) -> Result<Option<String>, DetectorError>;
}

/// Axis-aligned box in frame pixels
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    /// Edges count as inside.
    pub fn contains(&self, point: AimPoint) -> bool {
        let (x, y) = (point.x as f32, point.y as f32);
        self.x1 <= x && x <= self.x2 && self.y1 <= y && y <= self.y2
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub label: String,
    pub bbox: BoundingBox,
    pub confidence: f32,
}

/// A model that reports every object it sees in a frame
pub trait ObjectDetector: Send + Sync {
    fn detect(&self, frame: &RgbImage) -> Result<Vec<Detection>, DetectorError>;
}

/// Reports the first detection whose box contains the aim point
pub struct BoxHitDetector<D> {
    model: D,
}

impl<D: ObjectDetector> BoxHitDetector<D> {
    pub fn new(model: D) -> Self {
        Self { model }
    }
}

impl<D: ObjectDetector> TargetDetector for BoxHitDetector<D> {
    fn analyze(&self, frame: &RgbImage, aim: AimPoint) -> Result<Option<String>, DetectorError> {
        let detections = self.model.detect(frame)?;
        match detections.into_iter().find(|d| d.bbox.contains(aim)) {
            Some(hit) => {
                info!("Hit on {} ({:.2})", hit.label, hit.confidence);
                Ok(Some(hit.label))
            }
            None => {
                debug!("Shot at ({}, {}) missed every target", aim.x, aim.y);
                Ok(None)
            }
        }
    }
}

/// Detector for runs without a model: nothing is ever hit
pub struct NoTargets;

impl TargetDetector for NoTargets {
    fn analyze(&self, _frame: &RgbImage, _aim: AimPoint) -> Result<Option<String>, DetectorError> {
        Ok(None)
    }
}
