//! Frame processing for captured shots
//!
//! Orientation normalization, digital zoom and crosshair overlay for the
//! persisted shot image, plus JPEG encoding.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::{ImageResult, Rgb, RgbImage};

use crate::aim::{AimPoint, AimState, CropRegion};

const CROSSHAIR_SIZE: i64 = 30;
const CROSSHAIR_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const JPEG_QUALITY: u8 = 90;

/// Rotate a landscape capture a quarter turn clockwise into the portrait
/// frame that aim coordinates refer to.
pub fn normalize_orientation(frame: &RgbImage) -> RgbImage {
    imageops::rotate90(frame)
}

/// Crop the centered zoom window and scale it back to full size.
///
/// Returns the crop used, or `None` when `zoom` does not magnify.
pub fn digital_zoom(frame: &RgbImage, zoom: f64) -> (RgbImage, Option<CropRegion>) {
    if zoom <= 1.0 {
        return (frame.clone(), None);
    }
    let (width, height) = frame.dimensions();
    let crop = CropRegion::centered(width, height, zoom);
    let cropped = imageops::crop_imm(frame, crop.x, crop.y, crop.width, crop.height).to_image();
    let zoomed = imageops::resize(&cropped, width, height, FilterType::Triangle);
    (zoomed, Some(crop))
}

/// Where `center` lands on the zoomed view, if it is visible at all.
pub fn project_crosshair(center: AimPoint, zoom: f64, crop: Option<CropRegion>) -> Option<AimPoint> {
    match crop {
        None => Some(center),
        Some(crop) if crop.contains(center) => Some(AimPoint::new(
            ((center.x - crop.x as i32) as f64 * zoom) as i32,
            ((center.y - crop.y as i32) as f64 * zoom) as i32,
        )),
        Some(_) => None,
    }
}

/// Draw a cross marker centered on `at`, clipped to the frame.
pub fn draw_crosshair(frame: &mut RgbImage, at: AimPoint) {
    let (width, height) = frame.dimensions();
    let half = CROSSHAIR_SIZE / 2;
    let (cx, cy) = (i64::from(at.x), i64::from(at.y));

    // two pixels thick
    for d in -half..=half {
        for t in 0..2 {
            put(frame, width, height, cx + d, cy + t);
            put(frame, width, height, cx + t, cy + d);
        }
    }
}

fn put(frame: &mut RgbImage, width: u32, height: u32, x: i64, y: i64) {
    if x >= 0 && y >= 0 && x < i64::from(width) && y < i64::from(height) {
        frame.put_pixel(x as u32, y as u32, CROSSHAIR_COLOR);
    }
}

/// The image an observer sees for a shot: zoomed like the live view, with
/// the aim point marked.
pub fn annotate_shot(frame: &RgbImage, aim: AimState) -> RgbImage {
    let (mut view, crop) = digital_zoom(frame, aim.zoom);
    if let Some(at) = project_crosshair(aim.center, aim.zoom, crop) {
        draw_crosshair(&mut view, at);
    }
    view
}

pub fn encode_jpeg(frame: &RgbImage) -> ImageResult<Vec<u8>> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(frame)?;
    Ok(buf)
}
