//! Frames and plate crops.
//!
//! - `Frame`: one captured RGB image plus its capture time and sequence number.
//! - `BoundingBox`: pixel-space box produced by a detector.
//! - Crop and preprocessing helpers used before recognition.

use image::{GrayImage, RgbImage};
use std::time::SystemTime;

/// Margin in pixels added around a detected box before cropping.
pub const CROP_MARGIN_PX: u32 = 5;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A captured frame.
#[derive(Clone, Debug)]
pub struct Frame {
    image: RgbImage,
    captured_at: SystemTime,
    sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at: SystemTime, sequence: u64) -> Self {
        Self {
            image,
            captured_at,
            sequence,
        }
    }

    /// Build a frame from packed RGB24 bytes. Returns `None` on a length mismatch.
    pub fn from_rgb(
        pixels: Vec<u8>,
        width: u32,
        height: u32,
        captured_at: SystemTime,
        sequence: u64,
    ) -> Option<Self> {
        RgbImage::from_raw(width, height, pixels).map(|image| Self::new(image, captured_at, sequence))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> SystemTime {
        self.captured_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn is_empty(&self) -> bool {
        self.image.width() == 0 || self.image.height() == 0
    }

    /// Crop `bbox` expanded by [`CROP_MARGIN_PX`], clamped to the frame.
    ///
    /// Returns `None` when the clamped region is empty.
    pub fn crop_with_margin(&self, bbox: &BoundingBox) -> Option<RgbImage> {
        let (x1, y1, x2, y2) = bbox.expanded(CROP_MARGIN_PX, self.width(), self.height())?;
        let view = image::imageops::crop_imm(&self.image, x1, y1, x2 - x1, y2 - y1);
        Some(view.to_image())
    }
}

// ----------------------------------------------------------------------------
// BoundingBox
// ----------------------------------------------------------------------------

/// Axis-aligned box in frame pixel coordinates, `x2`/`y2` exclusive.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);
        let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Integer bounds grown by `margin` and clamped to `width` x `height`.
    fn expanded(&self, margin: u32, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if !(self.x1.is_finite() && self.y1.is_finite() && self.x2.is_finite() && self.y2.is_finite())
        {
            return None;
        }
        let margin = margin as f32;
        let x1 = (self.x1 - margin).floor().clamp(0.0, width as f32) as u32;
        let y1 = (self.y1 - margin).floor().clamp(0.0, height as f32) as u32;
        let x2 = (self.x2 + margin).ceil().clamp(0.0, width as f32) as u32;
        let y2 = (self.y2 + margin).ceil().clamp(0.0, height as f32) as u32;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some((x1, y1, x2, y2))
    }
}

// ----------------------------------------------------------------------------
// Preprocessing
// ----------------------------------------------------------------------------

/// Grayscale + histogram equalization, the input format recognizers expect.
pub fn preprocess_plate(crop: &RgbImage) -> GrayImage {
    let gray = image::imageops::grayscale(crop);
    equalize_histogram(&gray)
}

/// Global histogram equalization.
pub fn equalize_histogram(gray: &GrayImage) -> GrayImage {
    let total = (gray.width() as u64) * (gray.height() as u64);
    if total == 0 {
        return gray.clone();
    }

    let mut histogram = [0u64; 256];
    for p in gray.pixels() {
        histogram[p.0[0] as usize] += 1;
    }

    let mut cdf = [0u64; 256];
    let mut running = 0u64;
    for (i, count) in histogram.iter().enumerate() {
        running += count;
        cdf[i] = running;
    }

    let cdf_min = cdf.iter().copied().find(|&c| c > 0).unwrap_or(0);
    let denom = total - cdf_min;
    if denom == 0 {
        // Single intensity: nothing to spread.
        return gray.clone();
    }

    let mut lut = [0u8; 256];
    for (i, value) in lut.iter_mut().enumerate() {
        let scaled = (cdf[i].saturating_sub(cdf_min) as f64 * 255.0 / denom as f64).round();
        *value = scaled.clamp(0.0, 255.0) as u8;
    }

    let mut out = gray.clone();
    for p in out.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
    out
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    fn solid_frame(width: u32, height: u32) -> Frame {
        Frame::new(
            RgbImage::from_pixel(width, height, Rgb([90, 120, 200])),
            SystemTime::UNIX_EPOCH,
            1,
        )
    }

    #[test]
    fn crop_adds_margin_and_clamps_to_frame() {
        let frame = solid_frame(100, 50);

        let inner = frame
            .crop_with_margin(&BoundingBox::new(20.0, 10.0, 60.0, 30.0))
            .expect("inner crop");
        assert_eq!(inner.dimensions(), (50, 30));

        let edge = frame
            .crop_with_margin(&BoundingBox::new(0.0, 0.0, 98.0, 49.0))
            .expect("edge crop");
        assert_eq!(edge.dimensions(), (100, 50));
    }

    #[test]
    fn crop_outside_frame_is_none() {
        let frame = solid_frame(100, 50);
        assert!(frame
            .crop_with_margin(&BoundingBox::new(200.0, 200.0, 300.0, 300.0))
            .is_none());
        assert!(frame
            .crop_with_margin(&BoundingBox::new(f32::NAN, 0.0, 10.0, 10.0))
            .is_none());
    }

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2, SystemTime::UNIX_EPOCH, 0).is_some());
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, SystemTime::UNIX_EPOCH, 0).is_none());
    }

    #[test]
    fn equalization_stretches_contrast() {
        let mut gray = GrayImage::new(4, 1);
        gray.put_pixel(0, 0, Luma([100]));
        gray.put_pixel(1, 0, Luma([101]));
        gray.put_pixel(2, 0, Luma([102]));
        gray.put_pixel(3, 0, Luma([103]));

        let out = equalize_histogram(&gray);
        assert_eq!(out.get_pixel(0, 0).0[0], 0);
        assert_eq!(out.get_pixel(3, 0).0[0], 255);
    }

    #[test]
    fn equalization_keeps_flat_images() {
        let gray = GrayImage::from_pixel(3, 3, Luma([42]));
        assert_eq!(equalize_histogram(&gray), gray);
    }

    #[test]
    fn iou_of_identical_boxes_is_one() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }
}
