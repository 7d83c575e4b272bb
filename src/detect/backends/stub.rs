use anyhow::Result;

use crate::detect::backend::PlateDetector;
use crate::detect::result::PlateRegion;
use crate::frame::{BoundingBox, Frame};

/// Stub detector for dry runs and tests.
///
/// Reports a single plate-shaped region in the centre of every non-empty frame.
pub struct StubDetector {
    confidence: f32,
}

impl StubDetector {
    pub fn new() -> Self {
        Self { confidence: 0.9 }
    }

    fn centre_region(width: u32, height: u32) -> BoundingBox {
        let (w, h) = (width as f32, height as f32);
        BoundingBox::new(w * 0.375, h * 0.45, w * 0.625, h * 0.55)
    }
}

impl Default for StubDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl PlateDetector for StubDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<PlateRegion>> {
        if frame.is_empty() {
            return Ok(Vec::new());
        }
        let bbox = Self::centre_region(frame.width(), frame.height());
        Ok(vec![PlateRegion::new(bbox, self.confidence)])
    }
}
