use crate::frame::BoundingBox;

/// A region the detector believes contains a plate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlateRegion {
    /// Box in frame pixel coordinates.
    pub bbox: BoundingBox,
    pub confidence: f32,
}

impl PlateRegion {
    pub fn new(bbox: BoundingBox, confidence: f32) -> Self {
        Self { bbox, confidence }
    }
}
