use anyhow::Result;
use image::GrayImage;

use crate::ocr::{Recognition, TextRecognizer};

/// Scripted recognizer for dry runs and tests.
///
/// Returns the configured readings in order, wrapping around. With no readings it
/// never recognizes anything.
pub struct StubRecognizer {
    readings: Vec<String>,
    next: usize,
    confidence: f32,
}

impl StubRecognizer {
    pub fn new(readings: Vec<String>) -> Self {
        Self {
            readings,
            next: 0,
            confidence: 0.9,
        }
    }
}

impl TextRecognizer for StubRecognizer {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn recognize(&mut self, plate: &GrayImage) -> Result<Option<Recognition>> {
        if self.readings.is_empty() || plate.width() == 0 || plate.height() == 0 {
            return Ok(None);
        }
        let text = self.readings[self.next % self.readings.len()].clone();
        self.next = self.next.wrapping_add(1);
        Ok(Some(Recognition::new(text, self.confidence)))
    }
}
