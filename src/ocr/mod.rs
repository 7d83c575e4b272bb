//! Plate text recognition.
//!
//! Recognizers receive a grayscale, histogram-equalized plate crop (see
//! [`crate::frame::preprocess_plate`]) and return their best reading. The raw
//! text is not validated here; that is the job of
//! [`PlateValidator`](crate::validate::PlateValidator).

mod backends;
pub mod ctc;

use anyhow::Result;
use image::GrayImage;

use crate::config::{BackendKind, RecognizerSettings};

pub use backends::StubRecognizer;
#[cfg(feature = "backend-tract")]
pub use backends::TractRecognizer;

/// Best-guess reading of one plate crop.
#[derive(Clone, Debug, PartialEq)]
pub struct Recognition {
    pub text: String,
    /// Confidence in `0..=1`.
    pub confidence: f32,
}

impl Recognition {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Text recognizer backend.
pub trait TextRecognizer: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Read the characters in `plate`. `Ok(None)` means nothing legible.
    ///
    /// An `Err` skips the rest of the frame; the capture loop keeps running.
    fn recognize(&mut self, plate: &GrayImage) -> Result<Option<Recognition>>;
}

/// Build the recognizer selected by `settings`.
pub fn open_recognizer(settings: &RecognizerSettings) -> Result<Box<dyn TextRecognizer>> {
    match settings.backend {
        BackendKind::Stub => Ok(Box::new(StubRecognizer::new(settings.stub_plates.clone()))),
        BackendKind::Tract => {
            #[cfg(feature = "backend-tract")]
            {
                Ok(Box::new(TractRecognizer::new(
                    &settings.model_path,
                    &settings.alphabet,
                    settings.input_width,
                    settings.input_height,
                )?))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                Err(anyhow::anyhow!(
                    "recognizer backend 'tract' requires the backend-tract feature"
                ))
            }
        }
    }
}
