//! Plate localization.
//!
//! A [`PlateDetector`] turns a frame into candidate [`PlateRegion`]s. The
//! `stub` backend always reports a centre region; the `tract` backend
//! (feature `backend-tract`) runs a YOLO-style ONNX model.

mod backend;
mod backends;
pub mod nms;
mod result;

use anyhow::Result;

use crate::config::{BackendKind, DetectorSettings};

pub use backend::PlateDetector;
pub use backends::StubDetector;
#[cfg(feature = "backend-tract")]
pub use backends::TractDetector;
pub use result::PlateRegion;

/// Build the detector selected by `settings`.
pub fn open_detector(settings: &DetectorSettings) -> Result<Box<dyn PlateDetector>> {
    match settings.backend {
        BackendKind::Stub => Ok(Box::new(StubDetector::new())),
        BackendKind::Tract => {
            #[cfg(feature = "backend-tract")]
            {
                let detector = TractDetector::new(&settings.model_path, settings.input_size)?
                    .with_thresholds(settings.confidence_threshold, settings.iou_threshold)
                    .with_plate_class(settings.plate_class);
                Ok(Box::new(detector))
            }
            #[cfg(not(feature = "backend-tract"))]
            {
                Err(anyhow::anyhow!(
                    "detector backend 'tract' requires the backend-tract feature"
                ))
            }
        }
    }
}
