use anyhow::Result;

use crate::detect::result::PlateRegion;
use crate::frame::Frame;

/// Plate detector backend.
///
/// Implementations locate plates only. Reading the characters is the job of a
/// [`TextRecognizer`](crate::ocr::TextRecognizer).
pub trait PlateDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Return candidate plate regions for `frame`, highest confidence first.
    ///
    /// An `Err` skips the frame; the capture loop keeps running.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<PlateRegion>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
