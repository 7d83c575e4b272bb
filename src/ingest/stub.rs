use anyhow::Result;
use image::{Rgb, RgbImage};
use std::time::SystemTime;

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

/// Synthetic frame source for `stub://` identifiers.
///
/// Frames are a dark gradient with a light, plate-shaped rectangle that drifts
/// horizontally, so detectors see changing input.
pub struct StubSource {
    config: SourceConfig,
    frame_count: u64,
}

impl StubSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn generate(&self) -> RgbImage {
        let width = self.config.width.max(1);
        let height = self.config.height.max(1);
        let plate_w = (width / 4).max(1);
        let plate_h = (height / 12).max(1);
        let travel = width.saturating_sub(plate_w).max(1) as u64;
        let plate_x = (self.frame_count * 4 % travel) as u32;
        let plate_y = height / 2 - plate_h / 2;

        RgbImage::from_fn(width, height, |x, y| {
            let in_plate = x >= plate_x
                && x < plate_x + plate_w
                && y >= plate_y
                && y < plate_y + plate_h;
            if in_plate {
                Rgb([235, 235, 235])
            } else {
                let shade = ((x + y) % 64) as u8;
                Rgb([shade, shade, shade.saturating_add(16)])
            }
        })
    }
}

impl FrameSource for StubSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("StubSource: connected to {} (synthetic)", self.config.source);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.frame_count += 1;
        let image = self.generate();
        Ok(Some(Frame::new(image, SystemTime::now(), self.frame_count)))
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.source.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_change_between_captures() -> Result<()> {
        let mut source = StubSource::new(SourceConfig {
            source: "stub://test".to_string(),
            width: 64,
            height: 48,
            ..SourceConfig::default()
        });
        source.connect()?;

        let first = source.next_frame()?.expect("frame");
        let second = source.next_frame()?.expect("frame");
        assert_eq!(first.sequence(), 1);
        assert_eq!(second.sequence(), 2);
        assert_ne!(first.image(), second.image());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }
}
