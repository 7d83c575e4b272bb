//! Frame sources.
//!
//! The capture loop pulls frames from one of:
//! - `stub://<name>`: synthetic frames (testing, dry runs)
//! - a local image file or a directory of images
//! - a recorded video file such as `gate.mp4` (feature: ingest-file-ffmpeg)
//! - `http(s)://` JPEG snapshot or MJPEG endpoints (feature: ingest-http)
//! - a V4L2 device, given as `/dev/videoN` or a bare index like `0` (feature: ingest-v4l2)
//!
//! A source signals end of stream with `Ok(None)`. An `Err` from `next_frame` is an
//! acquisition failure and ends the capture loop.

pub mod file;
#[cfg(feature = "ingest-http")]
pub mod http;
pub mod stub;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;
#[cfg(feature = "ingest-file-ffmpeg")]
pub mod video;

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::frame::Frame;

pub use file::FileSource;
#[cfg(feature = "ingest-http")]
pub use http::HttpSource;
pub use stub::StubSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;
#[cfg(feature = "ingest-file-ffmpeg")]
pub use video::VideoFileSource;

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "webm", "m4v", "mpg", "mpeg", "ts"];

/// A producer of frames.
pub trait FrameSource {
    /// Open the underlying device, stream or directory.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame; `Ok(None)` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    /// Get frame statistics.
    fn stats(&self) -> SourceStats;
}

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Camera settings shared by all sources.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// Source identifier (see module docs).
    pub source: String,
    /// Target frame rate. Network sources decimate to this rate.
    pub target_fps: u32,
    /// Preferred frame width (stub and device sources).
    pub width: u32,
    /// Preferred frame height (stub and device sources).
    pub height: u32,
    /// Restart file sources from the beginning instead of ending the stream.
    pub loop_files: bool,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            source: "0".to_string(),
            target_fps: 10,
            width: 640,
            height: 480,
            loop_files: false,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum SourceKind {
    Stub,
    File,
    Video,
    Http,
    Device(String),
}

fn classify(source: &str) -> Result<SourceKind> {
    let source = source.trim();
    if source.is_empty() {
        return Err(anyhow!("camera source must not be empty"));
    }
    if source.starts_with("stub://") {
        return Ok(SourceKind::Stub);
    }
    if source.starts_with("http://") || source.starts_with("https://") {
        return Ok(SourceKind::Http);
    }
    if source.contains("://") {
        return Err(anyhow!(
            "unsupported camera source scheme in '{}'; expected stub://, http(s)://, a device or a path",
            source
        ));
    }
    if source.chars().all(|c| c.is_ascii_digit()) {
        return Ok(SourceKind::Device(format!("/dev/video{}", source)));
    }
    if source.starts_with("/dev/video") {
        return Ok(SourceKind::Device(source.to_string()));
    }
    let is_video = std::path::Path::new(source)
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
    if is_video {
        return Ok(SourceKind::Video);
    }
    Ok(SourceKind::File)
}

/// Build the source named by `config.source`. The source is not yet connected.
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>> {
    match classify(&config.source)? {
        SourceKind::Stub => Ok(Box::new(StubSource::new(config.clone()))),
        SourceKind::File => Ok(Box::new(FileSource::new(config.clone())?)),
        SourceKind::Video => {
            #[cfg(feature = "ingest-file-ffmpeg")]
            {
                Ok(Box::new(VideoFileSource::new(config.clone())?))
            }
            #[cfg(not(feature = "ingest-file-ffmpeg"))]
            {
                Err(anyhow!(
                    "video file {} requires the ingest-file-ffmpeg feature",
                    config.source
                ))
            }
        }
        SourceKind::Http => {
            #[cfg(feature = "ingest-http")]
            {
                Ok(Box::new(HttpSource::new(config.clone())?))
            }
            #[cfg(not(feature = "ingest-http"))]
            {
                Err(anyhow!("http camera sources require the ingest-http feature"))
            }
        }
        SourceKind::Device(device) => {
            #[cfg(feature = "ingest-v4l2")]
            {
                let mut config = config.clone();
                config.source = device;
                Ok(Box::new(V4l2Source::new(config)?))
            }
            #[cfg(not(feature = "ingest-v4l2"))]
            {
                Err(anyhow!(
                    "camera device {} requires the ingest-v4l2 feature",
                    device
                ))
            }
        }
    }
}

/// Minimum spacing between frames for `target_fps`; zero means unpaced.
pub fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

#[cfg_attr(
    not(any(
        feature = "ingest-http",
        feature = "ingest-v4l2",
        feature = "ingest-file-ffmpeg"
    )),
    allow(dead_code)
)]
pub(crate) fn health_grace(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_source_identifiers() -> Result<()> {
        assert_eq!(classify("stub://gate")?, SourceKind::Stub);
        assert_eq!(classify("0")?, SourceKind::Device("/dev/video0".to_string()));
        assert_eq!(
            classify("/dev/video2")?,
            SourceKind::Device("/dev/video2".to_string())
        );
        assert_eq!(classify("http://cam.local/snapshot.jpg")?, SourceKind::Http);
        assert_eq!(classify("recordings/gate")?, SourceKind::File);
        assert_eq!(classify("recordings/gate.jpg")?, SourceKind::File);
        assert_eq!(classify("recordings/gate.mp4")?, SourceKind::Video);
        assert_eq!(classify("/srv/cam/Entrance.MKV")?, SourceKind::Video);
        assert!(classify("rtsp://cam.local/live").is_err());
        assert!(classify("  ").is_err());
        Ok(())
    }

    #[test]
    fn stub_sources_open_without_features() -> Result<()> {
        let config = SourceConfig {
            source: "stub://gate".to_string(),
            ..SourceConfig::default()
        };
        let mut source = open_source(&config)?;
        source.connect()?;
        let frame = source.next_frame()?.expect("stub frame");
        assert_eq!((frame.width(), frame.height()), (640, 480));
        Ok(())
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    #[test]
    fn video_files_name_the_missing_feature() {
        let config = SourceConfig {
            source: "recordings/gate.mp4".to_string(),
            ..SourceConfig::default()
        };
        let err = open_source(&config).err().expect("video source without ffmpeg");
        assert!(err.to_string().contains("ingest-file-ffmpeg"), "{err}");
    }

    #[test]
    fn frame_interval_matches_fps() {
        assert_eq!(frame_interval(10), Duration::from_millis(100));
        assert_eq!(frame_interval(0), Duration::ZERO);
        assert_eq!(health_grace(10), Duration::from_millis(2_000));
        assert_eq!(health_grace(1), Duration::from_millis(6_000));
    }
}
