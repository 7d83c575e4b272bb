//! Recorded video frame source.
//!
//! Replays a local video file (`.mp4`, `.mkv`, `.avi`, ...) through FFmpeg,
//! converting every decoded picture to RGB24. Frames are stamped with the
//! wall-clock time they are decoded. With `loop_files` the recording restarts
//! from the beginning instead of ending the stream.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;
use std::path::Path;
use std::time::{Instant, SystemTime};

use super::{health_grace, FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

pub struct VideoFileSource {
    config: SourceConfig,
    decoding: Option<Decoding>,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
}

struct Decoding {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    eof_sent: bool,
    decoded_any: bool,
}

impl Decoding {
    fn open(path: &str) -> Result<Self> {
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open video file '{}' with ffmpeg", path))?;
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("{} has no video track", path))?;
        let stream_index = stream.index();
        let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;
        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler,
            eof_sent: false,
            decoded_any: false,
        })
    }

    /// Next decoded picture as packed RGB24, or `None` once the file is drained.
    fn decode_next(&mut self) -> Result<Option<(Vec<u8>, u32, u32)>> {
        let mut decoded = ffmpeg::frame::Video::empty();
        loop {
            if self.decoder.receive_frame(&mut decoded).is_ok() {
                let mut rgb = ffmpeg::frame::Video::empty();
                self.scaler
                    .run(&decoded, &mut rgb)
                    .context("scale frame to RGB")?;
                self.decoded_any = true;
                return frame_to_pixels(&rgb).map(Some);
            }
            if self.eof_sent {
                return Ok(None);
            }

            let stream_index = self.stream_index;
            let packet = self
                .input
                .packets()
                .find(|(stream, _)| stream.index() == stream_index)
                .map(|(_, packet)| packet);
            match packet {
                Some(packet) => self
                    .decoder
                    .send_packet(&packet)
                    .context("send packet to ffmpeg decoder")?,
                None => {
                    // Flush frames still buffered in the decoder.
                    self.decoder.send_eof().context("flush ffmpeg decoder")?;
                    self.eof_sent = true;
                }
            }
        }
    }
}

impl VideoFileSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if config.source.contains("://") {
            return Err(anyhow!("video replay only supports local paths"));
        }
        ffmpeg::init().context("initialize ffmpeg")?;
        Ok(Self {
            config,
            decoding: None,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        })
    }

    fn record_error(&mut self, err: anyhow::Error) -> anyhow::Error {
        self.last_error = Some(err.to_string());
        err
    }
}

impl FrameSource for VideoFileSource {
    fn connect(&mut self) -> Result<()> {
        if !Path::new(&self.config.source).is_file() {
            return Err(anyhow!("video file {} does not exist", self.config.source));
        }
        let decoding = Decoding::open(&self.config.source).map_err(|e| self.record_error(e))?;
        log::info!(
            "VideoFileSource: connected to {} ({}x{})",
            self.config.source,
            decoding.decoder.width(),
            decoding.decoder.height()
        );
        self.decoding = Some(decoding);
        self.last_error = None;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            let decoding = self
                .decoding
                .as_mut()
                .context("video file not connected")?;
            let next = decoding.decode_next();
            let restartable = decoding.decoded_any;

            match next.map_err(|e| self.record_error(e))? {
                Some((pixels, width, height)) => {
                    self.frame_count += 1;
                    self.last_frame_at = Some(Instant::now());
                    let frame = Frame::from_rgb(
                        pixels,
                        width,
                        height,
                        SystemTime::now(),
                        self.frame_count,
                    )
                    .ok_or_else(|| anyhow!("decoded frame does not match its size"))?;
                    return Ok(Some(frame));
                }
                None if self.config.loop_files && restartable => {
                    log::info!("VideoFileSource: restarting {}", self.config.source);
                    let decoding =
                        Decoding::open(&self.config.source).map_err(|e| self.record_error(e))?;
                    self.decoding = Some(decoding);
                }
                None => return Ok(None),
            }
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= health_grace(self.config.target_fps)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.source.clone(),
        }
    }
}

fn frame_to_pixels(frame: &ffmpeg::frame::Video) -> Result<(Vec<u8>, u32, u32)> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame is shorter than its size")?;
        return Ok((pixels.to_vec(), width, height));
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        pixels.extend_from_slice(
            data.get(start..start + row_bytes)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }
    Ok((pixels, width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_recording_fails_to_connect() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = SourceConfig {
            source: dir.path().join("gate.mp4").to_string_lossy().to_string(),
            ..SourceConfig::default()
        };
        let mut source = VideoFileSource::new(config)?;
        assert!(source.connect().is_err());
        assert!(source.next_frame().is_err());
        Ok(())
    }

    #[test]
    fn rejects_urls() {
        let config = SourceConfig {
            source: "rtsp://cam.local/live.mp4".to_string(),
            ..SourceConfig::default()
        };
        assert!(VideoFileSource::new(config).is_err());
    }
}
