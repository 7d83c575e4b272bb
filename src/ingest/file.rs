//! Local image frame source.
//!
//! `FileSource` reads a single still image or every `.jpg`/`.jpeg`/`.png` file in a
//! directory, in file-name order. Useful for replaying captured stills through the
//! pipeline. Frames are stamped with the wall-clock time they are read.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::{FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

pub struct FileSource {
    config: SourceConfig,
    files: Vec<PathBuf>,
    next_index: usize,
    frame_count: u64,
    last_error: Option<String>,
}

impl FileSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        if config.source.contains("://") {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        Ok(Self {
            config,
            files: Vec::new(),
            next_index: 0,
            frame_count: 0,
            last_error: None,
        })
    }

    fn list_files(path: &Path) -> Result<Vec<PathBuf>> {
        if path.is_file() {
            return Ok(vec![path.to_path_buf()]);
        }
        if !path.is_dir() {
            return Err(anyhow!("camera source {} does not exist", path.display()));
        }
        let mut files = Vec::new();
        for entry in std::fs::read_dir(path)
            .with_context(|| format!("read image directory {}", path.display()))?
        {
            let entry = entry?;
            let candidate = entry.path();
            if candidate.is_file() && has_image_extension(&candidate) {
                files.push(candidate);
            }
        }
        files.sort();
        Ok(files)
    }
}

impl FrameSource for FileSource {
    fn connect(&mut self) -> Result<()> {
        let path = PathBuf::from(&self.config.source);
        self.files = Self::list_files(&path)?;
        self.next_index = 0;
        if self.files.is_empty() {
            log::warn!("FileSource: no images found in {}", path.display());
        }
        log::info!(
            "FileSource: connected to {} ({} image(s))",
            path.display(),
            self.files.len()
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.next_index >= self.files.len() {
            if !self.config.loop_files || self.files.is_empty() {
                return Ok(None);
            }
            self.next_index = 0;
        }
        let path = self.files[self.next_index].clone();
        self.next_index += 1;

        let image = image::open(&path)
            .with_context(|| format!("decode image {}", path.display()))
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                err
            })?
            .into_rgb8();
        self.frame_count += 1;
        Ok(Some(Frame::new(image, SystemTime::now(), self.frame_count)))
    }

    fn is_healthy(&self) -> bool {
        self.last_error.is_none()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.source.clone(),
        }
    }
}

fn has_image_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    fn config_for(path: &Path, loop_files: bool) -> SourceConfig {
        SourceConfig {
            source: path.to_string_lossy().to_string(),
            loop_files,
            ..SourceConfig::default()
        }
    }

    #[test]
    fn reads_directory_in_name_order_then_ends() -> Result<()> {
        let dir = tempdir()?;
        RgbImage::from_pixel(8, 4, Rgb([1, 2, 3])).save(dir.path().join("b.png"))?;
        RgbImage::from_pixel(6, 3, Rgb([4, 5, 6])).save(dir.path().join("a.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "ignored")?;

        let mut source = FileSource::new(config_for(dir.path(), false))?;
        source.connect()?;

        let first = source.next_frame()?.expect("a.png");
        assert_eq!((first.width(), first.height()), (6, 3));
        let second = source.next_frame()?.expect("b.png");
        assert_eq!((second.width(), second.height()), (8, 4));
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn loops_when_configured() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("still.png");
        RgbImage::from_pixel(4, 4, Rgb([9, 9, 9])).save(&path)?;

        let mut source = FileSource::new(config_for(&path, true))?;
        source.connect()?;
        for _ in 0..3 {
            assert!(source.next_frame()?.is_some());
        }
        Ok(())
    }

    #[test]
    fn corrupt_image_is_an_acquisition_error() -> Result<()> {
        let dir = tempdir()?;
        std::fs::write(dir.path().join("broken.jpg"), b"not a jpeg")?;

        let mut source = FileSource::new(config_for(dir.path(), false))?;
        source.connect()?;
        assert!(source.next_frame().is_err());
        assert!(!source.is_healthy());
        Ok(())
    }

    #[test]
    fn missing_path_fails_on_connect() -> Result<()> {
        let dir = tempdir()?;
        let mut source = FileSource::new(config_for(&dir.path().join("nope"), false))?;
        assert!(source.connect().is_err());
        Ok(())
    }
}
