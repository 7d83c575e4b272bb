//! JPEG crops of accepted plates, referenced from the stored rows.

use anyhow::{Context, Result};
use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::epoch_millis;

/// Writes accepted plate crops as JPEG files.
#[derive(Clone, Debug)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Save `crop` as `<timestamp_ms>_<PLATE>.jpg` and return the written path.
    pub fn save(&self, plate_text: &str, timestamp: SystemTime, crop: &RgbImage) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("create snapshot directory {}", self.dir.display()))?;
        let name = format!("{}_{}.jpg", epoch_millis(timestamp)?, sanitize(plate_text));
        let path = self.dir.join(name);
        crop.save_with_format(&path, image::ImageFormat::Jpeg)
            .with_context(|| format!("write snapshot {}", path.display()))?;
        Ok(path)
    }

    /// Remove a snapshot whose detection was never stored.
    pub fn discard(&self, path: &Path) {
        remove_snapshot_file(path);
    }
}

/// Delete a snapshot file. A file that is already gone is not an error.
pub fn remove_snapshot_file(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("failed to remove snapshot {}: {}", path.display(), e),
    }
}

fn sanitize(plate_text: &str) -> String {
    plate_text
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::tempdir;

    #[test]
    fn saves_jpeg_named_after_plate_and_time() -> Result<()> {
        let dir = tempdir()?;
        let writer = SnapshotWriter::new(dir.path().join("plates"));
        let crop = RgbImage::from_pixel(40, 12, Rgb([200, 200, 200]));
        let ts = UNIX_EPOCH + Duration::from_millis(1_700_000_000_123);

        let path = writer.save("ABC1234", ts, &crop)?;
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("1700000000123_ABC1234.jpg")
        );
        let reloaded = image::open(&path)?;
        assert_eq!((reloaded.width(), reloaded.height()), (40, 12));
        Ok(())
    }

    #[test]
    fn discard_removes_file_and_tolerates_missing() -> Result<()> {
        let dir = tempdir()?;
        let writer = SnapshotWriter::new(dir.path());
        let crop = RgbImage::from_pixel(8, 4, Rgb([10, 10, 10]));
        let path = writer.save("ABC1234", UNIX_EPOCH, &crop)?;
        writer.discard(&path);
        assert!(!path.exists());
        writer.discard(&path);
        Ok(())
    }

    #[test]
    fn plate_text_cannot_escape_directory() {
        assert_eq!(sanitize("../AB/C1"), "ABC1");
    }
}
