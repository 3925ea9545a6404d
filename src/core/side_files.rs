//! Files a project keeps next to itself: thumbnails, audio peaks, proxies.
//!
//! Layout under the project folder:
//!
//! ```text
//! thumbs/<hash>#<frame>.png    video thumbnail
//! thumbs/<hash>_audio.png      audio peaks, one row per channel
//! proxy/<hash>.<ext>           proxy clip
//! ```

use image::{GrayImage, ImageError, Luma, RgbaImage};
use log::debug;
use std::path::{Path, PathBuf};

use crate::error::{TimelineError, TimelineResult};

pub const THUMBS_DIR: &str = "thumbs";
pub const PROXY_DIR: &str = "proxy";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectFolder {
    root: PathBuf,
}

impl ProjectFolder {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn thumbnail_path(&self, hash: &str, frame: i32) -> PathBuf {
        self.root.join(THUMBS_DIR).join(format!("{}#{}.png", hash, frame))
    }

    pub fn audio_thumbnail_path(&self, hash: &str) -> PathBuf {
        self.root.join(THUMBS_DIR).join(format!("{}_audio.png", hash))
    }

    pub fn proxy_path(&self, hash: &str, ext: &str) -> PathBuf {
        self.root.join(PROXY_DIR).join(format!("{}.{}", hash, ext))
    }

    /// Save a rendered frame as the thumbnail of `hash` at `frame`.
    pub fn write_thumbnail(&self, hash: &str, frame: i32, image: &RgbaImage) -> TimelineResult<PathBuf> {
        let path = self.thumbnail_path(hash, frame);
        save_png(&path, |p| image.save(p))?;
        Ok(path)
    }

    /// Pack audio peaks into a grayscale PNG: row = channel, pixel = peak.
    pub fn write_audio_peaks(&self, hash: &str, channels: &[Vec<u8>]) -> TimelineResult<PathBuf> {
        let width = channels.iter().map(Vec::len).max().unwrap_or(0);
        if channels.is_empty() || width == 0 {
            return Err(TimelineError::invalid("no audio peaks"));
        }
        let mut img = GrayImage::new(width as u32, channels.len() as u32);
        for (y, peaks) in channels.iter().enumerate() {
            for (x, &peak) in peaks.iter().enumerate() {
                img.put_pixel(x as u32, y as u32, Luma([peak]));
            }
        }
        let path = self.audio_thumbnail_path(hash);
        save_png(&path, |p| img.save(p))?;
        Ok(path)
    }

    /// Peaks stored for `hash`, or None when not generated yet.
    pub fn read_audio_peaks(&self, hash: &str) -> TimelineResult<Option<Vec<Vec<u8>>>> {
        let path = self.audio_thumbnail_path(hash);
        if !path.exists() {
            return Ok(None);
        }
        let img = image::open(&path).map_err(image_err)?.into_luma8();
        let channels = img
            .rows()
            .map(|row| row.map(|p| p.0[0]).collect())
            .collect();
        Ok(Some(channels))
    }
}

fn save_png(path: &Path, save: impl FnOnce(&Path) -> Result<(), ImageError>) -> TimelineResult<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    save(path).map_err(image_err)?;
    debug!("Wrote {}", path.display());
    Ok(())
}

fn image_err(e: ImageError) -> TimelineError {
    match e {
        ImageError::IoError(e) => TimelineError::Io(e),
        other => TimelineError::Renderer(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_layout() {
        let folder = ProjectFolder::new("/work/film");
        assert_eq!(folder.thumbnail_path("ab12", 40), PathBuf::from("/work/film/thumbs/ab12#40.png"));
        assert_eq!(folder.audio_thumbnail_path("ab12"), PathBuf::from("/work/film/thumbs/ab12_audio.png"));
        assert_eq!(folder.proxy_path("ab12", "mp4"), PathBuf::from("/work/film/proxy/ab12.mp4"));
    }

    #[test]
    fn test_thumbnail_written() {
        let dir = tempfile::tempdir().expect("tempdir");
        let folder = ProjectFolder::new(dir.path());
        let img = RgbaImage::from_pixel(8, 6, Rgba([10, 20, 30, 255]));
        let path = folder.write_thumbnail("ff", 3, &img).expect("write");
        let back = image::open(&path).expect("open").into_rgba8();
        assert_eq!(back.dimensions(), (8, 6));
        assert_eq!(back.get_pixel(0, 0), &Rgba([10, 20, 30, 255]));
    }

    #[test]
    fn test_audio_peaks_rows_per_channel() {
        let dir = tempfile::tempdir().expect("tempdir");
        let folder = ProjectFolder::new(dir.path());
        assert_eq!(folder.read_audio_peaks("aa").expect("none"), None);

        let peaks = vec![vec![0, 128, 255], vec![5, 6]];
        folder.write_audio_peaks("aa", &peaks).expect("write");
        let back = folder.read_audio_peaks("aa").expect("read").expect("peaks");
        // shorter channels are padded with silence
        assert_eq!(back, vec![vec![0, 128, 255], vec![5, 6, 0]]);

        assert!(folder.write_audio_peaks("bb", &[]).is_err());
    }
}
