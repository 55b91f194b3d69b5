use std::borrow::Cow;
use std::path::{Path, PathBuf};

use image::{Rgba, RgbaImage};
use tracing::debug;

use crate::{
    error::{GridError, Result},
    traits::{SlideOpener, SlideReader},
    types::PatchOrigin,
};

/// Opens `<dir>/<slide_id>.<extension>` as a [`RasterSlide`]
#[derive(Debug, Clone)]
pub struct RasterSlideOpener {
    pub dir: PathBuf,
    pub extension: String,
}

impl RasterSlideOpener {
    pub fn new(dir: impl Into<PathBuf>, extension: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            extension: extension.into(),
        }
    }

    pub fn slide_path(&self, slide_id: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", slide_id, self.extension))
    }
}

impl SlideOpener for RasterSlideOpener {
    type Reader = RasterSlide;

    fn open(&self, slide_id: &str) -> Result<RasterSlide> {
        RasterSlide::open(slide_id, self.slide_path(slide_id))
    }
}

/// A slide decoded from a single-resolution raster file.
///
/// Level `L` is the full-resolution raster shrunk by `2^L` with area
/// averaging, generated on demand.
#[derive(Debug, Clone)]
pub struct RasterSlide {
    base: RgbaImage,
}

impl RasterSlide {
    pub fn open(slide_id: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let open_error = |reason: String| GridError::SlideOpen {
            slide_id: slide_id.to_string(),
            path: path.to_path_buf(),
            reason,
        };

        if !path.is_file() {
            return Err(open_error("file not found".to_string()));
        }
        let base = image::open(path)
            .map_err(|e| open_error(e.to_string()))?
            .to_rgba8();
        debug!("Opened slide {} ({}x{})", slide_id, base.width(), base.height());

        Ok(Self { base })
    }

    pub fn from_image(base: RgbaImage) -> Self {
        Self { base }
    }

    fn level_image(&self, level: u32) -> Option<Cow<'_, RgbaImage>> {
        let (width, height) = self.dimensions(level)?;
        if level == 0 {
            return Some(Cow::Borrowed(&self.base));
        }
        Some(Cow::Owned(image::imageops::thumbnail(
            &self.base, width, height,
        )))
    }
}

impl SlideReader for RasterSlide {
    fn level_count(&self) -> u32 {
        let mut count = 0;
        while self.dimensions(count).is_some() {
            count += 1;
        }
        count
    }

    fn dimensions(&self, level: u32) -> Option<(u32, u32)> {
        let width = self.base.width().checked_shr(level)?;
        let height = self.base.height().checked_shr(level)?;
        (width > 0 && height > 0).then_some((width, height))
    }

    fn read_region(&self, origin: PatchOrigin, level: u32, size: (u32, u32)) -> Result<RgbaImage> {
        let (width, height) = size;
        let Some(source) = self.level_image(level) else {
            // No such level: nothing to sample, everything is out of bounds
            return Ok(RgbaImage::new(width, height));
        };

        let downsample = 1i64 << level;
        let left = origin.x.div_euclid(downsample);
        let top = origin.y.div_euclid(downsample);
        let (source_w, source_h) = (source.width() as i64, source.height() as i64);

        Ok(RgbaImage::from_fn(width, height, |i, j| {
            let sx = left + i as i64;
            let sy = top + j as i64;
            if (0..source_w).contains(&sx) && (0..source_h).contains(&sy) {
                *source.get_pixel(sx as u32, sy as u32)
            } else {
                Rgba([0, 0, 0, 0])
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_slide() -> RasterSlide {
        RasterSlide::from_image(RgbaImage::from_fn(64, 32, |x, y| {
            Rgba([x as u8, y as u8, 7, 255])
        }))
    }

    #[test]
    fn test_levels() {
        let slide = gradient_slide();
        assert_eq!(slide.dimensions(0), Some((64, 32)));
        assert_eq!(slide.dimensions(2), Some((16, 8)));
        assert_eq!(slide.level_count(), 6);
        assert_eq!(slide.dimensions(6), None);
    }

    #[test]
    fn test_read_region_inside() {
        let slide = gradient_slide();
        let region = slide
            .read_region(PatchOrigin { x: 10, y: 5 }, 0, (4, 4))
            .expect("Should read region");
        assert_eq!(region.dimensions(), (4, 4));
        assert_eq!(region.get_pixel(0, 0), &Rgba([10, 5, 7, 255]));
        assert_eq!(region.get_pixel(3, 2), &Rgba([13, 7, 7, 255]));
    }

    #[test]
    fn test_read_region_out_of_bounds_is_transparent() {
        let slide = gradient_slide();
        let region = slide
            .read_region(PatchOrigin { x: -2, y: -2 }, 0, (4, 4))
            .expect("Out of bounds regions are not an error");
        assert_eq!(region.get_pixel(0, 0), &Rgba([0, 0, 0, 0]));
        assert_eq!(region.get_pixel(2, 2), &Rgba([0, 0, 7, 255]));
    }

    #[test]
    fn test_read_region_at_level() {
        let slide = gradient_slide();
        let region = slide
            .read_region(PatchOrigin { x: 0, y: 0 }, 1, (32, 16))
            .expect("Should read level 1");
        assert_eq!(region.dimensions(), (32, 16));
        assert_eq!(region.get_pixel(0, 0)[3], 255);
        assert_eq!(region.get_pixel(31, 15)[3], 255);
    }

    #[test]
    fn test_missing_file() {
        let opener = RasterSlideOpener::new("/nonexistent", "tif");
        let err = opener.open("Tumor_001").unwrap_err();
        assert!(matches!(err, GridError::SlideOpen { .. }));
    }
}
