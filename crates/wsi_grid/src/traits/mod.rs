use image::{RgbImage, RgbaImage};
use rand::RngCore;

use crate::{error::Result, types::PatchOrigin};

/// Read access to one opened pyramidal slide
pub trait SlideReader {
    /// Number of resolution levels, level 0 being full resolution
    fn level_count(&self) -> u32;

    /// Size of the given level in pixels, `None` if the level does not exist
    fn dimensions(&self, level: u32) -> Option<(u32, u32)>;

    /// Read a `size` region of `level` whose top-left corner is `origin` in
    /// level-0 coordinates. Pixels outside the slide come back transparent.
    fn read_region(&self, origin: PatchOrigin, level: u32, size: (u32, u32)) -> Result<RgbaImage>;
}

/// Opens slides by identifier. Every call returns an independent reader.
pub trait SlideOpener: Send + Sync {
    type Reader: SlideReader;

    fn open(&self, slide_id: &str) -> Result<Self::Reader>;
}

/// Point-containment queries over the annotated regions of one slide
pub trait RegionIndex: Send + Sync {
    /// Whether `(x, y)` lies in an annotated region. Points exactly on an
    /// edge count as inside only when `include_boundary` is set.
    fn contains_point(&self, x: f64, y: f64, include_boundary: bool) -> bool;
}

/// Image-only augmentation step; never touches labels
pub trait PhotometricTransform: Send + Sync {
    fn apply(&self, image: &mut RgbImage, rng: &mut dyn RngCore);
}

/// Indexable collection of training samples
pub trait Dataset {
    type Item;

    /// Number of samples
    fn size(&self) -> usize;

    /// Build the sample at `index`
    fn get(&self, index: usize) -> Result<Self::Item>;
}
