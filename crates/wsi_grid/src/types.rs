use std::ops::Range;

use image::{Rgb, RgbImage};
use ndarray::{Array1, Array2, Array4, Axis};
use serde::{Deserialize, Serialize};

use crate::augment::GeometricTransform;
use crate::error::{GridError, Result};

/// One record of a coordinate list: a patch center in level-0 slide space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Slide identifier, the slide file stem
    pub slide_id: String,
    pub x_center: i64,
    pub y_center: i64,
}

/// Top-left corner of a square patch in level-0 slide space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchOrigin {
    pub x: i64,
    pub y: i64,
}

impl PatchOrigin {
    /// Origin of a `size`-wide patch centered on `(x_center, y_center)`.
    ///
    /// The half size is subtracted in floating point and the result is
    /// truncated toward zero, so odd sizes and negative origins round the
    /// same way for every caller.
    pub fn from_center(x_center: i64, y_center: i64, size: u32) -> Self {
        let half = size as f64 / 2.0;
        Self {
            x: (x_center as f64 - half).trunc() as i64,
            y: (y_center as f64 - half).trunc() as i64,
        }
    }

    pub fn of(coordinate: &Coordinate, size: u32) -> Self {
        Self::from_center(coordinate.x_center, coordinate.y_center, size)
    }
}

/// Validated sizes of a stored patch, its grid cells and the per-cell crop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridGeometry {
    img_size: u32,
    patch_size: u32,
    crop_size: u32,
}

impl GridGeometry {
    pub fn new(img_size: u32, patch_size: u32, crop_size: u32) -> Result<Self> {
        if patch_size == 0 || img_size == 0 {
            return Err(GridError::InvalidConfig(format!(
                "image size and patch size must be positive: {} / {}",
                img_size, patch_size
            )));
        }
        if img_size % patch_size != 0 {
            return Err(GridError::InvalidConfig(format!(
                "image size is not a multiple of patch size: {} / {}",
                img_size, patch_size
            )));
        }
        if crop_size == 0 || crop_size > patch_size {
            return Err(GridError::InvalidConfig(format!(
                "crop size must be in 1..={}, got {}",
                patch_size, crop_size
            )));
        }
        Ok(Self {
            img_size,
            patch_size,
            crop_size,
        })
    }

    pub fn img_size(&self) -> u32 {
        self.img_size
    }

    pub fn patch_size(&self) -> u32 {
        self.patch_size
    }

    pub fn crop_size(&self) -> u32 {
        self.crop_size
    }

    /// Number of grid cells along one side of the patch
    pub fn patch_per_side(&self) -> usize {
        (self.img_size / self.patch_size) as usize
    }

    /// Total number of grid cells
    pub fn grid_size(&self) -> usize {
        self.patch_per_side() * self.patch_per_side()
    }

    /// Offset of the center of cell `idx` from the patch edge, truncated.
    pub fn cell_center_offset(&self, idx: usize) -> i64 {
        ((idx as f64 + 0.5) * self.patch_size as f64).trunc() as i64
    }

    /// Pixel range of the centered crop of cell `idx` along one axis.
    pub fn crop_range(&self, idx: usize) -> Range<u32> {
        let start = ((idx as f64 + 0.5) * self.patch_size as f64 - self.crop_size as f64 / 2.0)
            .floor() as u32;
        start..start + self.crop_size
    }
}

/// Square matrix of binary labels, indexed `(row, column)`.
///
/// Rows follow the slide's y axis and columns its x axis, the same layout
/// as the raster rows and columns of the patch it labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelGrid {
    cells: Array2<u8>,
}

impl LabelGrid {
    pub fn zeros(side: usize) -> Self {
        Self {
            cells: Array2::zeros((side, side)),
        }
    }

    pub fn from_fn<F>(side: usize, mut f: F) -> Self
    where
        F: FnMut(usize, usize) -> bool,
    {
        Self {
            cells: Array2::from_shape_fn((side, side), |(r, c)| f(r, c) as u8),
        }
    }

    pub fn side(&self) -> usize {
        self.cells.nrows()
    }

    /// # Panics
    ///
    /// Panics if `row` or `col` is not below [`side`](Self::side).
    pub fn get(&self, row: usize, col: usize) -> u8 {
        self.cells[[row, col]]
    }

    /// # Panics
    ///
    /// Panics if `row` or `col` is not below [`side`](Self::side).
    pub fn set(&mut self, row: usize, col: usize, inside: bool) {
        self.cells[[row, col]] = inside as u8;
    }

    pub fn positives(&self) -> usize {
        self.cells.iter().filter(|&&v| v == 1).count()
    }

    /// Mirror left-right: column `c` moves to `side - 1 - c`.
    pub fn flip_horizontal(&self) -> Self {
        let n = self.side();
        Self::from_fn(n, |r, c| self.get(r, n - 1 - c) == 1)
    }

    /// Rotate counter-clockwise by `quarter_turns` × 90°.
    pub fn rotate_ccw(&self, quarter_turns: u8) -> Self {
        let n = self.side();
        let mut grid = self.clone();
        for _ in 0..quarter_turns % 4 {
            grid = Self::from_fn(n, |r, c| grid.get(c, n - 1 - r) == 1);
        }
        grid
    }
}

/// One flattened training sample: `grid_size` crops and their labels,
/// aligned index for index.
#[derive(Debug, Clone)]
pub struct GridSample {
    /// Crops in `(grid_size, 3, crop_size, crop_size)` channel-first layout
    pub crops: Array4<f32>,
    /// One label per crop, 0.0 or 1.0
    pub labels: Array1<f32>,
    /// Geometric transform applied to both the image and the labels
    pub transform: GeometricTransform,
}

impl GridSample {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Crop `cell` back as an image. `normalized` undoes `(v - 128) / 128`.
    ///
    /// # Panics
    ///
    /// Panics if `cell` is not below [`len`](Self::len).
    pub fn crop_image(&self, cell: usize, normalized: bool) -> RgbImage {
        let crop = self.crops.index_axis(Axis(0), cell);
        let (height, width) = (crop.shape()[1] as u32, crop.shape()[2] as u32);
        RgbImage::from_fn(width, height, |x, y| {
            Rgb(std::array::from_fn(|channel| {
                let v = crop[[channel, y as usize, x as usize]];
                let v = if normalized { v * 128.0 + 128.0 } else { v };
                v.round().clamp(0.0, 255.0) as u8
            }))
        })
    }
}
