use image::RgbImage;
use ndarray::{Array1, Array4};

use crate::{
    error::{GridError, Result},
    types::{GridGeometry, LabelGrid},
};

/// Cuts the centered crop of every grid cell and flattens crops and labels
/// in row-major cell order: sample `i` is cell `(i / side, i % side)`.
#[derive(Debug, Clone, Copy)]
pub struct CropFlattener {
    geometry: GridGeometry,
    normalize: bool,
}

impl CropFlattener {
    pub fn new(geometry: GridGeometry, normalize: bool) -> Self {
        Self {
            geometry,
            normalize,
        }
    }

    /// Map `[0, 255]` onto `[-1, 1)` as `(v - 128) / 128`
    pub fn normalize_value(v: u8) -> f32 {
        (v as f32 - 128.0) / 128.0
    }

    pub fn flatten(&self, image: &RgbImage, labels: &LabelGrid) -> Result<(Array4<f32>, Array1<f32>)> {
        let img_size = self.geometry.img_size();
        if image.dimensions() != (img_size, img_size) {
            return Err(GridError::InvalidConfig(format!(
                "image is {}x{}, grid expects {}x{}",
                image.width(),
                image.height(),
                img_size,
                img_size
            )));
        }
        let side = self.geometry.patch_per_side();
        if labels.side() != side {
            return Err(GridError::InvalidConfig(format!(
                "label grid is {}x{}, geometry expects {}x{}",
                labels.side(),
                labels.side(),
                side,
                side
            )));
        }

        let crop = self.geometry.crop_size() as usize;
        let starts: Vec<u32> = (0..side).map(|idx| self.geometry.crop_range(idx).start).collect();

        let crops = Array4::from_shape_fn(
            (self.geometry.grid_size(), 3, crop, crop),
            |(i, channel, dy, dx)| {
                let (row, col) = (i / side, i % side);
                let x = starts[col] + dx as u32;
                let y = starts[row] + dy as u32;
                let value = image.get_pixel(x, y)[channel];
                if self.normalize {
                    Self::normalize_value(value)
                } else {
                    value as f32
                }
            },
        );
        let flat_labels = Array1::from_shape_fn(self.geometry.grid_size(), |i| {
            labels.get(i / side, i % side) as f32
        });

        Ok((crops, flat_labels))
    }
}
