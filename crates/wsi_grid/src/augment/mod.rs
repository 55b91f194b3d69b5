//! Per-fetch augmentation of a patch and its label grid.
//!
//! Photometric steps touch the image only. The geometric step is drawn once
//! as a [`GeometricTransform`] and that single value is applied to both the
//! image and the labels, so the two can never disagree.

pub mod jitter;

pub use jitter::ColorJitter;

use image::RgbImage;
use image::imageops::{flip_horizontal, rotate180, rotate270, rotate90};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};

use crate::{config::ColorJitterConfig, traits::PhotometricTransform, types::LabelGrid};

/// Mirror then rotate counter-clockwise by `rotations` quarter turns
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometricTransform {
    pub mirror: bool,
    pub rotations: u8,
}

impl GeometricTransform {
    pub fn identity() -> Self {
        Self::default()
    }

    pub fn new(mirror: bool, rotations: u8) -> Self {
        Self {
            mirror,
            rotations: rotations % 4,
        }
    }

    /// Draw a transform: a fair coin for the mirror, a uniform quarter-turn
    /// count in `0..4`. Disabled steps draw nothing.
    pub fn sample(rng: &mut dyn RngCore, mirror: bool, rotate: bool) -> Self {
        let mirror = mirror && rng.random_bool(0.5);
        let rotations = if rotate { rng.random_range(0..4u8) } else { 0 };
        Self { mirror, rotations }
    }

    pub fn apply_image(&self, image: &RgbImage) -> RgbImage {
        let image = if self.mirror {
            flip_horizontal(image)
        } else {
            image.clone()
        };
        match self.rotations % 4 {
            1 => rotate270(&image),
            2 => rotate180(&image),
            3 => rotate90(&image),
            _ => image,
        }
    }

    pub fn apply_labels(&self, labels: &LabelGrid) -> LabelGrid {
        let labels = if self.mirror {
            labels.flip_horizontal()
        } else {
            labels.clone()
        };
        labels.rotate_ccw(self.rotations)
    }
}

/// Output of one augmentation pass
#[derive(Debug, Clone)]
pub struct Augmented {
    pub image: RgbImage,
    pub labels: LabelGrid,
    pub transform: GeometricTransform,
}

pub struct AugmentationPipeline {
    photometric: Vec<Box<dyn PhotometricTransform>>,
    mirror: bool,
    rotate: bool,
}

impl AugmentationPipeline {
    pub fn builder() -> AugmentationBuilder {
        AugmentationBuilder::new()
    }

    /// Color jitter, random mirror and random quarter-turn rotation
    pub fn standard(jitter: ColorJitterConfig) -> Self {
        Self::builder()
            .with_color_jitter(jitter)
            .with_mirror(true)
            .with_rotation(true)
            .build()
    }

    /// Pass-through pipeline
    pub fn none() -> Self {
        Self::builder().build()
    }

    /// Jitter the image, then draw one geometric transform and apply it to
    /// both the image and the labels.
    pub fn apply(&self, mut image: RgbImage, labels: &LabelGrid, rng: &mut dyn RngCore) -> Augmented {
        for step in &self.photometric {
            step.apply(&mut image, rng);
        }
        let transform = GeometricTransform::sample(rng, self.mirror, self.rotate);
        self.apply_transform(&image, labels, transform)
    }

    /// Apply a given transform to both image and labels, no randomness.
    pub fn apply_transform(
        &self,
        image: &RgbImage,
        labels: &LabelGrid,
        transform: GeometricTransform,
    ) -> Augmented {
        Augmented {
            image: transform.apply_image(image),
            labels: transform.apply_labels(labels),
            transform,
        }
    }
}

/// Builder for [`AugmentationPipeline`] with a fluent API
pub struct AugmentationBuilder {
    photometric: Vec<Box<dyn PhotometricTransform>>,
    mirror: bool,
    rotate: bool,
}

impl AugmentationBuilder {
    pub fn new() -> Self {
        Self {
            photometric: Vec::new(),
            mirror: false,
            rotate: false,
        }
    }

    pub fn add_photometric<P>(mut self, step: P) -> Self
    where
        P: PhotometricTransform + 'static,
    {
        self.photometric.push(Box::new(step));
        self
    }

    pub fn with_color_jitter(self, config: ColorJitterConfig) -> Self {
        self.add_photometric(ColorJitter::new(config))
    }

    pub fn with_mirror(mut self, enabled: bool) -> Self {
        self.mirror = enabled;
        self
    }

    pub fn with_rotation(mut self, enabled: bool) -> Self {
        self.rotate = enabled;
        self
    }

    pub fn build(self) -> AugmentationPipeline {
        AugmentationPipeline {
            photometric: self.photometric,
            mirror: self.mirror,
            rotate: self.rotate,
        }
    }
}

impl Default for AugmentationBuilder {
    fn default() -> Self {
        Self::new()
    }
}
