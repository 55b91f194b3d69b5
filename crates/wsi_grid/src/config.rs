use std::path::PathBuf;

use image::ImageFormat;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{GridError, Result};
use crate::types::GridGeometry;

/// Raster format of the extracted patch files
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PatchFormat {
    #[default]
    Png,
    Jpeg,
    Tiff,
}

impl PatchFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Tiff => "tif",
        }
    }

    pub fn image_format(&self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Tiff => ImageFormat::Tiff,
        }
    }
}

/// What the extractor does when a single item fails
#[derive(
    Debug, Clone, Copy, Default,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop dispatching work and return the first failure
    #[default]
    Abort,
    /// Log the failure and keep going
    Skip,
}

/// Settings for the offline patch extraction run
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ExtractConfig {
    /// Directory holding the slide files
    pub slide_dir: PathBuf,
    /// Coordinate list, one `slide_id,x_center,y_center` per line
    pub coords_path: PathBuf,
    /// Directory receiving `<index>.<ext>` patches and `list.txt`
    pub output_dir: PathBuf,
    #[serde(default = "default_extract_patch_size")]
    pub patch_size: u32,
    #[serde(default)]
    pub level: u32,
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    #[serde(default = "default_slide_extension")]
    pub slide_extension: String,
    #[serde(default)]
    pub patch_format: PatchFormat,
    #[serde(default)]
    pub on_error: FailurePolicy,
}

fn default_extract_patch_size() -> u32 {
    768
}

fn default_num_workers() -> usize {
    5
}

fn default_slide_extension() -> String {
    "tif".to_string()
}

impl ExtractConfig {
    pub fn new(
        slide_dir: impl Into<PathBuf>,
        coords_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            slide_dir: slide_dir.into(),
            coords_path: coords_path.into(),
            output_dir: output_dir.into(),
            patch_size: default_extract_patch_size(),
            level: 0,
            num_workers: default_num_workers(),
            slide_extension: default_slide_extension(),
            patch_format: PatchFormat::default(),
            on_error: FailurePolicy::default(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.patch_size == 0 {
            return Err(GridError::InvalidConfig("patch size must be positive".to_string()));
        }
        if self.num_workers == 0 {
            return Err(GridError::InvalidConfig("worker count must be positive".to_string()));
        }
        Ok(())
    }
}

/// Bounds of the random photometric perturbation.
///
/// Brightness, contrast and saturation factors are drawn from
/// `[max(0, 1 - b), 1 + b]`; the hue shift from `[-hue, hue]` in
/// fractions of a full turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ColorJitterConfig {
    #[serde(default = "default_brightness")]
    pub brightness: f32,
    #[serde(default = "default_contrast")]
    pub contrast: f32,
    #[serde(default = "default_saturation")]
    pub saturation: f32,
    #[serde(default = "default_hue")]
    #[schemars(range(min = 0.0, max = 0.5))]
    pub hue: f32,
}

fn default_brightness() -> f32 {
    64.0 / 255.0
}

fn default_contrast() -> f32 {
    0.75
}

fn default_saturation() -> f32 {
    0.25
}

fn default_hue() -> f32 {
    0.04
}

impl Default for ColorJitterConfig {
    fn default() -> Self {
        Self {
            brightness: default_brightness(),
            contrast: default_contrast(),
            saturation: default_saturation(),
            hue: default_hue(),
        }
    }
}

impl ColorJitterConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("brightness", self.brightness),
            ("contrast", self.contrast),
            ("saturation", self.saturation),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(GridError::InvalidConfig(format!(
                    "{} jitter must be finite and non-negative, got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=0.5).contains(&self.hue) {
            return Err(GridError::InvalidConfig(format!(
                "hue jitter must be in [0, 0.5], got {}",
                self.hue
            )));
        }
        Ok(())
    }
}

/// Settings for the grid dataset read at training time
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct DatasetConfig {
    /// Output directory of a previous extraction run
    pub data_dir: PathBuf,
    /// Directory of per-slide annotation files
    pub annotation_dir: PathBuf,
    #[serde(default = "default_img_size")]
    pub img_size: u32,
    #[serde(default = "default_grid_patch_size")]
    pub patch_size: u32,
    #[serde(default = "default_crop_size")]
    pub crop_size: u32,
    #[serde(default = "default_normalize")]
    pub normalize: bool,
    #[serde(default = "default_patch_format")]
    pub patch_format: PatchFormat,
    /// Base seed for augmentation; drawn from the OS when absent
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub jitter: ColorJitterConfig,
}

fn default_img_size() -> u32 {
    768
}

fn default_grid_patch_size() -> u32 {
    256
}

fn default_crop_size() -> u32 {
    224
}

fn default_normalize() -> bool {
    true
}

fn default_patch_format() -> PatchFormat {
    PatchFormat::Png
}

impl DatasetConfig {
    pub fn new(data_dir: impl Into<PathBuf>, annotation_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            annotation_dir: annotation_dir.into(),
            img_size: default_img_size(),
            patch_size: default_grid_patch_size(),
            crop_size: default_crop_size(),
            normalize: default_normalize(),
            patch_format: default_patch_format(),
            seed: None,
            jitter: ColorJitterConfig::default(),
        }
    }

    pub fn geometry(&self) -> Result<GridGeometry> {
        GridGeometry::new(self.img_size, self.patch_size, self.crop_size)
    }

    pub fn validate(&self) -> Result<()> {
        self.geometry()?;
        self.jitter.validate()
    }
}
