//! # WSI Grid Library
//!
//! Training data preparation for patch-level tissue classifiers on
//! whole-slide images.
//!
//! ## Core Features
//!
//! - **Patch Extraction**: sample fixed-size patches at listed coordinates with a worker pool
//! - **Grid Labels**: label each sub-cell of a patch by polygon containment at its center
//! - **Aligned Augmentation**: jitter colors, then mirror and rotate image and labels together
//! - **Crop Flattening**: cut a centered crop per cell into a `(cells, 3, crop, crop)` tensor
//! - **Annotations**: vertex-list JSON and GeoJSON polygons with exclusion regions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wsi_grid::{Dataset, DatasetConfig, ExtractConfig, GridDataset, PatchExtractor};
//!
//! // Offline: sample one 768px patch per coordinate
//! let extract = ExtractConfig::new("wsi", "tumor_train.txt", "patches/tumor");
//! let report = PatchExtractor::from_config(extract).run()?;
//! println!("{} patches written", report.completed);
//!
//! // Training time: 3x3 grid of 224px crops per patch
//! let dataset = GridDataset::new(DatasetConfig::new("patches/tumor", "annotations"))?;
//! let sample = dataset.get(0)?;
//! assert_eq!(sample.crops.shape(), &[9, 3, 224, 224]);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod error;
pub mod types;
pub mod traits;
pub mod config;
pub mod coords;
pub mod slide;
pub mod annotation;
pub mod grid;
pub mod augment;
pub mod crop;
pub mod extract;
pub mod dataset;

pub use error::{GridError, Result};
pub use types::{Coordinate, GridGeometry, GridSample, LabelGrid, PatchOrigin};
pub use traits::*;
pub use config::{ColorJitterConfig, DatasetConfig, ExtractConfig, FailurePolicy, PatchFormat};
pub use annotation::{AnnotationFormat, AnnotationIndex, AnnotationSet};
pub use augment::{AugmentationBuilder, AugmentationPipeline, ColorJitter, GeometricTransform};
pub use crop::CropFlattener;
pub use extract::{ExtractionReport, PatchExtractor};
pub use dataset::GridDataset;
pub use grid::GridLabelBuilder;
pub use slide::{RasterSlide, RasterSlideOpener};
