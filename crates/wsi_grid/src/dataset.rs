use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use image::RgbImage;
use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{info, warn};

use crate::{
    annotation::AnnotationSet,
    augment::AugmentationPipeline,
    config::DatasetConfig,
    coords::read_coordinates,
    crop::CropFlattener,
    error::{GridError, Result},
    extract::LIST_FILE,
    grid::GridLabelBuilder,
    traits::Dataset,
    types::{Coordinate, GridGeometry, GridSample, LabelGrid, PatchOrigin},
};

/// Indexable view over an extraction output directory.
///
/// Sample `i` is the stored patch `<i>.<ext>` together with the label grid
/// of its slide's annotations, augmented and cut into per-cell crops. All
/// shared state is read-only after construction, so `get` may be called
/// from several threads at once.
pub struct GridDataset {
    config: DatasetConfig,
    geometry: GridGeometry,
    coordinates: Vec<Coordinate>,
    annotations: AnnotationSet,
    labels: GridLabelBuilder,
    augmentation: AugmentationPipeline,
    flattener: CropFlattener,
    seed: u64,
    draws: AtomicU64,
}

impl GridDataset {
    /// Load `list.txt` from the data directory and every annotation file
    /// from the annotation directory.
    pub fn new(config: DatasetConfig) -> Result<Self> {
        config.validate()?;
        let coordinates = read_coordinates(config.data_dir.join(LIST_FILE))?;
        let annotations = AnnotationSet::from_dir(&config.annotation_dir)?;
        Self::from_parts(config, coordinates, annotations)
    }

    pub fn from_parts(
        config: DatasetConfig,
        coordinates: Vec<Coordinate>,
        annotations: AnnotationSet,
    ) -> Result<Self> {
        config.validate()?;
        let geometry = config.geometry()?;

        let mut unannotated: Vec<&str> = coordinates
            .iter()
            .map(|c| c.slide_id.as_str())
            .filter(|id| !annotations.contains_slide(id))
            .collect();
        unannotated.sort_unstable();
        unannotated.dedup();
        if !unannotated.is_empty() {
            warn!(
                "{} slides have no annotations, their samples will fail: {}",
                unannotated.len(),
                unannotated.join(", ")
            );
        }

        let seed = config.seed.unwrap_or_else(|| rand::rng().random());
        let augmentation = AugmentationPipeline::standard(config.jitter);
        info!(
            "Grid dataset: {} samples, {}x{} grid of {}px crops, seed {}",
            coordinates.len(),
            geometry.patch_per_side(),
            geometry.patch_per_side(),
            geometry.crop_size(),
            seed
        );

        Ok(Self {
            labels: GridLabelBuilder::new(geometry),
            flattener: CropFlattener::new(geometry, config.normalize),
            config,
            geometry,
            coordinates,
            annotations,
            augmentation,
            seed,
            draws: AtomicU64::new(0),
        })
    }

    /// Replace the default jitter/mirror/rotation pipeline
    pub fn with_augmentation(mut self, augmentation: AugmentationPipeline) -> Self {
        self.augmentation = augmentation;
        self
    }

    pub fn geometry(&self) -> GridGeometry {
        self.geometry
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn coordinate(&self, index: usize) -> Option<&Coordinate> {
        self.coordinates.get(index)
    }

    pub fn patch_path(&self, index: usize) -> PathBuf {
        self.config
            .data_dir
            .join(format!("{}.{}", index, self.config.patch_format.extension()))
    }

    fn checked_coordinate(&self, index: usize) -> Result<&Coordinate> {
        self.coordinates
            .get(index)
            .ok_or(GridError::IndexOutOfRange {
                index,
                size: self.coordinates.len(),
            })
    }

    /// Stored patch of `index` as RGB, checked against the configured size
    pub fn load_patch(&self, index: usize) -> Result<RgbImage> {
        self.checked_coordinate(index)?;
        let path = self.patch_path(index);
        let image = image::open(&path)?.to_rgb8();

        let expected = self.geometry.img_size();
        if image.dimensions() != (expected, expected) {
            return Err(GridError::PatchSize {
                path,
                width: image.width(),
                height: image.height(),
                expected,
            });
        }
        Ok(image)
    }

    /// Label grid of `index` before any augmentation
    pub fn label_grid(&self, index: usize) -> Result<LabelGrid> {
        let coordinate = self.checked_coordinate(index)?;
        let regions = self.annotations.get(&coordinate.slide_id)?;
        let origin = PatchOrigin::of(coordinate, self.geometry.img_size());
        Ok(self.labels.build(origin, regions))
    }

    /// Build sample `index` drawing augmentation choices from `rng`.
    pub fn get_with_rng(&self, index: usize, rng: &mut dyn RngCore) -> Result<GridSample> {
        let labels = self.label_grid(index)?;
        let image = self.load_patch(index)?;

        let augmented = self.augmentation.apply(image, &labels, rng);
        let (crops, labels) = self.flattener.flatten(&augmented.image, &augmented.labels)?;

        Ok(GridSample {
            crops,
            labels,
            transform: augmented.transform,
        })
    }

    /// Generator for the next fetch: the base seed on a stream no other
    /// fetch of this dataset uses.
    fn next_rng(&self) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(self.draws.fetch_add(1, Ordering::Relaxed));
        rng
    }
}

impl Dataset for GridDataset {
    type Item = GridSample;

    fn size(&self) -> usize {
        self.coordinates.len()
    }

    fn get(&self, index: usize) -> Result<GridSample> {
        let mut rng = self.next_rng();
        self.get_with_rng(index, &mut rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationIndex;
    use crate::augment::GeometricTransform;
    use crate::config::ColorJitterConfig;
    use geo_types::polygon;
    use image::Rgb;
    use tempfile::TempDir;

    const SIDE: u32 = 12;

    fn coordinate(slide_id: &str) -> Coordinate {
        Coordinate {
            slide_id: slide_id.to_string(),
            x_center: 6,
            y_center: 6,
        }
    }

    /// 12px patches, 3x3 cells of 4px, 2px crops, no jitter
    fn config(dir: &TempDir) -> DatasetConfig {
        let mut config = DatasetConfig::new(dir.path(), dir.path());
        config.img_size = SIDE;
        config.patch_size = 4;
        config.crop_size = 2;
        config.normalize = false;
        config.seed = Some(5);
        config.jitter = ColorJitterConfig {
            brightness: 0.0,
            contrast: 0.0,
            saturation: 0.0,
            hue: 0.0,
        };
        config
    }

    /// Annotated region covering the left column of cells (x < 4)
    fn annotations() -> AnnotationSet {
        AnnotationSet::new().with_slide(
            "Tumor_001",
            AnnotationIndex::new(
                vec![polygon![
                    (x: -1.0, y: -1.0),
                    (x: 3.0, y: -1.0),
                    (x: 3.0, y: 13.0),
                    (x: -1.0, y: 13.0),
                ]],
                vec![],
            ),
        )
    }

    /// Patch whose left column of cells is white, the rest black
    fn write_patch(dir: &TempDir, index: usize, side: u32) {
        let image = RgbImage::from_fn(side, side, |x, _| {
            if x < 4 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
        });
        image
            .save(dir.path().join(format!("{}.png", index)))
            .expect("Should write patch");
    }

    #[test]
    fn test_identity_sample() {
        let dir = TempDir::new().expect("Should create temp dir");
        write_patch(&dir, 0, SIDE);
        let dataset = GridDataset::from_parts(config(&dir), vec![coordinate("Tumor_001")], annotations())
            .expect("Should build")
            .with_augmentation(AugmentationPipeline::none());

        assert_eq!(dataset.size(), 1);
        let sample = dataset.get(0).expect("Should fetch");
        assert_eq!(sample.crops.shape(), &[9, 3, 2, 2]);
        assert_eq!(sample.transform, GeometricTransform::identity());

        // Left column cells are 0, 3 and 6
        assert_eq!(sample.labels.to_vec(), vec![1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);
        assert_eq!(sample.crops[[3, 0, 0, 0]], 255.0);
        assert_eq!(sample.crops[[4, 0, 0, 0]], 0.0);
    }

    #[test]
    fn test_augmented_crops_follow_labels() {
        let dir = TempDir::new().expect("Should create temp dir");
        write_patch(&dir, 0, SIDE);
        let dataset = GridDataset::from_parts(config(&dir), vec![coordinate("Tumor_001")], annotations())
            .expect("Should build");

        for _ in 0..32 {
            let sample = dataset.get(0).expect("Should fetch");
            for i in 0..sample.len() {
                let white = sample.crops[[i, 0, 0, 0]] == 255.0;
                assert_eq!(white, sample.labels[i] == 1.0, "cell {} under {:?}", i, sample.transform);
            }
        }
    }

    #[test]
    fn test_explicit_rng_is_reproducible() {
        let dir = TempDir::new().expect("Should create temp dir");
        write_patch(&dir, 0, SIDE);
        let dataset = GridDataset::from_parts(config(&dir), vec![coordinate("Tumor_001")], annotations())
            .expect("Should build");

        let a = dataset
            .get_with_rng(0, &mut ChaCha8Rng::seed_from_u64(9))
            .expect("Should fetch");
        let b = dataset
            .get_with_rng(0, &mut ChaCha8Rng::seed_from_u64(9))
            .expect("Should fetch");
        assert_eq!(a.transform, b.transform);
        assert_eq!(a.labels, b.labels);
    }

    #[test]
    fn test_concurrent_fetches_stay_aligned() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<GridDataset>();

        let dir = TempDir::new().expect("Should create temp dir");
        write_patch(&dir, 0, SIDE);
        let dataset = GridDataset::from_parts(config(&dir), vec![coordinate("Tumor_001")], annotations())
            .expect("Should build");

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    scope.spawn(|| {
                        (0..8)
                            .map(|_| dataset.get(0).expect("Should fetch"))
                            .collect::<Vec<_>>()
                    })
                })
                .collect();

            for handle in handles {
                for sample in handle.join().expect("Fetching thread panicked") {
                    for i in 0..sample.len() {
                        let white = sample.crops[[i, 0, 0, 0]] == 255.0;
                        assert_eq!(white, sample.labels[i] == 1.0, "cell {} under {:?}", i, sample.transform);
                    }
                }
            }
        });
    }

    #[test]
    fn test_repeated_fetches_draw_fresh_transforms() {
        let dir = TempDir::new().expect("Should create temp dir");
        write_patch(&dir, 0, SIDE);
        let build = || {
            GridDataset::from_parts(config(&dir), vec![coordinate("Tumor_001")], annotations())
                .expect("Should build")
        };

        let transforms = |dataset: &GridDataset| -> Vec<GeometricTransform> {
            (0..32)
                .map(|_| dataset.get(0).expect("Should fetch").transform)
                .collect()
        };

        let first = transforms(&build());
        let distinct: std::collections::HashSet<_> = first.iter().map(|t| (t.mirror, t.rotations)).collect();
        assert!(distinct.len() > 1, "every fetch drew {:?}", first[0]);

        // Same seed, same sequence of draws
        assert_eq!(transforms(&build()), first);
    }

    #[test]
    fn test_fetch_errors() {
        let dir = TempDir::new().expect("Should create temp dir");
        write_patch(&dir, 0, SIDE);
        write_patch(&dir, 1, 16);
        let coordinates = vec![coordinate("Tumor_001"), coordinate("Tumor_001"), coordinate("Normal_002")];
        let dataset = GridDataset::from_parts(config(&dir), coordinates, annotations()).expect("Should build");

        assert!(matches!(
            dataset.get(3),
            Err(GridError::IndexOutOfRange { index: 3, size: 3 })
        ));
        assert!(matches!(
            dataset.get(1),
            Err(GridError::PatchSize { width: 16, expected: 12, .. })
        ));
        assert!(matches!(dataset.get(2), Err(GridError::MissingAnnotation(_))));
    }

    #[test]
    fn test_rejects_bad_geometry() {
        let dir = TempDir::new().expect("Should create temp dir");
        let mut config = config(&dir);
        config.patch_size = 5;
        assert!(GridDataset::from_parts(config, vec![], AnnotationSet::new()).is_err());
    }
}
