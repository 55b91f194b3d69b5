use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};
use tempfile::TempDir;
use wsi_grid::{
    ColorJitterConfig, Dataset, DatasetConfig, ExtractConfig, GridDataset, PatchExtractor,
};

const LIST: &str = "Tumor_001,64,64\nTumor_001,112,112\nTumor_001,200,40\n";

/// 256px slide, white tissue left of x = 128, black background elsewhere
fn write_slide(dir: &Path) {
    let slide = RgbImage::from_fn(256, 256, |x, _| {
        if x < 128 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
    });
    slide.save(dir.join("Tumor_001.png")).expect("Should write slide");
}

fn write_annotation(dir: &Path) {
    let annotation = r#"{
        "positive": [
            {"name": "Annotation 0", "vertices": [[0, 0], [128, 0], [128, 256], [0, 256]]}
        ],
        "negative": []
    }"#;
    fs::write(dir.join("Tumor_001.json"), annotation).expect("Should write annotation");
}

fn extract(root: &Path, output: &str) -> ExtractConfig {
    let mut config = ExtractConfig::new(root.join("wsi"), root.join("coords.txt"), root.join(output));
    config.patch_size = 96;
    config.num_workers = 1;
    config.slide_extension = "png".to_string();
    config
}

fn setup() -> TempDir {
    let root = TempDir::new().expect("Should create temp dir");
    fs::create_dir_all(root.path().join("wsi")).expect("Should create slide dir");
    fs::create_dir_all(root.path().join("annotations")).expect("Should create annotation dir");
    write_slide(&root.path().join("wsi"));
    write_annotation(&root.path().join("annotations"));
    fs::write(root.path().join("coords.txt"), LIST).expect("Should write coordinates");
    root
}

#[test]
fn single_worker_extraction_is_deterministic() {
    let root = setup();

    for output in ["run_a", "run_b"] {
        let report = PatchExtractor::from_config(extract(root.path(), output))
            .run()
            .expect("Should extract");
        assert_eq!(report.total, 3);
        assert!(report.is_complete());
    }

    for file in ["0.png", "1.png", "2.png", "list.txt"] {
        let a = fs::read(root.path().join("run_a").join(file)).expect("Should read first run");
        let b = fs::read(root.path().join("run_b").join(file)).expect("Should read second run");
        assert_eq!(a, b, "{} differs between runs", file);
    }
    assert_eq!(
        fs::read_to_string(root.path().join("run_a/list.txt")).expect("Should read list"),
        LIST
    );
}

#[test]
fn dataset_reads_extracted_patches() {
    let root = setup();
    let mut config = extract(root.path(), "patches");
    config.num_workers = 3;
    PatchExtractor::from_config(config).run().expect("Should extract");

    let mut dataset_config = DatasetConfig::new(root.path().join("patches"), root.path().join("annotations"));
    dataset_config.img_size = 96;
    dataset_config.patch_size = 32;
    dataset_config.crop_size = 28;
    dataset_config.normalize = false;
    dataset_config.seed = Some(42);
    dataset_config.jitter = ColorJitterConfig {
        brightness: 0.0,
        contrast: 0.0,
        saturation: 0.0,
        hue: 0.0,
    };
    let dataset = GridDataset::new(dataset_config).expect("Should load dataset");
    assert_eq!(dataset.size(), 3);

    // Patch 0 lies entirely in tissue, patch 2 entirely outside, and patch 1
    // has two tissue columns out of three
    let expected_positives = [9.0, 6.0, 0.0];
    for (index, positives) in expected_positives.into_iter().enumerate() {
        for _ in 0..8 {
            let sample = dataset.get(index).expect("Should fetch");
            assert_eq!(sample.crops.shape(), &[9, 3, 28, 28]);
            assert_eq!(sample.labels.sum(), positives);

            for cell in 0..sample.len() {
                let white = sample.crops[[cell, 0, 14, 14]] == 255.0;
                assert_eq!(
                    white,
                    sample.labels[cell] == 1.0,
                    "sample {} cell {} misaligned under {:?}",
                    index,
                    cell,
                    sample.transform
                );
            }
        }
    }
}
