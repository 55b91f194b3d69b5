use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    #[error("Malformed coordinate on line {line}: {content:?} ({reason})")]
    MalformedCoordinate {
        line: usize,
        content: String,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid annotation in {path}: {reason}")]
    InvalidAnnotation { path: PathBuf, reason: String },

    #[error("No annotations loaded for slide {0}")]
    MissingAnnotation(String),

    #[error("Failed to open slide {slide_id} at {path}: {reason}")]
    SlideOpen {
        slide_id: String,
        path: PathBuf,
        reason: String,
    },

    #[error("Index {index} out of range for dataset of size {size}")]
    IndexOutOfRange { index: usize, size: usize },

    #[error("Stored patch {path} is {width}x{height}, expected {expected}x{expected}")]
    PatchSize {
        path: PathBuf,
        width: u32,
        height: u32,
        expected: u32,
    },

    #[error("Extraction of item {index} failed: {source}")]
    ItemFailed {
        index: usize,
        #[source]
        source: Box<GridError>,
    },

    #[error("Extraction worker panicked")]
    WorkerPanicked,
}

pub type Result<T> = std::result::Result<T, GridError>;
