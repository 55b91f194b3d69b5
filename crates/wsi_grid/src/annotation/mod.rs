//! Polygon annotations and point-containment queries.
//!
//! Each slide owns one [`AnnotationIndex`] of inclusion and exclusion
//! polygons in level-0 pixel space. A point is annotated when at least one
//! inclusion polygon covers it and no exclusion polygon does.

pub mod io;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use geo::coordinate_position::{CoordPos, CoordinatePosition};
use geo_types::{Coord, Polygon};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::{debug, info};

use crate::{
    error::{GridError, Result},
    traits::RegionIndex,
};

/// Serialized annotation layouts understood by the loaders
#[derive(
    Debug, Clone, Copy,
    Serialize, Deserialize, JsonSchema,
    Display, EnumString,
    PartialEq, Eq
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AnnotationFormat {
    /// `{"positive": [{"name", "vertices"}], "negative": [...]}`
    Json,
    /// FeatureCollection of polygons, `"exclude": true` marks exclusions
    Geojson,
}

/// Annotated regions of one slide
#[derive(Debug, Clone, Default)]
pub struct AnnotationIndex {
    inclusions: Vec<Polygon<f64>>,
    exclusions: Vec<Polygon<f64>>,
}

impl AnnotationIndex {
    pub fn new(inclusions: Vec<Polygon<f64>>, exclusions: Vec<Polygon<f64>>) -> Self {
        Self {
            inclusions,
            exclusions,
        }
    }

    /// Load one annotation file, picking the format from its content.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)?;
        match io::detect_format(path, &content)? {
            AnnotationFormat::Json => io::parse_polygon_json(&content, path),
            AnnotationFormat::Geojson => io::parse_geojson(&content, path),
        }
    }

    pub fn inclusions(&self) -> &[Polygon<f64>] {
        &self.inclusions
    }

    pub fn exclusions(&self) -> &[Polygon<f64>] {
        &self.exclusions
    }

    pub fn is_empty(&self) -> bool {
        self.inclusions.is_empty()
    }
}

fn covers(polygon: &Polygon<f64>, coord: &Coord<f64>, include_boundary: bool) -> bool {
    match polygon.coordinate_position(coord) {
        CoordPos::Inside => true,
        CoordPos::OnBoundary => include_boundary,
        CoordPos::Outside => false,
    }
}

impl RegionIndex for AnnotationIndex {
    fn contains_point(&self, x: f64, y: f64, include_boundary: bool) -> bool {
        let coord = Coord { x, y };
        // Exclusions follow the same boundary rule as inclusions
        self.inclusions
            .iter()
            .any(|polygon| covers(polygon, &coord, include_boundary))
            && !self
                .exclusions
                .iter()
                .any(|polygon| covers(polygon, &coord, include_boundary))
    }
}

/// Annotation indices keyed by slide id. Immutable once built.
#[derive(Debug, Clone, Default)]
pub struct AnnotationSet {
    slides: HashMap<String, AnnotationIndex>,
}

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every `*.json` / `*.geojson` file of `dir`, keyed by file stem.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let mut slides = HashMap::new();

        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let is_annotation = matches!(
                path.extension().and_then(|ext| ext.to_str()),
                Some("json") | Some("geojson")
            );
            if !is_annotation {
                continue;
            }
            let Some(slide_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };

            let index = AnnotationIndex::from_file(&path)?;
            debug!(
                "Loaded {} inclusion / {} exclusion polygons for {}",
                index.inclusions.len(),
                index.exclusions.len(),
                slide_id
            );
            slides.insert(slide_id.to_string(), index);
        }

        info!("Loaded annotations for {} slides from {}", slides.len(), dir.display());
        Ok(Self { slides })
    }

    pub fn with_slide(mut self, slide_id: impl Into<String>, index: AnnotationIndex) -> Self {
        self.slides.insert(slide_id.into(), index);
        self
    }

    pub fn get(&self, slide_id: &str) -> Result<&AnnotationIndex> {
        self.slides
            .get(slide_id)
            .ok_or_else(|| GridError::MissingAnnotation(slide_id.to_string()))
    }

    pub fn contains_slide(&self, slide_id: &str) -> bool {
        self.slides.contains_key(slide_id)
    }

    pub fn len(&self) -> usize {
        self.slides.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slides.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo_types::polygon;

    fn square(min: f64, max: f64) -> Polygon<f64> {
        polygon![
            (x: min, y: min),
            (x: max, y: min),
            (x: max, y: max),
            (x: min, y: max),
        ]
    }

    #[test]
    fn test_contains_point_boundary_rule() {
        let index = AnnotationIndex::new(vec![square(0.0, 10.0)], vec![]);

        for include_boundary in [true, false] {
            assert!(index.contains_point(5.0, 5.0, include_boundary));
            assert!(!index.contains_point(15.0, 15.0, include_boundary));
        }

        assert!(index.contains_point(10.0, 5.0, true), "edge point counts with boundary");
        assert!(!index.contains_point(10.0, 5.0, false), "edge point excluded without boundary");
        assert!(index.contains_point(0.0, 0.0, true), "vertex is on the boundary");
        assert!(!index.contains_point(0.0, 0.0, false));
    }

    #[test]
    fn test_any_inclusion_polygon_matches() {
        let index = AnnotationIndex::new(vec![square(0.0, 10.0), square(20.0, 30.0)], vec![]);
        assert!(index.contains_point(25.0, 25.0, false));
        assert!(!index.contains_point(15.0, 15.0, true));
    }

    #[test]
    fn test_exclusion_overrides_inclusion() {
        let index = AnnotationIndex::new(vec![square(0.0, 10.0)], vec![square(2.0, 4.0)]);
        assert!(!index.contains_point(3.0, 3.0, true));
        assert!(!index.contains_point(3.0, 3.0, false));
        assert!(index.contains_point(6.0, 6.0, true));

        // On the exclusion edge: excluded only when edges count
        assert!(!index.contains_point(4.0, 3.0, true));
        assert!(index.contains_point(4.0, 3.0, false));
    }

    #[test]
    fn test_missing_slide() {
        let set = AnnotationSet::new().with_slide("Tumor_001", AnnotationIndex::default());
        assert!(set.get("Tumor_001").is_ok());
        assert!(matches!(
            set.get("Normal_001").unwrap_err(),
            GridError::MissingAnnotation(_)
        ));
    }
}
