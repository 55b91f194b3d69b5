use std::path::Path;

use geojson::{GeoJson, Geometry, Value};
use geo_types::{Coord, LineString, Polygon};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AnnotationFormat, AnnotationIndex};
use crate::error::{GridError, Result};

/// One named polygon of the vertex-list layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolygonRecord {
    #[serde(default)]
    pub name: String,
    pub vertices: Vec<[f64; 2]>,
}

/// Vertex-list layout: inclusion regions under `positive`, exclusions under
/// `negative`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolygonAnnotation {
    #[serde(default)]
    pub positive: Vec<PolygonRecord>,
    #[serde(default)]
    pub negative: Vec<PolygonRecord>,
}

/// `.geojson` files are GeoJSON. `.json` files are GeoJSON when the top-level
/// object carries a `type` member, vertex lists otherwise.
pub fn detect_format(path: &Path, content: &str) -> Result<AnnotationFormat> {
    if path.extension().and_then(|ext| ext.to_str()) == Some("geojson") {
        return Ok(AnnotationFormat::Geojson);
    }
    let value: serde_json::Value = serde_json::from_str(content)?;
    if value.get("type").is_some() {
        Ok(AnnotationFormat::Geojson)
    } else {
        Ok(AnnotationFormat::Json)
    }
}

pub fn parse_polygon_json(content: &str, path: &Path) -> Result<AnnotationIndex> {
    let annotation: PolygonAnnotation = serde_json::from_str(content)?;

    let to_polygons = |records: &[PolygonRecord]| -> Result<Vec<Polygon<f64>>> {
        records
            .iter()
            .map(|record| {
                let exterior = ring(record.vertices.iter().map(|&[x, y]| Coord { x, y }), path)
                    .map_err(|e| name_error(e, &record.name))?;
                Ok(Polygon::new(exterior, vec![]))
            })
            .collect()
    };

    Ok(AnnotationIndex::new(
        to_polygons(&annotation.positive)?,
        to_polygons(&annotation.negative)?,
    ))
}

pub fn parse_geojson(content: &str, path: &Path) -> Result<AnnotationIndex> {
    let geojson: GeoJson = content.parse()?;
    let mut inclusions = Vec::new();
    let mut exclusions = Vec::new();

    let mut push = |geometry: &Geometry, exclude: bool| -> Result<()> {
        let target = if exclude { &mut exclusions } else { &mut inclusions };
        match &geometry.value {
            Value::Polygon(rings) => target.push(polygon_from_rings(rings, path)?),
            Value::MultiPolygon(polygons) => {
                for rings in polygons {
                    target.push(polygon_from_rings(rings, path)?);
                }
            }
            _ => debug!("Skipping non-polygon geometry in {}", path.display()),
        }
        Ok(())
    };

    match &geojson {
        GeoJson::FeatureCollection(collection) => {
            for feature in &collection.features {
                let exclude = feature
                    .property("exclude")
                    .and_then(|v| v.as_bool())
                    .unwrap_or(false);
                if let Some(geometry) = &feature.geometry {
                    push(geometry, exclude)?;
                }
            }
        }
        GeoJson::Feature(feature) => {
            let exclude = feature
                .property("exclude")
                .and_then(|v| v.as_bool())
                .unwrap_or(false);
            if let Some(geometry) = &feature.geometry {
                push(geometry, exclude)?;
            }
        }
        GeoJson::Geometry(geometry) => push(geometry, false)?,
    }

    Ok(AnnotationIndex::new(inclusions, exclusions))
}

fn polygon_from_rings(rings: &[Vec<Vec<f64>>], path: &Path) -> Result<Polygon<f64>> {
    let mut rings = rings.iter().map(|positions| {
        ring(
            positions.iter().filter(|p| p.len() >= 2).map(|p| Coord { x: p[0], y: p[1] }),
            path,
        )
    });
    let exterior = rings.next().ok_or_else(|| GridError::InvalidAnnotation {
        path: path.to_path_buf(),
        reason: "polygon without rings".to_string(),
    })??;
    let holes = rings.collect::<Result<Vec<_>>>()?;
    Ok(Polygon::new(exterior, holes))
}

fn ring(coords: impl Iterator<Item = Coord<f64>>, path: &Path) -> Result<LineString<f64>> {
    let mut coords: Vec<Coord<f64>> = coords.collect();
    // A closing vertex repeating the first does not count
    if coords.len() > 1 && coords.first() == coords.last() {
        coords.pop();
    }
    if coords.len() < 3 {
        return Err(GridError::InvalidAnnotation {
            path: path.to_path_buf(),
            reason: format!("ring has {} distinct vertices, need at least 3", coords.len()),
        });
    }
    Ok(LineString::new(coords))
}

fn name_error(err: GridError, name: &str) -> GridError {
    match err {
        GridError::InvalidAnnotation { path, reason } if !name.is_empty() => {
            GridError::InvalidAnnotation {
                path,
                reason: format!("{}: {}", name, reason),
            }
        }
        other => other,
    }
}
