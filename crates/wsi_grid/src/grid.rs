use crate::{
    traits::RegionIndex,
    types::{GridGeometry, LabelGrid, PatchOrigin},
};

/// Labels the grid cells of one stored patch by querying the slide's
/// annotated regions at each cell center.
#[derive(Debug, Clone, Copy)]
pub struct GridLabelBuilder {
    geometry: GridGeometry,
}

impl GridLabelBuilder {
    pub fn new(geometry: GridGeometry) -> Self {
        Self { geometry }
    }

    /// Level-0 slide position of the center of cell `(row, col)`
    pub fn cell_center(&self, origin: PatchOrigin, row: usize, col: usize) -> (i64, i64) {
        (
            origin.x + self.geometry.cell_center_offset(col),
            origin.y + self.geometry.cell_center_offset(row),
        )
    }

    /// Cell `(r, c)` of the result holds the label of the cell whose center
    /// is at column `c` along slide x and row `r` along slide y.
    pub fn build<R>(&self, origin: PatchOrigin, regions: &R) -> LabelGrid
    where
        R: RegionIndex + ?Sized,
    {
        LabelGrid::from_fn(self.geometry.patch_per_side(), |row, col| {
            let (x, y) = self.cell_center(origin, row, col);
            regions.contains_point(x as f64, y as f64, true)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::AnnotationIndex;
    use geo_types::polygon;

    /// Answers containment queries from a closure
    struct Probe<F: Fn(f64, f64) -> bool + Send + Sync>(F);

    impl<F: Fn(f64, f64) -> bool + Send + Sync> RegionIndex for Probe<F> {
        fn contains_point(&self, x: f64, y: f64, include_boundary: bool) -> bool {
            assert!(include_boundary, "grid labels always count edges as inside");
            (self.0)(x, y)
        }
    }

    #[test]
    fn test_cell_centers() {
        let geometry = GridGeometry::new(768, 256, 224).expect("Should be valid");
        let builder = GridLabelBuilder::new(geometry);
        let origin = PatchOrigin::from_center(1000, 2000, 768);

        assert_eq!(builder.cell_center(origin, 0, 0), (616 + 128, 1616 + 128));
        assert_eq!(builder.cell_center(origin, 0, 2), (616 + 640, 1616 + 128));
        assert_eq!(builder.cell_center(origin, 2, 0), (616 + 128, 1616 + 640));
    }

    #[test]
    fn test_rows_follow_slide_y() {
        let geometry = GridGeometry::new(768, 256, 224).expect("Should be valid");
        let builder = GridLabelBuilder::new(geometry);
        let origin = PatchOrigin { x: 0, y: 0 };

        // Only the top band of the slide (y < 256) is annotated
        let grid = builder.build(origin, &Probe(|_, y| y < 256.0));
        for col in 0..3 {
            assert_eq!(grid.get(0, col), 1);
            assert_eq!(grid.get(1, col), 0);
            assert_eq!(grid.get(2, col), 0);
        }

        // Only the left band (x < 256)
        let grid = builder.build(origin, &Probe(|x, _| x < 256.0));
        for row in 0..3 {
            assert_eq!(grid.get(row, 0), 1);
            assert_eq!(grid.get(row, 1), 0);
        }
    }

    #[test]
    fn test_build_against_annotation() {
        let geometry = GridGeometry::new(768, 256, 224).expect("Should be valid");
        let builder = GridLabelBuilder::new(geometry);

        // Covers the top-right cell center (640, 128) exactly on its edge
        let index = AnnotationIndex::new(
            vec![polygon![
                (x: 640.0, y: 0.0),
                (x: 768.0, y: 0.0),
                (x: 768.0, y: 256.0),
                (x: 640.0, y: 256.0),
            ]],
            vec![],
        );
        let grid = builder.build(PatchOrigin { x: 0, y: 0 }, &index);

        assert_eq!(grid.get(0, 2), 1, "boundary counts as inside");
        assert_eq!(grid.positives(), 1);
    }
}
