//! Coordinate list parsing.
//!
//! A coordinate list holds one `slide_id,x_center,y_center` record per line.
//! Extra comma-separated fields are ignored and blank lines are skipped, so
//! the index of a record is its position among the non-blank lines. The same
//! parser reads the input list at extraction time and the `list.txt` copy at
//! training time, keeping patch file indices in agreement.

use std::fs;
use std::path::Path;

use crate::error::{GridError, Result};
use crate::types::Coordinate;

/// Parse a whole coordinate list, rejecting it on the first malformed line.
pub fn parse_coordinates(content: &str) -> Result<Vec<Coordinate>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| parse_line(i + 1, line))
        .collect()
}

pub fn read_coordinates<P: AsRef<Path>>(path: P) -> Result<Vec<Coordinate>> {
    let content = fs::read_to_string(path)?;
    parse_coordinates(&content)
}

fn parse_line(line_no: usize, line: &str) -> Result<Coordinate> {
    let malformed = |reason: &str| GridError::MalformedCoordinate {
        line: line_no,
        content: line.to_string(),
        reason: reason.to_string(),
    };

    let mut fields = line.trim().split(',').map(str::trim);
    let slide_id = fields.next().filter(|s| !s.is_empty()).ok_or_else(|| malformed("missing slide id"))?;
    let x_center = fields.next().ok_or_else(|| malformed("missing x coordinate"))?;
    let y_center = fields.next().ok_or_else(|| malformed("missing y coordinate"))?;

    Ok(Coordinate {
        slide_id: slide_id.to_string(),
        x_center: x_center
            .parse()
            .map_err(|_| malformed("x coordinate is not an integer"))?,
        y_center: y_center
            .parse()
            .map_err(|_| malformed("y coordinate is not an integer"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list() {
        let coords = parse_coordinates("Tumor_001,1000,2000\nNormal_002, 35 ,-4\n")
            .expect("Should parse");
        assert_eq!(coords.len(), 2);
        assert_eq!(coords[0].slide_id, "Tumor_001");
        assert_eq!((coords[0].x_center, coords[0].y_center), (1000, 2000));
        assert_eq!((coords[1].x_center, coords[1].y_center), (35, -4));
    }

    #[test]
    fn test_extra_fields_and_blank_lines() {
        let coords = parse_coordinates("a,1,2,tumor\n\nb,3,4\r\n").expect("Should parse");
        assert_eq!(coords.len(), 2);
        assert_eq!(coords[1].slide_id, "b");
    }

    #[test]
    fn test_malformed_line_is_rejected() {
        let err = parse_coordinates("a,1,2\nb,3\n").unwrap_err();
        match err {
            GridError::MalformedCoordinate { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }

        assert!(parse_coordinates("a,1.5,2").is_err());
        assert!(parse_coordinates(",1,2").is_err());
    }
}
