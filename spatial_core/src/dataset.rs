/*
This file is part of the Building Aggregration Tool
Copyright (C) 2022 Novel-T

The Building Aggregration Tool is free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation, either version 3 of the License, or
(at your option) any later version.

This program is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with this program.  If not, see <http://www.gnu.org/licenses/>.
*/
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use wkt::TryFromWkt;

use crate::error::{Result, SpatialError};
use crate::geometry::{Geometry, GeometryKind, Rect};

/// An ordered collection of geometries of a single kind, plus the dataset's
/// total envelope.
pub struct Dataset {
    pub kind: GeometryKind,
    pub geometries: Vec<Geometry>,
    pub envelope: Rect,
}

impl Dataset {
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }
}

/// Loads a dataset file, inferring its kind from the extension and (for
/// `.csv`) the column count of the first non-empty line. Malformed rows
/// (non-numeric fields) are dropped silently; the dataset envelope is
/// accumulated while streaming so the file is read exactly once.
pub fn load_dataset(path: &Path) -> Result<Dataset> {
    if !path.exists() {
        return Err(SpatialError::MissingFile(path.to_path_buf()));
    }

    let is_wkt = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("wkt"))
        .unwrap_or(false);

    if is_wkt {
        load_polygon_dataset(path)
    } else {
        load_csv_dataset(path)
    }
}

fn load_polygon_dataset(path: &Path) -> Result<Dataset> {
    let reader = BufReader::new(File::open(path)?);
    let mut geometries = Vec::new();
    let mut envelope: Option<Rect> = None;

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let ring = match geo_types::Polygon::<f64>::try_from_wkt_str(line) {
            Ok(p) => p,
            Err(_) => continue,
        };

        let g = Geometry::Polygon {
            wkt: line.to_string(),
            envelope: polygon_envelope(&ring),
            ring,
        };

        let e = g.envelope();
        envelope = Some(envelope.map_or(e, |acc| acc.union(&e)));
        geometries.push(g);
    }

    Ok(Dataset {
        kind: GeometryKind::Polygon,
        geometries,
        envelope: envelope.unwrap_or_else(|| Rect::new(0.0, 0.0, 0.0, 0.0)),
    })
}

fn polygon_envelope(ring: &geo_types::Polygon<f64>) -> Rect {
    use geo::BoundingRect;
    ring.bounding_rect()
        .map(|r| Rect::new(r.min().x, r.min().y, r.max().x, r.max().y))
        .unwrap_or_else(|| Rect::new(0.0, 0.0, 0.0, 0.0))
}

fn load_csv_dataset(path: &Path) -> Result<Dataset> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines();

    let first_line = loop {
        match lines.next() {
            Some(line) => {
                let line = line?;
                if !line.trim().is_empty() {
                    break Some(line);
                }
            }
            None => break None,
        }
    };

    let first_line = match first_line {
        Some(l) => l,
        None => {
            return Ok(Dataset {
                kind: GeometryKind::Point,
                geometries: Vec::new(),
                envelope: Rect::new(0.0, 0.0, 0.0, 0.0),
            })
        }
    };

    let n_cols = first_line.split(',').count();
    let kind = match n_cols {
        2 => GeometryKind::Point,
        4 => GeometryKind::Box,
        _ => {
            return Err(SpatialError::UnsupportedFormat {
                path: path.to_path_buf(),
                reason: format!("expected 2 or 4 csv columns, found {}", n_cols),
            })
        }
    };

    let mut geometries = Vec::new();
    let mut envelope: Option<Rect> = None;

    for line in std::iter::once(Ok(first_line)).chain(lines) {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let fields: Vec<&str> = line.split(',').collect();
        let g = match kind {
            GeometryKind::Point => {
                if fields.len() != 2 {
                    continue;
                }
                match (fields[0].trim().parse::<f64>(), fields[1].trim().parse::<f64>()) {
                    (Ok(x), Ok(y)) => Geometry::Point { x, y },
                    _ => continue,
                }
            }
            GeometryKind::Box => {
                if fields.len() != 4 {
                    continue;
                }
                let parsed: Result<Vec<f64>> = fields
                    .iter()
                    .map(|f| {
                        f.trim()
                            .parse::<f64>()
                            .map_err(|_| SpatialError::UnsupportedFormat {
                                path: path.to_path_buf(),
                                reason: "non-numeric field".to_string(),
                            })
                    })
                    .collect();
                match parsed {
                    Ok(v) => Geometry::Box(Rect::new(v[0], v[1], v[2], v[3])),
                    Err(_) => continue,
                }
            }
            GeometryKind::Polygon => unreachable!(),
        };

        let e = g.envelope();
        envelope = Some(envelope.map_or(e, |acc| acc.union(&e)));
        geometries.push(g);
    }

    Ok(Dataset {
        kind,
        geometries,
        envelope: envelope.unwrap_or_else(|| Rect::new(0.0, 0.0, 0.0, 0.0)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn point_csv_is_kind_inferred() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "1.0,2.0").unwrap();
        writeln!(f, "3.0,4.0").unwrap();

        let ds = load_dataset(&path).unwrap();
        assert_eq!(ds.kind, GeometryKind::Point);
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.envelope, Rect::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn box_csv_drops_malformed_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "0,0,1,1").unwrap();
        writeln!(f, "not,a,number,here").unwrap();
        writeln!(f, "2,2,3,3").unwrap();

        let ds = load_dataset(&path).unwrap();
        assert_eq!(ds.kind, GeometryKind::Box);
        assert_eq!(ds.len(), 2);
    }

    #[test]
    fn unsupported_column_count_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.csv");
        let mut f = File::create(&path).unwrap();
        writeln!(f, "1,2,3").unwrap();

        let err = load_dataset(&path).unwrap_err();
        assert!(matches!(err, SpatialError::UnsupportedFormat { .. }));
    }

    #[test]
    fn missing_file_errors() {
        let path = Path::new("/no/such/dataset.csv");
        let err = load_dataset(path).unwrap_err();
        assert!(matches!(err, SpatialError::MissingFile(_)));
    }
}
