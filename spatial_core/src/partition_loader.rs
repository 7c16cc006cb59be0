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
use rstar::RTree;

use crate::dataset;
use crate::error::{Result, SpatialError};
use crate::geometry::{Geometry, Rect};
use crate::master_table::PartitionRef;
use crate::rtree_index::{build_geometry_rtree, GeometryEntry};

/// A partition pulled off disk for a query. `total_read` counts every
/// geometry read from the file, which is what feeds `mbr_tests`; `kept`
/// holds only the geometries that survive the per-partition re-filter
/// below, which is what the local R-tree and the true intersection test
/// operate on. These two counts diverge whenever a geometry was written
/// into more than one partition at index time.
pub struct LoadedPartition {
    pub total_read: usize,
    pub kept: Vec<Geometry>,
    pub rtree: RTree<GeometryEntry>,
}

impl LoadedPartition {
    pub fn candidates(&self, query: &Rect) -> Vec<usize> {
        crate::rtree_index::candidate_geometries(&self.rtree, query)
    }
}

/// A geometry written into more than one leaf during quadtree construction
/// belongs to this partition only if it satisfies the stricter re-filter
/// below: points must fall inside the partition bounds (border inclusive);
/// boxes and polygons are kept if the partition fully contains them, or
/// failing that, if the partition covers their centroid. The centroid
/// fallback breaks ties for geometries straddling a partition border in a
/// way that favors the partition holding most of their area.
fn kept_by_partition(bounds: &Rect, g: &Geometry) -> bool {
    match g {
        Geometry::Point { x, y } => bounds.covers_point(*x, *y),
        Geometry::Box(_) | Geometry::Polygon { .. } => {
            if g.contained_in(bounds) {
                return true;
            }
            let (cx, cy) = g.centroid();
            bounds.covers_point(cx, cy)
        }
    }
}

/// Reads a partition's geometry file and applies the re-filter, building
/// the local R-tree used for candidate filtering within the partition.
pub fn load_partition(partition_ref: &PartitionRef) -> Result<LoadedPartition> {
    let dataset = dataset::load_dataset(&partition_ref.path).map_err(|e| match e {
        SpatialError::MissingFile(path) => SpatialError::PartitionLoadError {
            path,
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "partition file missing"),
        },
        SpatialError::Io(source) => SpatialError::PartitionLoadError {
            path: partition_ref.path.clone(),
            source,
        },
        other => other,
    })?;

    let total_read = dataset.len();
    let kept: Vec<Geometry> = dataset
        .geometries
        .into_iter()
        .filter(|g| kept_by_partition(&partition_ref.bounds, g))
        .collect();

    let envelopes: Vec<Rect> = kept.iter().map(|g| g.envelope()).collect();
    let rtree = build_geometry_rtree(&envelopes);

    Ok(LoadedPartition {
        total_read,
        kept,
        rtree,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryKind;
    use std::io::Write;

    fn write_partition(dir: &std::path::Path, name: &str, lines: &[&str]) -> std::path::PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{}", line).unwrap();
        }
        path
    }

    #[test]
    fn total_read_counts_rows_not_kept_count() {
        let dir = tempfile::tempdir().unwrap();
        // border point duplicated into this partition, but only covered by
        // [0,0,5,5]; a second point genuinely outside.
        let path = write_partition(&dir.path(), "partition_0.csv", &["2,2", "9,9"]);
        let pref = PartitionRef {
            path,
            bounds: Rect::new(0.0, 0.0, 5.0, 5.0),
            geometry_kind: GeometryKind::Point,
        };
        let loaded = load_partition(&pref).unwrap();
        assert_eq!(loaded.total_read, 2);
        assert_eq!(loaded.kept.len(), 1);
    }

    #[test]
    fn box_kept_via_centroid_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_partition(&dir.path(), "partition_0.csv", &["-1,-1,2,2"]);
        let pref = PartitionRef {
            path,
            bounds: Rect::new(0.0, 0.0, 5.0, 5.0),
            geometry_kind: GeometryKind::Box,
        };
        let loaded = load_partition(&pref).unwrap();
        // not fully contained (xmin=-1 < 0) but centroid (0.5,0.5) is covered
        assert_eq!(loaded.kept.len(), 1);
    }

    #[test]
    fn missing_partition_file_errors() {
        let pref = PartitionRef {
            path: "/no/such/partition.csv".into(),
            bounds: Rect::new(0.0, 0.0, 1.0, 1.0),
            geometry_kind: GeometryKind::Point,
        };
        let err = load_partition(&pref).unwrap_err();
        assert!(matches!(err, SpatialError::PartitionLoadError { .. }));
    }
}
