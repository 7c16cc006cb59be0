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
use std::path::{Path, PathBuf};

use crate::error::{Result, SpatialError};
use crate::geometry::{GeometryKind, Rect};
use crate::quadtree::MasterRow;

const HEADER: &[&str] = &[
    "ID",
    "NamePartition",
    "NumberGeometries",
    "FileSize",
    "GeometryType",
    "xMin",
    "yMin",
    "xMax",
    "yMax",
];

/// A partition as known from the master table: where its file lives and
/// what rectangle it covers. This is all the R-tree candidate filter needs.
#[derive(Debug, Clone)]
pub struct PartitionRef {
    pub path: PathBuf,
    pub bounds: Rect,
    pub geometry_kind: GeometryKind,
}

/// Writes the master table for a freshly built index: one row per
/// partition, comma-separated, with a header.
pub fn write_master_table(rows: &[MasterRow], path: &Path) -> Result<()> {
    let mut w = csv::WriterBuilder::new().delimiter(b',').from_path(path)?;
    w.write_record(HEADER)?;
    for row in rows {
        w.write_record(&[
            row.id.to_string(),
            row.partition_filename.clone(),
            row.geometry_count.to_string(),
            row.byte_size.to_string(),
            row.geometry_kind.as_str().to_string(),
            row.bounds.xmin.to_string(),
            row.bounds.ymin.to_string(),
            row.bounds.xmax.to_string(),
            row.bounds.ymax.to_string(),
        ])?;
    }
    w.flush()?;
    Ok(())
}

/// Loads a master table, resolving each partition's filename against
/// `index_dir` so the returned refs carry absolute paths.
pub fn load_master_table(path: &Path, index_dir: &Path) -> Result<Vec<PartitionRef>> {
    if !path.exists() {
        return Err(SpatialError::MissingFile(path.to_path_buf()));
    }

    let mut reader = csv::ReaderBuilder::new().delimiter(b',').from_path(path)?;

    let headers: Vec<String> = reader.headers()?.iter().map(|s| s.to_string()).collect();
    let missing: Vec<String> = HEADER
        .iter()
        .filter(|h| !headers.iter().any(|found| found == *h))
        .map(|h| h.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(SpatialError::MasterSchemaError {
            path: path.to_path_buf(),
            missing,
        });
    }

    let mut refs = Vec::new();
    for record in reader.records() {
        let record = record?;
        let get = |name: &str| -> Option<&str> {
            headers
                .iter()
                .position(|h| h == name)
                .and_then(|idx| record.get(idx))
        };

        let filename = get("NamePartition").unwrap_or_default();
        let kind_str = get("GeometryType").unwrap_or_default();
        let kind = kind_str.parse::<GeometryKind>().map_err(|_| {
            SpatialError::MasterSchemaError {
                path: path.to_path_buf(),
                missing: vec!["GeometryType".to_string()],
            }
        })?;

        let parse_f64 = |name: &str| -> f64 { get(name).and_then(|v| v.parse().ok()).unwrap_or(0.0) };

        refs.push(PartitionRef {
            path: index_dir.join(filename),
            bounds: Rect::new(
                parse_f64("xMin"),
                parse_f64("yMin"),
                parse_f64("xMax"),
                parse_f64("yMax"),
            ),
            geometry_kind: kind,
        });
    }

    Ok(refs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::quadtree::MasterRow;

    #[test]
    fn round_trips_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let rows = vec![MasterRow {
            id: 0,
            partition_filename: "partition_0.csv".to_string(),
            geometry_count: 3,
            byte_size: 42,
            geometry_kind: GeometryKind::Point,
            bounds: Rect::new(0.0, 0.0, 1.0, 1.0),
        }];
        let path = dir.path().join("master_table.csv");
        write_master_table(&rows, &path).unwrap();

        let refs = load_master_table(&path, dir.path()).unwrap();
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].bounds, Rect::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(refs[0].path, dir.path().join("partition_0.csv"));
    }

    #[test]
    fn missing_columns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("master_table.csv");
        std::fs::write(&path, "ID,NamePartition\n0,partition_0.csv\n").unwrap();
        let err = load_master_table(&path, dir.path()).unwrap_err();
        assert!(matches!(err, SpatialError::MasterSchemaError { .. }));
    }
}
