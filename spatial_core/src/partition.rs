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
use std::path::Path;
use std::str::FromStr;

use crate::error::{Result, SpatialError};

/// How the caller expressed the desired partitioning granularity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    Partitions,
    Geometries,
    Bytes,
}

impl FromStr for PartitionMode {
    type Err = SpatialError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "partitions" => Ok(PartitionMode::Partitions),
            "geometries" => Ok(PartitionMode::Geometries),
            "bytes" => Ok(PartitionMode::Bytes),
            other => Err(SpatialError::InvalidPartitionParam(format!(
                "unknown partition mode '{}'",
                other
            ))),
        }
    }
}

/// The two derived sizing values the quadtree builder needs: the target
/// number of partitions, and the leaf capacity (geometries per partition)
/// that flows from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartitionParams {
    pub n_partitions: u64,
    pub n_geometries: u64,
}

/// Resolves a user-supplied `(mode, num)` pair plus the dataset's total
/// geometry count (and, for `bytes` mode, file size) into concrete
/// partitioning targets.
///
/// - `partitions`: `num` IS the target partition count; per-partition
///   capacity is `ceil(total_geometries / num)`.
/// - `geometries`: `num` IS the target per-partition capacity; the
///   partition count is derived as `ceil(total_geometries / num)`.
/// - `bytes`: `num` is a target partition file size in bytes; the average
///   per-geometry byte size is estimated from the dataset file size divided
///   by its geometry count, and used to derive a per-partition capacity,
///   from which the partition count follows as in `geometries` mode.
pub fn calculate_partition_params(
    mode: PartitionMode,
    num: i64,
    dataset_path: &Path,
    total_geometries: u64,
) -> Result<PartitionParams> {
    if num <= 0 {
        return Err(SpatialError::InvalidPartitionParam(format!(
            "partition parameter must be positive, got {}",
            num
        )));
    }
    if total_geometries == 0 {
        return Err(SpatialError::InvalidPartitionParam(
            "cannot partition an empty dataset".to_string(),
        ));
    }
    let num = num as u64;

    match mode {
        PartitionMode::Partitions => {
            let n_partitions = num.max(1);
            let n_geometries = div_ceil(total_geometries, n_partitions);
            Ok(PartitionParams {
                n_partitions,
                n_geometries,
            })
        }
        PartitionMode::Geometries => {
            let n_geometries = num.max(1);
            let n_partitions = div_ceil(total_geometries, n_geometries);
            Ok(PartitionParams {
                n_partitions,
                n_geometries,
            })
        }
        PartitionMode::Bytes => {
            let file_size = std::fs::metadata(dataset_path)?.len().max(1);
            let geom_size = (file_size / total_geometries).max(1);
            let n_geometries = (num / geom_size).max(1);
            let n_partitions = div_ceil(total_geometries, n_geometries);
            Ok(PartitionParams {
                n_partitions,
                n_geometries,
            })
        }
    }
}

/// The quadtree's area floor: `dataset_area / (4 * n_partitions)`. A node
/// whose area falls below this is forced to be a leaf even if it still
/// holds more than `n_geometries` geometries.
pub fn min_leaf_area(dataset_area: f64, n_partitions: u64) -> f64 {
    dataset_area / (4.0 * n_partitions as f64)
}

fn div_ceil(a: u64, b: u64) -> u64 {
    (a + b - 1) / b
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partitions_mode_derives_capacity() {
        let p = PartitionParams {
            n_partitions: 4,
            n_geometries: 25,
        };
        assert_eq!(p.n_partitions * p.n_geometries, 100);
    }

    #[test]
    fn rejects_non_positive_num() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.csv");
        std::fs::write(&path, "1,2\n").unwrap();
        let err = calculate_partition_params(PartitionMode::Partitions, 0, &path, 10).unwrap_err();
        assert!(matches!(err, SpatialError::InvalidPartitionParam(_)));
    }

    #[test]
    fn geometries_mode_rounds_up_partition_count() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("d.csv");
        std::fs::write(&path, "1,2\n").unwrap();
        let p = calculate_partition_params(PartitionMode::Geometries, 30, &path, 100).unwrap();
        assert_eq!(p.n_geometries, 30);
        assert_eq!(p.n_partitions, 4);
    }

    #[test]
    fn min_leaf_area_scales_with_partition_count() {
        assert_eq!(min_leaf_area(400.0, 4), 25.0);
    }

    #[test]
    fn mode_from_str_rejects_unknown() {
        assert!(PartitionMode::from_str("blocks").is_err());
    }
}
