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
use std::time::Instant;

use rayon::prelude::*;
use rstar::RTree;

use crate::geometry::Rect;
use crate::master_table::PartitionRef;
use crate::partition_loader::load_partition;
use crate::rtree_index::{candidate_partitions, PartitionEntry};

/// Candidate sets below this size run sequentially on the calling thread;
/// at or above it the partitions are loaded and scanned in parallel.
pub const PARALLEL_THRESHOLD: usize = 4;

/// Everything a single range query reports back.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryOutcome {
    pub matches: u64,
    pub mbr_tests: u64,
    pub avg_thread_time_ms: f64,
    pub parallel_threads: usize,
    pub total_time_ms: f64,
}

struct PartitionScan {
    total_read: u64,
    matches: u64,
    elapsed_ms: f64,
}

fn scan_partition(partition_ref: &PartitionRef, query_rect: &Rect) -> Option<PartitionScan> {
    let start = Instant::now();
    let loaded = match load_partition(partition_ref) {
        Ok(l) => l,
        Err(err) => {
            log::warn!(
                "skipping partition {}: {}",
                partition_ref.path.display(),
                err
            );
            return None;
        }
    };

    let candidate_idx = loaded.candidates(query_rect);
    let matches = candidate_idx
        .iter()
        .filter(|&&i| loaded.kept[i].intersects_rect(query_rect))
        .count() as u64;

    Some(PartitionScan {
        total_read: loaded.total_read as u64,
        matches,
        elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
    })
}

/// Runs one range query against the dataset's partitioned index: finds
/// candidate partitions via the global R-tree, loads each one, re-filters,
/// and true-tests every local candidate against `query_rect`.
pub fn execute_query(
    query_rect: &Rect,
    partitions: &[PartitionRef],
    partition_rtree: &RTree<PartitionEntry>,
) -> QueryOutcome {
    let start = Instant::now();
    let candidate_partition_idx = candidate_partitions(partition_rtree, query_rect);

    let scans: Vec<PartitionScan> = if candidate_partition_idx.len() < PARALLEL_THRESHOLD {
        candidate_partition_idx
            .iter()
            .filter_map(|&idx| scan_partition(&partitions[idx], query_rect))
            .collect()
    } else {
        candidate_partition_idx
            .par_iter()
            .filter_map(|&idx| scan_partition(&partitions[idx], query_rect))
            .collect()
    };

    let mbr_tests: u64 = scans.iter().map(|s| s.total_read).sum();
    let matches: u64 = scans.iter().map(|s| s.matches).sum();
    let total_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    let (parallel_threads, avg_thread_time_ms) = if candidate_partition_idx.len() < PARALLEL_THRESHOLD {
        (1, total_time_ms)
    } else {
        let avg = if scans.is_empty() {
            0.0
        } else {
            scans.iter().map(|s| s.elapsed_ms).sum::<f64>() / scans.len() as f64
        };
        (candidate_partition_idx.len(), avg)
    };

    QueryOutcome {
        matches,
        mbr_tests,
        avg_thread_time_ms,
        parallel_threads,
        total_time_ms,
    }
}

/// Fraction of the dataset's total geometry count that matched the query.
/// Zero (rather than NaN) when the dataset is empty.
pub fn cardinality(matches: u64, total_dataset_geometries: u64) -> f64 {
    if total_dataset_geometries == 0 {
        0.0
    } else {
        matches as f64 / total_dataset_geometries as f64
    }
}

/// Area of intersection between the query rectangle and the dataset's
/// envelope, clamped to zero when they are disjoint.
pub fn clipped_area(query_rect: &Rect, dataset_envelope: &Rect) -> f64 {
    query_rect.clip(dataset_envelope)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryKind;
    use crate::rtree_index::build_partition_rtree;
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
    fn sequential_and_parallel_paths_agree() {
        let dir = tempfile::tempdir().unwrap();
        let mut partitions = Vec::new();
        for i in 0..6u64 {
            let x = i as f64 * 10.0;
            let path = write_partition(
                &dir.path(),
                &format!("partition_{}.csv", i),
                &[&format!("{},{}", x + 1.0, 1.0)],
            );
            partitions.push(PartitionRef {
                path,
                bounds: Rect::new(x, 0.0, x + 5.0, 5.0),
                geometry_kind: GeometryKind::Point,
            });
        }
        let tree = build_partition_rtree(&partitions);

        let outcome = execute_query(&Rect::new(0.0, 0.0, 60.0, 5.0), &partitions, &tree);
        assert_eq!(outcome.matches, 6);
        assert_eq!(outcome.mbr_tests, 6);
        assert_eq!(outcome.parallel_threads, 6);
    }

    #[test]
    fn sequential_branch_reports_total_time_as_avg() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_partition(&dir.path(), "partition_0.csv", &["1,1"]);
        let partitions = vec![PartitionRef {
            path,
            bounds: Rect::new(0.0, 0.0, 5.0, 5.0),
            geometry_kind: GeometryKind::Point,
        }];
        let tree = build_partition_rtree(&partitions);

        let outcome = execute_query(&Rect::new(0.0, 0.0, 5.0, 5.0), &partitions, &tree);
        assert_eq!(outcome.parallel_threads, 1);
        assert_eq!(outcome.avg_thread_time_ms, outcome.total_time_ms);
    }

    #[test]
    fn cardinality_is_zero_for_empty_dataset() {
        assert_eq!(cardinality(5, 0), 0.0);
    }

    #[test]
    fn clipped_area_clamped_to_zero() {
        let q = Rect::new(100.0, 100.0, 110.0, 110.0);
        let e = Rect::new(0.0, 0.0, 10.0, 10.0);
        assert_eq!(clipped_area(&q, &e), 0.0);
    }
}
