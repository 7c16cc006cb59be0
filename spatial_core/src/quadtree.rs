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
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::dataset::Dataset;
use crate::error::Result;
use crate::geometry::{Geometry, GeometryKind, Rect};

/// Leaf nodes are flushed to disk once this many have accumulated, to bound
/// peak memory on large datasets.
pub const DEFAULT_FLUSH_THRESHOLD: usize = 8;

/// One row of the master table: a partition's identity, location, and
/// bounding summary.
#[derive(Debug, Clone)]
pub struct MasterRow {
    pub id: u64,
    pub partition_filename: String,
    pub geometry_count: usize,
    pub byte_size: u64,
    pub geometry_kind: GeometryKind,
    pub bounds: Rect,
}

/// Result of a full quadtree build: the master rows plus diagnostics for the
/// duplicate/lost-geometry check the indexer logs after every run.
pub struct QuadtreeBuildOutput {
    pub rows: Vec<MasterRow>,
    pub total_written: usize,
}

struct Node {
    envelope: Rect,
    indices: Vec<usize>,
}

/// Builds the quadtree over `dataset` breadth-first, writing one file per
/// leaf partition into `output_dir` and returning the corresponding master
/// rows. `n_geometries` is the leaf capacity and `min_area` the area floor;
/// both come from [`crate::partition::calculate_partition_params`] and
/// [`crate::partition::min_leaf_area`].
pub fn build_quadtree(
    dataset: &Dataset,
    n_geometries: u64,
    min_area: f64,
    output_dir: &Path,
    flush_threshold: usize,
) -> Result<QuadtreeBuildOutput> {
    std::fs::create_dir_all(output_dir)?;

    let mut queue = VecDeque::new();
    queue.push_back(Node {
        envelope: dataset.envelope,
        indices: (0..dataset.geometries.len()).collect(),
    });

    let mut leaf_buffer: Vec<Node> = Vec::new();
    let mut rows = Vec::new();
    let mut next_id: u64 = 0;
    let mut total_written = 0usize;

    while let Some(node) = queue.pop_front() {
        if node.indices.is_empty() {
            continue;
        }

        if is_leaf(&node, n_geometries, min_area) {
            leaf_buffer.push(node);
        } else {
            let children = split(&node, dataset);
            if is_degenerate(&node.envelope) || is_non_progress(&node, &children) {
                leaf_buffer.push(node);
            } else {
                for child in children {
                    if !child.indices.is_empty() {
                        queue.push_back(child);
                    }
                }
            }
        }

        if leaf_buffer.len() >= flush_threshold {
            flush_leaves(
                &mut leaf_buffer,
                dataset,
                output_dir,
                &mut next_id,
                &mut rows,
                &mut total_written,
            )?;
        }
    }

    flush_leaves(
        &mut leaf_buffer,
        dataset,
        output_dir,
        &mut next_id,
        &mut rows,
        &mut total_written,
    )?;

    let input_count = dataset.len();
    if total_written < input_count {
        log::warn!(
            "quadtree build lost geometries: {} written for {} input ({})",
            total_written,
            input_count,
            output_dir.display()
        );
    } else if total_written > input_count {
        log::info!(
            "quadtree build duplicated {} geometries across partition borders ({} written for {} input, {})",
            total_written - input_count,
            total_written,
            input_count,
            output_dir.display()
        );
    }

    Ok(QuadtreeBuildOutput {
        rows,
        total_written,
    })
}

fn is_leaf(node: &Node, n_geometries: u64, min_area: f64) -> bool {
    node.indices.len() as u64 <= n_geometries || node.envelope.area() <= min_area
}

fn is_degenerate(envelope: &Rect) -> bool {
    envelope.width() <= 0.0 || envelope.height() <= 0.0
}

/// True when splitting produced no reduction at all: every child quadrant
/// ended up holding the full parent set, which happens when all remaining
/// geometries sit on the same point. Splitting further would loop forever.
fn is_non_progress(node: &Node, children: &[Node; 4]) -> bool {
    children
        .iter()
        .all(|c| c.indices.len() == node.indices.len())
}

fn split(node: &Node, dataset: &Dataset) -> [Node; 4] {
    let quads = node.envelope.quadrants();
    let mut iter = quads.into_iter().map(|q| {
        let indices: Vec<usize> = node
            .indices
            .iter()
            .copied()
            .filter(|&i| dataset.geometries[i].envelope().intersects(&q))
            .collect();
        Node {
            envelope: q,
            indices,
        }
    });
    [
        iter.next().unwrap(),
        iter.next().unwrap(),
        iter.next().unwrap(),
        iter.next().unwrap(),
    ]
}

fn flush_leaves(
    buffer: &mut Vec<Node>,
    dataset: &Dataset,
    output_dir: &Path,
    next_id: &mut u64,
    rows: &mut Vec<MasterRow>,
    total_written: &mut usize,
) -> Result<()> {
    for node in buffer.drain(..) {
        let id = *next_id;
        *next_id += 1;

        let filename = format!("partition_{}.{}", id, dataset.kind.extension());
        let path: PathBuf = output_dir.join(&filename);
        write_partition(&path, dataset, &node.indices)?;

        let byte_size = std::fs::metadata(&path)?.len();
        *total_written += node.indices.len();

        rows.push(MasterRow {
            id,
            partition_filename: filename,
            geometry_count: node.indices.len(),
            byte_size,
            geometry_kind: dataset.kind,
            bounds: node.envelope,
        });
    }
    Ok(())
}

fn write_partition(path: &Path, dataset: &Dataset, indices: &[usize]) -> Result<()> {
    let mut w = BufWriter::new(File::create(path)?);
    for &i in indices {
        match &dataset.geometries[i] {
            Geometry::Point { x, y } => writeln!(w, "{},{}", x, y)?,
            Geometry::Box(r) => writeln!(w, "{},{},{},{}", r.xmin, r.ymin, r.xmax, r.ymax)?,
            Geometry::Polygon { wkt, .. } => writeln!(w, "{}", wkt)?,
        }
    }
    w.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryKind;

    fn grid_dataset(n: i64) -> Dataset {
        let mut geometries = Vec::new();
        for x in 0..n {
            for y in 0..n {
                geometries.push(Geometry::Point {
                    x: x as f64,
                    y: y as f64,
                });
            }
        }
        Dataset {
            kind: GeometryKind::Point,
            envelope: Rect::new(0.0, 0.0, (n - 1) as f64, (n - 1) as f64),
            geometries,
        }
    }

    #[test]
    fn every_leaf_respects_capacity_or_area_floor() {
        let dataset = grid_dataset(8);
        let dir = tempfile::tempdir().unwrap();
        let out = build_quadtree(&dataset, 4, 0.0001, dir.path(), DEFAULT_FLUSH_THRESHOLD).unwrap();
        for row in &out.rows {
            assert!(row.geometry_count as u64 <= 4 || row.bounds.area() <= 0.0001);
        }
    }

    #[test]
    fn partition_ids_are_unique_and_files_exist() {
        let dataset = grid_dataset(6);
        let dir = tempfile::tempdir().unwrap();
        let out = build_quadtree(&dataset, 3, 0.0, dir.path(), DEFAULT_FLUSH_THRESHOLD).unwrap();
        let mut ids: Vec<u64> = out.rows.iter().map(|r| r.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), out.rows.len());
        for row in &out.rows {
            assert!(dir.path().join(&row.partition_filename).exists());
        }
    }

    #[test]
    fn coincident_points_do_not_infinite_loop() {
        let mut geometries = Vec::new();
        for _ in 0..20 {
            geometries.push(Geometry::Point { x: 5.0, y: 5.0 });
        }
        let dataset = Dataset {
            kind: GeometryKind::Point,
            envelope: Rect::new(5.0, 5.0, 5.0, 5.0),
            geometries,
        };
        let dir = tempfile::tempdir().unwrap();
        let out = build_quadtree(&dataset, 4, 0.0, dir.path(), DEFAULT_FLUSH_THRESHOLD).unwrap();
        assert_eq!(out.total_written, 20);
    }

    #[test]
    fn partitions_cover_dataset_without_gaps() {
        let dataset = grid_dataset(10);
        let dir = tempfile::tempdir().unwrap();
        let out = build_quadtree(&dataset, 5, 0.0, dir.path(), DEFAULT_FLUSH_THRESHOLD).unwrap();
        let mut union = out.rows[0].bounds;
        for row in &out.rows[1..] {
            union = union.union(&row.bounds);
        }
        assert!(union.contains_rect(&dataset.envelope));
    }
}
