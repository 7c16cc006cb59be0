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
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::geometry::Rect;
use crate::master_table::PartitionRef;

fn to_aabb(r: &Rect) -> AABB<[f64; 2]> {
    AABB::from_corners([r.xmin, r.ymin], [r.xmax, r.ymax])
}

/// A partition's slot in the global, dataset-level R-tree. `index` is the
/// position into the `PartitionRef` slice the tree was built from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PartitionEntry {
    pub index: usize,
    envelope: Rect,
}

impl PartitionEntry {
    pub fn new(index: usize, envelope: Rect) -> Self {
        PartitionEntry { index, envelope }
    }
}

/// Implement this so rstar knows how to index a partition by its bounds.
impl RTreeObject for PartitionEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        to_aabb(&self.envelope)
    }
}

/// Rstar requires this implementation for nearest-neighbor queries; the
/// query engine here only does envelope intersection, but the bound is
/// cheap and keeps this type usable the same way the other R-tree-backed
/// indexes in this codebase are.
impl PointDistance for PartitionEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        self.envelope().distance_2(point)
    }
}

/// Bulk-loads the dataset-level R-tree over every partition's bounding
/// rectangle. Bulk loading is used because the whole set is known upfront
/// and never mutated afterwards.
pub fn build_partition_rtree(partitions: &[PartitionRef]) -> RTree<PartitionEntry> {
    let entries = partitions
        .iter()
        .enumerate()
        .map(|(index, p)| PartitionEntry::new(index, p.bounds))
        .collect();
    RTree::bulk_load(entries)
}

/// Returns the indices (into the slice `tree` was built from) of every
/// partition whose bounds intersect `query`.
pub fn candidate_partitions(tree: &RTree<PartitionEntry>, query: &Rect) -> Vec<usize> {
    tree.locate_in_envelope_intersecting(&to_aabb(query))
        .map(|e| e.index)
        .collect()
}

/// A kept geometry's slot in a partition's local R-tree, keyed by its
/// index into the partition's geometry vec.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryEntry {
    pub index: usize,
    envelope: Rect,
}

impl GeometryEntry {
    pub fn new(index: usize, envelope: Rect) -> Self {
        GeometryEntry { index, envelope }
    }
}

impl RTreeObject for GeometryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        to_aabb(&self.envelope)
    }
}

impl PointDistance for GeometryEntry {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        self.envelope().distance_2(point)
    }
}

/// Builds a partition-local R-tree over kept geometries' envelopes, used to
/// narrow candidates before the true intersection test.
pub fn build_geometry_rtree(envelopes: &[Rect]) -> RTree<GeometryEntry> {
    let entries = envelopes
        .iter()
        .enumerate()
        .map(|(index, e)| GeometryEntry::new(index, *e))
        .collect();
    RTree::bulk_load(entries)
}

pub fn candidate_geometries(tree: &RTree<GeometryEntry>, query: &Rect) -> Vec<usize> {
    tree.locate_in_envelope_intersecting(&to_aabb(query))
        .map(|e| e.index)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::GeometryKind;

    #[test]
    fn candidate_partitions_finds_intersecting_only() {
        let partitions = vec![
            PartitionRef {
                path: "a".into(),
                bounds: Rect::new(0.0, 0.0, 1.0, 1.0),
                geometry_kind: GeometryKind::Point,
            },
            PartitionRef {
                path: "b".into(),
                bounds: Rect::new(10.0, 10.0, 11.0, 11.0),
                geometry_kind: GeometryKind::Point,
            },
        ];
        let tree = build_partition_rtree(&partitions);
        let hits = candidate_partitions(&tree, &Rect::new(0.5, 0.5, 2.0, 2.0));
        assert_eq!(hits, vec![0]);
    }

    #[test]
    fn candidate_geometries_matches_bulk_loaded_envelopes() {
        let envelopes = vec![Rect::new(0.0, 0.0, 1.0, 1.0), Rect::new(5.0, 5.0, 6.0, 6.0)];
        let tree = build_geometry_rtree(&envelopes);
        let hits = candidate_geometries(&tree, &Rect::new(4.0, 4.0, 7.0, 7.0));
        assert_eq!(hits, vec![1]);
    }
}
