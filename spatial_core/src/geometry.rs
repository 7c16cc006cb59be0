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
use geo::{coord, Centroid, Contains, Intersects};
use geo_types::Polygon as GeoPolygon;
use serde::{Deserialize, Serialize};

/// Axis-aligned bounding rectangle. All partitioning and query filtering
/// is expressed in terms of this type; `Polygon` geometries additionally
/// carry their parsed ring for the final true-intersection test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl Rect {
    pub fn new(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Rect {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    pub fn from_point(x: f64, y: f64) -> Self {
        Rect::new(x, y, x, y)
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn midpoint(&self) -> (f64, f64) {
        ((self.xmin + self.xmax) / 2.0, (self.ymin + self.ymax) / 2.0)
    }

    /// NE, NW, SW, SE quadrants split at the midpoint, matching the
    /// quadtree builder's splitting order.
    pub fn quadrants(&self) -> [Rect; 4] {
        let (mid_x, mid_y) = self.midpoint();
        [
            Rect::new(mid_x, mid_y, self.xmax, self.ymax), // NE
            Rect::new(self.xmin, mid_y, mid_x, self.ymax), // NW
            Rect::new(self.xmin, self.ymin, mid_x, mid_y), // SW
            Rect::new(mid_x, self.ymin, self.xmax, mid_y), // SE
        ]
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.xmin <= other.xmax
            && self.xmax >= other.xmin
            && self.ymin <= other.ymax
            && self.ymax >= other.ymin
    }

    /// True if `self` fully contains `other`, borders included.
    pub fn contains_rect(&self, other: &Rect) -> bool {
        self.xmin <= other.xmin
            && self.ymin <= other.ymin
            && self.xmax >= other.xmax
            && self.ymax >= other.ymax
    }

    pub fn covers_point(&self, x: f64, y: f64) -> bool {
        self.xmin <= x && x <= self.xmax && self.ymin <= y && y <= self.ymax
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect::new(
            self.xmin.min(other.xmin),
            self.ymin.min(other.ymin),
            self.xmax.max(other.xmax),
            self.ymax.max(other.ymax),
        )
    }

    /// Area of the intersection of `self` and `other`, zero if disjoint.
    pub fn clip(&self, other: &Rect) -> f64 {
        let ix_min = self.xmin.max(other.xmin);
        let iy_min = self.ymin.max(other.ymin);
        let ix_max = self.xmax.min(other.xmax);
        let iy_max = self.ymax.min(other.ymax);
        let area = (ix_max - ix_min) * (iy_max - iy_min);
        area.max(0.0)
    }

    pub fn to_geo_rect(&self) -> geo_types::Rect<f64> {
        geo_types::Rect::new(
            coord! { x: self.xmin, y: self.ymin },
            coord! { x: self.xmax, y: self.ymax },
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GeometryKind {
    Point,
    Box,
    Polygon,
}

impl GeometryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GeometryKind::Point => "POINT",
            GeometryKind::Box => "BOX",
            GeometryKind::Polygon => "POLYGON",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            GeometryKind::Polygon => "wkt",
            GeometryKind::Point | GeometryKind::Box => "csv",
        }
    }
}

impl std::str::FromStr for GeometryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "POINT" => Ok(GeometryKind::Point),
            "BOX" => Ok(GeometryKind::Box),
            "POLYGON" => Ok(GeometryKind::Polygon),
            other => Err(format!("unknown geometry kind '{}'", other)),
        }
    }
}

/// A single geometry. `Polygon` retains both the original WKT (for
/// re-serialization) and the parsed ring (for the true intersection test).
#[derive(Debug, Clone)]
pub enum Geometry {
    Point { x: f64, y: f64 },
    Box(Rect),
    Polygon {
        wkt: String,
        envelope: Rect,
        ring: GeoPolygon<f64>,
    },
}

impl Geometry {
    pub fn envelope(&self) -> Rect {
        match self {
            Geometry::Point { x, y } => Rect::from_point(*x, *y),
            Geometry::Box(r) => *r,
            Geometry::Polygon { envelope, .. } => *envelope,
        }
    }

    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point { .. } => GeometryKind::Point,
            Geometry::Box(_) => GeometryKind::Box,
            Geometry::Polygon { .. } => GeometryKind::Polygon,
        }
    }

    pub fn centroid(&self) -> (f64, f64) {
        match self {
            Geometry::Point { x, y } => (*x, *y),
            Geometry::Box(r) => r.midpoint(),
            Geometry::Polygon { ring, envelope, .. } => ring
                .centroid()
                .map(|c| (c.x(), c.y()))
                .unwrap_or_else(|| envelope.midpoint()),
        }
    }

    /// Envelope-vs-rect overlap for Point/Box; true polygon-vs-rect
    /// intersection for Polygon.
    pub fn intersects_rect(&self, r: &Rect) -> bool {
        match self {
            Geometry::Point { .. } | Geometry::Box(_) => self.envelope().intersects(r),
            Geometry::Polygon { ring, .. } => ring.intersects(&r.to_geo_rect()),
        }
    }

    /// Strict containment used by the per-partition re-filter: does `r`
    /// fully contain this geometry.
    pub fn contained_in(&self, r: &Rect) -> bool {
        match self {
            Geometry::Point { x, y } => r.covers_point(*x, *y),
            Geometry::Box(b) => r.contains_rect(b),
            Geometry::Polygon { ring, .. } => r.to_geo_rect().contains(ring),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degenerate_point_envelope() {
        let g = Geometry::Point { x: 1.5, y: 2.5 };
        let e = g.envelope();
        assert_eq!(e.xmin, e.xmax);
        assert_eq!(e.ymin, e.ymax);
    }

    #[test]
    fn quadrants_partition_rect_without_gaps() {
        let r = Rect::new(0.0, 0.0, 10.0, 10.0);
        let qs = r.quadrants();
        // NE
        assert_eq!(qs[0], Rect::new(5.0, 5.0, 10.0, 10.0));
        // NW
        assert_eq!(qs[1], Rect::new(0.0, 5.0, 5.0, 10.0));
        // SW
        assert_eq!(qs[2], Rect::new(0.0, 0.0, 5.0, 5.0));
        // SE
        assert_eq!(qs[3], Rect::new(5.0, 0.0, 10.0, 5.0));
    }

    #[test]
    fn clip_disjoint_is_zero() {
        let d = Rect::new(0.0, 0.0, 10.0, 10.0);
        let q = Rect::new(20.0, 20.0, 30.0, 30.0);
        assert_eq!(d.clip(&q), 0.0);
    }

    #[test]
    fn clip_overlap() {
        let d = Rect::new(0.0, 0.0, 10.0, 10.0);
        let q = Rect::new(8.0, 8.0, 15.0, 15.0);
        assert_eq!(d.clip(&q), 4.0);
    }

    #[test]
    fn box_contained_in_checks_borders() {
        let outer = Rect::new(0.0, 0.0, 10.0, 10.0);
        let g = Geometry::Box(Rect::new(0.0, 0.0, 10.0, 10.0));
        assert!(g.contained_in(&outer));
    }
}
