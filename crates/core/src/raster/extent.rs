//! Geographic bounding rectangles

use serde::{Deserialize, Serialize};
use std::fmt;

/// Axis-aligned bounding rectangle in a raster's coordinate reference system.
///
/// Always normalized so that `xmin <= xmax` and `ymin <= ymax`. Zero-area
/// extents are allowed and address a single point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoExtent {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
}

impl GeoExtent {
    /// Create an extent from two corner coordinates in any order
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            xmin: x0.min(x1),
            ymin: y0.min(y1),
            xmax: x0.max(x1),
            ymax: y0.max(y1),
        }
    }

    pub fn width(&self) -> f64 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> f64 {
        self.ymax - self.ymin
    }

    /// Whether the extent has zero area
    pub fn is_degenerate(&self) -> bool {
        self.width() == 0.0 || self.height() == 0.0
    }

    /// Grow the extent to include a point
    pub fn include(&self, x: f64, y: f64) -> Self {
        Self {
            xmin: self.xmin.min(x),
            ymin: self.ymin.min(y),
            xmax: self.xmax.max(x),
            ymax: self.ymax.max(y),
        }
    }

    /// Check if two extents overlap (touching edges do not count)
    pub fn intersects(&self, other: &GeoExtent) -> bool {
        self.xmin < other.xmax
            && self.xmax > other.xmin
            && self.ymin < other.ymax
            && self.ymax > other.ymin
    }

    /// Whether a point lies inside the extent (edges included)
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.xmin && x <= self.xmax && y >= self.ymin && y <= self.ymax
    }

    /// Overlapping part of two extents, `None` if they are disjoint.
    ///
    /// A degenerate extent inside `self` intersects as itself.
    pub fn intersection(&self, other: &GeoExtent) -> Option<GeoExtent> {
        let xmin = self.xmin.max(other.xmin);
        let ymin = self.ymin.max(other.ymin);
        let xmax = self.xmax.min(other.xmax);
        let ymax = self.ymax.min(other.ymax);
        if xmin > xmax || ymin > ymax {
            return None;
        }
        Some(GeoExtent {
            xmin,
            ymin,
            xmax,
            ymax,
        })
    }
}

impl fmt::Display for GeoExtent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}) - ({}, {})",
            self.xmin, self.ymin, self.xmax, self.ymax
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_normalizes_corners() {
        let e = GeoExtent::new(10.0, 5.0, 0.0, -5.0);
        assert_eq!(e, GeoExtent::new(0.0, -5.0, 10.0, 5.0));
        assert_eq!(e.width(), 10.0);
        assert_eq!(e.height(), 10.0);
    }

    #[test]
    fn test_intersection() {
        let a = GeoExtent::new(0.0, 0.0, 10.0, 10.0);
        let b = GeoExtent::new(5.0, 5.0, 15.0, 15.0);
        let c = GeoExtent::new(20.0, 20.0, 30.0, 30.0);

        assert_eq!(a.intersection(&b), Some(GeoExtent::new(5.0, 5.0, 10.0, 10.0)));
        assert_eq!(a.intersection(&c), None);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_degenerate_point_extent() {
        let a = GeoExtent::new(0.0, 0.0, 10.0, 10.0);
        let p = GeoExtent::new(3.0, 4.0, 3.0, 4.0);
        assert!(p.is_degenerate());
        assert_eq!(a.intersection(&p), Some(p));
    }
}
