//! Tiling of a geographic extent in geo-referenced block units

use crate::error::{Error, Result};
use crate::raster::GeoExtent;

use super::block_count;

/// Enumerates non-overlapping tiles of `block_width` x `block_height`
/// (in CRS units) covering an extent.
///
/// ```
/// use bandstack_core::raster::GeoExtent;
/// use bandstack_core::walk::ExtentWalker;
///
/// let walker = ExtentWalker::new(GeoExtent::new(0.0, 0.0, 10.0, 4.0), 4.0, 4.0).unwrap();
/// let widths: Vec<f64> = walker.iter().map(|t| t.width()).collect();
/// assert_eq!(widths, vec![4.0, 4.0, 2.0]);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtentWalker {
    extent: GeoExtent,
    block_width: f64,
    block_height: f64,
    cols: usize,
    rows: usize,
}

impl ExtentWalker {
    /// Create a walker; block sizes must be finite and positive.
    pub fn new(extent: GeoExtent, block_width: f64, block_height: f64) -> Result<Self> {
        for (name, value) in [("block_width", block_width), ("block_height", block_height)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidParameter {
                    name,
                    value: value.to_string(),
                    reason: "block size must be finite and positive".into(),
                });
            }
        }
        Ok(Self {
            extent,
            block_width,
            block_height,
            cols: block_count(extent.width(), block_width),
            rows: block_count(extent.height(), block_height),
        })
    }

    pub fn extent(&self) -> &GeoExtent {
        &self.extent
    }

    /// Number of tile columns
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Number of tile rows
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Total number of tiles
    pub fn len(&self) -> usize {
        self.cols * self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tile at (tile row, tile column), clipped to the extent
    pub fn tile(&self, row: usize, col: usize) -> GeoExtent {
        let e = &self.extent;
        let x0 = self.x_edge(col);
        let x1 = self.x_edge(col + 1);
        let y1 = if row == 0 {
            e.ymax
        } else {
            (e.ymax - row as f64 * self.block_height).max(e.ymin)
        };
        let y0 = if row + 1 >= self.rows {
            e.ymin
        } else {
            (e.ymax - (row + 1) as f64 * self.block_height).max(e.ymin)
        };
        GeoExtent {
            xmin: x0,
            ymin: y0,
            xmax: x1,
            ymax: y1,
        }
    }

    // Edges are computed from the index alone so that neighbouring tiles
    // share bit-identical boundaries.
    fn x_edge(&self, col: usize) -> f64 {
        let e = &self.extent;
        if col == 0 {
            e.xmin
        } else if col >= self.cols {
            e.xmax
        } else {
            (e.xmin + col as f64 * self.block_width).min(e.xmax)
        }
    }

    /// Fresh row-major enumeration of all tiles
    pub fn iter(&self) -> ExtentTiles {
        ExtentTiles {
            walker: *self,
            index: 0,
        }
    }
}

impl IntoIterator for &ExtentWalker {
    type Item = GeoExtent;
    type IntoIter = ExtentTiles;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the tiles of an [`ExtentWalker`]
#[derive(Debug, Clone)]
pub struct ExtentTiles {
    walker: ExtentWalker,
    index: usize,
}

impl Iterator for ExtentTiles {
    type Item = GeoExtent;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.walker.len() {
            return None;
        }
        let row = self.index / self.walker.cols;
        let col = self.index % self.walker.cols;
        self.index += 1;
        Some(self.walker.tile(row, col))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.walker.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ExtentTiles {}
