//! Tiling of a raster grid in pixel block units

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::raster::{GeoExtent, GeoTransform, PixelWindow};

use super::ExtentWalker;

/// One block of a raster: its geographic extent and the pixel window to read.
///
/// `x_offset + width` never exceeds the raster width (same for rows); edge
/// blocks are clipped rather than padded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    pub extent: GeoExtent,
    pub x_offset: usize,
    pub y_offset: usize,
    pub width: usize,
    pub height: usize,
    /// Tile row in the enumeration grid
    pub tile_row: usize,
    /// Tile column in the enumeration grid
    pub tile_col: usize,
}

impl BlockDescriptor {
    /// Pixel window covered by this block
    pub fn window(&self) -> PixelWindow {
        PixelWindow::new(self.x_offset, self.y_offset, self.width, self.height)
    }
}

/// Enumerates [`BlockDescriptor`]s of `block_width` x `block_height` pixels
/// over a whole raster.
///
/// The pixel block size is converted to CRS units through the raster's
/// pixel size and the tiling itself is delegated to an [`ExtentWalker`], so
/// both walkers agree tile for tile.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridWalker {
    walker: ExtentWalker,
    raster_width: usize,
    raster_height: usize,
    block_width: usize,
    block_height: usize,
}

impl GridWalker {
    pub fn new(
        raster_width: usize,
        raster_height: usize,
        transform: &GeoTransform,
        block_width: usize,
        block_height: usize,
    ) -> Result<Self> {
        let extent = transform.bounds(raster_width, raster_height);
        let (px, py) = pixel_size(transform, &extent, raster_width, raster_height);
        let walker = ExtentWalker::new(
            extent,
            block_width as f64 * px,
            block_height as f64 * py,
        )?;
        Ok(Self {
            walker,
            raster_width,
            raster_height,
            block_width,
            block_height,
        })
    }

    /// The underlying geographic walker
    pub fn extent_walker(&self) -> &ExtentWalker {
        &self.walker
    }

    /// Number of block columns
    pub fn cols(&self) -> usize {
        self.walker.cols()
    }

    /// Number of block rows
    pub fn rows(&self) -> usize {
        self.walker.rows()
    }

    /// Total number of blocks
    pub fn len(&self) -> usize {
        self.walker.len()
    }

    pub fn is_empty(&self) -> bool {
        self.walker.is_empty()
    }

    /// Block at (tile row, tile column)
    pub fn block(&self, row: usize, col: usize) -> BlockDescriptor {
        let x_offset = (col * self.block_width).min(self.raster_width);
        let y_offset = (row * self.block_height).min(self.raster_height);
        BlockDescriptor {
            extent: self.walker.tile(row, col),
            x_offset,
            y_offset,
            width: self.block_width.min(self.raster_width - x_offset),
            height: self.block_height.min(self.raster_height - y_offset),
            tile_row: row,
            tile_col: col,
        }
    }

    /// Fresh row-major enumeration of all blocks
    pub fn iter(&self) -> GridBlocks {
        GridBlocks {
            walker: *self,
            index: 0,
        }
    }
}

/// Pixel size as extent divided by raster size, falling back to the
/// transform's coefficients for empty rasters.
pub(crate) fn pixel_size(
    transform: &GeoTransform,
    extent: &GeoExtent,
    width: usize,
    height: usize,
) -> (f64, f64) {
    let px = if width > 0 {
        extent.width() / width as f64
    } else {
        transform.pixel_width.abs()
    };
    let py = if height > 0 {
        extent.height() / height as f64
    } else {
        transform.pixel_height.abs()
    };
    (px, py)
}

impl IntoIterator for &GridWalker {
    type Item = BlockDescriptor;
    type IntoIter = GridBlocks;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the blocks of a [`GridWalker`]
#[derive(Debug, Clone)]
pub struct GridBlocks {
    walker: GridWalker,
    index: usize,
}

impl Iterator for GridBlocks {
    type Item = BlockDescriptor;

    fn next(&mut self) -> Option<Self::Item> {
        if self.index >= self.walker.len() {
            return None;
        }
        let cols = self.walker.cols();
        let block = self.walker.block(self.index / cols, self.index % cols);
        self.index += 1;
        Some(block)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.walker.len() - self.index;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for GridBlocks {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_blocks_cover_raster_once() {
        let gt = GeoTransform::new(100.0, 50.0, 30.0, -30.0);
        let walker = GridWalker::new(10, 7, &gt, 4, 3).unwrap();
        assert_eq!((walker.cols(), walker.rows()), (3, 3));

        let mut hits = vec![0u8; 10 * 7];
        for block in walker.iter() {
            assert!(block.x_offset + block.width <= 10);
            assert!(block.y_offset + block.height <= 7);
            for r in block.y_offset..block.y_offset + block.height {
                for c in block.x_offset..block.x_offset + block.width {
                    hits[r * 10 + c] += 1;
                }
            }
        }
        assert!(hits.iter().all(|&h| h == 1));
    }

    #[test]
    fn test_block_extents_match_pixel_windows() {
        let gt = GeoTransform::new(100.0, 50.0, 30.0, -30.0);
        let walker = GridWalker::new(10, 7, &gt, 4, 3).unwrap();
        let blocks: Vec<BlockDescriptor> = walker.iter().collect();

        assert_eq!(blocks[0].window(), PixelWindow::new(0, 0, 4, 3));
        assert_eq!(blocks[2].window(), PixelWindow::new(8, 0, 2, 3));
        assert_eq!(blocks[8].window(), PixelWindow::new(8, 6, 2, 1));
        for block in &blocks {
            let expected = gt.window_bounds(&block.window());
            approx::assert_relative_eq!(block.extent.xmin, expected.xmin, epsilon = 1e-9);
            approx::assert_relative_eq!(block.extent.xmax, expected.xmax, epsilon = 1e-9);
            approx::assert_relative_eq!(block.extent.ymin, expected.ymin, epsilon = 1e-9);
            approx::assert_relative_eq!(block.extent.ymax, expected.ymax, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_single_block_when_larger_than_raster() {
        let walker = GridWalker::new(4, 2, &GeoTransform::default(), 256, 256).unwrap();
        let blocks: Vec<BlockDescriptor> = walker.iter().collect();
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].window(), PixelWindow::full(4, 2));
    }
}
