//! Pixel windows

use serde::{Deserialize, Serialize};
use std::fmt;

/// A rectangular pixel window: offsets of the top-left pixel plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct PixelWindow {
    pub x_offset: usize,
    pub y_offset: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelWindow {
    pub fn new(x_offset: usize, y_offset: usize, width: usize, height: usize) -> Self {
        Self {
            x_offset,
            y_offset,
            width,
            height,
        }
    }

    /// Window covering a whole raster of the given size
    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Whether the window contains no pixels
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Exclusive end column, saturating at `usize::MAX`
    pub fn x_end(&self) -> usize {
        self.x_offset.saturating_add(self.width)
    }

    /// Exclusive end row, saturating at `usize::MAX`
    pub fn y_end(&self) -> usize {
        self.y_offset.saturating_add(self.height)
    }

    /// Number of pixels in the window
    pub fn len(&self) -> usize {
        self.width.saturating_mul(self.height)
    }

    /// Whether the window lies inside a raster of the given size
    pub fn fits(&self, width: usize, height: usize) -> bool {
        let x_end = self.x_offset.checked_add(self.width);
        let y_end = self.y_offset.checked_add(self.height);
        matches!((x_end, y_end), (Some(x), Some(y)) if x <= width && y <= height)
    }

    /// Grow the window by `overlap` pixels on every side, clamped to a
    /// raster of the given size.
    pub fn padded(&self, overlap: usize, width: usize, height: usize) -> Self {
        let x0 = self.x_offset.saturating_sub(overlap);
        let y0 = self.y_offset.saturating_sub(overlap);
        let x1 = self.x_end().saturating_add(overlap).min(width);
        let y1 = self.y_end().saturating_add(overlap).min(height);
        Self::new(x0, y0, x1.saturating_sub(x0), y1.saturating_sub(y0))
    }
}

impl fmt::Display for PixelWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[x={}, y={}, {}x{}]",
            self.x_offset, self.y_offset, self.width, self.height
        )
    }
}
