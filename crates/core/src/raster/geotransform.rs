//! Affine geotransformation for rasters

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::{GeoExtent, PixelWindow};

/// Affine transformation coefficients for georeferencing rasters.
///
/// Converts between pixel coordinates (col, row) and geographic coordinates (x, y):
/// ```text
/// x = origin_x + col * pixel_width + row * row_rotation
/// y = origin_y + col * col_rotation + row * pixel_height
/// ```
///
/// Pixel coordinates address pixel corners: `(0, 0)` is the top-left corner
/// of the top-left pixel, `(0.5, 0.5)` its center. For north-up images
/// `row_rotation` and `col_rotation` are 0 and `pixel_height` is negative.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoTransform {
    /// X coordinate of the upper-left corner
    pub origin_x: f64,
    /// Y coordinate of the upper-left corner
    pub origin_y: f64,
    /// Pixel width (cell size in X direction)
    pub pixel_width: f64,
    /// Pixel height (cell size in Y direction, usually negative)
    pub pixel_height: f64,
    /// Rotation about X axis (usually 0)
    pub row_rotation: f64,
    /// Rotation about Y axis (usually 0)
    pub col_rotation: f64,
}

impl GeoTransform {
    /// Create a new GeoTransform with no rotation (north-up image)
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
            row_rotation: 0.0,
            col_rotation: 0.0,
        }
    }

    /// Create from GDAL-style array [origin_x, pixel_width, row_rotation, origin_y, col_rotation, pixel_height]
    pub fn from_gdal(coeffs: [f64; 6]) -> Self {
        Self {
            origin_x: coeffs[0],
            pixel_width: coeffs[1],
            row_rotation: coeffs[2],
            origin_y: coeffs[3],
            col_rotation: coeffs[4],
            pixel_height: coeffs[5],
        }
    }

    /// Convert to GDAL-style array
    pub fn to_gdal(&self) -> [f64; 6] {
        [
            self.origin_x,
            self.pixel_width,
            self.row_rotation,
            self.origin_y,
            self.col_rotation,
            self.pixel_height,
        ]
    }

    /// Apply the affine transform to (fractional) pixel coordinates
    pub fn pixel_to_geo(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.origin_x + col * self.pixel_width + row * self.row_rotation;
        let y = self.origin_y + col * self.col_rotation + row * self.pixel_height;
        (x, y)
    }

    /// Geographic coordinates of a pixel center
    pub fn pixel_center(&self, col: usize, row: usize) -> (f64, f64) {
        self.pixel_to_geo(col as f64 + 0.5, row as f64 + 0.5)
    }

    /// Convert geographic coordinates to fractional pixel coordinates
    ///
    /// Fails if the transform is not invertible (e.g. zero pixel size).
    pub fn geo_to_pixel(&self, x: f64, y: f64) -> Result<(f64, f64)> {
        let det = self.determinant();

        if det.abs() < 1e-12 || !det.is_finite() {
            return Err(Error::InvalidTransform(format!(
                "transform {:?} is not invertible (determinant {})",
                self.to_gdal(),
                det
            )));
        }

        let dx = x - self.origin_x;
        let dy = y - self.origin_y;

        let col = (self.pixel_height * dx - self.row_rotation * dy) / det;
        let row = (-self.col_rotation * dx + self.pixel_width * dy) / det;

        Ok((col, row))
    }

    fn determinant(&self) -> f64 {
        self.pixel_width * self.pixel_height - self.row_rotation * self.col_rotation
    }

    /// Whether pixel/geo conversion is possible with this transform
    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        det.is_finite() && det.abs() >= 1e-12
    }

    /// Bounding box of a raster of the given dimensions
    pub fn bounds(&self, width: usize, height: usize) -> GeoExtent {
        self.window_bounds(&PixelWindow::full(width, height))
    }

    /// Bounding box of a pixel window
    pub fn window_bounds(&self, window: &PixelWindow) -> GeoExtent {
        let x0 = window.x_offset as f64;
        let y0 = window.y_offset as f64;
        let x1 = window.x_end() as f64;
        let y1 = window.y_end() as f64;
        let corners = [
            self.pixel_to_geo(x0, y0),
            self.pixel_to_geo(x1, y0),
            self.pixel_to_geo(x0, y1),
            self.pixel_to_geo(x1, y1),
        ];

        let mut extent = GeoExtent::new(corners[0].0, corners[0].1, corners[0].0, corners[0].1);
        for &(x, y) in &corners[1..] {
            extent = extent.include(x, y);
        }
        extent
    }
}

impl Default for GeoTransform {
    fn default() -> Self {
        Self::new(0.0, 0.0, 1.0, -1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_pixel_to_geo_roundtrip() {
        let gt = GeoTransform::new(100.0, 200.0, 10.0, -10.0);

        let (x, y) = gt.pixel_center(5, 10);
        let (col, row) = gt.geo_to_pixel(x, y).unwrap();

        assert_relative_eq!(col, 5.5, epsilon = 1e-10);
        assert_relative_eq!(row, 10.5, epsilon = 1e-10);
    }

    #[test]
    fn test_rotated_inverse() {
        let gt = GeoTransform {
            origin_x: 10.0,
            origin_y: 50.0,
            pixel_width: 2.0,
            pixel_height: -2.0,
            row_rotation: 0.5,
            col_rotation: 0.25,
        };
        let (x, y) = gt.pixel_to_geo(3.0, 7.0);
        let (col, row) = gt.geo_to_pixel(x, y).unwrap();
        assert_relative_eq!(col, 3.0, epsilon = 1e-10);
        assert_relative_eq!(row, 7.0, epsilon = 1e-10);
    }

    #[test]
    fn test_zero_pixel_size_is_not_invertible() {
        let gt = GeoTransform::new(0.0, 0.0, 0.0, -1.0);
        assert!(!gt.is_invertible());
        assert!(matches!(
            gt.geo_to_pixel(1.0, 1.0),
            Err(Error::InvalidTransform(_))
        ));
    }

    #[test]
    fn test_bounds() {
        let gt = GeoTransform::new(0.0, 100.0, 1.0, -1.0);
        let b = gt.bounds(100, 100);

        assert_relative_eq!(b.xmin, 0.0, epsilon = 1e-10);
        assert_relative_eq!(b.ymin, 0.0, epsilon = 1e-10);
        assert_relative_eq!(b.xmax, 100.0, epsilon = 1e-10);
        assert_relative_eq!(b.ymax, 100.0, epsilon = 1e-10);
    }
}
