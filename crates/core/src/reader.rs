//! Windowed and blockwise array access
//!
//! [`RasterReader`] is the only component that produces pixel arrays. A
//! request addresses either a pixel window or a bounding box, optionally
//! padded by an overlap margin, and returns one array per band in the
//! band's native data type.
//!
//! Padding that would reach past the raster edge is clamped: the result
//! shrinks on that side and [`RasterReader::resolve_window`] tells the
//! caller where the returned block lies.

use std::path::Path;
use std::sync::Arc;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cancel::Feedback;
use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::{self, RasterDataset, ReaderOptions};
use crate::metadata::SessionOverlay;
use crate::raster::{BandArray, DataType, GeoExtent, GeoTransform, PixelWindow};
use crate::source::RasterSource;
use crate::walk::GridWalker;

/// Tolerance, in pixels, for snapping bounding box edges to pixel edges
const SNAP_TOLERANCE: f64 = 1e-6;

/// Arguments of [`RasterReader::array`].
///
/// Pixel addressing (`x_offset`, `y_offset`, `width`, `height`) and
/// `bounding_box` are mutually exclusive; `width`/`height` may accompany a
/// bounding box only when they equal its native pixel size.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayRequest {
    /// 1-based band numbers, all bands when `None`
    pub bands: Option<Vec<usize>>,
    pub x_offset: Option<usize>,
    pub y_offset: Option<usize>,
    pub width: Option<usize>,
    pub height: Option<usize>,
    pub bounding_box: Option<GeoExtent>,
    /// Pixels added on every side of the window
    pub overlap: usize,
}

impl ArrayRequest {
    /// Full raster, all bands
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bands(mut self, bands: impl Into<Vec<usize>>) -> Self {
        self.bands = Some(bands.into());
        self
    }

    pub fn window(mut self, x_offset: usize, y_offset: usize, width: usize, height: usize) -> Self {
        self.x_offset = Some(x_offset);
        self.y_offset = Some(y_offset);
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn pixel_window(self, window: &PixelWindow) -> Self {
        self.window(window.x_offset, window.y_offset, window.width, window.height)
    }

    pub fn bounding_box(mut self, extent: GeoExtent) -> Self {
        self.bounding_box = Some(extent);
        self
    }

    pub fn size(mut self, width: usize, height: usize) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }
}

/// Reader over one raster source.
///
/// Owns its dataset handle, decoded-chunk cache and session metadata
/// overlay. A reader is `Send` but not shared: open one reader per worker
/// thread.
pub struct RasterReader {
    source: RasterSource,
    options: ReaderOptions,
    feedback: Option<Arc<dyn Feedback>>,
}

impl RasterReader {
    /// Open a raster file with default options
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_options(path, ReaderOptions::default())
    }

    pub fn open_with_options(path: impl AsRef<Path>, options: ReaderOptions) -> Result<Self> {
        let dataset = io::open(path, &options)?;
        Ok(Self::from_dataset_with_options(dataset, options))
    }

    /// Wrap an already opened dataset
    pub fn from_dataset(dataset: Box<dyn RasterDataset>) -> Self {
        Self::from_dataset_with_options(dataset, ReaderOptions::default())
    }

    pub fn from_dataset_with_options(dataset: Box<dyn RasterDataset>, options: ReaderOptions) -> Self {
        Self {
            source: RasterSource::new(dataset),
            options,
            feedback: None,
        }
    }

    /// Start from pre-populated session metadata instead of an empty overlay
    pub fn with_overlay(mut self, overlay: SessionOverlay) -> Self {
        self.source.replace_overlay(overlay);
        self
    }

    /// Cancellation and progress sink consulted by [`array`](Self::array)
    pub fn with_feedback(mut self, feedback: Arc<dyn Feedback>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    pub fn set_feedback(&mut self, feedback: Option<Arc<dyn Feedback>>) {
        self.feedback = feedback;
    }

    pub fn options(&self) -> &ReaderOptions {
        &self.options
    }

    pub fn source(&self) -> &RasterSource {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut RasterSource {
        &mut self.source
    }

    pub fn width(&self) -> usize {
        self.source.width()
    }

    pub fn height(&self) -> usize {
        self.source.height()
    }

    pub fn band_count(&self) -> usize {
        self.source.band_count()
    }

    pub fn data_type(&self, band: usize) -> Result<DataType> {
        self.source.data_type(band)
    }

    pub fn extent(&self) -> GeoExtent {
        self.source.extent()
    }

    pub fn pixel_size(&self) -> (f64, f64) {
        self.source.pixel_size()
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        self.source.geo_transform()
    }

    pub fn crs(&self) -> Option<&CRS> {
        self.source.crs()
    }

    /// Validate a band list, defaulting to every band
    fn resolve_bands(&self, bands: Option<&[usize]>) -> Result<Vec<usize>> {
        match bands {
            Some(bands) => {
                for &band in bands {
                    self.source.check_band(band)?;
                }
                Ok(bands.to_vec())
            }
            None => Ok((1..=self.band_count()).collect()),
        }
    }

    /// The window [`array`](Self::array) will read for `request`, padding
    /// included and clamped to the raster.
    ///
    /// `None` when a bounding box misses the raster entirely.
    pub fn resolve_window(&self, request: &ArrayRequest) -> Result<Option<PixelWindow>> {
        let (width, height) = (self.width(), self.height());
        let base = match &request.bounding_box {
            Some(bbox) => {
                if request.x_offset.is_some() || request.y_offset.is_some() {
                    return Err(Error::InvalidParameter {
                        name: "bounding_box",
                        value: bbox.to_string(),
                        reason: "cannot be combined with pixel offsets".into(),
                    });
                }
                let Some(window) = self.bbox_window(bbox)? else {
                    return Ok(None);
                };
                check_size("width", request.width, window.width)?;
                check_size("height", request.height, window.height)?;
                window
            }
            None => {
                let x = request.x_offset.unwrap_or(0);
                let y = request.y_offset.unwrap_or(0);
                let window = PixelWindow::new(
                    x,
                    y,
                    request.width.unwrap_or(width.saturating_sub(x)),
                    request.height.unwrap_or(height.saturating_sub(y)),
                );
                if !window.fits(width, height) {
                    return Err(Error::InvalidWindow {
                        window,
                        width,
                        height,
                    });
                }
                window
            }
        };
        Ok(Some(base.padded(request.overlap, width, height)))
    }

    /// Pixels touched by `bbox` after clipping it to the raster extent
    fn bbox_window(&self, bbox: &GeoExtent) -> Result<Option<PixelWindow>> {
        let (width, height) = (self.width(), self.height());
        if width == 0 || height == 0 {
            return Ok(None);
        }
        let Some(clip) = self.extent().intersection(bbox) else {
            return Ok(None);
        };

        let transform = self.geo_transform();
        let corners = [
            (clip.xmin, clip.ymax),
            (clip.xmax, clip.ymax),
            (clip.xmin, clip.ymin),
            (clip.xmax, clip.ymin),
        ];
        let (mut col_min, mut col_max) = (f64::INFINITY, f64::NEG_INFINITY);
        let (mut row_min, mut row_max) = (f64::INFINITY, f64::NEG_INFINITY);
        for (x, y) in corners {
            let (col, row) = transform.geo_to_pixel(x, y)?;
            col_min = col_min.min(col);
            col_max = col_max.max(col);
            row_min = row_min.min(row);
            row_max = row_max.max(row);
        }

        let (x0, x1) = pixel_span(col_min, col_max, width);
        let (y0, y1) = pixel_span(row_min, row_max, height);
        Ok(Some(PixelWindow::new(x0, y0, x1 - x0, y1 - y0)))
    }

    /// Read the requested window of each requested band.
    ///
    /// Band numbers are validated before any I/O. Every array has the shape
    /// of [`resolve_window`](Self::resolve_window), or `(0, 0)` when a
    /// bounding box misses the raster.
    pub fn array(&mut self, request: &ArrayRequest) -> Result<Vec<BandArray>> {
        let bands = self.resolve_bands(request.bands.as_deref())?;
        let Some(window) = self.resolve_window(request)? else {
            debug!("Bounding box outside {}, returning empty arrays", self.source.description());
            return bands
                .iter()
                .map(|&band| Ok(BandArray::zeros(self.source.data_type(band)?, (0, 0))))
                .collect();
        };

        let total = window.height * bands.len();
        let mut arrays = Vec::with_capacity(bands.len());
        for (i, &band) in bands.iter().enumerate() {
            arrays.push(self.read_band(band, &window, i * window.height, total)?);
        }
        Ok(arrays)
    }

    /// Read one band strip by strip, checking for cancellation between strips
    fn read_band(
        &mut self,
        band: usize,
        window: &PixelWindow,
        done_before: usize,
        total: usize,
    ) -> Result<BandArray> {
        let mut out = BandArray::zeros(self.source.data_type(band)?, (window.height, window.width));
        if window.is_empty() {
            return Ok(out);
        }
        let (_, block_height) = self.source.native_block_size(band)?;
        let strip = block_height.max(self.options.strip_rows).max(1);

        let mut row = 0;
        while row < window.height {
            if self.feedback.as_ref().is_some_and(|f| f.is_cancelled()) {
                debug!("Read of band {} cancelled at row {}", band, row);
                return Err(Error::Cancelled { window: *window });
            }
            let rows = strip.min(window.height - row);
            let part = PixelWindow::new(window.x_offset, window.y_offset + row, window.width, rows);
            let block = self
                .source
                .dataset_mut()
                .read_block(band, &part)
                .map_err(|e| read_error(e, band, part))?;
            out.assign_region(row, 0, &block)?;
            row += rows;
            if let Some(feedback) = &self.feedback {
                feedback.set_progress(done_before + row, total);
            }
        }
        debug!(
            "Read band {} window {}x{} at ({}, {})",
            band, window.width, window.height, window.x_offset, window.y_offset
        );
        Ok(out)
    }

    /// [`array`](Self::array) converted to `value * scale + offset`.
    ///
    /// Pixels rejected by the band's no-data rules keep their raw value.
    pub fn array_scaled(&mut self, request: &ArrayRequest) -> Result<Vec<Array2<f64>>> {
        let bands = self.resolve_bands(request.bands.as_deref())?;
        let arrays = self.array(request)?;
        arrays
            .iter()
            .zip(&bands)
            .map(|(array, &band)| {
                let (scale, offset) = (self.source.scale(band)?, self.source.offset(band)?);
                let valid = self.source.mask_rules(band, false, None)?.apply(array);
                let mut values = array.to_f64();
                ndarray::Zip::from(&mut values).and(&valid).for_each(|v, &ok| {
                    if ok {
                        *v = *v * scale + offset;
                    }
                });
                Ok(values)
            })
            .collect()
    }

    /// Validity masks for arrays previously read from `bands`.
    ///
    /// `true` marks a valid pixel. A pixel is invalid if it equals the
    /// band's no-data value in use, falls into one of the band's user
    /// ranges, or (with `mask_not_finite`) is NaN or infinite.
    /// `default_no_data` stands in for a band that declares no no-data at
    /// all and is not stored anywhere.
    pub fn mask_array(
        &self,
        arrays: &[BandArray],
        bands: Option<&[usize]>,
        mask_not_finite: bool,
        default_no_data: Option<f64>,
    ) -> Result<Vec<Array2<bool>>> {
        let bands = self.resolve_bands(bands)?;
        if bands.len() != arrays.len() {
            return Err(Error::InvalidParameter {
                name: "bands",
                value: format!("{:?}", bands),
                reason: format!("{} arrays given", arrays.len()),
            });
        }
        arrays
            .iter()
            .zip(bands)
            .map(|(array, band)| {
                let rules = self.source.mask_rules(band, mask_not_finite, default_no_data)?;
                Ok(rules.apply(array))
            })
            .collect()
    }

    /// Blocks of `block_width` x `block_height` pixels covering the raster
    pub fn walk_grid(&self, block_width: usize, block_height: usize) -> Result<GridWalker> {
        GridWalker::new(
            self.width(),
            self.height(),
            self.geo_transform(),
            block_width,
            block_height,
        )
    }

    /// Bytes needed for one full raster row over `bands`
    pub fn line_memory_usage(&self, bands: Option<&[usize]>) -> Result<usize> {
        let bands = self.resolve_bands(bands)?;
        bands.iter().try_fold(0usize, |acc, &band| {
            Ok(acc + self.width() * self.source.data_type(band)?.size_bytes())
        })
    }

    /// Largest block height (at least 1) whose full-width rows over `bands`
    /// fit in `max_bytes`
    pub fn block_rows_for_memory(&self, max_bytes: usize, bands: Option<&[usize]>) -> Result<usize> {
        let line = self.line_memory_usage(bands)?;
        let limit = self.height().max(1);
        if line == 0 {
            return Ok(limit);
        }
        Ok((max_bytes / line).clamp(1, limit))
    }
}

impl std::fmt::Debug for RasterReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterReader")
            .field("source", &self.source)
            .field("options", &self.options)
            .field("feedback", &self.feedback.is_some())
            .finish()
    }
}

fn check_size(name: &'static str, requested: Option<usize>, native: usize) -> Result<()> {
    match requested {
        Some(size) if size != native => Err(Error::InvalidParameter {
            name,
            value: size.to_string(),
            reason: format!(
                "bounding box covers {} pixels and resampling is not supported",
                native
            ),
        }),
        _ => Ok(()),
    }
}

/// Half-open pixel range covering `[min, max]` in pixel coordinates,
/// at least one pixel wide and inside `0..size`
fn pixel_span(min: f64, max: f64, size: usize) -> (usize, usize) {
    let start = snap(min).floor().max(0.0) as usize;
    let end = (snap(max).ceil().max(0.0) as usize).min(size);
    let start = start.min(size - 1);
    (start, end.max(start + 1))
}

fn snap(v: f64) -> f64 {
    let r = v.round();
    if (v - r).abs() < SNAP_TOLERANCE {
        r
    } else {
        v
    }
}

/// Validation and cancellation errors pass through, anything else from the
/// backend becomes a `Read` error naming band and window
fn read_error(err: Error, band: usize, window: PixelWindow) -> Error {
    match err {
        Error::InvalidBand { .. } | Error::InvalidWindow { .. } | Error::Cancelled { .. } => err,
        other => Error::Read {
            band,
            window,
            reason: other.to_string(),
        },
    }
}
