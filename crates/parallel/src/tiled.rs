//! Tiled processing of whole rasters
//!
//! Blocks come from the reader's `walk_grid` and are handed out to workers.
//! A reader is never shared: every worker opens its own through the
//! caller's factory. Results are returned in block enumeration order
//! (row-major, top-left first) whatever the mode.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bandstack_core::{
    ArrayRequest, BandArray, BlockDescriptor, Feedback, PixelWindow, RasterReader,
};
use ndarray::Array2;
use rayon::prelude::*;
use tracing::debug;

use crate::error::{Error, Result};
use crate::strategy::ProcessingMode;

/// Input handed to the per-block function
#[derive(Debug, Clone)]
pub struct BlockData {
    pub block: BlockDescriptor,
    /// Window actually read: the block plus overlap, clamped to the raster
    pub window: PixelWindow,
    /// One array per requested band, shaped like `window`
    pub arrays: Vec<BandArray>,
    /// Validity masks matching `arrays`
    pub masks: Vec<Array2<bool>>,
}

impl BlockData {
    /// (row, col) of the block's own pixels inside the padded arrays
    pub fn inner_offset(&self) -> (usize, usize) {
        (
            self.block.y_offset - self.window.y_offset,
            self.block.x_offset - self.window.x_offset,
        )
    }

    /// Array `index` without its overlap margin
    pub fn inner(&self, index: usize) -> Option<BandArray> {
        let (row, col) = self.inner_offset();
        self.arrays
            .get(index)
            .map(|a| a.slice(row, col, self.block.height, self.block.width))
    }
}

/// Processor for tiled raster operations
#[derive(Clone)]
pub struct TiledProcessor {
    pub block_width: usize,
    pub block_height: usize,
    /// Pixels of context read around each block
    pub overlap: usize,
    pub mode: ProcessingMode,
    pub mask_not_finite: bool,
    /// Stand-in no-data value for bands that declare none
    pub default_no_data: Option<f64>,
    feedback: Option<Arc<dyn Feedback>>,
}

impl TiledProcessor {
    pub fn new(block_width: usize, block_height: usize) -> Self {
        Self {
            block_width,
            block_height,
            overlap: 0,
            mode: ProcessingMode::default(),
            mask_not_finite: true,
            default_no_data: None,
            feedback: None,
        }
    }

    pub fn with_overlap(mut self, overlap: usize) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn with_mode(mut self, mode: ProcessingMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_default_no_data(mut self, value: Option<f64>) -> Self {
        self.default_no_data = value;
        self
    }

    /// Progress is reported in blocks; cancellation is checked per block
    pub fn with_feedback(mut self, feedback: Arc<dyn Feedback>) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Blocks of `reader` in processing order
    pub fn blocks(&self, reader: &RasterReader) -> Result<Vec<BlockDescriptor>> {
        Ok(reader
            .walk_grid(self.block_width, self.block_height)?
            .iter()
            .collect())
    }

    /// Apply `f` to every block of the raster `open` returns.
    ///
    /// `open` is called once for the block layout and once per worker.
    /// The first error from any block aborts the run.
    pub fn process<O, T, F>(
        &self,
        open: O,
        bands: Option<&[usize]>,
        f: F,
    ) -> Result<Vec<(BlockDescriptor, T)>>
    where
        O: Fn() -> bandstack_core::Result<RasterReader> + Sync,
        T: Send,
        F: Fn(&BlockData) -> T + Sync,
    {
        let mut probe = open()?;
        let blocks = self.blocks(&probe)?;
        let done = AtomicUsize::new(0);
        debug!(
            "Processing {} blocks of {}x{} ({:?})",
            blocks.len(),
            self.block_width,
            self.block_height,
            self.mode
        );

        if !self.mode.is_parallel() {
            return blocks
                .iter()
                .map(|block| self.run_block(&mut probe, block, bands, &f, &done, blocks.len()))
                .collect();
        }
        drop(probe);

        self.mode.install(|| {
            blocks
                .par_iter()
                .map_init(
                    || open().map_err(|e| e.to_string()),
                    |reader, block| {
                        let reader = reader.as_mut().map_err(|e| Error::WorkerOpen(e.clone()))?;
                        self.run_block(reader, block, bands, &f, &done, blocks.len())
                    },
                )
                .collect()
        })?
    }

    fn run_block<T, F>(
        &self,
        reader: &mut RasterReader,
        block: &BlockDescriptor,
        bands: Option<&[usize]>,
        f: &F,
        done: &AtomicUsize,
        total: usize,
    ) -> Result<(BlockDescriptor, T)>
    where
        F: Fn(&BlockData) -> T,
    {
        if self.feedback.as_ref().is_some_and(|fb| fb.is_cancelled()) {
            return Err(bandstack_core::Error::Cancelled {
                window: block.window(),
            }
            .into());
        }

        let request = ArrayRequest {
            bands: bands.map(<[usize]>::to_vec),
            ..ArrayRequest::new()
                .pixel_window(&block.window())
                .overlap(self.overlap)
        };
        let window = reader
            .resolve_window(&request)?
            .unwrap_or_else(|| block.window());
        let arrays = reader.array(&request)?;
        let masks = reader.mask_array(&arrays, bands, self.mask_not_finite, self.default_no_data)?;
        let data = BlockData {
            block: *block,
            window,
            arrays,
            masks,
        };
        let result = f(&data);

        let finished = done.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(feedback) = &self.feedback {
            feedback.set_progress(finished, total);
        }
        Ok((*block, result))
    }
}

impl std::fmt::Debug for TiledProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiledProcessor")
            .field("block_width", &self.block_width)
            .field("block_height", &self.block_height)
            .field("overlap", &self.overlap)
            .field("mode", &self.mode)
            .field("mask_not_finite", &self.mask_not_finite)
            .field("default_no_data", &self.default_no_data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bandstack_core::io::MemDataset;
    use bandstack_core::CancelToken;

    fn open_ramp() -> bandstack_core::Result<RasterReader> {
        let data = Array2::from_shape_fn((10, 13), |(r, c)| (r * 13 + c) as i32);
        let ds = MemDataset::new(13, 10)
            .with_band(data)?
            .with_no_data(1, 0.0)?;
        Ok(RasterReader::from_dataset(Box::new(ds)))
    }

    fn block_sum(data: &BlockData) -> (usize, f64) {
        let inner = data.inner(0).map(|a| a.to_f64()).unwrap_or_default();
        let (row, col) = data.inner_offset();
        let mask = &data.masks[0];
        let mut valid = 0;
        for ((r, c), _) in inner.indexed_iter() {
            if mask[[r + row, c + col]] {
                valid += 1;
            }
        }
        (valid, inner.sum())
    }

    #[test]
    fn test_results_in_block_order() {
        let processor = TiledProcessor::new(4, 3).with_mode(ProcessingMode::ParallelWith(3));
        let results = processor.process(open_ramp, None, block_sum).unwrap();
        assert_eq!(results.len(), 16);
        for (i, (block, _)) in results.iter().enumerate() {
            assert_eq!((block.tile_row, block.tile_col), (i / 4, i % 4));
        }

        let valid: usize = results.iter().map(|(_, (v, _))| v).sum();
        let total: f64 = results.iter().map(|(_, (_, s))| s).sum();
        assert_eq!(valid, 129);
        assert_eq!(total, (0..130).sum::<i32>() as f64);
    }

    #[test]
    fn test_modes_agree_with_overlap() {
        let sequential = TiledProcessor::new(5, 4)
            .with_overlap(2)
            .with_mode(ProcessingMode::Sequential)
            .process(open_ramp, Some(&[1]), block_sum)
            .unwrap();
        let parallel = TiledProcessor::new(5, 4)
            .with_overlap(2)
            .with_mode(ProcessingMode::Parallel)
            .process(open_ramp, Some(&[1]), block_sum)
            .unwrap();
        assert_eq!(sequential, parallel);
    }

    #[test]
    fn test_padded_window_offsets() {
        let results = TiledProcessor::new(5, 4)
            .with_overlap(1)
            .with_mode(ProcessingMode::Sequential)
            .process(open_ramp, None, |d| (d.window, d.inner_offset()))
            .unwrap();
        let (first, second) = (results[0].1, results[1].1);
        assert_eq!(first, (PixelWindow::new(0, 0, 6, 5), (0, 0)));
        assert_eq!(second, (PixelWindow::new(4, 0, 7, 5), (0, 1)));
    }

    #[test]
    fn test_open_failure_aborts() {
        let err = TiledProcessor::new(4, 4)
            .process(
                || RasterReader::open("/nonexistent/cube.tif"),
                None,
                |_| (),
            )
            .unwrap_err();
        assert!(matches!(err, Error::Core(_)));
    }

    #[test]
    fn test_cancelled_run() {
        let token = CancelToken::new();
        token.cancel();
        let err = TiledProcessor::new(4, 4)
            .with_mode(ProcessingMode::Sequential)
            .with_feedback(Arc::new(token))
            .process(open_ramp, None, |_| ())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Core(bandstack_core::Error::Cancelled { .. })
        ));
    }
}
