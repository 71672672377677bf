//! In-memory datasets

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::metadata::PersistedMetadata;
use crate::raster::{BandArray, DataType, GeoTransform, PixelWindow};

use super::RasterDataset;

#[derive(Debug, Clone)]
struct MemBand {
    data: BandArray,
    no_data: Option<f64>,
    scale: Option<f64>,
    offset: Option<f64>,
    description: Option<String>,
}

/// A dataset held entirely in memory.
///
/// Built with chained setters:
///
/// ```
/// use bandstack_core::io::MemDataset;
/// use ndarray::array;
///
/// let ds = MemDataset::new(2, 1)
///     .with_band(array![[1u8, 2]])?
///     .with_no_data(1, 0.0)?;
/// # Ok::<(), bandstack_core::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct MemDataset {
    width: usize,
    height: usize,
    bands: Vec<MemBand>,
    transform: GeoTransform,
    crs: Option<CRS>,
    metadata: PersistedMetadata,
    block_size: Option<(usize, usize)>,
}

impl MemDataset {
    /// Empty dataset of `width` x `height` pixels with no bands
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            bands: Vec::new(),
            transform: GeoTransform::default(),
            crs: None,
            metadata: PersistedMetadata::new(),
            block_size: None,
        }
    }

    /// Append a band; its shape must be `(height, width)`
    pub fn with_band(mut self, data: impl Into<BandArray>) -> Result<Self> {
        let data = data.into();
        if data.shape() != (self.height, self.width) {
            return Err(Error::InvalidParameter {
                name: "band",
                value: format!("{}x{}", data.cols(), data.rows()),
                reason: format!("dataset is {}x{}", self.width, self.height),
            });
        }
        self.bands.push(MemBand {
            data,
            no_data: None,
            scale: None,
            offset: None,
            description: None,
        });
        Ok(self)
    }

    pub fn with_transform(mut self, transform: GeoTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_crs(mut self, crs: CRS) -> Self {
        self.crs = Some(crs);
        self
    }

    pub fn with_metadata(mut self, metadata: PersistedMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Override the native block size (defaults to whole rows)
    pub fn with_block_size(mut self, width: usize, height: usize) -> Self {
        self.block_size = Some((width.max(1), height.max(1)));
        self
    }

    pub fn with_no_data(mut self, band: usize, value: f64) -> Result<Self> {
        self.band_mut(band)?.no_data = Some(value);
        Ok(self)
    }

    pub fn with_scale_offset(mut self, band: usize, scale: f64, offset: f64) -> Result<Self> {
        let b = self.band_mut(band)?;
        b.scale = Some(scale);
        b.offset = Some(offset);
        Ok(self)
    }

    pub fn with_band_description(mut self, band: usize, description: &str) -> Result<Self> {
        self.band_mut(band)?.description = Some(description.to_string());
        Ok(self)
    }

    fn band_mut(&mut self, band: usize) -> Result<&mut MemBand> {
        let band_count = self.bands.len();
        band.checked_sub(1)
            .and_then(|i| self.bands.get_mut(i))
            .ok_or(Error::InvalidBand { band, band_count })
    }

    fn band(&self, band: usize) -> Option<&MemBand> {
        band.checked_sub(1).and_then(|i| self.bands.get(i))
    }
}

impl RasterDataset for MemDataset {
    fn description(&self) -> String {
        format!("<memory {}x{}x{}>", self.width, self.height, self.bands.len())
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn data_type(&self, band: usize) -> DataType {
        self.band(band)
            .map(|b| b.data.data_type())
            .unwrap_or(DataType::Float64)
    }

    fn geo_transform(&self) -> GeoTransform {
        self.transform
    }

    fn crs(&self) -> Option<CRS> {
        self.crs.clone()
    }

    fn no_data_value(&self, band: usize) -> Option<f64> {
        self.band(band).and_then(|b| b.no_data)
    }

    fn scale(&self, band: usize) -> Option<f64> {
        self.band(band).and_then(|b| b.scale)
    }

    fn offset(&self, band: usize) -> Option<f64> {
        self.band(band).and_then(|b| b.offset)
    }

    fn band_description(&self, band: usize) -> Option<String> {
        self.band(band).and_then(|b| b.description.clone())
    }

    fn native_block_size(&self, _band: usize) -> (usize, usize) {
        self.block_size.unwrap_or((self.width.max(1), 1))
    }

    fn persisted_metadata(&self) -> PersistedMetadata {
        self.metadata.clone()
    }

    fn read_block(&mut self, band: usize, window: &PixelWindow) -> Result<BandArray> {
        if !window.fits(self.width, self.height) {
            return Err(Error::InvalidWindow {
                window: *window,
                width: self.width,
                height: self.height,
            });
        }
        let band_count = self.bands.len();
        let b = self
            .band(band)
            .ok_or(Error::InvalidBand { band, band_count })?;
        Ok(b.data.slice(
            window.y_offset,
            window.x_offset,
            window.height,
            window.width,
        ))
    }
}
