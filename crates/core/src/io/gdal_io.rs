//! Any GDAL-readable raster through the `gdal` crate

use std::path::Path;

use gdal::raster::{GdalDataType, GdalType};
use gdal::{Dataset, Metadata};

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::metadata::{PersistedMetadata, Scope};
use crate::raster::{BandArray, DataType, GeoTransform, PixelWindow, RasterElement};

use super::RasterDataset;

/// A dataset opened with GDAL.
///
/// Metadata items of every domain, dataset and band level, are exposed as
/// persisted metadata.
pub struct GdalDataset {
    path: String,
    dataset: Dataset,
    width: usize,
    height: usize,
    band_count: usize,
    data_types: Vec<DataType>,
}

fn data_type_of(t: GdalDataType) -> Result<DataType> {
    match t {
        GdalDataType::UInt8 => Ok(DataType::UInt8),
        GdalDataType::Int8 => Ok(DataType::Int8),
        GdalDataType::UInt16 => Ok(DataType::UInt16),
        GdalDataType::Int16 => Ok(DataType::Int16),
        GdalDataType::UInt32 => Ok(DataType::UInt32),
        GdalDataType::Int32 => Ok(DataType::Int32),
        GdalDataType::UInt64 => Ok(DataType::UInt64),
        GdalDataType::Int64 => Ok(DataType::Int64),
        GdalDataType::Float32 => Ok(DataType::Float32),
        GdalDataType::Float64 => Ok(DataType::Float64),
        other => Err(Error::UnsupportedDataType(format!("GDAL {:?}", other))),
    }
}

impl GdalDataset {
    pub fn open(path: &Path) -> Result<Self> {
        let dataset = Dataset::open(path)?;
        let (width, height) = dataset.raster_size();
        let band_count = dataset.raster_count() as usize;
        let data_types = (1..=band_count)
            .map(|b| data_type_of(dataset.rasterband(b)?.band_type()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            path: path.display().to_string(),
            dataset,
            width,
            height,
            band_count,
            data_types,
        })
    }

    fn read_typed<T: RasterElement + GdalType>(
        &self,
        band: usize,
        window: &PixelWindow,
    ) -> Result<BandArray> {
        let rasterband = self.dataset.rasterband(band)?;
        let size = (window.width, window.height);
        let buffer = rasterband.read_as::<T>(
            (window.x_offset as isize, window.y_offset as isize),
            size,
            size,
            None,
        )?;
        BandArray::from_vec(buffer.data().to_vec(), window.height, window.width)
    }
}

/// Split GDAL `KEY=VALUE` metadata strings into `target`
fn collect_items(target: &mut PersistedMetadata, object: &impl Metadata, scope: Scope) {
    let mut domains = object.metadata_domains();
    if !domains.iter().any(|d| d.is_empty()) {
        domains.push(String::new());
    }
    for domain in domains {
        for entry in object.metadata_domain(&domain).unwrap_or_default() {
            if let Some((key, value)) = entry.split_once('=') {
                target.insert(&domain, scope, key, value);
            }
        }
    }
}

impl RasterDataset for GdalDataset {
    fn description(&self) -> String {
        self.path.clone()
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn band_count(&self) -> usize {
        self.band_count
    }

    fn data_type(&self, band: usize) -> DataType {
        band.checked_sub(1)
            .and_then(|i| self.data_types.get(i))
            .copied()
            .unwrap_or(DataType::Float64)
    }

    fn geo_transform(&self) -> GeoTransform {
        self.dataset
            .geo_transform()
            .map(GeoTransform::from_gdal)
            .unwrap_or_default()
    }

    fn crs(&self) -> Option<CRS> {
        let srs = self.dataset.spatial_ref().ok()?;
        let wkt = srs.to_wkt().ok()?;
        match srs.auth_code() {
            Ok(code) if code > 0 => Some(CRS::from_epsg(code as u32)),
            _ => CRS::from_wkt(wkt),
        }
    }

    fn no_data_value(&self, band: usize) -> Option<f64> {
        self.dataset.rasterband(band).ok()?.no_data_value()
    }

    fn scale(&self, band: usize) -> Option<f64> {
        self.dataset.rasterband(band).ok()?.scale()
    }

    fn offset(&self, band: usize) -> Option<f64> {
        self.dataset.rasterband(band).ok()?.offset()
    }

    fn band_description(&self, band: usize) -> Option<String> {
        let description = self.dataset.rasterband(band).ok()?.description().ok()?;
        (!description.is_empty()).then_some(description)
    }

    fn native_block_size(&self, band: usize) -> (usize, usize) {
        self.dataset
            .rasterband(band)
            .map(|b| b.block_size())
            .unwrap_or((self.width.max(1), 1))
    }

    fn persisted_metadata(&self) -> PersistedMetadata {
        let mut meta = PersistedMetadata::new();
        collect_items(&mut meta, &self.dataset, Scope::Dataset);
        for band in 1..=self.band_count {
            if let Ok(rasterband) = self.dataset.rasterband(band) {
                collect_items(&mut meta, &rasterband, Scope::Band(band));
            }
        }
        meta
    }

    fn read_block(&mut self, band: usize, window: &PixelWindow) -> Result<BandArray> {
        if band == 0 || band > self.band_count {
            return Err(Error::InvalidBand {
                band,
                band_count: self.band_count,
            });
        }
        if !window.fits(self.width, self.height) {
            return Err(Error::InvalidWindow {
                window: *window,
                width: self.width,
                height: self.height,
            });
        }
        match self.data_type(band) {
            DataType::UInt8 => self.read_typed::<u8>(band, window),
            DataType::Int8 => self.read_typed::<i8>(band, window),
            DataType::UInt16 => self.read_typed::<u16>(band, window),
            DataType::Int16 => self.read_typed::<i16>(band, window),
            DataType::UInt32 => self.read_typed::<u32>(band, window),
            DataType::Int32 => self.read_typed::<i32>(band, window),
            DataType::UInt64 => self.read_typed::<u64>(band, window),
            DataType::Int64 => self.read_typed::<i64>(band, window),
            DataType::Float32 => self.read_typed::<f32>(band, window),
            DataType::Float64 => self.read_typed::<f64>(band, window),
        }
    }
}
