//! Raster dataset backends
//!
//! A [`RasterDataset`] is the native handle a reader owns: it knows the
//! raster's geometry, band properties and persisted metadata, and can read
//! one band over a pixel window in the band's native data type.

mod cache;
mod envi;
#[cfg(feature = "gdal")]
mod gdal_io;
mod mem;
mod tiff_io;

pub use cache::{ChunkCache, ChunkKey};
pub use envi::{EnviDataset, EnviHeader, Interleave};
#[cfg(feature = "gdal")]
pub use gdal_io::GdalDataset;
pub use mem::MemDataset;
pub use tiff_io::TiffDataset;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::metadata::PersistedMetadata;
use crate::raster::{BandArray, DataType, GeoTransform, PixelWindow};

/// Options for opening a dataset through a reader
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Number of decoded chunks kept in the reader's LRU cache (default: 64).
    pub cache_capacity: usize,
    /// Minimum rows per read strip; cancellation is checked between strips
    /// (default: 256).
    pub strip_rows: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            cache_capacity: 64,
            strip_rows: 256,
        }
    }
}

/// Native raster handle.
///
/// Bands are 1-based. Callers validate band numbers and windows before
/// calling into a dataset; implementations may still return errors for
/// them but never panic.
pub trait RasterDataset: Send {
    /// Path or other identification used in messages
    fn description(&self) -> String;

    fn width(&self) -> usize;

    fn height(&self) -> usize;

    fn band_count(&self) -> usize;

    fn data_type(&self, band: usize) -> DataType;

    fn geo_transform(&self) -> GeoTransform;

    fn crs(&self) -> Option<CRS>;

    /// No-data value declared by the source for a band
    fn no_data_value(&self, band: usize) -> Option<f64>;

    fn scale(&self, _band: usize) -> Option<f64> {
        None
    }

    fn offset(&self, _band: usize) -> Option<f64> {
        None
    }

    fn band_description(&self, _band: usize) -> Option<String> {
        None
    }

    /// Natural read granularity (width, height) in pixels
    fn native_block_size(&self, band: usize) -> (usize, usize);

    /// Metadata items stored in the file
    fn persisted_metadata(&self) -> PersistedMetadata;

    /// Read one band over a window that lies inside the raster
    fn read_block(&mut self, band: usize, window: &PixelWindow) -> Result<BandArray>;
}

/// Open a raster file with the backend matching its format.
///
/// ENVI is chosen when a header sits next to the path, TIFF for `.tif` /
/// `.tiff`, anything else goes to GDAL when the `gdal` feature is enabled.
pub fn open(path: impl AsRef<Path>, options: &ReaderOptions) -> Result<Box<dyn RasterDataset>> {
    let path = path.as_ref();
    if let Some((header, data)) = envi_pair(path) {
        debug!("Opening {} as ENVI (header {})", data.display(), header.display());
        return Ok(Box::new(EnviDataset::open(&header, &data)?));
    }
    let ext = extension(path);
    if ext == "tif" || ext == "tiff" {
        debug!("Opening {} as TIFF", path.display());
        return Ok(Box::new(TiffDataset::open(path, options.cache_capacity)?));
    }
    open_fallback(path)
}

#[cfg(feature = "gdal")]
fn open_fallback(path: &Path) -> Result<Box<dyn RasterDataset>> {
    debug!("Opening {} through GDAL", path.display());
    Ok(Box::new(GdalDataset::open(path)?))
}

#[cfg(not(feature = "gdal"))]
fn open_fallback(path: &Path) -> Result<Box<dyn RasterDataset>> {
    if !path.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} not found", path.display()),
        )));
    }
    Err(Error::UnsupportedFormat(format!(
        "{} (build with the `gdal` feature for formats other than ENVI and TIFF)",
        path.display()
    )))
}

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default()
}

/// Data file extensions tried next to a bare `.hdr` path
const ENVI_DATA_EXTENSIONS: [&str; 6] = ["img", "dat", "bsq", "bil", "bip", "raw"];

/// (header, data) paths when `path` is part of an ENVI pair
fn envi_pair(path: &Path) -> Option<(PathBuf, PathBuf)> {
    if extension(path) == "hdr" {
        let stem = path.with_extension("");
        if stem.is_file() {
            return Some((path.to_path_buf(), stem));
        }
        return ENVI_DATA_EXTENSIONS
            .iter()
            .map(|ext| path.with_extension(ext))
            .find(|p| p.is_file())
            .map(|data| (path.to_path_buf(), data));
    }
    let mut appended = path.as_os_str().to_os_string();
    appended.push(".hdr");
    [PathBuf::from(appended), path.with_extension("hdr")]
        .into_iter()
        .find(|h| h.is_file())
        .map(|header| (header, path.to_path_buf()))
}
