//! Error types for bandstack

use thiserror::Error;

use crate::metadata::Scope;
use crate::raster::PixelWindow;

/// Main error type for bandstack operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid transform: {0}")]
    InvalidTransform(String),

    #[error("Invalid band {band}: raster has {band_count} band(s), numbered from 1")]
    InvalidBand { band: usize, band_count: usize },

    #[error("Invalid window {window} for raster of size {width}x{height}")]
    InvalidWindow {
        window: PixelWindow,
        width: usize,
        height: usize,
    },

    #[error("Malformed metadata item '{key}' (domain '{domain}', {scope}): {reason}")]
    MetadataFormat {
        key: String,
        domain: String,
        scope: Scope,
        reason: String,
    },

    #[error("Read of window {window} cancelled")]
    Cancelled { window: PixelWindow },

    #[error("Read failed for band {band}, window {window}: {reason}")]
    Read {
        band: usize,
        window: PixelWindow,
        reason: String,
    },

    #[error("Unsupported raster format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Malformed file: {0}")]
    Format(String),

    #[error("GDAL error: {0}")]
    #[cfg(feature = "gdal")]
    Gdal(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(e.to_string())
    }
}

impl From<tiff::TiffError> for Error {
    fn from(e: tiff::TiffError) -> Self {
        match e {
            tiff::TiffError::IoError(io) => Error::Io(io),
            other => Error::Format(format!("TIFF: {}", other)),
        }
    }
}

/// Result type alias for bandstack operations
pub type Result<T> = std::result::Result<T, Error>;
