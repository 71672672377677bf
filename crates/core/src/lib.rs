//! # Bandstack Core
//!
//! Tiled, bounded-memory read access to multi-band rasters, with spectral
//! band metadata resolved through a session overlay over the file's own
//! metadata.
//!
//! This crate provides:
//! - [`RasterReader`]: windowed and blockwise array reads, overlap padding
//!   and validity masks
//! - [`RasterSource`]: band facts, no-data semantics and metadata lookups
//!   (wavelength, FWHM, bad-band flags)
//! - [`GeoTransform`], [`ExtentWalker`] and [`GridWalker`]: coordinate math
//!   and deterministic tiling
//! - Dataset backends for ENVI, (Geo)TIFF, in-memory bands and, with the
//!   `gdal` feature, anything GDAL can open
//!
//! ```
//! use bandstack_core::prelude::*;
//! use ndarray::array;
//!
//! let dataset = MemDataset::new(2, 2)
//!     .with_band(array![[1.0f32, -1.0], [3.0, 4.0]])?
//!     .with_no_data(1, -1.0)?;
//! let mut reader = RasterReader::from_dataset(Box::new(dataset));
//!
//! let arrays = reader.array(&ArrayRequest::new())?;
//! let masks = reader.mask_array(&arrays, None, true, None)?;
//! assert!(!masks[0][[0, 1]]);
//! # Ok::<(), bandstack_core::Error>(())
//! ```

pub mod cancel;
pub mod crs;
pub mod error;
pub mod io;
pub mod mask;
pub mod metadata;
pub mod raster;
pub mod reader;
pub mod source;
pub mod walk;

pub use cancel::{CancelToken, Feedback};
pub use crs::CRS;
pub use error::{Error, Result};
pub use io::{ReaderOptions, RasterDataset};
pub use mask::{MaskRules, NoDataRange, RangeMode};
pub use metadata::{MetadataStore, MetadataValue, Scope, SessionOverlay, WavelengthUnits};
pub use raster::{BandArray, DataType, GeoExtent, GeoTransform, PixelWindow, RasterElement};
pub use reader::{ArrayRequest, RasterReader};
pub use source::RasterSource;
pub use walk::{BlockDescriptor, ExtentWalker, GridWalker};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::cancel::{CancelToken, Feedback};
    pub use crate::crs::CRS;
    pub use crate::error::{Error, Result};
    pub use crate::io::{MemDataset, ReaderOptions};
    pub use crate::mask::{NoDataRange, RangeMode};
    pub use crate::metadata::{Scope, WavelengthUnits, DEFAULT_DOMAIN, ENVI_DOMAIN};
    pub use crate::raster::{BandArray, DataType, GeoExtent, GeoTransform, PixelWindow};
    pub use crate::reader::{ArrayRequest, RasterReader};
    pub use crate::walk::{BlockDescriptor, GridWalker};
}
