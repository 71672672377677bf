//! Band and dataset metadata with session-overlay precedence
//!
//! Metadata items are addressed by `(key, domain, scope)`. Lookups walk an
//! ordered chain of [`MetadataProvider`]s: the reader's [`SessionOverlay`]
//! first, then the persisted metadata read from the file. The first
//! provider that knows the item wins; a miss in every provider is reported
//! as absent, never as a default value.

mod gdal_xml;
mod persisted;
mod provider;
mod spectral;
mod store;
mod value;

pub use gdal_xml::{parse_gdal_metadata, GdalMetadata};
pub use persisted::PersistedMetadata;
pub use provider::{MetadataProvider, SessionOverlay};
pub use spectral::WavelengthUnits;
pub use store::{MetadataIssue, MetadataStore};
pub use value::MetadataValue;

use serde::{Deserialize, Serialize};
use std::fmt;

/// GDAL's default (unnamed) metadata domain
pub const DEFAULT_DOMAIN: &str = "";

/// Domain holding ENVI header items
pub const ENVI_DOMAIN: &str = "ENVI";

/// Well-known item keys
pub mod keys {
    pub const WAVELENGTH: &str = "wavelength";
    pub const WAVELENGTH_UNITS: &str = "wavelength_units";
    pub const FWHM: &str = "fwhm";
    pub const BAD_BAND_LIST: &str = "bbl";
}

/// Whether a metadata item belongs to the whole dataset or to one band
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Scope {
    Dataset,
    /// 1-based band number
    Band(usize),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Dataset => f.write_str("dataset"),
            Scope::Band(b) => write!(f, "band {}", b),
        }
    }
}
