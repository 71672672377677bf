//! Coordinate Reference System handling
//!
//! A raster's CRS may be missing or undefined; readers expose it as
//! `Option<CRS>` and never guess one.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Coordinate Reference System representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CRS {
    /// WKT representation as found in the source
    wkt: Option<String>,
    /// EPSG code if known
    epsg: Option<u32>,
}

impl CRS {
    /// Create a CRS from an EPSG code
    pub fn from_epsg(code: u32) -> Self {
        Self {
            wkt: None,
            epsg: Some(code),
        }
    }

    /// Create a CRS from a WKT string.
    ///
    /// The EPSG code is taken from the outermost `AUTHORITY["EPSG", ...]`
    /// (the last one in the string) when present. Returns `None` for blank
    /// input.
    pub fn from_wkt(wkt: impl Into<String>) -> Option<Self> {
        let wkt = wkt.into();
        let trimmed = wkt.trim();
        if trimmed.is_empty() {
            return None;
        }
        let epsg = authority_code(trimmed);
        Some(Self {
            wkt: Some(trimmed.to_string()),
            epsg,
        })
    }

    /// Get EPSG code if known
    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    /// Get WKT representation
    pub fn wkt(&self) -> Option<&str> {
        self.wkt.as_deref()
    }

    /// Check if two CRS are equivalent
    pub fn is_equivalent(&self, other: &CRS) -> bool {
        if let (Some(a), Some(b)) = (self.epsg, other.epsg) {
            return a == b;
        }

        // If both have WKT, compare (this is imperfect)
        if let (Some(a), Some(b)) = (&self.wkt, &other.wkt) {
            return a == b;
        }

        false
    }

    /// Get a string identifier for this CRS
    pub fn identifier(&self) -> String {
        if let Some(code) = self.epsg {
            return format!("EPSG:{}", code);
        }
        if let Some(wkt) = &self.wkt {
            let end = wkt
                .char_indices()
                .nth(50)
                .map(|(i, _)| i)
                .unwrap_or(wkt.len());
            return format!("WKT:{}", &wkt[..end]);
        }
        "Unknown".to_string()
    }
}

/// Last `AUTHORITY["EPSG","<code>"]` in a WKT1 string
fn authority_code(wkt: &str) -> Option<u32> {
    let start = wkt.rfind("AUTHORITY[")?;
    let rest = &wkt[start + "AUTHORITY[".len()..];
    let end = rest.find(']')?;
    let mut parts = rest[..end].split(',').map(|p| p.trim().trim_matches('"'));
    let authority = parts.next()?;
    if !authority.eq_ignore_ascii_case("EPSG") {
        return None;
    }
    parts.next()?.parse().ok()
}

impl fmt::Display for CRS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.identifier())
    }
}
