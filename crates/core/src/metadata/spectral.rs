//! Wavelength, FWHM and bad-band resolution

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use super::{keys, MetadataIssue, MetadataStore, MetadataValue, Scope, DEFAULT_DOMAIN, ENVI_DOMAIN};
use crate::error::Result;

/// Unit of a wavelength or FWHM value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WavelengthUnits {
    Nanometers,
    Micrometers,
    Millimeters,
    Meters,
}

impl WavelengthUnits {
    /// Guess the unit of a bare value: below 100 it is micrometers,
    /// otherwise nanometers.
    pub fn infer(value: f64) -> Self {
        if value < 100.0 {
            WavelengthUnits::Micrometers
        } else {
            WavelengthUnits::Nanometers
        }
    }

    /// Length of one unit in nanometers
    fn nanometers(self) -> f64 {
        match self {
            WavelengthUnits::Nanometers => 1.0,
            WavelengthUnits::Micrometers => 1e3,
            WavelengthUnits::Millimeters => 1e6,
            WavelengthUnits::Meters => 1e9,
        }
    }

    /// Convert `value` from `self` to `to`
    pub fn convert(self, value: f64, to: WavelengthUnits) -> f64 {
        if self == to {
            value
        } else {
            value * self.nanometers() / to.nanometers()
        }
    }

    /// Name as written in ENVI headers
    pub fn name(self) -> &'static str {
        match self {
            WavelengthUnits::Nanometers => "Nanometers",
            WavelengthUnits::Micrometers => "Micrometers",
            WavelengthUnits::Millimeters => "Millimeters",
            WavelengthUnits::Meters => "Meters",
        }
    }

    pub fn abbreviation(self) -> &'static str {
        match self {
            WavelengthUnits::Nanometers => "nm",
            WavelengthUnits::Micrometers => "µm",
            WavelengthUnits::Millimeters => "mm",
            WavelengthUnits::Meters => "m",
        }
    }
}

impl FromStr for WavelengthUnits {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "nm" | "nanometer" | "nanometers" => Ok(WavelengthUnits::Nanometers),
            "um" | "µm" | "μm" | "micrometer" | "micrometers" | "micron" | "microns" => {
                Ok(WavelengthUnits::Micrometers)
            }
            "mm" | "millimeter" | "millimeters" => Ok(WavelengthUnits::Millimeters),
            "m" | "meter" | "meters" => Ok(WavelengthUnits::Meters),
            other => Err(format!("unknown wavelength unit '{}'", other)),
        }
    }
}

impl fmt::Display for WavelengthUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.abbreviation())
    }
}

/// Resolution of the spectral items.
///
/// Each band value is looked up per band first (`DEFAULT_DOMAIN`, band
/// scope) and then in the dataset-wide ENVI list, indexed by band number.
/// A list whose length differs from the band count is malformed as a whole.
impl MetadataStore {
    /// Center wavelength of `band`, converted to `units` (native units when
    /// `None`).
    ///
    /// A value resolved from the dataset list is promoted into the overlay as
    /// a per-band item, together with its units, until the list or its units
    /// are edited through the overlay.
    pub fn wavelength(&mut self, band: usize, units: Option<WavelengthUnits>) -> Result<Option<f64>> {
        self.check_scope(Scope::Band(band))?;
        let Some(value) = self.native_wavelength(band) else {
            return Ok(None);
        };
        Ok(Some(match units {
            None => value,
            Some(to) => self
                .declared_units(band)
                .unwrap_or_else(|| WavelengthUnits::infer(value))
                .convert(value, to),
        }))
    }

    /// Units of the band's wavelength: declared, or inferred from the value.
    pub fn wavelength_units(&mut self, band: usize) -> Result<Option<WavelengthUnits>> {
        self.check_scope(Scope::Band(band))?;
        Ok(self.resolved_units(band))
    }

    /// Full width at half maximum of `band`, in `units` (native when `None`).
    ///
    /// The FWHM shares the band's wavelength units; when those cannot be
    /// determined a conversion is impossible and the value is absent.
    pub fn fwhm(&mut self, band: usize, units: Option<WavelengthUnits>) -> Result<Option<f64>> {
        self.check_scope(Scope::Band(band))?;
        let Some(value) = self.band_number(keys::FWHM, band) else {
            return Ok(None);
        };
        let Some(to) = units else {
            return Ok(Some(value));
        };
        match self.resolved_units(band) {
            Some(from) => Ok(Some(from.convert(value, to))),
            None => {
                self.report(MetadataIssue::new(
                    keys::FWHM,
                    DEFAULT_DOMAIN,
                    Scope::Band(band),
                    "no wavelength units to convert from",
                ));
                Ok(None)
            }
        }
    }

    /// 1 for a good band, 0 for a band flagged bad. Defaults to 1.
    pub fn bad_band_multiplier(&mut self, band: usize) -> Result<u8> {
        self.check_scope(Scope::Band(band))?;
        Ok(match self.band_number(keys::BAD_BAND_LIST, band) {
            None => 1,
            Some(v) if v == 0.0 => 0,
            Some(v) if v == 1.0 => 1,
            Some(v) => {
                self.report(MetadataIssue::new(
                    keys::BAD_BAND_LIST,
                    DEFAULT_DOMAIN,
                    Scope::Band(band),
                    format!("expected 0 or 1, found {}", v),
                ));
                1
            }
        })
    }

    /// Band whose wavelength is closest to `target` (both in `units`).
    ///
    /// The lowest band number wins ties; `None` when no band has a
    /// wavelength.
    pub fn find_wavelength(
        &mut self,
        target: f64,
        units: Option<WavelengthUnits>,
    ) -> Result<Option<usize>> {
        let mut best: Option<(usize, f64)> = None;
        for band in 1..=self.band_count() {
            let Some(wavelength) = self.wavelength(band, units)? else {
                continue;
            };
            let distance = (wavelength - target).abs();
            if !distance.is_finite() {
                continue;
            }
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((band, distance));
            }
        }
        Ok(best.map(|(band, _)| band))
    }

    /// Wavelength of every band, in band order
    pub fn wavelengths(&mut self, units: Option<WavelengthUnits>) -> Result<Vec<Option<f64>>> {
        (1..=self.band_count())
            .map(|band| self.wavelength(band, units))
            .collect()
    }

    /// FWHM of every band, in band order
    pub fn fwhms(&mut self, units: Option<WavelengthUnits>) -> Result<Vec<Option<f64>>> {
        (1..=self.band_count())
            .map(|band| self.fwhm(band, units))
            .collect()
    }

    fn native_wavelength(&mut self, band: usize) -> Option<f64> {
        if let Some(value) = self.per_band_number(keys::WAVELENGTH, band) {
            return Some(value);
        }
        let value = self.list_entry(keys::WAVELENGTH, band)?;
        let units = self
            .declared_units(band)
            .unwrap_or_else(|| WavelengthUnits::infer(value));
        self.promote(keys::WAVELENGTH, value.into(), band);
        self.promote(keys::WAVELENGTH_UNITS, units.name().into(), band);
        debug!("Promoted wavelength {} {} of band {} to overlay", value, units, band);
        Some(value)
    }

    fn resolved_units(&mut self, band: usize) -> Option<WavelengthUnits> {
        self.declared_units(band)
            .or_else(|| self.native_wavelength(band).map(WavelengthUnits::infer))
    }

    /// Units item for the band, then the dataset-wide ENVI one.
    /// `Unknown` counts as not declared.
    fn declared_units(&mut self, band: usize) -> Option<WavelengthUnits> {
        let candidates = [
            (DEFAULT_DOMAIN, Scope::Band(band)),
            (ENVI_DOMAIN, Scope::Dataset),
        ];
        for (domain, scope) in candidates {
            let Some(value) = self.item_or_report(keys::WAVELENGTH_UNITS, domain, scope) else {
                continue;
            };
            let parsed = match &value {
                MetadataValue::Text(text) if text.trim().eq_ignore_ascii_case("unknown") => {
                    continue
                }
                MetadataValue::Text(text) => text.parse::<WavelengthUnits>(),
                other => Err(format!("expected a unit name, found a {}", other.type_name())),
            };
            match parsed {
                Ok(units) => return Some(units),
                Err(reason) => self.report(MetadataIssue::new(
                    keys::WAVELENGTH_UNITS,
                    domain,
                    scope,
                    reason,
                )),
            }
        }
        None
    }

    fn band_number(&mut self, key: &str, band: usize) -> Option<f64> {
        self.per_band_number(key, band)
            .or_else(|| self.list_entry(key, band))
    }

    /// Per-band numeric item. A non-numeric value is reported and treated
    /// as absent so the list form is tried next.
    fn per_band_number(&mut self, key: &str, band: usize) -> Option<f64> {
        let scope = Scope::Band(band);
        let value = self.item_or_report(key, DEFAULT_DOMAIN, scope)?;
        if let Some(n) = value.as_f64() {
            return Some(n);
        }
        self.report(MetadataIssue::new(
            key,
            DEFAULT_DOMAIN,
            scope,
            format!("expected a number, found a {}", value.type_name()),
        ));
        None
    }

    /// Entry `band` of the dataset-wide ENVI list `key`
    fn list_entry(&mut self, key: &str, band: usize) -> Option<f64> {
        let value = self.item_or_report(key, ENVI_DOMAIN, Scope::Dataset)?;
        let band_count = self.band_count();
        let reason = match &value {
            MetadataValue::Numbers(list) if list.len() == band_count => {
                return list.get(band - 1).copied()
            }
            MetadataValue::Number(n) if band_count == 1 => return Some(*n),
            MetadataValue::Numbers(list) => {
                format!("list has {} entries for {} bands", list.len(), band_count)
            }
            other => format!("expected a number list, found a {}", other.type_name()),
        };
        self.report(MetadataIssue::new(key, ENVI_DOMAIN, Scope::Dataset, reason));
        None
    }
}
