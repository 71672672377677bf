//! Dataset identity, band facts and no-data semantics

use std::collections::BTreeMap;

use tracing::debug;

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::io::RasterDataset;
use crate::mask::{MaskRules, NoDataRange};
use crate::metadata::{
    MetadataIssue, MetadataStore, MetadataValue, Scope, SessionOverlay, WavelengthUnits,
};
use crate::raster::{DataType, GeoExtent, GeoTransform};
use crate::walk::pixel_size;

#[derive(Debug, Clone)]
struct BandSettings {
    data_type: DataType,
    source_no_data: Option<f64>,
    use_source_no_data: bool,
    user_ranges: Vec<NoDataRange>,
}

/// One raster dataset as seen by a reader.
///
/// Geometry and band count are read once when the source is created and
/// never change afterwards. Bands are numbered from 1.
pub struct RasterSource {
    dataset: Box<dyn RasterDataset>,
    width: usize,
    height: usize,
    transform: GeoTransform,
    crs: Option<CRS>,
    bands: Vec<BandSettings>,
    metadata: MetadataStore,
}

impl RasterSource {
    /// Wrap a dataset; its persisted metadata becomes the fallback tier
    /// behind an empty session overlay.
    pub fn new(dataset: Box<dyn RasterDataset>) -> Self {
        let band_count = dataset.band_count();
        let bands = (1..=band_count)
            .map(|b| BandSettings {
                data_type: dataset.data_type(b),
                source_no_data: dataset.no_data_value(b),
                use_source_no_data: true,
                user_ranges: Vec::new(),
            })
            .collect();
        let mut metadata = MetadataStore::new(band_count);
        metadata.push_provider(Box::new(dataset.persisted_metadata()));
        debug!(
            "Opened {} ({}x{}, {} bands)",
            dataset.description(),
            dataset.width(),
            dataset.height(),
            band_count
        );
        Self {
            width: dataset.width(),
            height: dataset.height(),
            transform: dataset.geo_transform(),
            crs: dataset.crs(),
            bands,
            metadata,
            dataset,
        }
    }

    pub fn description(&self) -> String {
        self.dataset.description()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn geo_transform(&self) -> &GeoTransform {
        &self.transform
    }

    /// `None` when the dataset has no usable coordinate reference system
    pub fn crs(&self) -> Option<&CRS> {
        self.crs.as_ref()
    }

    pub fn extent(&self) -> GeoExtent {
        self.transform.bounds(self.width, self.height)
    }

    /// Pixel size as extent divided by raster size.
    ///
    /// `width * sx == extent.width()` up to rounding.
    pub fn pixel_size(&self) -> (f64, f64) {
        pixel_size(&self.transform, &self.extent(), self.width, self.height)
    }

    /// Fail with `InvalidBand` unless `band` is in `1..=band_count`
    pub fn check_band(&self, band: usize) -> Result<()> {
        self.settings(band).map(|_| ())
    }

    fn settings(&self, band: usize) -> Result<&BandSettings> {
        band.checked_sub(1)
            .and_then(|i| self.bands.get(i))
            .ok_or(Error::InvalidBand {
                band,
                band_count: self.bands.len(),
            })
    }

    fn settings_mut(&mut self, band: usize) -> Result<&mut BandSettings> {
        let band_count = self.bands.len();
        band.checked_sub(1)
            .and_then(|i| self.bands.get_mut(i))
            .ok_or(Error::InvalidBand { band, band_count })
    }

    pub fn data_type(&self, band: usize) -> Result<DataType> {
        Ok(self.settings(band)?.data_type)
    }

    /// The no-data value the source declares, whether in use or not
    pub fn source_no_data_value(&self, band: usize) -> Result<Option<f64>> {
        Ok(self.settings(band)?.source_no_data)
    }

    pub fn source_has_no_data(&self, band: usize) -> Result<bool> {
        Ok(self.settings(band)?.source_no_data.is_some())
    }

    /// Whether the source no-data value takes part in masking.
    /// Always `false` for a band without one.
    pub fn use_source_no_data(&self, band: usize) -> Result<bool> {
        let s = self.settings(band)?;
        Ok(s.use_source_no_data && s.source_no_data.is_some())
    }

    /// Enable or disable the source no-data value without forgetting it
    pub fn set_use_source_no_data(&mut self, band: usize, enabled: bool) -> Result<()> {
        self.settings_mut(band)?.use_source_no_data = enabled;
        Ok(())
    }

    /// No-data value in effect for masking
    pub fn no_data_value(&self, band: usize) -> Result<Option<f64>> {
        let s = self.settings(band)?;
        Ok(s.source_no_data.filter(|_| s.use_source_no_data))
    }

    pub fn user_no_data_ranges(&self, band: usize) -> Result<&[NoDataRange]> {
        Ok(&self.settings(band)?.user_ranges)
    }

    pub fn add_user_no_data_range(&mut self, band: usize, range: NoDataRange) -> Result<()> {
        self.settings_mut(band)?.user_ranges.push(range);
        Ok(())
    }

    pub fn set_user_no_data_ranges(&mut self, band: usize, ranges: Vec<NoDataRange>) -> Result<()> {
        self.settings_mut(band)?.user_ranges = ranges;
        Ok(())
    }

    /// Rules that decide pixel validity for `band`.
    ///
    /// `default_no_data` only applies when the band declares no no-data at
    /// all (no value in use, no ranges). The no-data value is compared in
    /// the band's own representation, so a value the band cannot hold
    /// matches nothing.
    pub fn mask_rules(
        &self,
        band: usize,
        mask_not_finite: bool,
        default_no_data: Option<f64>,
    ) -> Result<MaskRules> {
        let s = self.settings(band)?;
        let declared = s.source_no_data.filter(|_| s.use_source_no_data);
        let no_data = match declared {
            Some(v) => Some(v),
            None if s.user_ranges.is_empty() => default_no_data,
            None => None,
        };
        Ok(MaskRules {
            no_data: no_data.and_then(|v| s.data_type.representable(v)),
            ranges: s.user_ranges.clone(),
            mask_not_finite,
        })
    }

    /// Scale of the band's values, 1 when undeclared
    pub fn scale(&self, band: usize) -> Result<f64> {
        self.check_band(band)?;
        Ok(self.dataset.scale(band).unwrap_or(1.0))
    }

    /// Offset of the band's values, 0 when undeclared
    pub fn offset(&self, band: usize) -> Result<f64> {
        self.check_band(band)?;
        Ok(self.dataset.offset(band).unwrap_or(0.0))
    }

    pub fn band_name(&self, band: usize) -> Result<Option<String>> {
        self.check_band(band)?;
        Ok(self.dataset.band_description(band))
    }

    pub fn native_block_size(&self, band: usize) -> Result<(usize, usize)> {
        self.check_band(band)?;
        Ok(self.dataset.native_block_size(band))
    }

    pub(crate) fn dataset_mut(&mut self) -> &mut dyn RasterDataset {
        self.dataset.as_mut()
    }

    pub fn metadata(&self) -> &MetadataStore {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut MetadataStore {
        &mut self.metadata
    }

    /// Swap in a session overlay, e.g. one cloned from another reader
    pub fn replace_overlay(&mut self, overlay: SessionOverlay) -> SessionOverlay {
        self.metadata.replace_overlay(overlay)
    }

    pub fn item(&self, key: &str, domain: &str, scope: Scope) -> Result<Option<MetadataValue>> {
        self.metadata.item(key, domain, scope)
    }

    pub fn set_item(
        &mut self,
        key: &str,
        value: impl Into<MetadataValue>,
        domain: &str,
        scope: Scope,
    ) -> Result<()> {
        self.metadata.set_item(key, value, domain, scope)
    }

    pub fn remove_item(&mut self, key: &str, domain: &str, scope: Scope) -> Result<Option<MetadataValue>> {
        self.metadata.remove_item(key, domain, scope)
    }

    pub fn metadata_domains(&self) -> Vec<String> {
        self.metadata.domains()
    }

    pub fn metadata_items(&self, domain: &str, scope: Scope) -> Result<BTreeMap<String, MetadataValue>> {
        self.metadata.items(domain, scope)
    }

    pub fn metadata_issues(&self) -> &[MetadataIssue] {
        self.metadata.issues()
    }

    pub fn wavelength(&mut self, band: usize, units: Option<WavelengthUnits>) -> Result<Option<f64>> {
        self.metadata.wavelength(band, units)
    }

    pub fn wavelength_units(&mut self, band: usize) -> Result<Option<WavelengthUnits>> {
        self.metadata.wavelength_units(band)
    }

    pub fn fwhm(&mut self, band: usize, units: Option<WavelengthUnits>) -> Result<Option<f64>> {
        self.metadata.fwhm(band, units)
    }

    pub fn bad_band_multiplier(&mut self, band: usize) -> Result<u8> {
        self.metadata.bad_band_multiplier(band)
    }

    pub fn find_wavelength(
        &mut self,
        target: f64,
        units: Option<WavelengthUnits>,
    ) -> Result<Option<usize>> {
        self.metadata.find_wavelength(target, units)
    }

    pub fn wavelengths(&mut self, units: Option<WavelengthUnits>) -> Result<Vec<Option<f64>>> {
        self.metadata.wavelengths(units)
    }

    pub fn fwhms(&mut self, units: Option<WavelengthUnits>) -> Result<Vec<Option<f64>>> {
        self.metadata.fwhms(units)
    }
}

impl std::fmt::Debug for RasterSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RasterSource")
            .field("dataset", &self.dataset.description())
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bands", &self.bands)
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemDataset;
    use crate::mask::RangeMode;
    use ndarray::array;

    fn source() -> RasterSource {
        let ds = MemDataset::new(2, 1)
            .with_band(array![[0u8, 1]])
            .unwrap()
            .with_band(array![[0.5f32, 1.5]])
            .unwrap()
            .with_no_data(2, -9999.9)
            .unwrap();
        RasterSource::new(Box::new(ds))
    }

    #[test]
    fn test_use_source_no_data_toggle() {
        let mut src = source();
        assert!(!src.source_has_no_data(1).unwrap());
        assert!(!src.use_source_no_data(1).unwrap());
        src.set_use_source_no_data(1, true).unwrap();
        assert!(!src.use_source_no_data(1).unwrap());

        assert!(src.use_source_no_data(2).unwrap());
        src.set_use_source_no_data(2, false).unwrap();
        assert_eq!(src.no_data_value(2).unwrap(), None);
        assert_eq!(src.source_no_data_value(2).unwrap(), Some(-9999.9));
    }

    #[test]
    fn test_mask_rules_default_no_data() {
        let mut src = source();
        let rules = src.mask_rules(1, true, Some(0.0)).unwrap();
        assert_eq!(rules.no_data, Some(0.0));

        // -1 cannot be stored as UInt8
        let rules = src.mask_rules(1, true, Some(-1.0)).unwrap();
        assert_eq!(rules.no_data, None);

        // declared ranges suppress the default
        src.add_user_no_data_range(1, NoDataRange::new(5.0, 6.0, RangeMode::IncludeBoth).unwrap())
            .unwrap();
        assert_eq!(src.mask_rules(1, true, Some(0.0)).unwrap().no_data, None);

        // source no-data is compared as Float32
        let rules = src.mask_rules(2, true, Some(0.0)).unwrap();
        assert_eq!(rules.no_data, Some(-9999.9f32 as f64));
    }

    #[test]
    fn test_invalid_band() {
        let src = source();
        assert!(matches!(
            src.data_type(3),
            Err(Error::InvalidBand { band: 3, band_count: 2 })
        ));
        assert!(src.check_band(0).is_err());
        assert_eq!(src.scale(2).unwrap(), 1.0);
        assert_eq!(src.offset(1).unwrap(), 0.0);
    }
}
