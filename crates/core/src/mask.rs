//! Validity masks from no-data values and ranges

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::raster::{BandArray, DataType, RasterElement};

/// Which bounds of a [`NoDataRange`] are themselves no-data
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RangeMode {
    IncludeBoth,
    IncludeMinOnly,
    IncludeMaxOnly,
    ExcludeBoth,
}

/// A caller-declared interval of no-data values
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoDataRange {
    pub min: f64,
    pub max: f64,
    pub mode: RangeMode,
}

impl NoDataRange {
    pub fn new(min: f64, max: f64, mode: RangeMode) -> Result<Self> {
        if min.is_nan() || max.is_nan() || min > max {
            return Err(Error::InvalidParameter {
                name: "no-data range",
                value: format!("[{}, {}]", min, max),
                reason: "bounds must be ordered numbers".into(),
            });
        }
        Ok(Self { min, max, mode })
    }

    /// Whether `value` falls inside the range
    pub fn contains(&self, value: f64) -> bool {
        let above_min = match self.mode {
            RangeMode::IncludeBoth | RangeMode::IncludeMinOnly => value >= self.min,
            RangeMode::IncludeMaxOnly | RangeMode::ExcludeBoth => value > self.min,
        };
        let below_max = match self.mode {
            RangeMode::IncludeBoth | RangeMode::IncludeMaxOnly => value <= self.max,
            RangeMode::IncludeMinOnly | RangeMode::ExcludeBoth => value < self.max,
        };
        above_min && below_max
    }
}

/// Everything that makes a pixel of one band invalid
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaskRules {
    /// Single no-data value, already in the band's representation.
    /// [`apply`](Self::apply) matches it in the band's native type, so
    /// 64-bit integer samples next to it stay valid; the value itself must
    /// be exactly representable as `f64`.
    pub no_data: Option<f64>,
    pub ranges: Vec<NoDataRange>,
    /// Also reject NaN and infinities
    pub mask_not_finite: bool,
}

impl MaskRules {
    pub fn is_valid(&self, value: f64) -> bool {
        let is_no_data = match self.no_data {
            Some(nd) => value == nd || (nd.is_nan() && value.is_nan()),
            None => false,
        };
        !is_no_data && self.passes_ranges(value)
    }

    /// `true` where the pixel is valid
    pub fn apply(&self, band: &BandArray) -> Array2<bool> {
        match band.data_type() {
            DataType::UInt8 => self.apply_typed::<u8>(band),
            DataType::Int8 => self.apply_typed::<i8>(band),
            DataType::UInt16 => self.apply_typed::<u16>(band),
            DataType::Int16 => self.apply_typed::<i16>(band),
            DataType::UInt32 => self.apply_typed::<u32>(band),
            DataType::Int32 => self.apply_typed::<i32>(band),
            DataType::UInt64 => self.apply_typed::<u64>(band),
            DataType::Int64 => self.apply_typed::<i64>(band),
            DataType::Float32 => self.apply_typed::<f32>(band),
            DataType::Float64 => self.apply_typed::<f64>(band),
        }
    }

    fn apply_typed<T: RasterElement>(&self, band: &BandArray) -> Array2<bool> {
        let Some(view) = band.view::<T>() else {
            return band.map_bool(|v| self.is_valid(v));
        };
        match self.no_data {
            Some(nd) if nd.is_nan() => view.mapv(|v| {
                let value = v.as_f64();
                !value.is_nan() && self.passes_ranges(value)
            }),
            Some(nd) => {
                let native = T::from_f64(nd).filter(|n| n.as_f64() == nd);
                view.mapv(|v| Some(v) != native && self.passes_ranges(v.as_f64()))
            }
            None => view.mapv(|v| self.passes_ranges(v.as_f64())),
        }
    }

    /// Finite check and user ranges, no-data value aside
    fn passes_ranges(&self, value: f64) -> bool {
        if self.mask_not_finite && !value.is_finite() {
            return false;
        }
        !self.ranges.iter().any(|r| r.contains(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_range_modes() {
        let both = NoDataRange::new(0.0, 10.0, RangeMode::IncludeBoth).unwrap();
        let min_only = NoDataRange { mode: RangeMode::IncludeMinOnly, ..both };
        let max_only = NoDataRange { mode: RangeMode::IncludeMaxOnly, ..both };
        let neither = NoDataRange { mode: RangeMode::ExcludeBoth, ..both };

        assert!(both.contains(0.0) && both.contains(10.0));
        assert!(min_only.contains(0.0) && !min_only.contains(10.0));
        assert!(!max_only.contains(0.0) && max_only.contains(10.0));
        assert!(!neither.contains(0.0) && !neither.contains(10.0) && neither.contains(5.0));
        assert!(!both.contains(f64::NAN));
        assert!(NoDataRange::new(2.0, 1.0, RangeMode::IncludeBoth).is_err());
    }

    #[test]
    fn test_apply_combines_rules() {
        let rules = MaskRules {
            no_data: Some(-1.0),
            ranges: vec![NoDataRange::new(100.0, 200.0, RangeMode::ExcludeBoth).unwrap()],
            mask_not_finite: true,
        };
        let band = BandArray::from(array![[-1.0f32, 150.0, 200.0], [f32::NAN, f32::INFINITY, 3.0]]);
        assert_eq!(
            rules.apply(&band),
            array![[false, false, true], [false, false, true]]
        );

        let lenient = MaskRules { mask_not_finite: false, ..rules };
        assert!(lenient.apply(&band)[[1, 0]]);
    }

    #[test]
    fn test_nan_no_data() {
        let rules = MaskRules {
            no_data: Some(f64::NAN),
            ..Default::default()
        };
        assert!(!rules.is_valid(f64::NAN));
        assert!(rules.is_valid(0.0));

        let band = BandArray::from(array![[f64::NAN, 1.0]]);
        assert_eq!(rules.apply(&band), array![[false, true]]);
    }

    #[test]
    fn test_wide_integers_compare_natively() {
        let nd = (1u64 << 53) as f64;
        let rules = MaskRules {
            no_data: Some(nd),
            ..Default::default()
        };
        let band = BandArray::from(array![[1u64 << 53, (1u64 << 53) + 1, 7]]);
        assert_eq!(rules.apply(&band), array![[false, true, true]]);

        let signed = BandArray::from(array![[-(1i64 << 53), -(1i64 << 53) - 1]]);
        let rules = MaskRules {
            no_data: Some(-nd),
            ..rules
        };
        assert_eq!(rules.apply(&signed), array![[false, true]]);
    }
}
