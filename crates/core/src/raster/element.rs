//! Raster element trait and native data types

use ndarray::{Array2, ArrayView2};
use num_traits::{NumCast, Zero};
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};

use super::BandArray;

/// Native sample type of a raster band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    UInt8,
    Int8,
    UInt16,
    Int16,
    UInt32,
    Int32,
    UInt64,
    Int64,
    Float32,
    Float64,
}

impl DataType {
    /// Size of one sample in bytes
    pub fn size_bytes(&self) -> usize {
        match self {
            DataType::UInt8 | DataType::Int8 => 1,
            DataType::UInt16 | DataType::Int16 => 2,
            DataType::UInt32 | DataType::Int32 | DataType::Float32 => 4,
            DataType::UInt64 | DataType::Int64 | DataType::Float64 => 8,
        }
    }

    /// Whether this is a floating point type
    pub fn is_float(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Map an ENVI `data type` code
    pub fn from_envi_code(code: u32) -> Option<Self> {
        match code {
            1 => Some(DataType::UInt8),
            2 => Some(DataType::Int16),
            3 => Some(DataType::Int32),
            4 => Some(DataType::Float32),
            5 => Some(DataType::Float64),
            12 => Some(DataType::UInt16),
            13 => Some(DataType::UInt32),
            14 => Some(DataType::Int64),
            15 => Some(DataType::UInt64),
            _ => None,
        }
    }

    /// Map TIFF `BitsPerSample` + `SampleFormat` (1 = unsigned, 2 = signed, 3 = float)
    pub fn from_tiff(bits_per_sample: u16, sample_format: u16) -> Option<Self> {
        match (sample_format, bits_per_sample) {
            (1, 8) => Some(DataType::UInt8),
            (1, 16) => Some(DataType::UInt16),
            (1, 32) => Some(DataType::UInt32),
            (1, 64) => Some(DataType::UInt64),
            (2, 8) => Some(DataType::Int8),
            (2, 16) => Some(DataType::Int16),
            (2, 32) => Some(DataType::Int32),
            (2, 64) => Some(DataType::Int64),
            (3, 32) => Some(DataType::Float32),
            (3, 64) => Some(DataType::Float64),
            _ => None,
        }
    }

    /// Value as stored in this type and read back, `None` if it cannot be
    /// represented (e.g. `-1` for `UInt8`).
    pub fn representable(&self, value: f64) -> Option<f64> {
        fn through<T: RasterElement>(value: f64) -> Option<f64> {
            if value.is_nan() {
                return T::DATA_TYPE.is_float().then_some(value);
            }
            if !T::DATA_TYPE.is_float() && value.fract() != 0.0 {
                return None;
            }
            T::from_f64(value).map(<T as RasterElement>::as_f64)
        }
        match self {
            DataType::UInt8 => through::<u8>(value),
            DataType::Int8 => through::<i8>(value),
            DataType::UInt16 => through::<u16>(value),
            DataType::Int16 => through::<i16>(value),
            DataType::UInt32 => through::<u32>(value),
            DataType::Int32 => through::<i32>(value),
            DataType::UInt64 => through::<u64>(value),
            DataType::Int64 => through::<i64>(value),
            DataType::Float32 => through::<f32>(value),
            DataType::Float64 => Some(value),
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::UInt8 => "UInt8",
            DataType::Int8 => "Int8",
            DataType::UInt16 => "UInt16",
            DataType::Int16 => "Int16",
            DataType::UInt32 => "UInt32",
            DataType::Int32 => "Int32",
            DataType::UInt64 => "UInt64",
            DataType::Int64 => "Int64",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
        };
        f.write_str(name)
    }
}

/// Trait for types that can be stored in a raster cell.
///
/// Ties each Rust sample type to its [`DataType`] and to the matching
/// [`BandArray`] variant.
pub trait RasterElement:
    Copy + Clone + Debug + PartialOrd + PartialEq + NumCast + Zero + Send + Sync + 'static
{
    /// Native data type for this sample type
    const DATA_TYPE: DataType;

    /// Convert self to f64 (may round for 64-bit integers)
    fn as_f64(self) -> f64;

    /// Convert from f64, `None` if out of range
    fn from_f64(value: f64) -> Option<Self> {
        NumCast::from(value)
    }

    /// Wrap a typed array as a band array
    fn into_band(array: Array2<Self>) -> BandArray;

    /// Unwrap a band array of exactly this type, handing it back otherwise
    fn from_band(band: BandArray) -> std::result::Result<Array2<Self>, BandArray>;

    /// Borrow a band array of exactly this type
    fn band_view(band: &BandArray) -> Option<ArrayView2<'_, Self>>;
}

macro_rules! impl_raster_element {
    ($t:ty, $variant:ident) => {
        impl RasterElement for $t {
            const DATA_TYPE: DataType = DataType::$variant;

            fn as_f64(self) -> f64 {
                self as f64
            }

            fn into_band(array: Array2<Self>) -> BandArray {
                BandArray::$variant(array)
            }

            fn from_band(band: BandArray) -> std::result::Result<Array2<Self>, BandArray> {
                match band {
                    BandArray::$variant(a) => Ok(a),
                    other => Err(other),
                }
            }

            fn band_view(band: &BandArray) -> Option<ArrayView2<'_, Self>> {
                match band {
                    BandArray::$variant(a) => Some(a.view()),
                    _ => None,
                }
            }
        }
    };
}

impl_raster_element!(u8, UInt8);
impl_raster_element!(i8, Int8);
impl_raster_element!(u16, UInt16);
impl_raster_element!(i16, Int16);
impl_raster_element!(u32, UInt32);
impl_raster_element!(i32, Int32);
impl_raster_element!(u64, UInt64);
impl_raster_element!(i64, Int64);
impl_raster_element!(f32, Float32);
impl_raster_element!(f64, Float64);
