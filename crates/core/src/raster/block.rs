//! Band arrays in their native data type

use ndarray::{s, Array2};

use super::{DataType, RasterElement};
use crate::error::{Error, Result};

/// One band of pixel data, `(rows, cols)` shaped, in the native data type
/// of the source band.
#[derive(Debug, Clone, PartialEq)]
pub enum BandArray {
    UInt8(Array2<u8>),
    Int8(Array2<i8>),
    UInt16(Array2<u16>),
    Int16(Array2<i16>),
    UInt32(Array2<u32>),
    Int32(Array2<i32>),
    UInt64(Array2<u64>),
    Int64(Array2<i64>),
    Float32(Array2<f32>),
    Float64(Array2<f64>),
}

/// Run `$body` with `$a` bound to the inner `Array2<T>` of any variant.
macro_rules! dispatch {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            BandArray::UInt8($a) => $body,
            BandArray::Int8($a) => $body,
            BandArray::UInt16($a) => $body,
            BandArray::Int16($a) => $body,
            BandArray::UInt32($a) => $body,
            BandArray::Int32($a) => $body,
            BandArray::UInt64($a) => $body,
            BandArray::Int64($a) => $body,
            BandArray::Float32($a) => $body,
            BandArray::Float64($a) => $body,
        }
    };
}

impl BandArray {
    /// Zero-filled array of the given type and `(rows, cols)` shape
    pub fn zeros(data_type: DataType, shape: (usize, usize)) -> Self {
        match data_type {
            DataType::UInt8 => BandArray::UInt8(Array2::zeros(shape)),
            DataType::Int8 => BandArray::Int8(Array2::zeros(shape)),
            DataType::UInt16 => BandArray::UInt16(Array2::zeros(shape)),
            DataType::Int16 => BandArray::Int16(Array2::zeros(shape)),
            DataType::UInt32 => BandArray::UInt32(Array2::zeros(shape)),
            DataType::Int32 => BandArray::Int32(Array2::zeros(shape)),
            DataType::UInt64 => BandArray::UInt64(Array2::zeros(shape)),
            DataType::Int64 => BandArray::Int64(Array2::zeros(shape)),
            DataType::Float32 => BandArray::Float32(Array2::zeros(shape)),
            DataType::Float64 => BandArray::Float64(Array2::zeros(shape)),
        }
    }

    /// Build from row-major samples
    pub fn from_vec<T: RasterElement>(data: Vec<T>, rows: usize, cols: usize) -> Result<Self> {
        let len = data.len();
        let array = Array2::from_shape_vec((rows, cols), data).map_err(|_| {
            Error::Format(format!(
                "{} samples cannot fill a {}x{} block",
                len, cols, rows
            ))
        })?;
        Ok(T::into_band(array))
    }

    pub fn data_type(&self) -> DataType {
        match self {
            BandArray::UInt8(_) => DataType::UInt8,
            BandArray::Int8(_) => DataType::Int8,
            BandArray::UInt16(_) => DataType::UInt16,
            BandArray::Int16(_) => DataType::Int16,
            BandArray::UInt32(_) => DataType::UInt32,
            BandArray::Int32(_) => DataType::Int32,
            BandArray::UInt64(_) => DataType::UInt64,
            BandArray::Int64(_) => DataType::Int64,
            BandArray::Float32(_) => DataType::Float32,
            BandArray::Float64(_) => DataType::Float64,
        }
    }

    /// Shape as (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        dispatch!(self, a => a.dim())
    }

    /// Number of rows
    pub fn rows(&self) -> usize {
        self.shape().0
    }

    /// Number of columns
    pub fn cols(&self) -> usize {
        self.shape().1
    }

    pub fn is_empty(&self) -> bool {
        dispatch!(self, a => a.is_empty())
    }

    /// Value at (row, col) converted to f64
    pub fn get_f64(&self, row: usize, col: usize) -> Option<f64> {
        dispatch!(self, a => a.get((row, col)).map(|v| v.as_f64()))
    }

    /// Convert every sample to f64
    pub fn to_f64(&self) -> Array2<f64> {
        dispatch!(self, a => a.mapv(|v| v.as_f64()))
    }

    /// Evaluate a predicate on every sample (as f64)
    pub fn map_bool<F>(&self, f: F) -> Array2<bool>
    where
        F: Fn(f64) -> bool,
    {
        dispatch!(self, a => a.mapv(|v| f(v.as_f64())))
    }

    /// Borrow as a typed view if the native type is `T`
    pub fn view<T: RasterElement>(&self) -> Option<ndarray::ArrayView2<'_, T>> {
        T::band_view(self)
    }

    /// Take the typed array out if the native type is `T`
    pub fn into_typed<T: RasterElement>(self) -> std::result::Result<Array2<T>, BandArray> {
        T::from_band(self)
    }

    /// Cast every sample to `T`, failing on the first value `T` cannot hold
    pub fn cast<T: RasterElement>(&self) -> Result<Array2<T>> {
        let (rows, cols) = self.shape();
        let mut out = Array2::<T>::zeros((rows, cols));
        for ((r, c), dst) in out.indexed_iter_mut() {
            let v = self.get_f64(r, c).unwrap_or(0.0);
            *dst = T::from_f64(v).ok_or_else(|| Error::InvalidParameter {
                name: "value",
                value: v.to_string(),
                reason: format!("not representable as {}", T::DATA_TYPE),
            })?;
        }
        Ok(out)
    }

    /// Copy of a sub-rectangle
    pub fn slice(&self, row: usize, col: usize, rows: usize, cols: usize) -> BandArray {
        dispatch!(self, a => {
            let view = a.slice(s![row..row + rows, col..col + cols]);
            BandArray::from(view.to_owned())
        })
    }

    /// Copy `src` into this array with its top-left corner at (row, col).
    ///
    /// Both arrays must share the native type and `src` must fit.
    pub fn assign_region(&mut self, row: usize, col: usize, src: &BandArray) -> Result<()> {
        let (rows, cols) = src.shape();
        let (dst_rows, dst_cols) = self.shape();
        if row + rows > dst_rows || col + cols > dst_cols {
            return Err(Error::Format(format!(
                "block {}x{} at ({}, {}) exceeds target {}x{}",
                cols, rows, col, row, dst_cols, dst_rows
            )));
        }
        let (src_type, dst_type) = (src.data_type(), self.data_type());
        let mismatch = || {
            Error::UnsupportedDataType(format!(
                "cannot copy {} samples into a {} array",
                src_type, dst_type
            ))
        };
        match (&mut *self, src) {
            (BandArray::UInt8(d), BandArray::UInt8(s)) => assign(d, row, col, s),
            (BandArray::Int8(d), BandArray::Int8(s)) => assign(d, row, col, s),
            (BandArray::UInt16(d), BandArray::UInt16(s)) => assign(d, row, col, s),
            (BandArray::Int16(d), BandArray::Int16(s)) => assign(d, row, col, s),
            (BandArray::UInt32(d), BandArray::UInt32(s)) => assign(d, row, col, s),
            (BandArray::Int32(d), BandArray::Int32(s)) => assign(d, row, col, s),
            (BandArray::UInt64(d), BandArray::UInt64(s)) => assign(d, row, col, s),
            (BandArray::Int64(d), BandArray::Int64(s)) => assign(d, row, col, s),
            (BandArray::Float32(d), BandArray::Float32(s)) => assign(d, row, col, s),
            (BandArray::Float64(d), BandArray::Float64(s)) => assign(d, row, col, s),
            _ => return Err(mismatch()),
        }
        Ok(())
    }

    /// Overwrite every pixel whose mask entry is `false` with `value`.
    ///
    /// Fails if `value` is not representable in the native type or the
    /// mask shape differs.
    pub fn fill_invalid(&mut self, mask: &Array2<bool>, value: f64) -> Result<()> {
        if mask.dim() != self.shape() {
            return Err(Error::InvalidParameter {
                name: "mask",
                value: format!("{:?}", mask.dim()),
                reason: format!("expected shape {:?}", self.shape()),
            });
        }
        let data_type = self.data_type();
        dispatch!(self, a => {
            let fill = from_f64_checked(value, data_type)?;
            ndarray::Zip::from(a).and(mask).for_each(|v, &valid| {
                if !valid {
                    *v = fill;
                }
            });
            Ok(())
        })
    }
}

fn assign<T: Copy>(dst: &mut Array2<T>, row: usize, col: usize, src: &Array2<T>) {
    let (rows, cols) = src.dim();
    dst.slice_mut(s![row..row + rows, col..col + cols]).assign(src);
}

fn from_f64_checked<T: RasterElement>(value: f64, data_type: DataType) -> Result<T> {
    data_type
        .representable(value)
        .and_then(T::from_f64)
        .ok_or_else(|| Error::InvalidParameter {
            name: "fill value",
            value: value.to_string(),
            reason: format!("not representable as {}", data_type),
        })
}

impl<T: RasterElement> From<Array2<T>> for BandArray {
    fn from(array: Array2<T>) -> Self {
        T::into_band(array)
    }
}

impl Default for BandArray {
    fn default() -> Self {
        BandArray::Float64(Array2::zeros((0, 0)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_assign_region_and_slice() {
        let mut dst = BandArray::zeros(DataType::Int16, (3, 4));
        let src = BandArray::from(array![[1i16, 2], [3, 4]]);
        dst.assign_region(1, 2, &src).unwrap();

        assert_eq!(dst.get_f64(1, 2), Some(1.0));
        assert_eq!(dst.get_f64(2, 3), Some(4.0));
        assert_eq!(dst.slice(1, 2, 2, 2), src);
    }

    #[test]
    fn test_assign_region_rejects_type_mismatch() {
        let mut dst = BandArray::zeros(DataType::Int16, (2, 2));
        let src = BandArray::from(array![[1.0f32]]);
        assert!(dst.assign_region(0, 0, &src).is_err());
    }

    #[test]
    fn test_cast_and_typed_access() {
        let band = BandArray::from(array![[1u8, 200]]);
        assert!(band.view::<u8>().is_some());
        assert!(band.view::<f32>().is_none());
        let as_i8 = band.cast::<i8>();
        assert!(as_i8.is_err());
        let as_f32 = band.cast::<f32>().unwrap();
        assert_eq!(as_f32, array![[1.0f32, 200.0]]);
    }

    #[test]
    fn test_fill_invalid() {
        let mut band = BandArray::from(array![[1.0f32, 2.0], [3.0, 4.0]]);
        let mask = array![[true, false], [false, true]];
        band.fill_invalid(&mask, -1.0).unwrap();
        assert_eq!(band, BandArray::from(array![[1.0f32, -1.0], [-1.0, 4.0]]));

        let mut bytes = BandArray::from(array![[1u8]]);
        assert!(bytes.fill_invalid(&array![[false]], -1.0).is_err());
    }
}
