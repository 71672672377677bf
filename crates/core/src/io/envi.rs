//! ENVI header + raw binary datasets

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use byteorder::{BigEndian, ByteOrder, LittleEndian};
use tracing::{debug, warn};

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::metadata::{MetadataValue, PersistedMetadata, Scope, ENVI_DOMAIN};
use crate::raster::{BandArray, DataType, GeoTransform, PixelWindow};

use super::RasterDataset;

/// Sample layout of an ENVI data file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interleave {
    /// Band sequential
    Bsq,
    /// Band interleaved by line
    Bil,
    /// Band interleaved by pixel
    Bip,
}

impl Interleave {
    fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "bsq" => Some(Interleave::Bsq),
            "bil" => Some(Interleave::Bil),
            "bip" => Some(Interleave::Bip),
            _ => None,
        }
    }
}

/// Parsed `.hdr` file: ordered `key = value` items.
///
/// Keys are lower-cased; `{...}` values may span several lines and are
/// kept verbatim, braces included.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EnviHeader {
    items: Vec<(String, String)>,
}

impl EnviHeader {
    pub fn parse(text: &str) -> Result<Self> {
        let mut lines = text.lines();
        match lines.next() {
            Some(first) if first.trim().eq_ignore_ascii_case("ENVI") => {}
            _ => return Err(Error::Format("ENVI header must start with 'ENVI'".into())),
        }

        let mut items = Vec::new();
        while let Some(line) = lines.next() {
            let line = line.trim();
            if line.is_empty() || line.starts_with(';') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                warn!("Skipping ENVI header line without '=': {}", line);
                continue;
            };
            let mut value = value.trim().to_string();
            if value.starts_with('{') {
                while !value.contains('}') {
                    let Some(next) = lines.next() else {
                        return Err(Error::Format(format!(
                            "unterminated '{{' in ENVI header item '{}'",
                            key.trim()
                        )));
                    };
                    value.push(' ');
                    value.push_str(next.trim());
                }
            }
            items.push((key.trim().to_ascii_lowercase(), value));
        }
        Ok(Self { items })
    }

    /// Raw value of an item (last occurrence wins)
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, &str)> {
        self.items.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn required_usize(&self, key: &str) -> Result<usize> {
        let raw = self
            .get(key)
            .ok_or_else(|| Error::Format(format!("ENVI header lacks '{}'", key)))?;
        raw.trim()
            .parse()
            .map_err(|_| Error::Format(format!("ENVI header item '{}' = '{}' is not a count", key, raw)))
    }

    fn optional_usize(&self, key: &str) -> Result<usize> {
        match self.get(key) {
            None => Ok(0),
            Some(_) => self.required_usize(key),
        }
    }

    /// Numeric list item, `None` when absent or malformed
    fn numbers(&self, key: &str) -> Option<Vec<f64>> {
        match MetadataValue::parse(self.get(key)?).ok()? {
            MetadataValue::Numbers(n) => Some(n),
            MetadataValue::Number(n) => Some(vec![n]),
            _ => None,
        }
    }

    fn texts(&self, key: &str) -> Option<Vec<String>> {
        let raw = self.get(key)?.trim();
        let inner = raw.strip_prefix('{')?.strip_suffix('}')?;
        Some(inner.split(',').map(|s| s.trim().to_string()).collect())
    }
}

/// GeoTransform from `map info = {proj, ref x, ref y, easting, northing,
/// x size, y size, ...}`, where the reference pixel is 1-based.
fn map_info_transform(raw: &str) -> Option<GeoTransform> {
    let inner = raw.trim().strip_prefix('{')?.strip_suffix('}')?;
    let fields: Vec<&str> = inner.split(',').map(str::trim).collect();
    if fields.len() < 7 {
        return None;
    }
    let num = |i: usize| fields[i].parse::<f64>().ok();
    let (ref_x, ref_y, easting, northing, size_x, size_y) =
        (num(1)?, num(2)?, num(3)?, num(4)?, num(5)?, num(6)?);
    if fields.iter().any(|f| f.to_ascii_lowercase().starts_with("rotation")) {
        warn!("Ignoring rotation in ENVI map info");
    }
    Some(GeoTransform::new(
        easting - (ref_x - 1.0) * size_x,
        northing + (ref_y - 1.0) * size_y,
        size_x,
        -size_y,
    ))
}

/// ENVI dataset: header plus a raw data file read with seeks, so a window
/// read touches only the rows it needs.
#[derive(Debug)]
pub struct EnviDataset {
    path: String,
    file: File,
    header: EnviHeader,
    width: usize,
    height: usize,
    band_count: usize,
    header_offset: u64,
    data_type: DataType,
    interleave: Interleave,
    big_endian: bool,
    transform: GeoTransform,
    crs: Option<CRS>,
    no_data: Option<f64>,
    gains: Option<Vec<f64>>,
    offsets: Option<Vec<f64>>,
    band_names: Option<Vec<String>>,
}

impl EnviDataset {
    pub fn open(header_path: &Path, data_path: &Path) -> Result<Self> {
        let header = EnviHeader::parse(&fs::read_to_string(header_path)?)?;
        let width = header.required_usize("samples")?;
        let height = header.required_usize("lines")?;
        let band_count = header.required_usize("bands")?;
        let header_offset = header.optional_usize("header offset")? as u64;

        let code = header.required_usize("data type")?;
        let data_type = DataType::from_envi_code(code as u32)
            .ok_or_else(|| Error::UnsupportedDataType(format!("ENVI data type {}", code)))?;
        let interleave = match header.get("interleave") {
            None => Interleave::Bsq,
            Some(raw) => Interleave::parse(raw)
                .ok_or_else(|| Error::Format(format!("unknown ENVI interleave '{}'", raw)))?,
        };
        let big_endian = header.optional_usize("byte order")? == 1;

        let transform = header
            .get("map info")
            .and_then(map_info_transform)
            .unwrap_or_default();
        let crs = header
            .get("coordinate system string")
            .map(|raw| raw.trim().trim_start_matches('{').trim_end_matches('}'))
            .and_then(CRS::from_wkt);
        let no_data = header
            .get("data ignore value")
            .and_then(|raw| raw.trim().parse().ok());

        let band_list = |list: Option<Vec<f64>>, key: &str| {
            list.filter(|l| {
                let ok = l.len() == band_count;
                if !ok {
                    warn!("Ignoring ENVI '{}' with {} entries for {} bands", key, l.len(), band_count);
                }
                ok
            })
        };
        let gains = band_list(header.numbers("data gain values"), "data gain values");
        let offsets = band_list(header.numbers("data offset values"), "data offset values");
        let band_names = header.texts("band names").filter(|n| n.len() == band_count);

        let file = File::open(data_path)?;
        let expected = [width, height, band_count, data_type.size_bytes()]
            .into_iter()
            .try_fold(1u64, |acc, n| acc.checked_mul(n as u64))
            .and_then(|bytes| bytes.checked_add(header_offset))
            .ok_or_else(|| {
                Error::Format(format!(
                    "ENVI header describes {}x{}x{} samples, more than a file can hold",
                    width, height, band_count
                ))
            })?;
        let actual = file.metadata()?.len();
        if actual < expected {
            return Err(Error::Format(format!(
                "{} holds {} bytes, header describes {}",
                data_path.display(),
                actual,
                expected
            )));
        }

        debug!(
            "ENVI {}: {}x{}x{} {} {:?}",
            data_path.display(),
            width,
            height,
            band_count,
            data_type,
            interleave
        );

        Ok(Self {
            path: data_path.display().to_string(),
            file,
            header,
            width,
            height,
            band_count,
            header_offset,
            data_type,
            interleave,
            big_endian,
            transform,
            crs,
            no_data,
            gains,
            offsets,
            band_names,
        })
    }

    pub fn header(&self) -> &EnviHeader {
        &self.header
    }

    pub fn interleave(&self) -> Interleave {
        self.interleave
    }

    /// Byte offset of sample (band, row, col); band is 0-based here.
    /// `open` checked that the whole cube fits in `u64` bytes.
    fn sample_offset(&self, band: usize, row: usize, col: usize) -> u64 {
        let (w, h, b) = (self.width as u64, self.height as u64, self.band_count as u64);
        let (band, row, col) = (band as u64, row as u64, col as u64);
        let index = match self.interleave {
            Interleave::Bsq => (band * h + row) * w + col,
            Interleave::Bil => (row * b + band) * w + col,
            Interleave::Bip => (row * w + col) * b + band,
        };
        self.header_offset + index * self.data_type.size_bytes() as u64
    }

    fn read_rows(&mut self, band: usize, window: &PixelWindow) -> Result<Vec<u8>> {
        let size = self.data_type.size_bytes();
        let row_bytes = window.width * size;
        let mut out = vec![0u8; window.height * row_bytes];
        if window.is_empty() {
            return Ok(out);
        }
        match self.interleave {
            Interleave::Bsq | Interleave::Bil => {
                for (i, chunk) in out.chunks_exact_mut(row_bytes).enumerate() {
                    let offset = self.sample_offset(band, window.y_offset + i, window.x_offset);
                    self.file.seek(SeekFrom::Start(offset))?;
                    self.file.read_exact(chunk)?;
                }
            }
            Interleave::Bip => {
                let pixel_bytes = self.band_count * size;
                let mut span = vec![0u8; window.width * pixel_bytes];
                for (i, chunk) in out.chunks_exact_mut(row_bytes).enumerate() {
                    let offset = self.sample_offset(0, window.y_offset + i, window.x_offset);
                    self.file.seek(SeekFrom::Start(offset))?;
                    self.file.read_exact(&mut span)?;
                    for (dst, pixel) in chunk.chunks_exact_mut(size).zip(span.chunks_exact(pixel_bytes)) {
                        dst.copy_from_slice(&pixel[band * size..(band + 1) * size]);
                    }
                }
            }
        }
        Ok(out)
    }
}

/// Decode raw samples of one type and byte order into a `(rows, cols)` band
pub(crate) fn decode_samples(
    bytes: &[u8],
    data_type: DataType,
    big_endian: bool,
    rows: usize,
    cols: usize,
) -> Result<BandArray> {
    macro_rules! decode {
        ($t:ty, $read:ident) => {{
            let mut out: Vec<$t> = vec![Default::default(); bytes.len() / std::mem::size_of::<$t>()];
            if big_endian {
                BigEndian::$read(bytes, &mut out);
            } else {
                LittleEndian::$read(bytes, &mut out);
            }
            BandArray::from_vec(out, rows, cols)
        }};
    }
    match data_type {
        DataType::UInt8 => BandArray::from_vec(bytes.to_vec(), rows, cols),
        DataType::Int8 => BandArray::from_vec(bytes.iter().map(|&b| b as i8).collect(), rows, cols),
        DataType::UInt16 => decode!(u16, read_u16_into),
        DataType::Int16 => decode!(i16, read_i16_into),
        DataType::UInt32 => decode!(u32, read_u32_into),
        DataType::Int32 => decode!(i32, read_i32_into),
        DataType::UInt64 => decode!(u64, read_u64_into),
        DataType::Int64 => decode!(i64, read_i64_into),
        DataType::Float32 => decode!(f32, read_f32_into),
        DataType::Float64 => decode!(f64, read_f64_into),
    }
}

impl RasterDataset for EnviDataset {
    fn description(&self) -> String {
        self.path.clone()
    }

    fn width(&self) -> usize {
        self.width
    }

    fn height(&self) -> usize {
        self.height
    }

    fn band_count(&self) -> usize {
        self.band_count
    }

    fn data_type(&self, _band: usize) -> DataType {
        self.data_type
    }

    fn geo_transform(&self) -> GeoTransform {
        self.transform
    }

    fn crs(&self) -> Option<CRS> {
        self.crs.clone()
    }

    fn no_data_value(&self, _band: usize) -> Option<f64> {
        self.no_data
    }

    fn scale(&self, band: usize) -> Option<f64> {
        self.gains.as_ref()?.get(band.checked_sub(1)?).copied()
    }

    fn offset(&self, band: usize) -> Option<f64> {
        self.offsets.as_ref()?.get(band.checked_sub(1)?).copied()
    }

    fn band_description(&self, band: usize) -> Option<String> {
        self.band_names.as_ref()?.get(band.checked_sub(1)?).cloned()
    }

    fn native_block_size(&self, _band: usize) -> (usize, usize) {
        (self.width.max(1), 1)
    }

    fn persisted_metadata(&self) -> PersistedMetadata {
        let mut meta = PersistedMetadata::new();
        for (key, value) in self.header.items() {
            meta.insert(ENVI_DOMAIN, Scope::Dataset, key, value);
        }
        meta
    }

    fn read_block(&mut self, band: usize, window: &PixelWindow) -> Result<BandArray> {
        if band == 0 || band > self.band_count {
            return Err(Error::InvalidBand {
                band,
                band_count: self.band_count,
            });
        }
        if !window.fits(self.width, self.height) {
            return Err(Error::InvalidWindow {
                window: *window,
                width: self.width,
                height: self.height,
            });
        }
        let bytes = self.read_rows(band - 1, window)?;
        decode_samples(
            &bytes,
            self.data_type,
            self.big_endian,
            window.height,
            window.width,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    const HEADER: &str = "ENVI
description = {
  test cube}
samples = 3
lines = 2
bands = 2
header offset = 0
data type = 2
interleave = bil
byte order = 1
map info = {UTM, 1.0, 1.0, 500000.0, 4000000.0, 30.0, 30.0, 33, North, WGS-84}
wavelength units = Nanometers
wavelength = {
 450.0, 550.0}
band names = {blue, green}
data ignore value = -9999
";

    #[test]
    fn test_header_parse() {
        let header = EnviHeader::parse(HEADER).unwrap();
        assert_eq!(header.get("samples"), Some("3"));
        assert_eq!(header.get("wavelength"), Some("{ 450.0, 550.0}"));
        assert_eq!(header.get("description"), Some("{ test cube}"));
        assert_eq!(header.numbers("wavelength"), Some(vec![450.0, 550.0]));
        assert!(EnviHeader::parse("not envi\nsamples = 1").is_err());
        assert!(EnviHeader::parse("ENVI\nwavelength = {1, 2").is_err());
    }

    #[test]
    fn test_map_info() {
        let gt = map_info_transform("{UTM, 2.0, 3.0, 500030.0, 3999940.0, 30.0, 30.0, 33}").unwrap();
        assert_eq!(gt.origin_x, 500000.0);
        assert_eq!(gt.origin_y, 4000000.0);
        assert_eq!(gt.pixel_height, -30.0);
        assert!(map_info_transform("{UTM, 1}").is_none());
    }

    #[test]
    fn test_decode_big_endian() {
        let bytes = [0x00, 0x01, 0xff, 0xfe];
        let band = decode_samples(&bytes, DataType::Int16, true, 1, 2).unwrap();
        assert_eq!(band, BandArray::from(array![[1i16, -2]]));
    }

    #[test]
    fn test_read_bil_window() {
        let dir = tempfile::tempdir().unwrap();
        let hdr = dir.path().join("cube.hdr");
        let data = dir.path().join("cube.bil");
        fs::write(&hdr, HEADER).unwrap();
        // BIL: row 0 band 1, row 0 band 2, row 1 band 1, row 1 band 2
        let samples: [i16; 12] = [1, 2, 3, 10, 20, 30, 4, 5, 6, 40, 50, 60];
        let bytes: Vec<u8> = samples.iter().flat_map(|v| v.to_be_bytes()).collect();
        fs::write(&data, bytes).unwrap();

        let mut ds = EnviDataset::open(&hdr, &data).unwrap();
        assert_eq!(ds.interleave(), Interleave::Bil);
        assert_eq!(ds.no_data_value(1), Some(-9999.0));
        assert_eq!(ds.band_description(2).as_deref(), Some("green"));

        let b2 = ds.read_block(2, &PixelWindow::new(1, 0, 2, 2)).unwrap();
        assert_eq!(b2, BandArray::from(array![[20i16, 30], [50, 60]]));

        let meta = ds.persisted_metadata();
        assert_eq!(
            meta.get_raw("wavelength_units", ENVI_DOMAIN, Scope::Dataset),
            Some("Nanometers")
        );
    }

    #[test]
    fn test_truncated_data_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let hdr = dir.path().join("cube.hdr");
        let data = dir.path().join("cube.bil");
        fs::write(&hdr, HEADER).unwrap();
        fs::write(&data, [0u8; 10]).unwrap();
        assert!(matches!(EnviDataset::open(&hdr, &data), Err(Error::Format(_))));
    }
}
