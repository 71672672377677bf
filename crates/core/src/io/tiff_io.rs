//! (Geo)TIFF datasets through the `tiff` crate
//!
//! Reads tags 33550 (ModelPixelScale), 33922 (ModelTiepoint),
//! 34264 (ModelTransformation), 34735 (GeoKeyDirectory),
//! 42112 (GDAL_METADATA) and 42113 (GDAL_NODATA). Pixel data is decoded one
//! strip or tile at a time and kept in the dataset's [`ChunkCache`].

use std::fs::File;
use std::io::{BufReader, Read, Seek};
use std::path::Path;

use tiff::decoder::{Decoder, DecodingResult, Limits};
use tiff::tags::Tag;
use tracing::{debug, warn};

use crate::crs::CRS;
use crate::error::{Error, Result};
use crate::metadata::{parse_gdal_metadata, GdalMetadata, PersistedMetadata};
use crate::raster::{BandArray, DataType, GeoTransform, PixelWindow, RasterElement};

use super::{ChunkCache, ChunkKey, RasterDataset};

const MODEL_PIXEL_SCALE: u16 = 33550;
const MODEL_TIEPOINT: u16 = 33922;
const MODEL_TRANSFORMATION: u16 = 34264;
const GEO_KEY_DIRECTORY: u16 = 34735;
const GDAL_METADATA: u16 = 42112;
const GDAL_NODATA: u16 = 42113;

/// GeoKey ids
const GEOGRAPHIC_TYPE: u16 = 2048;
const PROJECTED_CS_TYPE: u16 = 3072;
const USER_DEFINED: u16 = 32767;

/// A TIFF file read chunk by chunk
pub struct TiffDataset {
    path: String,
    decoder: Decoder<BufReader<File>>,
    width: usize,
    height: usize,
    samples: usize,
    data_type: DataType,
    planar: bool,
    chunk_width: usize,
    chunk_height: usize,
    chunks_across: usize,
    chunks_down: usize,
    transform: GeoTransform,
    crs: Option<CRS>,
    no_data: Option<f64>,
    metadata: GdalMetadata,
    cache: ChunkCache,
}

impl TiffDataset {
    pub fn open(path: &Path, cache_capacity: usize) -> Result<Self> {
        let file = File::open(path)?;
        let mut decoder = Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited());

        let (width, height) = decoder.dimensions()?;
        let (width, height) = (width as usize, height as usize);
        let samples = decoder
            .find_tag_unsigned::<u16>(Tag::SamplesPerPixel)?
            .unwrap_or(1) as usize;
        let bits = decoder
            .find_tag_unsigned_vec::<u16>(Tag::BitsPerSample)?
            .unwrap_or_default();
        let formats = decoder
            .find_tag_unsigned_vec::<u16>(Tag::SampleFormat)?
            .unwrap_or_default();
        let bits_per_sample = bits.first().copied().unwrap_or(1);
        let sample_format = formats.first().copied().unwrap_or(1);
        if bits.iter().any(|&b| b != bits_per_sample) {
            return Err(Error::UnsupportedDataType(format!(
                "{}: mixed bits per sample {:?}",
                path.display(),
                bits
            )));
        }
        let data_type = DataType::from_tiff(bits_per_sample, sample_format).ok_or_else(|| {
            Error::UnsupportedDataType(format!(
                "{}: {} bits with sample format {}",
                path.display(),
                bits_per_sample,
                sample_format
            ))
        })?;
        let planar = decoder
            .find_tag_unsigned::<u16>(Tag::PlanarConfiguration)?
            .unwrap_or(1)
            == 2;

        let (chunk_width, chunk_height) = decoder.chunk_dimensions();
        let chunk_width = (chunk_width as usize).max(1);
        let chunk_height = (chunk_height as usize).max(1);

        let transform = read_transform(&mut decoder);
        let crs = decoder
            .get_tag_u16_vec(Tag::from_u16_exhaustive(GEO_KEY_DIRECTORY))
            .ok()
            .and_then(|keys| epsg_from_geokeys(&keys))
            .map(CRS::from_epsg);
        let no_data = decoder
            .get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_NODATA))
            .ok()
            .and_then(|s| s.trim_matches(char::from(0)).trim().parse().ok());
        let metadata = match decoder.get_tag_ascii_string(Tag::from_u16_exhaustive(GDAL_METADATA)) {
            Ok(xml) => parse_gdal_metadata(xml.trim_matches(char::from(0))).unwrap_or_else(|e| {
                warn!("Ignoring GDAL metadata of {}: {}", path.display(), e);
                GdalMetadata::default()
            }),
            Err(_) => GdalMetadata::default(),
        };

        debug!(
            "TIFF {}: {}x{}x{} {} chunks {}x{}{}",
            path.display(),
            width,
            height,
            samples,
            data_type,
            chunk_width,
            chunk_height,
            if planar { " planar" } else { "" }
        );

        Ok(Self {
            path: path.display().to_string(),
            decoder,
            width,
            height,
            samples,
            data_type,
            planar,
            chunk_width,
            chunk_height,
            chunks_across: width.div_ceil(chunk_width),
            chunks_down: height.div_ceil(chunk_height),
            transform,
            crs,
            no_data,
            metadata,
            cache: ChunkCache::new(cache_capacity),
        })
    }

    /// Decoded chunks currently cached
    pub fn cached_chunks(&self) -> usize {
        self.cache.len()
    }

    fn decode_chunk(&mut self, plane: usize, chunk: usize) -> Result<Vec<BandArray>> {
        let index = (plane * self.chunks_across * self.chunks_down + chunk) as u32;
        let (w, h) = self.decoder.chunk_data_dimensions(index);
        let decoded = self.decoder.read_chunk(index)?;
        let samples = if self.planar { 1 } else { self.samples };
        split_samples(decoded, w as usize, h as usize, samples)
    }
}

/// Split an interleaved chunk into one `(rows, cols)` array per sample
#[allow(unreachable_patterns)]
fn split_samples(
    decoded: DecodingResult,
    cols: usize,
    rows: usize,
    samples: usize,
) -> Result<Vec<BandArray>> {
    fn split<T: RasterElement>(
        data: Vec<T>,
        cols: usize,
        rows: usize,
        samples: usize,
    ) -> Result<Vec<BandArray>> {
        let n = cols * rows;
        if data.len() < n * samples {
            return Err(Error::Format(format!(
                "chunk holds {} samples, expected {}",
                data.len(),
                n * samples
            )));
        }
        if samples == 1 {
            let mut data = data;
            data.truncate(n);
            return Ok(vec![BandArray::from_vec(data, rows, cols)?]);
        }
        (0..samples)
            .map(|s| {
                let plane: Vec<T> = data.iter().skip(s).step_by(samples).take(n).copied().collect();
                BandArray::from_vec(plane, rows, cols)
            })
            .collect()
    }

    match decoded {
        DecodingResult::U8(d) => split(d, cols, rows, samples),
        DecodingResult::U16(d) => split(d, cols, rows, samples),
        DecodingResult::U32(d) => split(d, cols, rows, samples),
        DecodingResult::U64(d) => split(d, cols, rows, samples),
        DecodingResult::I8(d) => split(d, cols, rows, samples),
        DecodingResult::I16(d) => split(d, cols, rows, samples),
        DecodingResult::I32(d) => split(d, cols, rows, samples),
        DecodingResult::I64(d) => split(d, cols, rows, samples),
        DecodingResult::F32(d) => split(d, cols, rows, samples),
        DecodingResult::F64(d) => split(d, cols, rows, samples),
        _ => Err(Error::UnsupportedDataType(
            "TIFF sample type without a band type".into(),
        )),
    }
}

/// GeoTransform from ModelPixelScale + ModelTiepoint, or from the
/// ModelTransformation matrix.
fn read_transform<R: Read + Seek>(decoder: &mut Decoder<R>) -> GeoTransform {
    let scale = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_PIXEL_SCALE))
        .ok();
    let tiepoint = decoder
        .get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TIEPOINT))
        .ok();
    if let (Some(scale), Some(tiepoint)) = (&scale, &tiepoint) {
        if scale.len() >= 2 && tiepoint.len() >= 6 {
            let origin_x = tiepoint[3] - tiepoint[0] * scale[0];
            let origin_y = tiepoint[4] + tiepoint[1] * scale[1];
            return GeoTransform::new(origin_x, origin_y, scale[0], -scale[1]);
        }
    }

    // Row-major 4x4: x = t[3] + col * t[0] + row * t[1]
    //                y = t[7] + col * t[4] + row * t[5]
    if let Ok(t) = decoder.get_tag_f64_vec(Tag::from_u16_exhaustive(MODEL_TRANSFORMATION)) {
        if t.len() >= 16 {
            return GeoTransform {
                origin_x: t[3],
                origin_y: t[7],
                pixel_width: t[0],
                pixel_height: t[5],
                row_rotation: t[1],
                col_rotation: t[4],
            };
        }
    }

    GeoTransform::default()
}

/// EPSG code from a GeoKeyDirectory, projected CRS preferred
fn epsg_from_geokeys(keys: &[u16]) -> Option<u32> {
    let count = *keys.get(3)? as usize;
    let mut geographic = None;
    for entry in keys.get(4..)?.chunks_exact(4).take(count) {
        let (id, location, value) = (entry[0], entry[1], entry[3]);
        if location != 0 || value == 0 || value == USER_DEFINED {
            continue;
        }
        match id {
            PROJECTED_CS_TYPE => return Some(value as u32),
            GEOGRAPHIC_TYPE => geographic = Some(value as u32),
            _ => {}
        }
    }
    geographic
}

impl RasterDataset for TiffDataset {
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
        self.samples
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
        self.metadata.scales.get(&band).copied()
    }

    fn offset(&self, band: usize) -> Option<f64> {
        self.metadata.offsets.get(&band).copied()
    }

    fn band_description(&self, band: usize) -> Option<String> {
        self.metadata.descriptions.get(&band).cloned()
    }

    fn native_block_size(&self, _band: usize) -> (usize, usize) {
        (
            self.chunk_width.min(self.width.max(1)),
            self.chunk_height.min(self.height.max(1)),
        )
    }

    fn persisted_metadata(&self) -> PersistedMetadata {
        self.metadata.items.clone()
    }

    fn read_block(&mut self, band: usize, window: &PixelWindow) -> Result<BandArray> {
        if band == 0 || band > self.samples {
            return Err(Error::InvalidBand {
                band,
                band_count: self.samples,
            });
        }
        if !window.fits(self.width, self.height) {
            return Err(Error::InvalidWindow {
                window: *window,
                width: self.width,
                height: self.height,
            });
        }
        let mut out = BandArray::zeros(self.data_type, (window.height, window.width));
        if window.is_empty() {
            return Ok(out);
        }

        let (plane, sample) = if self.planar { (band - 1, 0) } else { (0, band - 1) };
        let (cw, ch) = (self.chunk_width, self.chunk_height);
        for chunk_row in window.y_offset / ch..=(window.y_end() - 1) / ch {
            for chunk_col in window.x_offset / cw..=(window.x_end() - 1) / cw {
                let key = ChunkKey {
                    plane,
                    chunk: chunk_row * self.chunks_across + chunk_col,
                };
                if !self.cache.contains(&key) {
                    let planes = self.decode_chunk(plane, key.chunk)?;
                    self.cache.insert(key, planes);
                }
                let data = self
                    .cache
                    .get(&key)
                    .and_then(|planes| planes.get(sample))
                    .ok_or_else(|| Error::Format(format!("chunk {} lacks sample {}", key.chunk, sample)))?;

                let (cx, cy) = (chunk_col * cw, chunk_row * ch);
                let x0 = window.x_offset.max(cx);
                let x1 = window.x_end().min(cx + data.cols());
                let y0 = window.y_offset.max(cy);
                let y1 = window.y_end().min(cy + data.rows());
                if x0 >= x1 || y0 >= y1 {
                    continue;
                }
                let part = data.slice(y0 - cy, x0 - cx, y1 - y0, x1 - x0);
                out.assign_region(y0 - window.y_offset, x0 - window.x_offset, &part)?;
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::Scope;
    use ndarray::Array2;
    use tiff::encoder::{colortype, TiffEncoder};

    const XML: &str = r#"<GDALMetadata><Item name="wavelength" domain="ENVI">{450, 550, 650}</Item><Item name="DESCRIPTION" sample="2" role="description">red</Item></GDALMetadata>"#;

    /// 4x3 RGB file, one row per strip; sample s of pixel (r, c) holds
    /// r * 40 + c * 10 + s.
    fn write_rgb(path: &Path) {
        let file = File::create(path).unwrap();
        let mut encoder = TiffEncoder::new(file).unwrap();
        let mut image = encoder.new_image::<colortype::RGB8>(4, 3).unwrap();
        image.rows_per_strip(1).unwrap();
        image
            .encoder()
            .write_tag(Tag::Unknown(MODEL_PIXEL_SCALE), &[10.0f64, 10.0, 0.0][..])
            .unwrap();
        image
            .encoder()
            .write_tag(
                Tag::Unknown(MODEL_TIEPOINT),
                &[0.0f64, 0.0, 0.0, 100.0, 200.0, 0.0][..],
            )
            .unwrap();
        image
            .encoder()
            .write_tag(Tag::Unknown(GEO_KEY_DIRECTORY), &[1u16, 1, 0, 1, 3072, 0, 1, 32633][..])
            .unwrap();
        image.encoder().write_tag(Tag::Unknown(GDAL_NODATA), "7").unwrap();
        image.encoder().write_tag(Tag::Unknown(GDAL_METADATA), XML).unwrap();

        let mut data = Vec::new();
        for r in 0..3u8 {
            for c in 0..4u8 {
                for s in 0..3u8 {
                    data.push(r * 40 + c * 10 + s);
                }
            }
        }
        image.write_data(&data).unwrap();
    }

    #[test]
    fn test_open_reads_geotiff_tags() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.tif");
        write_rgb(&path);

        let ds = TiffDataset::open(&path, 8).unwrap();
        assert_eq!((ds.width(), ds.height(), ds.band_count()), (4, 3, 3));
        assert_eq!(ds.data_type(1), DataType::UInt8);
        assert_eq!(ds.geo_transform(), GeoTransform::new(100.0, 200.0, 10.0, -10.0));
        assert_eq!(ds.crs().and_then(|c| c.epsg()), Some(32633));
        assert_eq!(ds.no_data_value(2), Some(7.0));
        assert_eq!(ds.band_description(3).as_deref(), Some("red"));
        assert_eq!(ds.native_block_size(1), (4, 1));
        assert_eq!(
            ds.persisted_metadata()
                .get_raw("wavelength", "ENVI", Scope::Dataset),
            Some("{450, 550, 650}")
        );
    }

    #[test]
    fn test_window_spans_strips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rgb.tif");
        write_rgb(&path);

        let mut ds = TiffDataset::open(&path, 8).unwrap();
        let block = ds.read_block(2, &PixelWindow::new(1, 1, 3, 2)).unwrap();
        let expected = Array2::from_shape_fn((2, 3), |(r, c)| ((r + 1) * 40 + (c + 1) * 10 + 1) as u8);
        assert_eq!(block, BandArray::from(expected));
        assert_eq!(ds.cached_chunks(), 2);

        // cached strips are reused for other bands
        let b3 = ds.read_block(3, &PixelWindow::new(0, 2, 1, 1)).unwrap();
        assert_eq!(b3.get_f64(0, 0), Some(82.0));
        assert_eq!(ds.cached_chunks(), 2);
    }

    /// Tiled u16 file written tag by tag, one `rows x cols` plane per sample.
    /// Edge tiles are zero padded; planar files give each plane its own tiles.
    fn write_tiled(path: &Path, planes: &[Array2<u16>], tile: (usize, usize), planar: bool) {
        let (rows, cols) = planes[0].dim();
        let (tw, th) = tile;
        let groups: Vec<Vec<&Array2<u16>>> = if planar {
            planes.iter().map(|p| vec![p]).collect()
        } else {
            vec![planes.iter().collect()]
        };

        let mut encoder = TiffEncoder::new(File::create(path).unwrap()).unwrap();
        let mut dir = encoder.new_directory().unwrap();
        let (mut offsets, mut counts) = (Vec::new(), Vec::new());
        for group in &groups {
            for ty in 0..rows.div_ceil(th) {
                for tx in 0..cols.div_ceil(tw) {
                    let mut data = Vec::with_capacity(tw * th * group.len());
                    for r in 0..th {
                        for c in 0..tw {
                            for plane in group {
                                data.push(plane.get((ty * th + r, tx * tw + c)).copied().unwrap_or(0));
                            }
                        }
                    }
                    offsets.push(dir.write_data(data.as_slice()).unwrap() as u32);
                    counts.push((data.len() * 2) as u32);
                }
            }
        }

        let samples = planes.len() as u16;
        dir.write_tag(Tag::ImageWidth, cols as u32).unwrap();
        dir.write_tag(Tag::ImageLength, rows as u32).unwrap();
        dir.write_tag(Tag::BitsPerSample, vec![16u16; samples as usize].as_slice()).unwrap();
        dir.write_tag(Tag::Compression, 1u16).unwrap();
        dir.write_tag(Tag::PhotometricInterpretation, if samples == 1 { 1u16 } else { 2 })
            .unwrap();
        dir.write_tag(Tag::SamplesPerPixel, samples).unwrap();
        dir.write_tag(Tag::PlanarConfiguration, if planar { 2u16 } else { 1 })
            .unwrap();
        dir.write_tag(Tag::TileWidth, tw as u32).unwrap();
        dir.write_tag(Tag::TileLength, th as u32).unwrap();
        dir.write_tag(Tag::TileOffsets, offsets.as_slice()).unwrap();
        dir.write_tag(Tag::TileByteCounts, counts.as_slice()).unwrap();
        dir.finish().unwrap();
    }

    fn plane(rows: usize, cols: usize, sample: u16) -> Array2<u16> {
        Array2::from_shape_fn((rows, cols), |(r, c)| sample * 100 + (r * 10 + c) as u16)
    }

    #[test]
    fn test_planar_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("planar.tif");
        let planes: Vec<Array2<u16>> = (0..3).map(|s| plane(4, 4, s)).collect();
        write_tiled(&path, &planes, (2, 2), true);

        let mut ds = TiffDataset::open(&path, 16).unwrap();
        assert_eq!(ds.band_count(), 3);
        assert_eq!(ds.data_type(1), DataType::UInt16);
        assert_eq!(ds.native_block_size(2), (2, 2));

        let window = PixelWindow::new(1, 1, 3, 2);
        let b3 = ds.read_block(3, &window).unwrap();
        assert_eq!(b3, BandArray::from(planes[2].slice(ndarray::s![1..3, 1..4]).to_owned()));
        assert_eq!(ds.cached_chunks(), 4);

        // another band lives in other tiles
        let b1 = ds.read_block(1, &window).unwrap();
        assert_eq!(b1, BandArray::from(planes[0].slice(ndarray::s![1..3, 1..4]).to_owned()));
        assert_eq!(ds.cached_chunks(), 8);
    }

    #[test]
    fn test_padded_edge_tiles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiled.tif");
        let band = plane(3, 5, 0);
        write_tiled(&path, std::slice::from_ref(&band), (4, 2), false);

        let mut ds = TiffDataset::open(&path, 8).unwrap();
        assert_eq!((ds.width(), ds.height()), (5, 3));
        assert_eq!(ds.native_block_size(1), (4, 2));

        let full = ds.read_block(1, &PixelWindow::full(5, 3)).unwrap();
        assert_eq!(full, BandArray::from(band.clone()));

        let corner = ds.read_block(1, &PixelWindow::new(3, 1, 2, 2)).unwrap();
        assert_eq!(corner, BandArray::from(band.slice(ndarray::s![1..3, 3..5]).to_owned()));
    }

    #[test]
    fn test_geokeys() {
        assert_eq!(epsg_from_geokeys(&[1, 1, 0, 2, 2048, 0, 1, 4326, 3072, 0, 1, 32633]), Some(32633));
        assert_eq!(epsg_from_geokeys(&[1, 1, 0, 1, 2048, 0, 1, 4326]), Some(4326));
        assert_eq!(epsg_from_geokeys(&[1, 1, 0, 1, 3072, 0, 1, 32767]), None);
        assert_eq!(epsg_from_geokeys(&[1, 1]), None);
    }
}
