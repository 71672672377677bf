//! Array access, masking and tiling through the public reader API

use std::sync::Arc;

use bandstack_core::io::MemDataset;
use bandstack_core::metadata::{keys, PersistedMetadata};
use bandstack_core::prelude::*;
use ndarray::{array, Array2};

/// 3 bands, 4x2 pixels, band 1 has no-data -1 at (0, 0)
fn three_band_reader() -> RasterReader {
    let ds = MemDataset::new(4, 2)
        .with_band(array![[-1.0f32, 2.0, 3.0, 4.0], [5.0, 6.0, 7.0, 8.0]])
        .unwrap()
        .with_band(array![[1u16, 2, 3, 4], [5, 6, 7, 8]])
        .unwrap()
        .with_band(array![[0i32, 0, 0, 0], [0, 0, 0, 0]])
        .unwrap()
        .with_no_data(1, -1.0)
        .unwrap();
    RasterReader::from_dataset(Box::new(ds))
}

fn ramp_reader(width: usize, height: usize, block_height: usize) -> RasterReader {
    let data = Array2::from_shape_fn((height, width), |(r, c)| (r * width + c) as f64);
    let ds = MemDataset::new(width, height)
        .with_transform(GeoTransform::new(0.0, height as f64 * 2.0, 2.0, -2.0))
        .with_block_size(width, block_height)
        .with_band(data)
        .unwrap();
    RasterReader::from_dataset_with_options(
        Box::new(ds),
        ReaderOptions {
            strip_rows: 3,
            ..ReaderOptions::default()
        },
    )
}

#[test]
fn test_no_data_pixel_is_masked() {
    let mut reader = three_band_reader();
    let arrays = reader.array(&ArrayRequest::new().bands(vec![1])).unwrap();
    assert_eq!(arrays.len(), 1);
    assert_eq!(arrays[0].shape(), (2, 4));

    let masks = reader.mask_array(&arrays, Some(&[1]), true, None).unwrap();
    let mut expected = Array2::from_elem((2, 4), true);
    expected[[0, 0]] = false;
    assert_eq!(masks[0], expected);
}

#[test]
fn test_invalid_band_fails_before_reading() {
    let mut reader = three_band_reader();
    let err = reader
        .array(&ArrayRequest::new().bands(vec![1, 4]))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidBand { band: 4, band_count: 3 }));

    let err = reader.array(&ArrayRequest::new().bands(vec![0])).unwrap_err();
    assert!(matches!(err, Error::InvalidBand { band: 0, .. }));
}

#[test]
fn test_windows_match_full_read_slices() {
    let mut reader = ramp_reader(9, 7, 2);
    let full = reader.array(&ArrayRequest::new()).unwrap().remove(0);

    for (x, y, w, h) in [(0, 0, 9, 7), (2, 1, 3, 4), (8, 6, 1, 1), (0, 3, 9, 4), (4, 0, 5, 7)] {
        let part = reader
            .array(&ArrayRequest::new().window(x, y, w, h))
            .unwrap()
            .remove(0);
        assert_eq!(part, full.slice(y, x, h, w), "window ({x}, {y}, {w}, {h})");
    }
}

#[test]
fn test_walk_grid_blocks_reassemble_the_raster() {
    let mut reader = ramp_reader(9, 7, 1);
    let full = reader.array(&ArrayRequest::new()).unwrap().remove(0);
    let mut stitched = BandArray::zeros(DataType::Float64, (7, 9));

    let walker = reader.walk_grid(4, 3).unwrap();
    assert_eq!(walker.len(), 9);
    for block in walker.iter() {
        let part = reader
            .array(&ArrayRequest::new().pixel_window(&block.window()))
            .unwrap()
            .remove(0);
        stitched
            .assign_region(block.y_offset, block.x_offset, &part)
            .unwrap();
    }
    assert_eq!(stitched, full);

    // re-enumeration is identical
    let again: Vec<BlockDescriptor> = walker.iter().collect();
    assert_eq!(again, walker.iter().collect::<Vec<_>>());
}

#[test]
fn test_overlap_is_clamped_at_the_edges() {
    let mut reader = ramp_reader(9, 7, 2);
    let request = ArrayRequest::new().window(0, 2, 3, 3).overlap(2);
    let window = reader.resolve_window(&request).unwrap().unwrap();
    assert_eq!(window, PixelWindow::new(0, 0, 5, 7));

    let arrays = reader.array(&request).unwrap();
    assert_eq!(arrays[0].shape(), (7, 5));

    // interior windows grow by the full margin on every side
    let request = ArrayRequest::new().window(3, 2, 2, 2).overlap(1);
    let arrays = reader.array(&request).unwrap();
    assert_eq!(arrays[0].shape(), (4, 4));
    assert_eq!(arrays[0].get_f64(0, 0), Some(11.0));
}

#[test]
fn test_overflowing_window_is_rejected() {
    let mut reader = ramp_reader(9, 7, 2);
    let err = reader
        .array(&ArrayRequest::new().window(usize::MAX, 0, 2, 1))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidWindow { width: 9, height: 7, .. }));

    let err = reader
        .array(&ArrayRequest::new().window(0, usize::MAX - 1, 1, 4))
        .unwrap_err();
    assert!(matches!(err, Error::InvalidWindow { .. }));
}

#[test]
fn test_huge_overlap_covers_the_raster() {
    let mut reader = ramp_reader(9, 7, 2);
    let request = ArrayRequest::new().window(0, 0, 2, 1).overlap(usize::MAX);
    assert_eq!(
        reader.resolve_window(&request).unwrap(),
        Some(PixelWindow::full(9, 7))
    );
    assert_eq!(reader.array(&request).unwrap()[0].shape(), (7, 9));
}

#[test]
fn test_bounding_box_overlap_is_clamped() {
    let mut reader = ramp_reader(9, 7, 2);
    // covers pixels (2, 2, 3, 2); a 3 pixel margin hits the top and left edges
    let request = ArrayRequest::new()
        .bounding_box(GeoExtent::new(4.0, 6.0, 10.0, 10.0))
        .overlap(3);
    let window = reader.resolve_window(&request).unwrap().unwrap();
    assert_eq!(window, PixelWindow::new(0, 0, 8, 7));

    let padded = reader.array(&request).unwrap().remove(0);
    let full = reader.array(&ArrayRequest::new()).unwrap().remove(0);
    assert_eq!(padded, full.slice(0, 0, 7, 8));
}

#[test]
fn test_bounding_box_size_must_match_native_pixels() {
    let mut reader = ramp_reader(9, 7, 2);
    let bbox = GeoExtent::new(4.0, 6.0, 10.0, 10.0);

    let matching = ArrayRequest::new().bounding_box(bbox).size(3, 2);
    assert_eq!(reader.array(&matching).unwrap()[0].shape(), (2, 3));

    let resampled = ArrayRequest::new().bounding_box(bbox).size(6, 4);
    match reader.array(&resampled).unwrap_err() {
        Error::InvalidParameter { name, value, .. } => {
            assert_eq!(name, "width");
            assert_eq!(value, "6");
        }
        other => panic!("expected invalid parameter, got {other}"),
    }
}

#[test]
fn test_bounding_box_rejects_pixel_offsets() {
    let mut reader = ramp_reader(9, 7, 2);
    let bbox = GeoExtent::new(4.0, 6.0, 10.0, 10.0);
    let request = ArrayRequest::new().window(2, 2, 3, 2).bounding_box(bbox);
    assert!(matches!(
        reader.array(&request),
        Err(Error::InvalidParameter { name: "bounding_box", .. })
    ));

    let mut offset_only = ArrayRequest::new().bounding_box(bbox);
    offset_only.y_offset = Some(1);
    assert!(matches!(
        reader.resolve_window(&offset_only),
        Err(Error::InvalidParameter { name: "bounding_box", .. })
    ));
}

#[test]
fn test_bounding_box_outside_yields_empty_arrays() {
    let mut reader = ramp_reader(9, 7, 2);
    let request = ArrayRequest::new().bounding_box(GeoExtent::new(100.0, 100.0, 120.0, 120.0));
    assert_eq!(reader.resolve_window(&request).unwrap(), None);
    let arrays = reader.array(&request).unwrap();
    assert_eq!(arrays.len(), 1);
    assert_eq!(arrays[0].shape(), (0, 0));
    assert_eq!(arrays[0].data_type(), DataType::Float64);
}

#[test]
fn test_bounding_box_reads_the_covered_pixels() {
    let mut reader = ramp_reader(9, 7, 2);
    // extent is x 0..18, y 0..14 with 2 unit pixels
    let bbox = GeoExtent::new(4.0, 6.0, 10.0, 10.0);
    let by_box = reader
        .array(&ArrayRequest::new().bounding_box(bbox))
        .unwrap()
        .remove(0);
    let by_window = reader
        .array(&ArrayRequest::new().window(2, 2, 3, 2))
        .unwrap()
        .remove(0);
    assert_eq!(by_box, by_window);
}

#[test]
fn test_masking_is_idempotent_after_fill() {
    let mut reader = three_band_reader();
    reader
        .source_mut()
        .add_user_no_data_range(1, NoDataRange::new(6.0, 7.0, RangeMode::IncludeMinOnly).unwrap())
        .unwrap();
    let mut arrays = reader.array(&ArrayRequest::new().bands(vec![1])).unwrap();
    let first = reader.mask_array(&arrays, Some(&[1]), true, None).unwrap();
    assert!(!first[0][[1, 1]]);
    assert!(first[0][[1, 2]]);

    arrays[0].fill_invalid(&first[0], -1.0).unwrap();
    let second = reader.mask_array(&arrays, Some(&[1]), true, None).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_default_no_data_only_applies_to_undeclared_bands() {
    let mut reader = three_band_reader();
    let arrays = reader.array(&ArrayRequest::new()).unwrap();
    let masks = reader.mask_array(&arrays, None, true, Some(0.0)).unwrap();
    // band 1 declares -1, so 0 stays valid there; band 3 is all zeros
    assert!(masks[0].iter().filter(|v| !**v).count() == 1);
    assert!(masks[2].iter().all(|v| !*v));
    assert_eq!(reader.source().no_data_value(3).unwrap(), None);
}

#[test]
fn test_cancellation_stops_a_read() {
    let token = CancelToken::new();
    let mut reader = ramp_reader(9, 7, 1).with_feedback(Arc::new(token.clone()));
    assert!(reader.array(&ArrayRequest::new()).is_ok());

    token.cancel();
    let err = reader.array(&ArrayRequest::new().window(1, 1, 2, 2)).unwrap_err();
    match err {
        Error::Cancelled { window } => assert_eq!(window, PixelWindow::new(1, 1, 2, 2)),
        other => panic!("expected cancellation, got {other}"),
    }
}

fn spectral_reader(with_wavelengths: bool) -> RasterReader {
    let mut meta = PersistedMetadata::new();
    if with_wavelengths {
        meta.insert(ENVI_DOMAIN, Scope::Dataset, keys::WAVELENGTH, "{450, 550, 700}");
        meta.insert(ENVI_DOMAIN, Scope::Dataset, keys::WAVELENGTH_UNITS, "Nanometers");
    }
    let band = array![[1u8, 2], [3, 4]];
    let ds = MemDataset::new(2, 2)
        .with_band(band.clone())
        .unwrap()
        .with_band(band.clone())
        .unwrap()
        .with_band(band)
        .unwrap()
        .with_metadata(meta);
    RasterReader::from_dataset(Box::new(ds))
}

#[test]
fn test_find_wavelength_without_metadata_is_absent() {
    let mut reader = spectral_reader(false);
    assert_eq!(reader.source_mut().find_wavelength(550.0, None).unwrap(), None);
    assert_eq!(reader.source_mut().bad_band_multiplier(2).unwrap(), 1);
}

#[test]
fn test_session_overlay_beats_the_persisted_list() {
    let mut reader = spectral_reader(true);
    let source = reader.source_mut();
    assert_eq!(source.wavelength(3, None).unwrap(), Some(700.0));

    source
        .set_item(keys::WAVELENGTH, 650.0, DEFAULT_DOMAIN, Scope::Band(3))
        .unwrap();
    assert_eq!(source.wavelength(3, None).unwrap(), Some(650.0));
    assert_eq!(source.find_wavelength(660.0, None).unwrap(), Some(3));
    approx::assert_relative_eq!(
        source.wavelength(1, Some(WavelengthUnits::Micrometers)).unwrap().unwrap(),
        0.45,
        epsilon = 1e-12
    );
}

#[test]
fn test_readers_do_not_share_overlays() {
    let mut a = spectral_reader(true);
    let mut b = spectral_reader(true);
    a.source_mut()
        .set_item(keys::WAVELENGTH, 650.0, DEFAULT_DOMAIN, Scope::Band(3))
        .unwrap();
    assert_eq!(b.source_mut().wavelength(3, None).unwrap(), Some(700.0));

    // unless the overlay is handed over explicitly
    let overlay = a.source().metadata().overlay().clone();
    let mut c = spectral_reader(true).with_overlay(overlay);
    assert_eq!(c.source_mut().wavelength(3, None).unwrap(), Some(650.0));
}

#[test]
fn test_edited_wavelength_list_replaces_resolved_values() {
    let mut reader = spectral_reader(true);
    let source = reader.source_mut();
    assert_eq!(source.wavelength(2, None).unwrap(), Some(550.0));

    source
        .set_item(keys::WAVELENGTH, vec![460.0, 560.0, 710.0], ENVI_DOMAIN, Scope::Dataset)
        .unwrap();
    assert_eq!(source.wavelength(2, None).unwrap(), Some(560.0));

    source
        .set_item(keys::WAVELENGTH_UNITS, "Micrometers", ENVI_DOMAIN, Scope::Dataset)
        .unwrap();
    assert_eq!(
        source.wavelength_units(2).unwrap(),
        Some(WavelengthUnits::Micrometers)
    );
}
