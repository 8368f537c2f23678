//! `GeoTIFF` decoding, nodata masking and downsampling behaviour
mod common;

use approx::assert_relative_eq;
use rain_garden_core::raster::parse_elevation;
use rain_garden_core::{
    load_elevation, DataSource, ElevationGrid, ErrorKind, FetchOptions, GeoBounds,
};
use std::io::Cursor;
use tiff::encoder::{colortype, TiffEncoder};

const NODATA: f32 = -9999.0;

/// 12 x 8 DEM over Norfolk with a nodata stripe along the first column
fn norfolk_dem() -> Vec<u8> {
    let (width, height) = (8u32, 12u32);
    let data: Vec<f32> = (0..height)
        .flat_map(|r| {
            (0..width).map(move |c| {
                if c == 0 {
                    NODATA
                } else {
                    (r * 10 + c) as f32
                }
            })
        })
        .collect();
    common::geotiff_bytes(width, height, &data, 37.0, -76.4, 0.025, Some("-9999"))
}

#[test]
fn test_decodes_dimensions_bounds_and_nodata() {
    let grid = parse_elevation("norfolk.tif", norfolk_dem()).unwrap();

    assert_eq!(grid.rows(), 12);
    assert_eq!(grid.cols(), 8);
    assert_eq!(grid.nodata(), Some(-9999.0));

    let bounds = grid.bounds();
    assert_relative_eq!(bounds.max_lat, 37.0);
    assert_relative_eq!(bounds.min_lat, 36.7, epsilon = 1e-9);
    assert_relative_eq!(bounds.min_lon, -76.4);
    assert_relative_eq!(bounds.max_lon, -76.2, epsilon = 1e-9);
}

#[test]
fn test_nodata_never_reaches_statistics() {
    let grid = parse_elevation("norfolk.tif", norfolk_dem()).unwrap();
    let stats = grid.statistics().unwrap();

    assert_eq!(stats.nodata_cells, 12);
    assert_eq!(stats.valid_cells, 12 * 7);
    assert_eq!(stats.min, 1.0);
    assert_eq!(stats.max, 117.0);
    assert!(stats.min > -9999.0);

    let masked = grid.masked_values();
    assert!((0..12).all(|r| masked[r * 8].is_nan()));
}

#[test]
fn test_downsampled_statistics_exclude_nodata() {
    let grid = parse_elevation("norfolk.tif", norfolk_dem()).unwrap();
    let down = grid.downsample(3).unwrap();

    assert_eq!((down.rows(), down.cols()), (4, 3));
    // Column 0 survives subsampling and is all nodata
    assert!((0..4).all(|r| down.get(r, 0).is_none()));

    let stats = down.statistics().unwrap();
    assert_eq!(stats.nodata_cells, 4);
    assert_eq!(stats.min, 3.0);
    assert_eq!(stats.max, 96.0);
}

#[test]
fn test_stride_composition_matches_single_pass() {
    let bounds = GeoBounds {
        min_lat: 36.0,
        max_lat: 37.0,
        min_lon: -77.0,
        max_lon: -76.0,
    };
    for (rows, cols) in [(17, 23), (30, 30), (1, 9), (12, 5)] {
        let values = (0..rows * cols).map(|v| v as f64).collect();
        let grid = ElevationGrid::new(rows, cols, values, bounds, None).unwrap();

        for (a, b) in [(2, 3), (3, 2), (4, 4), (1, 5), (5, 1)] {
            let twice = grid.downsample(a).unwrap().downsample(b).unwrap();
            let once = grid.downsample(a * b).unwrap();
            assert_eq!(twice, once, "{rows}x{cols} with strides {a} then {b}");
            assert_eq!(once.rows(), rows.div_ceil(a * b));
            assert_eq!(once.cols(), cols.div_ceil(a * b));
        }
    }
}

#[test]
fn test_multi_band_rejected() {
    let mut buf = Cursor::new(Vec::new());
    TiffEncoder::new(&mut buf)
        .unwrap()
        .write_image::<colortype::RGB8>(2, 2, &[0u8; 12])
        .unwrap();

    let err = parse_elevation("rgb.tif", buf.into_inner()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataUnavailable);
    assert!(err.to_string().contains("single band"));
}

#[test]
fn test_missing_georeferencing_rejected() {
    let mut buf = Cursor::new(Vec::new());
    TiffEncoder::new(&mut buf)
        .unwrap()
        .write_image::<colortype::Gray32Float>(2, 2, &[1.0f32; 4])
        .unwrap();

    let err = parse_elevation("plain.tif", buf.into_inner()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DataUnavailable);
}

#[test]
fn test_raster_without_nodata_tag() {
    let bytes = common::geotiff_bytes(2, 2, &[1.0, 2.0, 3.0, 4.0], 37.0, -76.0, 0.5, None);
    let grid = parse_elevation("clean.tif", bytes).unwrap();
    assert_eq!(grid.nodata(), None);
    assert_relative_eq!(grid.statistics().unwrap().mean, 2.5);
}

#[test]
fn test_load_from_file() {
    let dir = common::scratch_dir("raster");
    let path = dir.join("norfolk.tif");
    std::fs::write(&path, norfolk_dem()).unwrap();

    let grid = load_elevation(&DataSource::from(path), &FetchOptions::default()).unwrap();
    assert_eq!(grid.rows(), 12);

    let missing = load_elevation(
        &DataSource::from(dir.join("absent.tif")),
        &FetchOptions::default(),
    )
    .unwrap_err();
    assert_eq!(missing.kind(), ErrorKind::DataUnavailable);
}

/// Little-endian baseline TIFF header with one IFD declaring a 4 x 0
/// single-band `f32` image; the encoder refuses to write such a file
fn zero_height_tiff() -> Vec<u8> {
    // (tag, type, value); type 3 is SHORT, 4 is LONG
    let entries: [(u16, u16, u32); 10] = [
        (256, 3, 4),  // ImageWidth
        (257, 3, 0),  // ImageLength
        (258, 3, 32), // BitsPerSample
        (259, 3, 1),  // Compression: none
        (262, 3, 1),  // PhotometricInterpretation: black is zero
        (273, 4, 8),  // StripOffsets
        (277, 3, 1),  // SamplesPerPixel
        (278, 4, 1),  // RowsPerStrip
        (279, 4, 0),  // StripByteCounts
        (339, 3, 3),  // SampleFormat: IEEE float
    ];

    let mut bytes = b"II*\0".to_vec();
    bytes.extend_from_slice(&8u32.to_le_bytes());
    bytes.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (tag, kind, value) in entries {
        bytes.extend_from_slice(&tag.to_le_bytes());
        bytes.extend_from_slice(&kind.to_le_bytes());
        bytes.extend_from_slice(&1u32.to_le_bytes());
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes
}

#[test]
fn test_zero_height_file_is_shape_mismatch() {
    let err = parse_elevation("zero.tif", zero_height_tiff()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShapeMismatch, "{err}");

    let dir = common::scratch_dir("raster-zero");
    let path = dir.join("zero.tif");
    std::fs::write(&path, zero_height_tiff()).unwrap();
    let err = load_elevation(&DataSource::from(path), &FetchOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
}

#[test]
fn test_inexact_f32_sentinels_masked() {
    for (tag, sentinel) in [("-9999.9", -9999.9f32), ("-3.40282346639e+038", f32::MIN)] {
        let bytes =
            common::geotiff_bytes(2, 2, &[sentinel, 1.0, 2.0, 3.0], 37.0, -76.0, 0.5, Some(tag));
        let grid = parse_elevation("sentinel.tif", bytes).unwrap();

        assert_eq!(grid.nodata(), Some(f64::from(sentinel)), "tag {tag}");
        assert_eq!(grid.get(0, 0), None, "tag {tag}");

        let stats = grid.statistics().unwrap();
        assert_eq!(stats.valid_cells, 3, "tag {tag}");
        assert_eq!(stats.nodata_cells, 1, "tag {tag}");
        assert_eq!(stats.min, 1.0, "tag {tag}");
        assert_relative_eq!(stats.mean, 2.0);

        let down = grid.downsample(2).unwrap();
        assert!(down.statistics().is_none(), "tag {tag}");
    }
}

#[test]
fn test_zero_rows_never_downsampled() {
    let bounds = GeoBounds {
        min_lat: 0.0,
        max_lat: 1.0,
        min_lon: 0.0,
        max_lon: 1.0,
    };
    let result = ElevationGrid::new(0, 10, Vec::new(), bounds, Some(-9999.0));
    let err = result.as_ref().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    assert!(result.and_then(|grid| grid.downsample(2)).is_err());
}
