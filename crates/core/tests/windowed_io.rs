//! Integration tests for windowed reads and the tiled writer.
//!
//! Fixtures are generated on the fly: tiled files with our own writer, and
//! stripped files with the `tiff` crate so the reader is exercised against
//! an independent encoder.

use std::fs::File;

use approx::assert_relative_eq;
use geoscout_core::io::{write_geotiff, Compression, ImageSpec, TiffWriter, WriteOptions};
use geoscout_core::{Error, GeoTransform, PixelType, RasterHandle, Window, CRS};
use ndarray::Array2;
use tiff::decoder::{Decoder, DecodingResult};
use tiff::encoder::{colortype, compression, TiffEncoder};

fn ramp(rows: usize, cols: usize) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(r, c)| ((r * 7 + c * 3) % 256) as f64)
}

fn utm_transform() -> GeoTransform {
    GeoTransform::new(450_000.0, 4_430_000.0, 10.0, -10.0)
}

#[test]
fn test_tiff_crate_decodes_our_output() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ours.tif");
    let band = ramp(100, 130);
    let opts = WriteOptions {
        tile_size: 64,
        ..Default::default()
    };
    write_geotiff(&path, &[band.clone()], utm_transform(), &opts).unwrap();

    let mut decoder = Decoder::new(File::open(&path).unwrap()).unwrap();
    assert_eq!(decoder.dimensions().unwrap(), (130, 100));
    match decoder.read_image().unwrap() {
        DecodingResult::U8(pixels) => {
            assert_eq!(pixels.len(), 130 * 100);
            for (i, &v) in pixels.iter().enumerate() {
                assert_eq!(v as f64, band[(i / 130, i % 130)]);
            }
        }
        _ => panic!("expected 8-bit samples"),
    }
}

#[test]
fn test_reads_lzw_stripped_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strips.tif");
    let (w, h) = (300u32, 200u32);
    let data: Vec<u16> = (0..w * h).map(|i| (i % 4000) as u16).collect();
    {
        let mut file = File::create(&path).unwrap();
        let mut encoder = TiffEncoder::new(&mut file).unwrap();
        encoder
            .write_image_with_compression::<colortype::Gray16, _>(w, h, compression::Lzw, &data)
            .unwrap();
    }

    let handle = RasterHandle::open(&path).unwrap();
    assert_eq!(handle.pixel_type(), PixelType::Uint16);
    assert_eq!((handle.width(), handle.height(), handle.band_count()), (300, 200, 1));
    assert!(!handle.metadata().tiled);

    // spans several strips, including the last
    let block = handle.read_window(&Window::new(250, 150, 50, 50), 1).unwrap();
    for r in 0..50 {
        for c in 0..50 {
            let idx = (150 + r) * 300 + 250 + c;
            assert_eq!(block.data()[(r, c)], data[idx] as f64);
        }
    }
}

#[test]
fn test_partial_window_is_clipped() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.tif");
    let band = ramp(80, 80);
    write_geotiff(&path, &[band.clone()], utm_transform(), &WriteOptions { tile_size: 32, ..Default::default() }).unwrap();

    let handle = RasterHandle::open(&path).unwrap();
    let block = handle.read_window(&Window::new(60, -10, 40, 30), 1).unwrap();
    assert_eq!(block.shape(), (20, 20));
    assert_eq!(block.data()[(0, 0)], band[(0, 60)]);

    let err = handle.read_window(&Window::new(80, 0, 10, 10), 1).unwrap_err();
    assert!(matches!(err, Error::Read(_)));
    assert!(!err.is_fatal());
}

#[test]
fn test_full_windows_have_exact_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sizes.tif");
    write_geotiff(&path, &[ramp(97, 61)], utm_transform(), &WriteOptions { tile_size: 16, ..Default::default() }).unwrap();

    let handle = RasterHandle::open(&path).unwrap();
    for &(x, y, w, h) in &[(0, 0, 61, 97), (5, 7, 1, 1), (16, 16, 16, 16), (45, 80, 16, 17)] {
        let block = handle.read_window(&Window::new(x, y, w, h), 1).unwrap();
        assert_eq!(block.data().len(), w * h);
    }
}

#[test]
fn test_resampled_read_averages_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("avg.tif");
    let band = Array2::from_shape_fn((64, 64), |(r, c)| if (r / 2 + c / 2) % 2 == 0 { 0.0 } else { 200.0 });
    let band = band.mapv(|v| v + 10.0);
    write_geotiff(&path, &[band], utm_transform(), &WriteOptions { tile_size: 32, ..Default::default() }).unwrap();

    let handle = RasterHandle::open(&path).unwrap();
    let small = handle.read_window_resampled(&Window::full(64, 64), 1, 16, 16).unwrap();
    assert_eq!(small.shape(), (16, 16));
    // every 4x4 block holds two 2x2 cells of each value
    for &v in small.data().iter() {
        assert_relative_eq!(v, 110.0, epsilon = 1e-9);
    }
    assert_relative_eq!(small.transform().pixel_width, 40.0);
}

/// Main image filled with 10, one half-size overview filled with 200, so a
/// read reveals which level served it.
fn write_marked_pyramid(path: &std::path::Path) {
    let base = ImageSpec {
        width: 64,
        height: 64,
        bands: 1,
        pixel_type: PixelType::Uint8,
        tile_size: 32,
        compression: Compression::Deflate,
        quality: 90,
        transform: utm_transform(),
        crs: Some(CRS::from_epsg(32630)),
        nodata: None,
        overview: false,
    };
    let overview = ImageSpec {
        width: 32,
        height: 32,
        transform: utm_transform().scaled(2.0, 2.0),
        overview: true,
        ..base.clone()
    };
    let mut writer = TiffWriter::create(path).unwrap();
    let main = writer.add_image(base).unwrap();
    let ovr = writer.add_image(overview).unwrap();
    for ty in 0..2 {
        for tx in 0..2 {
            writer.write_tile(main, tx, ty, &[10.0; 32 * 32]).unwrap();
        }
    }
    writer.write_tile(ovr, 0, 0, &[200.0; 32 * 32]).unwrap();
    writer.finish().unwrap();
}

#[test]
fn test_resampled_read_uses_overview() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("pyramid.tif");
    write_marked_pyramid(&path);

    let handle = RasterHandle::open(&path).unwrap();
    assert_eq!(handle.overview_sizes(), &[(32, 32)][..]);

    // at or below the overview's resolution: served from the overview
    let half = handle.read_window_resampled(&Window::full(64, 64), 1, 32, 32).unwrap();
    assert!(half.data().iter().all(|&v| v == 200.0));
    let quarter = handle.read_window_resampled(&Window::new(16, 8, 32, 40), 1, 8, 10).unwrap();
    assert!(quarter.data().iter().all(|&v| v == 200.0));
    assert_relative_eq!(quarter.transform().origin_x, 450_160.0);
    assert_relative_eq!(quarter.transform().pixel_width, 40.0);

    // finer than the overview: full resolution
    let fine = handle.read_window_resampled(&Window::full(64, 64), 1, 48, 48).unwrap();
    assert!(fine.data().iter().all(|&v| v == 10.0));
    let exact = handle.read_window(&Window::full(64, 64), 1).unwrap();
    assert!(exact.data().iter().all(|&v| v == 10.0));
}

#[test]
fn test_upsampled_constant_stays_exact() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("const.tif");
    let opts = WriteOptions {
        pixel_type: PixelType::Float64,
        tile_size: 16,
        ..Default::default()
    };
    write_geotiff(&path, &[Array2::from_elem((7, 9), 0.1)], utm_transform(), &opts).unwrap();

    let handle = RasterHandle::open(&path).unwrap();
    let big = handle.read_window_resampled(&Window::full(9, 7), 1, 400, 311).unwrap();
    assert!(big.data().iter().all(|&v| v == 0.1));
}

#[test]
fn test_jpeg_three_band_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rgb.tif");
    let flat = |v: f64| Array2::from_elem((48, 48), v);
    let opts = WriteOptions {
        compression: Compression::Jpeg,
        tile_size: 16,
        quality: 95,
        crs: Some(CRS::from_epsg(32630)),
        ..Default::default()
    };
    write_geotiff(&path, &[flat(200.0), flat(60.0), flat(40.0)], utm_transform(), &opts).unwrap();

    let handle = RasterHandle::open(&path).unwrap();
    assert_eq!(handle.metadata().compression, "jpeg");
    for (band, expected) in [(1, 200.0), (2, 60.0), (3, 40.0)] {
        let block = handle.read_window(&Window::new(8, 8, 24, 24), band).unwrap();
        for &v in block.data().iter() {
            assert!((v - expected).abs() <= 4.0, "band {} got {}", band, v);
        }
    }
}

#[test]
fn test_close_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("close.tif");
    write_geotiff(&path, &[ramp(32, 32)], utm_transform(), &WriteOptions { tile_size: 16, ..Default::default() }).unwrap();

    let handle = RasterHandle::open(&path).unwrap();
    assert!(handle.read_window(&Window::new(100, 100, 4, 4), 1).is_err());
    handle.close();
    handle.close();
    assert!(handle.is_closed());
    assert!(matches!(handle.read_window(&Window::full(4, 4), 1), Err(Error::Read(_))));
}

#[test]
fn test_metadata_report() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("meta.tif");
    let opts = WriteOptions {
        pixel_type: PixelType::Float32,
        tile_size: 32,
        crs: Some(CRS::from_epsg(32630)),
        nodata: Some(-1.0),
        ..Default::default()
    };
    write_geotiff(&path, &[ramp(40, 50), ramp(40, 50)], utm_transform(), &opts).unwrap();

    let meta = RasterHandle::open(&path).unwrap().metadata();
    assert_eq!((meta.width, meta.height, meta.bands), (50, 40, 2));
    assert_eq!(meta.dtype, "float32");
    assert_eq!(meta.crs.as_deref(), Some("EPSG:32630"));
    assert_eq!(meta.bounds, (450_000.0, 4_429_600.0, 450_500.0, 4_430_000.0));
    assert_eq!(meta.resolution, (10.0, 10.0));
    assert_eq!(meta.nodata, Some(-1.0));
    assert_eq!(meta.overview_count, 0);
}
