//! End-to-end detection scenarios on synthetic GeoTIFFs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use approx::assert_relative_eq;
use geoscout_core::io::{write_geotiff, WriteOptions};
use geoscout_core::{CoordinateMapper, GeoTransform, PixelType, RasterHandle, CRS};
use geoscout_detect::{
    AnalysisCoordinator, DetectError, DetectionEngine, FireDetector, FireParams, LogLevel, MemoryAuditLog,
    RunStats, RunStatus, Severity, ThreatType,
};
use geoscout_detect::summary::NO_THREATS;
use geoscout_parallel::ProcessingMode;
use ndarray::Array2;

fn utm_transform() -> GeoTransform {
    GeoTransform::new(450_000.0, 4_430_000.0, 10.0, -10.0)
}

fn write_utm(path: &Path, bands: &[Array2<f64>]) {
    let opts = WriteOptions {
        pixel_type: PixelType::Uint8,
        tile_size: 128,
        crs: Some(CRS::from_epsg(32630)),
        ..Default::default()
    };
    write_geotiff(path, bands, utm_transform(), &opts).unwrap();
}

/// Three bands at 100 with `squares` of R=200, G=50, B=50, given as
/// (top row, left col, side).
fn fire_scene(size: usize, squares: &[(usize, usize, usize)]) -> Vec<Array2<f64>> {
    let inside = |r: usize, c: usize| {
        squares
            .iter()
            .any(|&(r0, c0, s)| (r0..r0 + s).contains(&r) && (c0..c0 + s).contains(&c))
    };
    [200.0, 50.0, 50.0]
        .iter()
        .map(|&hot| Array2::from_shape_fn((size, size), |(r, c)| if inside(r, c) { hot } else { 100.0 }))
        .collect()
}

fn scene_file(dir: &Path, name: &str, bands: &[Array2<f64>]) -> PathBuf {
    let path = dir.join(name);
    write_utm(&path, bands);
    path
}

fn messages(log: &MemoryAuditLog) -> Vec<&str> {
    log.entries().iter().map(|e| e.message.as_str()).collect()
}

#[test]
fn test_single_fire_square() {
    let dir = tempfile::tempdir().unwrap();
    let path = scene_file(dir.path(), "fire.tif", &fire_scene(512, &[(100, 150, 150)]));

    let mut log = MemoryAuditLog::new();
    let run = AnalysisCoordinator::default().run(&path, "threat_detection", &mut log);

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.threat_count, 1);
    let fire = &run.detections[0];
    assert_eq!(fire.threat_type, ThreatType::Fire);
    assert_eq!(fire.severity, Severity::Critical);
    assert!(fire.confidence > 0.8);
    assert_relative_eq!(fire.confidence, 0.84, epsilon = 1e-3);
    let area = fire.area_pixels.unwrap();
    assert!((22_000..=22_500).contains(&area), "area {}", area);
    assert!((fire.pixel_coordinates.x - 224).abs() <= 1);
    assert!((fire.pixel_coordinates.y - 174).abs() <= 1);
    assert!(!fire.location_degraded);
    assert!(CoordinateMapper::new(&RasterHandle::open(&path).unwrap()).validate(&fire.location));

    assert_relative_eq!(run.confidence_score, fire.confidence);
    assert!(run.summary.starts_with("Analysis identified 1 potential threat(s):"));
    assert!(run.summary.contains("  • Fire/Explosion Signatures: 1"));
    assert_eq!(run.raw_data["detections"].as_array().map(Vec::len), Some(1));
    assert_eq!(run.raw_data["detections"][0]["threat_type"], "fire");

    assert_eq!(
        messages(&log),
        vec![
            "Analysis started",
            "Running fire and explosion detection",
            "Running structural damage detection",
            "Running vehicle concentration detection",
            "Created 1 threat detections",
            "Analysis completed successfully. Found 1 threats.",
        ]
    );
    assert!(run.completed_at >= run.started_at);
}

#[test]
fn test_object_recognition_runs_vehicle_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = scene_file(dir.path(), "fire.tif", &fire_scene(512, &[(100, 150, 150)]));

    let mut log = MemoryAuditLog::new();
    let run = AnalysisCoordinator::default().run(&path, "object_recognition", &mut log);

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.threat_count, 0);
    assert_eq!(run.detectors.len(), 1);
    assert_eq!(run.detectors[0].detector, "vehicle_convoy");
    assert_eq!(
        messages(&log),
        vec![
            "Analysis started",
            "Running vehicle concentration detection",
            "Analysis completed successfully. Found 0 threats.",
        ]
    );
}

#[test]
fn test_all_zero_raster_is_empty_not_failed() {
    let dir = tempfile::tempdir().unwrap();
    let zeros = vec![Array2::zeros((256, 256)); 3];
    let path = scene_file(dir.path(), "zeros.tif", &zeros);

    let mut log = MemoryAuditLog::new();
    let run = AnalysisCoordinator::default().run(&path, "threat_detection", &mut log);

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.detections.is_empty());
    assert_eq!(run.confidence_score, 0.0);
    assert_eq!(run.summary, NO_THREATS);
    assert_eq!(run.detectors.len(), 3);
    assert!(run.detectors.iter().all(|d| d.skipped.is_some() && d.tiles_scanned == 0));
    assert_eq!(log.at_level(LogLevel::Error).count(), 0);
}

#[test]
fn test_unknown_analysis_type_warns_once() {
    let dir = tempfile::tempdir().unwrap();
    let path = scene_file(dir.path(), "fire.tif", &fire_scene(128, &[]));

    let mut log = MemoryAuditLog::new();
    let run = AnalysisCoordinator::default().run(&path, "terrain_analysis", &mut log);

    assert_eq!(run.status, RunStatus::Completed);
    assert!(run.detections.is_empty());
    let warnings: Vec<_> = log.at_level(LogLevel::Warning).collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].message, "Unknown analysis type: terrain_analysis");
}

#[test]
fn test_utm_footprint_validates() {
    let dir = tempfile::tempdir().unwrap();
    let path = scene_file(dir.path(), "fire.tif", &fire_scene(512, &[]));
    let handle = RasterHandle::open(&path).unwrap();
    let mapper = CoordinateMapper::new(&handle);
    assert!(!mapper.is_degraded());

    let extent = mapper.geographic_extent();
    // UTM zone 30N, around 3.6 W 40 N
    assert!(extent.bounds.west > -6.0 && extent.bounds.east < 0.0);
    assert!(extent.bounds.south > 39.0 && extent.bounds.north < 41.0);
    assert_eq!(extent.polygon.len(), 5);
    assert_eq!(extent.polygon.first(), extent.polygon.last());
    for vertex in &extent.polygon {
        assert!(mapper.validate(vertex));
    }
    assert!(mapper.validate(&extent.center));

    for (x, y) in [(0.0, 0.0), (511.0, 0.0), (0.0, 511.0), (511.0, 511.0), (255.5, 255.5)] {
        let geo = mapper.pixel_to_geo(x, y);
        assert!(!geo.degraded);
        assert!(mapper.validate(&geo.point));
    }
    // 50 km off the footprint
    assert!(!mapper.validate(&mapper.pixel_to_geo(-5000.0, -5000.0).point));
}

#[test]
fn test_vehicle_formation() {
    let dir = tempfile::tempdir().unwrap();
    let mut band = Array2::from_shape_fn((512, 512), |(r, c)| 40.0 + (r + c) as f64 * 0.05);
    // 30 bright 6x6 targets on a 40-pixel grid, aligned to the 2x downsample
    for i in 0..5 {
        for j in 0..6 {
            let (r0, c0) = (40 + 40 * i, 40 + 40 * j);
            for r in r0..r0 + 6 {
                for c in c0..c0 + 6 {
                    band[(r, c)] = 250.0;
                }
            }
        }
    }
    let path = scene_file(dir.path(), "convoy.tif", &[band]);

    let mut log = MemoryAuditLog::new();
    let run = AnalysisCoordinator::default().run(&path, "threat_detection", &mut log);

    assert_eq!(run.status, RunStatus::Completed);
    assert_eq!(run.threat_count, 1, "{:?}", run.detections);
    let convoy = &run.detections[0];
    assert_eq!(convoy.threat_type, ThreatType::VehicleConvoy);
    assert_eq!(convoy.vehicle_count, Some(30));
    assert_eq!(convoy.severity, Severity::Critical);
    assert_relative_eq!(convoy.confidence, 0.9);
    assert!(convoy.area_pixels.is_none());

    // grid centre: rows 40..206, cols 40..246
    assert!((convoy.pixel_coordinates.x - 142).abs() <= 1);
    assert!((convoy.pixel_coordinates.y - 122).abs() <= 1);

    // fire needs three bands
    let fire = run.detectors.iter().find(|d| d.detector == "fire").unwrap();
    assert!(fire.skipped.is_some());
}

/// Next value of a fixed 64-bit LCG, top bits only.
fn lcg(state: &mut u64) -> u64 {
    *state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1_442_695_040_888_963_407);
    *state >> 33
}

/// 512x512 texture of 30..70 with `count` bright 5x5 targets scattered over
/// rows and cols 100..400, kept apart so no two touch.
fn scattered_targets(seed: u64, count: usize) -> Array2<f64> {
    let mut state = seed;
    let mut band = Array2::from_shape_fn((512, 512), |_| 30.0 + (lcg(&mut state) % 40) as f64);
    let mut placed: Vec<(usize, usize)> = Vec::new();
    while placed.len() < count {
        let r0 = 100 + (lcg(&mut state) % 295) as usize;
        let c0 = 100 + (lcg(&mut state) % 295) as usize;
        if placed.iter().any(|&(r, c)| r.abs_diff(r0) < 10 && c.abs_diff(c0) < 10) {
            continue;
        }
        placed.push((r0, c0));
        for r in r0..r0 + 5 {
            for c in c0..c0 + 5 {
                band[(r, c)] = 250.0;
            }
        }
    }
    band
}

#[test]
fn test_scattered_targets_on_texture() {
    let dir = tempfile::tempdir().unwrap();
    for seed in [1, 2, 3, 4, 5] {
        let path = scene_file(dir.path(), &format!("scatter_{}.tif", seed), &[scattered_targets(seed, 30)]);

        let mut log = MemoryAuditLog::new();
        let run = AnalysisCoordinator::default().run(&path, "object_recognition", &mut log);
        assert_eq!(run.status, RunStatus::Completed);

        let counts: Vec<u32> = run.detections.iter().filter_map(|d| d.vehicle_count).collect();
        assert!(!counts.is_empty(), "seed {}: no convoy", seed);
        assert!(counts.iter().any(|&n| n >= 5));
        // texture never adds vehicles
        let total: u32 = counts.iter().sum();
        assert!(total <= 30, "seed {}: {} vehicles for 30 targets", seed, total);
        assert!(total >= 25, "seed {}: only {} of 30 targets", seed, total);
    }
}

fn fire_detections(path: &Path, params: FireParams, mode: ProcessingMode) -> Vec<(i64, i64)> {
    let handle = RasterHandle::open(path).unwrap();
    let mapper = CoordinateMapper::new(&handle);
    let stats = RunStats::sample(&handle, 1024).unwrap();
    let report = DetectionEngine::new(&handle, &mapper, &stats)
        .with_mode(mode)
        .run(&FireDetector::new(params))
        .unwrap();
    assert!(report.tile_errors.is_empty());
    report
        .detections
        .iter()
        .map(|d| (d.pixel_coordinates.x, d.pixel_coordinates.y))
        .collect()
}

#[test]
fn test_overlapping_tiles_never_duplicate() {
    let dir = tempfile::tempdir().unwrap();
    // the second square straddles the tile edge at 128
    let squares = [(20, 20, 40), (110, 110, 40), (200, 250, 40), (300, 40, 40)];
    let path = scene_file(dir.path(), "fires.tif", &fire_scene(384, &squares));

    let full = fire_detections(&path, FireParams::default(), ProcessingMode::Sequential);
    let tiled_params = FireParams {
        tile_size: 128,
        overlap: 48,
        ..FireParams::default()
    };
    let tiled = fire_detections(&path, tiled_params.clone(), ProcessingMode::Parallel);

    assert_eq!(full.len(), 4);
    assert!(tiled.len() <= full.len());
    assert_eq!(tiled.len(), 4);

    let buckets: HashSet<(i64, i64)> = tiled.iter().map(|&(x, y)| (x / 100, y / 100)).collect();
    assert_eq!(buckets.len(), tiled.len());

    // deterministic regardless of execution mode
    let sequential = fire_detections(&path, tiled_params, ProcessingMode::Sequential);
    assert_eq!(sequential, tiled);
}

#[test]
fn test_closed_handle_fails_every_tile() {
    let dir = tempfile::tempdir().unwrap();
    let path = scene_file(dir.path(), "fire.tif", &fire_scene(256, &[(40, 40, 60)]));
    let handle = RasterHandle::open(&path).unwrap();
    let mapper = CoordinateMapper::new(&handle);
    let stats = RunStats::sample(&handle, 1024).unwrap();
    handle.close();

    let params = FireParams {
        tile_size: 128,
        overlap: 16,
        ..FireParams::default()
    };
    let err = DetectionEngine::new(&handle, &mapper, &stats)
        .run(&FireDetector::new(params))
        .unwrap_err();
    match err {
        DetectError::AllTilesFailed { detector, tiles, .. } => {
            assert_eq!(detector, "fire");
            assert_eq!(tiles, 4);
        }
        other => panic!("unexpected {:?}", other),
    }
}
