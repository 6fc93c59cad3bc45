//! Image optimization pipeline
//!
//! Turns an uploaded raster into the artifacts the rest of the system
//! serves: a tiled multi-resolution GeoTIFF, a JPEG thumbnail and a PNG map
//! overlay, plus the raster's metadata and WGS84 footprint.

use std::path::{Path, PathBuf};

use geoscout_cog::{build_preview, build_tiled_output, OverviewLevel, PreviewImage};
use geoscout_core::geo::GeographicExtent;
use geoscout_core::io::TiffFormat;
use geoscout_core::{Compression, CoordinateMapper, RasterHandle, RasterMetadata};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::config::ProcessingConfig;
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStatus {
    Uploaded,
    Processing,
    Optimized,
    Failed,
}

/// Outcome of [`optimize_image`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizeReport {
    pub input: PathBuf,
    pub status: ImageStatus,
    /// Size of the input file in bytes
    pub file_size: u64,
    pub metadata: Option<RasterMetadata>,
    pub extent: Option<GeographicExtent>,
    pub cog_path: Option<PathBuf>,
    pub thumbnail_path: Option<PathBuf>,
    pub overlay_path: Option<PathBuf>,
    pub compression: Option<Compression>,
    /// Classic TIFF or BigTIFF, as written
    pub format: Option<TiffFormat>,
    pub overviews: Vec<OverviewLevel>,
    pub processing_error: Option<String>,
    pub warnings: Vec<String>,
}

impl OptimizeReport {
    fn new(input: &Path) -> Self {
        Self {
            input: input.to_path_buf(),
            status: ImageStatus::Uploaded,
            file_size: 0,
            metadata: None,
            extent: None,
            cog_path: None,
            thumbnail_path: None,
            overlay_path: None,
            compression: None,
            format: None,
            overviews: Vec::new(),
            processing_error: None,
            warnings: Vec::new(),
        }
    }
}

/// Names of the artifacts written for `input`.
pub fn artifact_names(input: &Path) -> (String, String, String) {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    (
        format!("cog_{}.tif", stem),
        format!("thumb_{}.jpg", stem),
        format!("overlay_{}.png", stem),
    )
}

/// Optimize the raster at `input` into `out_dir`.
///
/// The report's status is `Optimized` once the tiled output exists, even if
/// a preview could not be made; any earlier failure leaves it `Failed` with
/// `processing_error` set and no tiled output on disk.
pub fn optimize_image(input: impl AsRef<Path>, out_dir: impl AsRef<Path>, config: &ProcessingConfig) -> OptimizeReport {
    let input = input.as_ref();
    let mut report = OptimizeReport::new(input);
    report.status = ImageStatus::Processing;

    match run(input, out_dir.as_ref(), config, &mut report) {
        Ok(()) => {
            report.status = ImageStatus::Optimized;
            info!(input = %input.display(), warnings = report.warnings.len(), "image optimized");
        }
        Err(e) => {
            error!(input = %input.display(), error = %e, "optimization failed");
            report.status = ImageStatus::Failed;
            report.processing_error = Some(e.to_string());
        }
    }
    report
}

fn run(input: &Path, out_dir: &Path, config: &ProcessingConfig, report: &mut OptimizeReport) -> Result<()> {
    config.validate()?;
    report.file_size = std::fs::metadata(input)?.len();
    std::fs::create_dir_all(out_dir)?;

    let handle = RasterHandle::open(input)?;
    let result = write_artifacts(&handle, input, out_dir, config, report);
    handle.close();
    result
}

fn write_artifacts(
    handle: &RasterHandle,
    input: &Path,
    out_dir: &Path,
    config: &ProcessingConfig,
    report: &mut OptimizeReport,
) -> Result<()> {
    report.metadata = Some(handle.metadata());
    let mapper = CoordinateMapper::new(handle);
    if mapper.is_degraded() {
        report
            .warnings
            .push("raster has no usable CRS; footprint is in raw transform units".to_string());
    }
    report.extent = Some(mapper.geographic_extent().clone());

    let (cog_name, thumb_name, overlay_name) = artifact_names(input);
    let output = build_tiled_output(handle, out_dir.join(cog_name), &config.optimize)?;
    report.compression = Some(output.compression);
    report.overviews = output.overviews;
    report.format = Some(output.format);

    // Previews read the new file so downsampling is served by its overviews.
    let cog = RasterHandle::open(&output.path)?;
    report.cog_path = Some(output.path);
    let thumb = build_preview(&cog, &config.thumbnail, None);
    report.thumbnail_path = save_preview(thumb, out_dir.join(thumb_name), config.thumbnail_quality, &mut report.warnings);
    let overlay = build_preview(&cog, &config.overlay, None);
    report.overlay_path = save_preview(overlay, out_dir.join(overlay_name), config.thumbnail_quality, &mut report.warnings);
    cog.close();
    Ok(())
}

fn save_preview(image: Option<PreviewImage>, path: PathBuf, quality: u8, warnings: &mut Vec<String>) -> Option<PathBuf> {
    let Some(image) = image else {
        warnings.push(format!("preview {} not created", path.display()));
        return None;
    };
    match image.save(&path, quality) {
        Ok(()) => Some(path),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "preview not saved");
            warnings.push(format!("preview {} not saved: {}", path.display(), e));
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_names() {
        let (cog, thumb, overlay) = artifact_names(Path::new("/data/uploads/scene_042.tif"));
        assert_eq!(cog, "cog_scene_042.tif");
        assert_eq!(thumb, "thumb_scene_042.jpg");
        assert_eq!(overlay, "overlay_scene_042.png");
    }

    #[test]
    fn test_missing_input_fails() {
        let dir = tempfile::tempdir().unwrap();
        let report = optimize_image(dir.path().join("missing.tif"), dir.path(), &ProcessingConfig::default());
        assert_eq!(report.status, ImageStatus::Failed);
        assert!(report.processing_error.is_some());
        assert!(report.cog_path.is_none());
    }
}
