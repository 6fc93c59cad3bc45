//! Processing configuration
//!
//! Every field has a default, so a JSON file only needs the values it
//! changes:
//!
//! ```json
//! {
//!   "optimize": { "compression": "deflate", "overview_levels": [2, 4] },
//!   "fire": { "tile_size": 1024, "overlap": 128 },
//!   "mode": "sequential"
//! }
//! ```

use std::path::Path;

use geoscout_cog::{OptimizeOptions, PreviewOptions};
use geoscout_parallel::ProcessingMode;
use serde::{Deserialize, Serialize};

use crate::detectors::{DamageParams, FireParams, VehicleParams};
use crate::error::{DetectError, Result};
use crate::stats::DEFAULT_SAMPLE_SIDE;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingConfig {
    pub optimize: OptimizeOptions,
    pub thumbnail: PreviewOptions,
    /// JPEG quality of the thumbnail
    pub thumbnail_quality: u8,
    pub overlay: PreviewOptions,
    pub fire: FireParams,
    pub damage: DamageParams,
    pub vehicle: VehicleParams,
    /// Longest side of the read used for run-wide band statistics
    pub stats_sample_side: usize,
    pub mode: ProcessingMode,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            optimize: OptimizeOptions::default(),
            thumbnail: PreviewOptions::thumbnail(),
            thumbnail_quality: 85,
            overlay: PreviewOptions::overlay(),
            fire: FireParams::default(),
            damage: DamageParams::default(),
            vehicle: VehicleParams::default(),
            stats_sample_side: DEFAULT_SAMPLE_SIDE,
            mode: ProcessingMode::default(),
        }
    }
}

fn require(ok: bool, what: &str) -> Result<()> {
    if ok {
        Ok(())
    } else {
        Err(DetectError::Config(what.to_string()))
    }
}

impl ProcessingConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.optimize.validate()?;
        require((1..=100).contains(&self.thumbnail_quality), "thumbnail_quality must be within 1..=100")?;
        for (name, preview) in [("thumbnail", &self.thumbnail), ("overlay", &self.overlay)] {
            if preview.max_width == 0 || preview.max_height == 0 {
                return Err(DetectError::Config(format!("{} size must be positive", name)));
            }
        }
        require(self.stats_sample_side > 0, "stats_sample_side must be positive")?;

        let f = &self.fire;
        require(f.tile_size > 0, "fire.tile_size must be positive")?;
        require(f.bucket_size > 0, "fire.bucket_size must be positive")?;
        require(
            f.opening_radius > 0 && f.closing_radius > 0,
            "fire morphology radii must be at least 1",
        )?;

        let d = &self.damage;
        require(d.block_size >= 3, "damage.block_size must be at least 3")?;
        require(d.stride > 0 && d.bucket_size > 0, "damage.stride and damage.bucket_size must be positive")?;

        let v = &self.vehicle;
        require(v.block_size > 0 && v.stride > 0, "vehicle.block_size and vehicle.stride must be positive")?;
        require(v.bucket_size > 0 && v.downsample > 0, "vehicle.bucket_size and vehicle.downsample must be positive")?;
        require(v.max_samples > 0, "vehicle.max_samples must be positive")?;
        require(
            v.min_blob_area <= v.max_blob_area,
            "vehicle.min_blob_area must not exceed vehicle.max_blob_area",
        )?;
        if let ProcessingMode::ParallelWith(0) = self.mode {
            return Err(DetectError::Config("mode.parallel_with needs at least one thread".into()));
        }
        Ok(())
    }
}
