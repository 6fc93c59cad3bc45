//! Threat detectors
//!
//! - **fire**: spectral fire index over overlapping tiles
//! - **damage**: Sobel edge density on sparse sample blocks
//! - **vehicle**: bright blob clusters on a capped set of sample blocks

mod damage;
mod fire;
mod vehicle;

pub use damage::{damage_severity, DamageDetector, DamageParams};
pub use fire::{fire_severity, FireDetector, FireParams};
pub use vehicle::{vehicle_severity, BlobHit, VehicleDetector, VehicleParams};

use serde::{Deserialize, Serialize};

/// The detectors an analysis can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Fire,
    Damage,
    Vehicle,
}

impl DetectorKind {
    /// Name the detector reports under.
    pub fn name(&self) -> &'static str {
        match self {
            DetectorKind::Fire => "fire",
            DetectorKind::Damage => "structural_damage",
            DetectorKind::Vehicle => "vehicle_convoy",
        }
    }

    /// Audit message announcing the detector.
    pub fn announcement(&self) -> &'static str {
        match self {
            DetectorKind::Fire => "Running fire and explosion detection",
            DetectorKind::Damage => "Running structural damage detection",
            DetectorKind::Vehicle => "Running vehicle concentration detection",
        }
    }
}
