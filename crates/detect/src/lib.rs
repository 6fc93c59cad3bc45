//! # Geoscout Detect
//!
//! Windowed threat detection over large georeferenced rasters, and the
//! analysis runs built on it.
//!
//! This crate provides:
//! - `DetectionEngine`: tile scan, spatial dedup and geolocation for any
//!   [`Detector`]
//! - Fire, structural damage and vehicle concentration detectors
//! - `AnalysisCoordinator`: ordered detector plans per analysis type, with a
//!   summary and an append-only audit log
//! - `optimize_image`: tiled output plus previews for an uploaded raster
//!
//! ```no_run
//! use geoscout_detect::{AnalysisCoordinator, MemoryAuditLog, ProcessingConfig};
//!
//! let coordinator = AnalysisCoordinator::new(ProcessingConfig::default());
//! let mut log = MemoryAuditLog::new();
//! let run = coordinator.run("scene.tif", "threat_detection", &mut log);
//! println!("{}", run.summary);
//! ```

pub mod audit;
pub mod config;
pub mod coordinator;
pub mod dedup;
pub mod detectors;
pub mod engine;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod stats;
pub mod summary;

pub use audit::{AuditLog, LogEntry, LogLevel, MemoryAuditLog, TracingAuditLog};
pub use config::ProcessingConfig;
pub use coordinator::{AnalysisCoordinator, AnalysisRun, AnalysisType, DetectorOutcome, RunStatus};
pub use dedup::{DedupIndex, DedupKey};
pub use detectors::{DamageDetector, DamageParams, DetectorKind, FireDetector, FireParams, VehicleDetector, VehicleParams};
pub use engine::{Candidate, DetectionEngine, Detector, DetectorReport, Located, ScanContext, ScanState};
pub use error::{DetectError, Result, TileError};
pub use model::{DetailValue, Detection, PixelCoord, Severity, TechnicalDetails, ThreatType};
pub use pipeline::{optimize_image, ImageStatus, OptimizeReport};
pub use stats::RunStats;
pub use summary::{mean_confidence, summarize};
