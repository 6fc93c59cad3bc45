//! Analysis coordination
//!
//! An [`AnalysisCoordinator`] opens a raster once, computes the run-wide
//! band statistics once, and runs the detectors planned for the requested
//! analysis type in order. Each detector's failure is logged and absorbed;
//! the run only fails when it cannot produce any output at all.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Instant;

use chrono::{DateTime, Utc};
use geoscout_core::{CoordinateMapper, RasterHandle};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::audit::{AuditLog, LogEntry, LogLevel};
use crate::config::ProcessingConfig;
use crate::detectors::{DamageDetector, DetectorKind, FireDetector, VehicleDetector};
use crate::engine::{DetectionEngine, DetectorReport};
use crate::error::{DetectError, Result};
use crate::model::Detection;
use crate::stats::RunStats;
use crate::summary::{mean_confidence, summarize};

/// Analysis types known by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    ThreatDetection,
    ObjectRecognition,
    ChangeDetection,
    TerrainAnalysis,
}

impl AnalysisType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisType::ThreatDetection => "threat_detection",
            AnalysisType::ObjectRecognition => "object_recognition",
            AnalysisType::ChangeDetection => "change_detection",
            AnalysisType::TerrainAnalysis => "terrain_analysis",
        }
    }

    /// Detectors run for this type, in order. Empty when the type has no
    /// detector plan.
    pub fn plan(&self) -> &'static [DetectorKind] {
        match self {
            AnalysisType::ThreatDetection => &[DetectorKind::Fire, DetectorKind::Damage, DetectorKind::Vehicle],
            AnalysisType::ObjectRecognition => &[DetectorKind::Vehicle],
            AnalysisType::ChangeDetection | AnalysisType::TerrainAnalysis => &[],
        }
    }
}

impl FromStr for AnalysisType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "threat_detection" => Ok(AnalysisType::ThreatDetection),
            "object_recognition" => Ok(AnalysisType::ObjectRecognition),
            "change_detection" => Ok(AnalysisType::ChangeDetection),
            "terrain_analysis" => Ok(AnalysisType::TerrainAnalysis),
            other => Err(format!("unknown analysis type '{}'", other)),
        }
    }
}

impl fmt::Display for AnalysisType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed)
    }
}

/// How one detector of a run went.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorOutcome {
    pub detector: String,
    /// Tiling and threshold parameters the detector ran with
    pub parameters: Value,
    pub detections: usize,
    pub tiles_scanned: usize,
    pub failed_tiles: usize,
    pub duplicates: usize,
    pub rejected: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DetectorOutcome {
    fn from_report(report: &DetectorReport, parameters: Value) -> Self {
        Self {
            detector: report.detector.to_string(),
            parameters,
            detections: report.detections.len(),
            tiles_scanned: report.tiles_scanned,
            failed_tiles: report.tile_errors.len(),
            duplicates: report.duplicates,
            rejected: report.rejected,
            skipped: report.skipped.clone(),
            error: None,
        }
    }

    fn failed(detector: &str, parameters: Value, error: &DetectError) -> Self {
        Self {
            detector: detector.to_string(),
            parameters,
            detections: 0,
            tiles_scanned: 0,
            failed_tiles: 0,
            duplicates: 0,
            rejected: 0,
            skipped: None,
            error: Some(error.to_string()),
        }
    }
}

/// Record of one analysis invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub analysis_type: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Seconds between start and completion
    pub processing_time: Option<f64>,
    pub detections: Vec<Detection>,
    pub threat_count: usize,
    pub confidence_score: f64,
    pub summary: String,
    pub error_message: Option<String>,
    pub detectors: Vec<DetectorOutcome>,
    pub raw_data: Value,
}

impl AnalysisRun {
    pub fn new(analysis_type: &str) -> Self {
        Self {
            analysis_type: analysis_type.to_string(),
            status: RunStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            processing_time: None,
            detections: Vec::new(),
            threat_count: 0,
            confidence_score: 0.0,
            summary: String::new(),
            error_message: None,
            detectors: Vec::new(),
            raw_data: Value::Null,
        }
    }

    fn start(&mut self) {
        self.status = RunStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    fn finish(&mut self, status: RunStatus, started: Instant) {
        self.status = status;
        self.completed_at = Some(Utc::now());
        self.processing_time = Some(started.elapsed().as_secs_f64());
    }

    fn complete(&mut self, detections: Vec<Detection>, started: Instant) {
        self.summary = summarize(&detections);
        self.confidence_score = mean_confidence(&detections);
        self.threat_count = detections.len();
        self.raw_data = json!({ "detections": detections });
        self.detections = detections;
        self.finish(RunStatus::Completed, started);
    }

    fn fail(&mut self, error: &DetectError, started: Instant) {
        self.error_message = Some(error.to_string());
        self.finish(RunStatus::Failed, started);
    }
}

/// Sequences detectors over one raster per call.
#[derive(Debug, Clone, Default)]
pub struct AnalysisCoordinator {
    config: ProcessingConfig,
}

impl AnalysisCoordinator {
    pub fn new(config: ProcessingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessingConfig {
        &self.config
    }

    /// Analyse the raster at `path`. The returned run always has a
    /// terminal status.
    pub fn run(&self, path: impl AsRef<Path>, analysis_type: &str, log: &mut dyn AuditLog) -> AnalysisRun {
        let path = path.as_ref();
        let mut run = AnalysisRun::new(analysis_type);
        let started = Instant::now();
        run.start();
        log.record(
            LogEntry::new(LogLevel::Info, "Analysis started")
                .with("analysis_type", analysis_type)
                .with("path", path.display().to_string()),
        );

        match self.execute(path, analysis_type, &mut run, log) {
            Ok(detections) => {
                if !detections.is_empty() {
                    log.info(&format!("Created {} threat detections", detections.len()));
                }
                let count = detections.len();
                run.complete(detections, started);
                log.record(
                    LogEntry::new(
                        LogLevel::Info,
                        format!("Analysis completed successfully. Found {} threats.", count),
                    )
                    .with("confidence_score", run.confidence_score)
                    .with("processing_time", run.processing_time.unwrap_or_default()),
                );
            }
            Err(e) => {
                run.fail(&e, started);
                log.error(&format!("Analysis failed: {}", e));
            }
        }
        run
    }

    fn execute(
        &self,
        path: &Path,
        analysis_type: &str,
        run: &mut AnalysisRun,
        log: &mut dyn AuditLog,
    ) -> Result<Vec<Detection>> {
        let handle = RasterHandle::open(path)?;
        let result = self.detect(&handle, analysis_type, run, log);
        handle.close();
        result
    }

    fn detect(
        &self,
        handle: &RasterHandle,
        analysis_type: &str,
        run: &mut AnalysisRun,
        log: &mut dyn AuditLog,
    ) -> Result<Vec<Detection>> {
        let plan = match analysis_type.parse::<AnalysisType>() {
            Ok(t) => t.plan(),
            Err(_) => &[],
        };
        if plan.is_empty() {
            log.warning(&format!("Unknown analysis type: {}", analysis_type));
            return Ok(Vec::new());
        }

        let mapper = CoordinateMapper::new(handle);
        if mapper.is_degraded() {
            log.record(
                LogEntry::new(
                    LogLevel::Warning,
                    "Raster is not georeferenced in a known CRS; locations use raw pixel transform",
                )
                .with("crs", handle.crs().map(|c| c.identifier()).unwrap_or_default()),
            );
        }
        let stats = RunStats::sample(handle, self.config.stats_sample_side)?;
        let engine = DetectionEngine::new(handle, &mapper, &stats).with_mode(self.config.mode);

        let mut detections = Vec::new();
        let mut failures = Vec::new();
        for &kind in plan {
            log.info(kind.announcement());
            let (parameters, result) = self.run_detector(&engine, kind);
            match result {
                Ok(mut report) => {
                    info!(detector = report.detector, found = report.detections.len(), "detector finished");
                    if !report.tile_errors.is_empty() {
                        log.record(
                            LogEntry::new(
                                LogLevel::Warning,
                                format!("{} tile(s) skipped by {}", report.tile_errors.len(), report.detector),
                            )
                            .with("first_error", report.tile_errors[0].to_string()),
                        );
                    }
                    run.detectors.push(DetectorOutcome::from_report(&report, parameters));
                    detections.append(&mut report.detections);
                }
                Err(e) => {
                    warn!(detector = kind.name(), error = %e, "detector failed");
                    log.error(&format!("{} detection failed: {}", kind.name(), e));
                    run.detectors.push(DetectorOutcome::failed(kind.name(), parameters, &e));
                    failures.push(e);
                }
            }
        }

        if failures.len() == plan.len() {
            if let Some(e) = failures.pop() {
                return Err(e);
            }
        }
        Ok(detections)
    }

    fn run_detector(&self, engine: &DetectionEngine, kind: DetectorKind) -> (Value, Result<DetectorReport>) {
        let c = &self.config;
        match kind {
            DetectorKind::Fire => (
                serde_json::to_value(&c.fire).unwrap_or(Value::Null),
                engine.run(&FireDetector::new(c.fire.clone())),
            ),
            DetectorKind::Damage => (
                serde_json::to_value(&c.damage).unwrap_or(Value::Null),
                engine.run(&DamageDetector::new(c.damage.clone())),
            ),
            DetectorKind::Vehicle => (
                serde_json::to_value(&c.vehicle).unwrap_or(Value::Null),
                engine.run(&VehicleDetector::new(c.vehicle.clone())),
            ),
        }
    }
}
