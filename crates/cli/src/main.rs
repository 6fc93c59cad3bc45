//! geoscout CLI - satellite imagery optimization and threat analysis

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use geoscout_cog::{build_preview, BandMapping, PreviewOptions};
use geoscout_core::{Compression, CoordinateMapper, RasterHandle};
use geoscout_detect::{
    optimize_image, AnalysisCoordinator, ImageStatus, MemoryAuditLog, ProcessingConfig, RunStatus,
};
use geoscout_parallel::ProcessingMode;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "geoscout")]
#[command(author, version, about = "Satellite imagery optimization and threat analysis", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show metadata and WGS84 bounds of a raster file
    Info {
        /// Input raster file
        input: PathBuf,
    },
    /// Write a tiled multi-resolution GeoTIFF plus thumbnail and overlay
    Optimize {
        /// Input raster file
        input: PathBuf,
        /// Output directory
        out_dir: PathBuf,
        /// Compression: none, lzw, deflate, jpeg
        #[arg(short, long)]
        compression: Option<Compression>,
        /// JPEG quality (1-100)
        #[arg(short, long)]
        quality: Option<u8>,
        /// Overview factors, e.g. 2,4,8,16
        #[arg(short, long, value_delimiter = ',')]
        overviews: Option<Vec<usize>>,
        /// Internal tile size in pixels (multiple of 16)
        #[arg(short, long)]
        block_size: Option<usize>,
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Render a percentile-stretched RGB preview
    Preview {
        /// Input raster file
        input: PathBuf,
        /// Output image (.png, .jpg)
        output: PathBuf,
        /// Longest side of the preview
        #[arg(short, long, default_value = "400")]
        max_size: usize,
        /// Bands mapped to red, green, blue, e.g. 4,3,2
        #[arg(short, long, value_delimiter = ',')]
        bands: Option<Vec<usize>>,
        /// JPEG quality (1-100)
        #[arg(short, long, default_value = "85")]
        quality: u8,
    },
    /// Run threat analysis on a raster
    Analyze {
        /// Input raster file
        input: PathBuf,
        /// Analysis type: threat_detection, object_recognition, ...
        #[arg(short = 't', long = "type", default_value = "threat_detection")]
        analysis_type: String,
        /// Write detections as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
        /// Scan tiles on the current thread only
        #[arg(long)]
        sequential: bool,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set default subscriber")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn load_config(path: Option<&Path>) -> Result<ProcessingConfig> {
    match path {
        Some(p) => ProcessingConfig::from_json_file(p)
            .with_context(|| format!("Failed to load configuration {}", p.display())),
        None => Ok(ProcessingConfig::default()),
    }
}

fn parse_bands(bands: &[usize]) -> Result<BandMapping> {
    match *bands {
        [b] => Ok(BandMapping([b, b, b])),
        [r, g, b] => Ok(BandMapping([r, g, b])),
        _ => bail!("Expected 1 or 3 bands, got {}", bands.len()),
    }
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

// ─── Commands ───────────────────────────────────────────────────────────

fn info_command(input: &Path) -> Result<()> {
    let handle = RasterHandle::open(input).context("Failed to open raster")?;
    let meta = handle.metadata();
    let mapper = CoordinateMapper::new(&handle);
    let extent = mapper.geographic_extent();

    println!("File: {}", input.display());
    println!("Dimensions: {} x {} x {} ({})", meta.width, meta.height, meta.bands, meta.dtype);
    println!("Resolution: {} x {}", meta.resolution.0, meta.resolution.1);
    println!(
        "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
        meta.bounds.0, meta.bounds.1, meta.bounds.2, meta.bounds.3
    );
    println!("CRS: {}", meta.crs.as_deref().unwrap_or("none"));
    if let Some(nodata) = meta.nodata {
        println!("NoData: {}", nodata);
    }
    println!(
        "Layout: {} {}x{}, compression {}, {} overview(s)",
        if meta.tiled { "tiled" } else { "striped" },
        meta.block_size.0,
        meta.block_size.1,
        meta.compression,
        meta.overview_count
    );
    println!(
        "WGS84 bounds: W {:.6} S {:.6} E {:.6} N {:.6}{}",
        extent.bounds.west,
        extent.bounds.south,
        extent.bounds.east,
        extent.bounds.north,
        if mapper.is_degraded() { " (not reprojected)" } else { "" }
    );
    println!("Center: {:.6}, {:.6}", extent.center.longitude, extent.center.latitude);
    Ok(())
}

fn preview_command(input: &Path, output: &Path, max_size: usize, bands: Option<&[usize]>, quality: u8) -> Result<()> {
    let mapping = bands.map(parse_bands).transpose()?;
    let handle = RasterHandle::open(input).context("Failed to open raster")?;
    let options = PreviewOptions {
        max_width: max_size,
        max_height: max_size,
        allow_upscale: false,
    };

    let start = Instant::now();
    let pb = spinner("Rendering preview...");
    let preview = build_preview(&handle, &options, mapping);
    pb.finish_and_clear();
    let Some(preview) = preview else {
        bail!("No preview could be rendered from {}", input.display());
    };
    preview.save(output, quality).context("Failed to write preview")?;
    info!("Preview: {} x {}", preview.width, preview.height);
    done("Preview", output, start.elapsed());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input } => info_command(&input)?,

        Commands::Optimize {
            input,
            out_dir,
            compression,
            quality,
            overviews,
            block_size,
            config,
        } => {
            let mut config = load_config(config.as_deref())?;
            if let Some(c) = compression {
                config.optimize.compression = c;
            }
            if let Some(q) = quality {
                config.optimize.quality = q;
            }
            if let Some(levels) = overviews {
                config.optimize.overview_levels = levels;
            }
            if let Some(bs) = block_size {
                config.optimize.block_size = bs;
            }
            config.validate().context("Invalid optimize options")?;

            let start = Instant::now();
            let pb = spinner("Optimizing raster...");
            let report = optimize_image(&input, &out_dir, &config);
            pb.finish_and_clear();

            for warning in &report.warnings {
                eprintln!("warning: {}", warning);
            }
            if report.status == ImageStatus::Failed {
                bail!(
                    "Optimization failed: {}",
                    report.processing_error.as_deref().unwrap_or("unknown error")
                );
            }
            if let Some(path) = &report.cog_path {
                let compression = report.compression.map(|c| c.name()).unwrap_or("unknown");
                let factors: Vec<String> = report.overviews.iter().map(|o| o.factor.to_string()).collect();
                println!("Tiled output: {} ({}, overviews {})", path.display(), compression, factors.join(","));
            }
            for path in [&report.thumbnail_path, &report.overlay_path].into_iter().flatten() {
                println!("Preview: {}", path.display());
            }
            println!("  Processing time: {:.2?}", start.elapsed());
        }

        Commands::Preview {
            input,
            output,
            max_size,
            bands,
            quality,
        } => preview_command(&input, &output, max_size, bands.as_deref(), quality)?,

        Commands::Analyze {
            input,
            analysis_type,
            json,
            config,
            sequential,
        } => {
            let mut config = load_config(config.as_deref())?;
            if sequential {
                config.mode = ProcessingMode::Sequential;
            }

            let coordinator = AnalysisCoordinator::new(config);
            let mut log = MemoryAuditLog::new();
            let pb = spinner("Analyzing raster...");
            let run = coordinator.run(&input, &analysis_type, &mut log);
            pb.finish_and_clear();

            println!("Audit log:");
            for entry in log.entries() {
                println!(
                    "  {} [{}] {}",
                    entry.timestamp.format("%H:%M:%S%.3f"),
                    entry.level,
                    entry.message
                );
            }
            println!();

            if run.status == RunStatus::Failed {
                bail!("Analysis failed: {}", run.error_message.as_deref().unwrap_or("unknown error"));
            }
            println!("{}", run.summary);
            println!();
            println!(
                "Threats: {}  Mean confidence: {:.2}  Time: {:.2}s",
                run.threat_count,
                run.confidence_score,
                run.processing_time.unwrap_or_default()
            );

            if let Some(path) = json {
                let text = serde_json::to_string_pretty(&run.detections).context("Failed to serialize detections")?;
                std::fs::write(&path, text).with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Detections saved to: {}", path.display());
            }
        }
    }

    Ok(())
}
