//! Bandstack CLI - inspection of multi-band rasters and their spectral metadata

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use bandstack_core::prelude::*;
use bandstack_parallel::{BlockData, ProcessingMode, TiledProcessor};

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "bandstack")]
#[command(author, version, about = "Tiled reads and spectral metadata for multi-band rasters", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show size, georeferencing and per-band metadata of a raster
    Info {
        /// Input raster file
        input: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find the band closest to a wavelength
    Wavelength {
        /// Input raster file
        input: PathBuf,
        /// Target wavelength
        target: f64,
        /// Units of the target: nm, um, mm, m
        #[arg(short, long, default_value = "nm")]
        units: String,
    },
    /// Blockwise per-band statistics over valid pixels
    Stats {
        /// Input raster file
        input: PathBuf,
        /// Bands to process (1-based, comma separated), all by default
        #[arg(short, long, value_delimiter = ',')]
        bands: Option<Vec<usize>>,
        /// Block size in pixels
        #[arg(long, default_value = "256")]
        block: usize,
        /// No-data value for bands that declare none
        #[arg(long)]
        default_no_data: Option<f64>,
        /// Worker threads (default: all cores)
        #[arg(short, long)]
        threads: Option<usize>,
    },
}

// ─── Reports ────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct InfoReport {
    file: String,
    width: usize,
    height: usize,
    band_count: usize,
    crs: Option<String>,
    extent: GeoExtent,
    pixel_size: (f64, f64),
    bands: Vec<BandInfo>,
}

#[derive(Serialize)]
struct BandInfo {
    band: usize,
    name: Option<String>,
    data_type: DataType,
    no_data: Option<f64>,
    wavelength_nm: Option<f64>,
    fwhm_nm: Option<f64>,
    bad_band_multiplier: u8,
}

#[derive(Debug, Clone, Copy, Default)]
struct BandStats {
    valid: usize,
    min: f64,
    max: f64,
    sum: f64,
}

impl BandStats {
    fn add(&mut self, value: f64) {
        if self.valid == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.valid += 1;
        self.sum += value;
    }

    fn merge(&mut self, other: &BandStats) {
        if other.valid == 0 {
            return;
        }
        if self.valid == 0 {
            *self = *other;
            return;
        }
        self.valid += other.valid;
        self.min = self.min.min(other.min);
        self.max = self.max.max(other.max);
        self.sum += other.sum;
    }

    fn mean(&self) -> Option<f64> {
        (self.valid > 0).then(|| self.sum / self.valid as f64)
    }
}

/// Progress bar driven by block completion
struct ProgressFeedback {
    bar: ProgressBar,
    cancel: CancelToken,
}

impl Feedback for ProgressFeedback {
    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    fn set_progress(&self, done: usize, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_position(done as u64);
    }
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install the log subscriber")
}

fn progress_bar(msg: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{msg} [{bar:40.green}] {pos}/{len} blocks ({eta})")
            .context("Invalid progress template")?,
    );
    pb.set_message(msg.to_string());
    Ok(pb)
}

fn open_reader(path: &Path) -> Result<RasterReader> {
    let reader = RasterReader::open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    info!(
        "Input: {} x {}, {} band(s)",
        reader.width(),
        reader.height(),
        reader.band_count()
    );
    Ok(reader)
}

fn parse_units(units: &str) -> Result<WavelengthUnits> {
    units.parse::<WavelengthUnits>().map_err(|e| anyhow!(e))
}

fn fmt_opt(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v))
}

fn band_info(reader: &mut RasterReader, band: usize) -> Result<BandInfo> {
    let nm = Some(WavelengthUnits::Nanometers);
    let source = reader.source_mut();
    Ok(BandInfo {
        band,
        name: source.band_name(band)?,
        data_type: source.data_type(band)?,
        no_data: source.no_data_value(band)?,
        wavelength_nm: source.wavelength(band, nm)?,
        fwhm_nm: source.fwhm(band, nm)?,
        bad_band_multiplier: source.bad_band_multiplier(band)?,
    })
}

fn block_stats(data: &BlockData) -> Vec<BandStats> {
    let (row, col) = data.inner_offset();
    data.arrays
        .iter()
        .zip(&data.masks)
        .map(|(array, mask)| {
            let mut stats = BandStats::default();
            for r in 0..data.block.height {
                for c in 0..data.block.width {
                    if mask[[r + row, c + col]] {
                        if let Some(v) = array.get_f64(r + row, c + col) {
                            stats.add(v);
                        }
                    }
                }
            }
            stats
        })
        .collect()
}

// ─── Commands ───────────────────────────────────────────────────────────

fn info_command(input: &Path, json: bool) -> Result<()> {
    let mut reader = open_reader(input)?;
    let bands = (1..=reader.band_count())
        .map(|band| band_info(&mut reader, band))
        .collect::<Result<Vec<_>>>()?;
    let report = InfoReport {
        file: input.display().to_string(),
        width: reader.width(),
        height: reader.height(),
        band_count: reader.band_count(),
        crs: reader.crs().map(|c| c.to_string()),
        extent: reader.extent(),
        pixel_size: reader.pixel_size(),
        bands,
    };
    for issue in reader.source().metadata_issues() {
        info!("Metadata problem: {}", issue);
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to encode report")?
        );
        return Ok(());
    }

    println!("File: {}", report.file);
    println!(
        "Dimensions: {} x {} ({} bands)",
        report.width, report.height, report.band_count
    );
    println!("Pixel size: {} x {}", report.pixel_size.0, report.pixel_size.1);
    println!("Extent: {}", report.extent);
    println!("CRS: {}", report.crs.as_deref().unwrap_or("undefined"));
    println!("\nBands:");
    for b in &report.bands {
        println!(
            "  {:>4} {:<8} nodata={:<10} wl={:<10} fwhm={:<10} bbl={} {}",
            b.band,
            b.data_type.to_string(),
            fmt_opt(b.no_data),
            fmt_opt(b.wavelength_nm),
            fmt_opt(b.fwhm_nm),
            b.bad_band_multiplier,
            b.name.as_deref().unwrap_or("")
        );
    }
    Ok(())
}

fn wavelength_command(input: &Path, target: f64, units: &str) -> Result<()> {
    let units = parse_units(units)?;
    let mut reader = open_reader(input)?;
    let source = reader.source_mut();
    match source
        .find_wavelength(target, Some(units))
        .context("Failed to resolve wavelengths")?
    {
        Some(band) => {
            let wl = source.wavelength(band, Some(units))?;
            println!("Band {}: {} {}", band, fmt_opt(wl), units);
        }
        None => println!("No band carries wavelength metadata"),
    }
    Ok(())
}

fn stats_command(
    input: &Path,
    bands: Option<Vec<usize>>,
    block: usize,
    default_no_data: Option<f64>,
    threads: Option<usize>,
) -> Result<()> {
    let start = Instant::now();
    let bar = progress_bar("Computing statistics")?;
    let feedback = Arc::new(ProgressFeedback {
        bar: bar.clone(),
        cancel: CancelToken::new(),
    });
    let processor = TiledProcessor::new(block, block)
        .with_mode(ProcessingMode::from_threads(threads))
        .with_default_no_data(default_no_data)
        .with_feedback(feedback);

    let band_list = match &bands {
        Some(b) => b.clone(),
        None => (1..=open_reader(input)?.band_count()).collect(),
    };
    let results = processor
        .process(
            || RasterReader::open(input),
            Some(band_list.as_slice()),
            block_stats,
        )
        .context("Failed to compute statistics")?;
    bar.finish_and_clear();

    let mut totals = vec![BandStats::default(); band_list.len()];
    for (_, block) in &results {
        for (total, stats) in totals.iter_mut().zip(block) {
            total.merge(stats);
        }
    }

    println!("{:>6} {:>12} {:>14} {:>14} {:>14}", "band", "valid", "min", "max", "mean");
    for (band, stats) in band_list.iter().zip(&totals) {
        let (min, max) = if stats.valid > 0 {
            (Some(stats.min), Some(stats.max))
        } else {
            (None, None)
        };
        println!(
            "{:>6} {:>12} {:>14} {:>14} {:>14}",
            band,
            stats.valid,
            fmt_opt(min),
            fmt_opt(max),
            fmt_opt(stats.mean())
        );
    }
    println!("  Processing time: {:.2?} ({} blocks)", start.elapsed(), results.len());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Info { input, json } => info_command(&input, json),
        Commands::Wavelength {
            input,
            target,
            units,
        } => wavelength_command(&input, target, &units),
        Commands::Stats {
            input,
            bands,
            block,
            default_no_data,
            threads,
        } => stats_command(&input, bands, block, default_no_data, threads),
    }
}
