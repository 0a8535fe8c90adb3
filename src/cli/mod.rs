//! Command-line interface for the clear-cut clustering pipeline.

use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::core::dates::decode_date_code;
use crate::PipelineConfig;

#[derive(Parser)]
#[command(name = "clearcut-clusters")]
#[command(about = "Group dated clear-cut detections into clear-cut events", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Cluster a detection raster into filtered clear-cut events
    Cluster {
        /// Input raster (.asc or .tif) of YYDDD date codes
        input: PathBuf,
        /// Output GeoJSON file
        output: PathBuf,
        /// Also write the attribute table as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Separate mask raster (non-zero = observed)
        #[arg(long)]
        mask: Option<PathBuf>,
        /// CRS to use when the raster carries none (EPSG:<code> or WKT)
        #[arg(long)]
        crs: Option<String>,
        /// Maximum gap in meters between detections of one event
        #[arg(long)]
        max_meters: Option<f64>,
        /// Maximum number of days between detections of one event
        #[arg(long)]
        max_days: Option<i64>,
        /// Minimum event area in hectares
        #[arg(long)]
        min_area_ha: Option<f64>,
        /// Concave hull edge-length ratio in (0, 1]
        #[arg(long)]
        hull_ratio: Option<f64>,
        /// Minimum area / concave hull area score
        #[arg(long)]
        score_threshold: Option<f64>,
    },

    /// Polygonize a detection raster into dated polygons without clustering
    Polygonize {
        /// Input raster (.asc or .tif) of YYDDD date codes
        input: PathBuf,
        /// Output GeoJSON file
        output: PathBuf,
        /// Separate mask raster (non-zero = observed)
        #[arg(long)]
        mask: Option<PathBuf>,
        /// CRS to use when the raster carries none (EPSG:<code> or WKT)
        #[arg(long)]
        crs: Option<String>,
    },

    /// Decode a YYDDD date code
    DecodeDate {
        /// Date code, e.g. 19032
        #[arg(allow_hyphen_values = true)]
        code: i64,
    },

    /// Write the default configuration as YAML
    InitConfig {
        /// Destination file
        path: PathBuf,
    },
}

/// Create a spinner for indeterminate operations
fn create_spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<60} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 37 {
            format!("{}...", value.chars().take(34).collect::<String>())
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<37} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

fn fail(what: &str, e: impl std::fmt::Display) -> ! {
    error!("{} failed: {:#}", what, e);
    std::process::exit(1);
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    // Thresholds change results, so a broken config file is fatal
    let config = match &cli.config {
        Some(path) => match PipelineConfig::from_yaml(path) {
            Ok(cfg) => {
                info!("Loaded config from: {}", path.display());
                cfg
            }
            Err(e) => fail(&format!("Loading config {}", path.display()), e),
        },
        None => PipelineConfig::default(),
    };

    match cli.command {
        Commands::Cluster {
            input,
            output,
            csv,
            mask,
            crs,
            max_meters,
            max_days,
            min_area_ha,
            hull_ratio,
            score_threshold,
        } => {
            let mut config = config;
            override_raster(&mut config, mask, crs);
            let c = &mut config.clustering;
            c.max_meters_between_clear_cuts = max_meters.unwrap_or(c.max_meters_between_clear_cuts);
            c.max_days_between_clear_cuts = max_days.unwrap_or(c.max_days_between_clear_cuts);
            let f = &mut config.filtering;
            f.min_clear_cut_area_hectare = min_area_ha.unwrap_or(f.min_clear_cut_area_hectare);
            f.concave_hull_ratio = hull_ratio.unwrap_or(f.concave_hull_ratio);
            f.concave_hull_score_threshold =
                score_threshold.unwrap_or(f.concave_hull_score_threshold);

            cmd_cluster(&input, &output, csv.as_deref(), &config);
        }
        Commands::Polygonize { input, output, mask, crs } => {
            let mut config = config;
            override_raster(&mut config, mask, crs);
            cmd_polygonize(&input, &output, &config);
        }
        Commands::DecodeDate { code } => cmd_decode_date(code),
        Commands::InitConfig { path } => cmd_init_config(&path, &config),
    }
}

fn override_raster(config: &mut PipelineConfig, mask: Option<PathBuf>, crs: Option<String>) {
    if mask.is_some() {
        config.raster.mask_path = mask;
    }
    if crs.is_some() {
        config.raster.crs = crs;
    }
}

fn cmd_cluster(input: &Path, output: &Path, csv: Option<&Path>, config: &PipelineConfig) {
    use crate::processors::clustering;

    if let Err(e) = config.validate() {
        fail("Configuration check", e);
    }

    let start = Instant::now();
    let c = &config.clustering;
    let f = &config.filtering;

    println!("Clustering clear-cut detections...");
    println!("Input: {}", input.display());
    println!("Output: {}", output.display());
    println!("Parameters:");
    println!("  max_meters_between_clear_cuts: {}", c.max_meters_between_clear_cuts);
    println!("  max_days_between_clear_cuts: {}", c.max_days_between_clear_cuts);
    println!("  min_clear_cut_area_hectare: {}", f.min_clear_cut_area_hectare);
    println!("  concave_hull_ratio: {}", f.concave_hull_ratio);
    println!("  concave_hull_score_threshold: {}", f.concave_hull_score_threshold);

    let spinner = create_spinner("Polygonizing, pairing and dissolving...");

    match clustering::process_raster(input, output, csv, config) {
        Ok(report) => {
            spinner.finish_and_clear();

            let mut items = vec![
                ("Input raster", input.display().to_string()),
                ("Output GeoJSON", output.display().to_string()),
            ];
            if let Some(csv) = csv {
                items.push(("Output CSV", csv.display().to_string()));
            }
            items.extend([
                ("Raw polygons", report.raw_polygons.to_string()),
                ("Candidate pairs", report.candidate_pairs.to_string()),
                ("Clusters formed", report.clusters.to_string()),
                ("Dropped by shape", report.dropped_by_shape.to_string()),
                ("Indeterminate shape", report.indeterminate_shape.to_string()),
                ("Dropped by area", report.dropped_by_area.to_string()),
                ("Clusters kept", report.survivors.to_string()),
                ("Duration", format!("{:.2?}", start.elapsed())),
            ]);
            print_summary("Clustering Complete", &items);
        }
        Err(e) => {
            spinner.finish_and_clear();
            fail("Clustering", e);
        }
    }
}

fn cmd_polygonize(input: &Path, output: &Path, config: &PipelineConfig) {
    use crate::processors::polygonize;

    let start = Instant::now();

    println!("Polygonizing detection raster...");
    println!("Input: {}", input.display());
    println!("Output: {}", output.display());

    let spinner = create_spinner("Tracing 8-connected regions...");

    match polygonize::polygonize_raster(input, output, &config.raster) {
        Ok(count) => {
            spinner.finish_and_clear();
            print_summary(
                "Polygonize Complete",
                &[
                    ("Input raster", input.display().to_string()),
                    ("Output GeoJSON", output.display().to_string()),
                    ("Polygons", count.to_string()),
                    ("Duration", format!("{:.2?}", start.elapsed())),
                ],
            );
        }
        Err(e) => {
            spinner.finish_and_clear();
            fail("Polygonize", e);
        }
    }
}

fn cmd_decode_date(code: i64) {
    match decode_date_code(code) {
        Ok(date) => println!("{} -> {}", code, date.format("%Y-%m-%d")),
        Err(e) => fail("Decoding", e),
    }
}

fn cmd_init_config(path: &Path, config: &PipelineConfig) {
    match config.to_yaml(path) {
        Ok(()) => println!("Wrote configuration to {}", path.display()),
        Err(e) => fail("Writing config", e),
    }
}
