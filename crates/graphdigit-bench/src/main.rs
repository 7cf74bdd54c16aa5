//! graphdigit-bench: CLI tool for curve extraction experiments and diagnostics.
//!
//! Runs the extraction pipeline on a graph image with configurable
//! parameters, printing detailed per-stage diagnostics. Useful for:
//!
//! - Comparing the legacy, enhanced, and auto-color pipelines
//! - Tuning `min_size`, bin width, and simplification tolerance
//! - Measuring per-stage durations to identify bottlenecks
//! - Checking which palette colors an image contains before extracting
//!
//! # Usage
//!
//! ```text
//! cargo run --release --bin graphdigit-bench -- extract [OPTIONS] <IMAGE_PATH>
//! cargo run --release --bin graphdigit-bench -- detect [OPTIONS] <IMAGE_PATH>
//! ```
//!
//! Log output goes to stderr and is filtered by `RUST_LOG` (default `warn`).

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};
use graphdigit_export::{SvgMetadata, SvgOptions};
use graphdigit_pipeline::{
    AxisConfig, ColorBand, ExtractionConfig, ExtractionDiagnostics, ExtractionRequest,
    ExtractionResult, Point,
};
use tracing_subscriber::EnvFilter;

/// Curve extraction experiments and diagnostics for graphdigit.
#[derive(Parser)]
#[command(name = "graphdigit-bench", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract curves and print per-stage diagnostics.
    Extract(ExtractArgs),
    /// Report which palette colors are present in an image.
    Detect(DetectArgs),
}

#[derive(Args)]
#[allow(clippy::struct_excessive_bools)]
struct ExtractArgs {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// Pipeline variant.
    #[arg(long, value_enum, default_value_t = Mode::Legacy)]
    mode: Mode,

    /// Colors to extract, comma-separated (e.g. `red,blue`).
    #[arg(long, value_delimiter = ',')]
    colors: Vec<String>,

    /// Data value at the left edge of the plot.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    x_min: f64,

    /// Data value at the right edge of the plot.
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    x_max: f64,

    /// Logarithmic x axis.
    #[arg(long)]
    x_log: bool,

    /// Multiplier applied to mapped x values.
    #[arg(long, default_value_t = 1.0)]
    x_scale: f64,

    /// Data value at the bottom edge of the plot.
    #[arg(long, default_value_t = 0.0, allow_negative_numbers = true)]
    y_min: f64,

    /// Data value at the top edge of the plot.
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    y_max: f64,

    /// Logarithmic y axis.
    #[arg(long)]
    y_log: bool,

    /// Multiplier applied to mapped y values.
    #[arg(long, default_value_t = 1.0)]
    y_scale: f64,

    /// Minimum connected-component size in pixels.
    #[arg(long, default_value_t = 1000, allow_negative_numbers = true)]
    min_size: i64,

    /// Bin width in pixels.
    #[arg(long, default_value_t = 5, allow_negative_numbers = true)]
    bin_size: i64,

    /// Detect the plot frame and restrict extraction to it.
    #[arg(long)]
    plot_area: bool,

    /// Suppress legend and label regions.
    #[arg(long)]
    annotation_mask: bool,

    /// Drop mask pixels without edge support.
    #[arg(long)]
    edge_denoise: bool,

    /// Vary bin width with local curve density.
    #[arg(long)]
    adaptive_binning: bool,

    /// Simplify the smoothed curve (RDP).
    #[arg(long)]
    simplify: bool,

    /// RDP tolerance in pixels.
    #[arg(long)]
    simplify_tolerance: Option<f64>,

    /// Upper bound on discovered colors (auto-color mode).
    #[arg(long)]
    max_clusters: Option<usize>,

    /// Foreground pixels sampled for clustering (auto-color mode).
    #[arg(long)]
    sample_size: Option<usize>,

    /// Plot corners TL, TR, BR, BL as eight comma-separated pixel
    /// coordinates (`x,y,x,y,...`).
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    calibration: Option<Vec<f64>>,

    /// Write the preview overlay PNG to file.
    #[arg(long)]
    preview: Option<PathBuf>,

    /// Write all curves as a long-form CSV to file.
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Write an SVG plot of the curves to file.
    #[arg(long)]
    svg: Option<PathBuf>,

    /// Number of runs for averaging.
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..)
    )]
    runs: usize,

    /// Output the full result as JSON instead of the diagnostics report.
    #[arg(long)]
    json: bool,

    /// Extraction request JSON file.
    ///
    /// When provided, all other extraction flags are ignored.
    #[arg(long, conflicts_with = "config_json")]
    config: Option<PathBuf>,

    /// Extraction request as a JSON string.
    ///
    /// When provided, all other extraction flags are ignored.
    #[arg(long)]
    config_json: Option<String>,
}

#[derive(Args)]
struct DetectArgs {
    /// Path to the input image (PNG, JPEG, BMP, WebP).
    image_path: PathBuf,

    /// JSON file with a list of color bands replacing the default palette.
    #[arg(long)]
    palette: Option<PathBuf>,

    /// Output detections as JSON.
    #[arg(long)]
    json: bool,
}

/// Pipeline variant selection.
#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// Fixed HSV masks, 3x3 closing, uniform bins.
    Legacy,
    /// Legacy chain plus the optional stages selected by flags.
    Enhanced,
    /// Discover curve colors by clustering.
    AutoColor,
}

impl Mode {
    /// Name used by the request wire format.
    const fn wire_name(self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Enhanced => "enhanced",
            Self::AutoColor => "auto_color",
        }
    }
}

fn axis(min: f64, max: f64, log: bool, scale: f64) -> AxisConfig {
    let axis = if log {
        AxisConfig::log(min, max)
    } else {
        AxisConfig::linear(min, max)
    };
    axis.with_scale(scale)
}

fn calibration_from(values: &[f64]) -> Result<[Point; 4], String> {
    match *values {
        [x0, y0, x1, y1, x2, y2, x3, y3] => Ok([
            Point::new(x0, y0),
            Point::new(x1, y1),
            Point::new(x2, y2),
            Point::new(x3, y3),
        ]),
        _ => Err(format!(
            "--calibration takes 8 numbers (4 corners), got {}",
            values.len()
        )),
    }
}

/// Build an [`ExtractionRequest`] from CLI arguments.
///
/// If `--config` or `--config-json` is provided, the JSON is parsed
/// directly and all individual flags are ignored. Otherwise, a request
/// is assembled from the individual flags.
fn request_from_cli(args: &ExtractArgs) -> Result<ExtractionRequest, String> {
    if let Some(ref path) = args.config {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("Error reading {}: {e}", path.display()))?;
        return serde_json::from_str(&text)
            .map_err(|e| format!("Error parsing {}: {e}", path.display()));
    }
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }

    let calibration = args
        .calibration
        .as_deref()
        .map(calibration_from)
        .transpose()?;

    Ok(ExtractionRequest {
        mode: args.mode.wire_name().to_string(),
        selected_colors: args.colors.clone(),
        x_axis: axis(args.x_min, args.x_max, args.x_log, args.x_scale),
        y_axis: axis(args.y_min, args.y_max, args.y_log, args.y_scale),
        min_size: args.min_size,
        bin_size: args.bin_size,
        use_plot_area: args.plot_area,
        use_annotation_mask: args.annotation_mask,
        use_edge_denoise: args.edge_denoise,
        use_adaptive_binning: args.adaptive_binning,
        simplify_curve: args.simplify,
        simplify_tolerance: args.simplify_tolerance,
        max_clusters: args.max_clusters,
        sample_size: args.sample_size,
        calibration,
        render_preview: args.preview.is_some(),
        ..ExtractionRequest::default()
    })
}

fn read_image(path: &Path) -> Result<Vec<u8>, String> {
    let bytes = std::fs::read(path).map_err(|e| format!("Error reading {}: {e}", path.display()))?;
    eprintln!("Image: {} ({} bytes)", path.display(), bytes.len());
    Ok(bytes)
}

fn write_output(kind: &str, path: &Path, contents: &[u8]) {
    match std::fs::write(path, contents) {
        Ok(()) => eprintln!(
            "{kind} written to {} ({} bytes)",
            path.display(),
            contents.len()
        ),
        Err(e) => eprintln!("Error writing {kind} to {}: {e}", path.display()),
    }
}

/// Write the preview, CSV, and SVG files requested on the command line.
fn write_outputs(args: &ExtractArgs, config: &ExtractionConfig, result: &ExtractionResult) {
    if let Some(ref path) = args.preview {
        match result.preview_image {
            Some(ref png) => write_output("Preview", path, png),
            None => eprintln!("No preview was rendered"),
        }
    }

    if let Some(ref path) = args.csv {
        match graphdigit_export::to_long_csv(&result.curves) {
            Ok(csv) => write_output("CSV", path, csv.as_bytes()),
            Err(e) => eprintln!("Error exporting CSV: {e}"),
        }
    }

    if let Some(ref path) = args.svg {
        let title = args
            .image_path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("bench");
        let desc = format!("mode: {}, colors: {:?}", config.mode.name(), config.selected_colors);
        let config_json = serde_json::to_string(config).ok();
        let metadata = SvgMetadata {
            title: Some(title),
            description: Some(&desc),
            config_json: config_json.as_deref(),
        };
        let options = SvgOptions {
            x_scale: config.x_axis.scale_type,
            y_scale: config.y_axis.scale_type,
            ..SvgOptions::default()
        };
        match graphdigit_export::to_svg(&result.curves, &options, &metadata) {
            Ok(svg) => write_output("SVG", path, svg.as_bytes()),
            Err(e) => eprintln!("Error exporting SVG: {e}"),
        }
    }
}

fn run_extract(args: &ExtractArgs) -> ExitCode {
    let mut config = match request_from_cli(args).and_then(|request| {
        ExtractionConfig::try_from(request).map_err(|e| format!("Invalid configuration: {e}"))
    }) {
        Ok(c) => c,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };
    if args.preview.is_some() {
        config.render_preview = true;
    }

    let image_bytes = match read_image(&args.image_path) {
        Ok(bytes) => bytes,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    tracing::debug!(?config, "extraction config");
    eprintln!("Mode: {}", config.mode.name());
    eprintln!("Runs: {}", args.runs);
    eprintln!();

    let mut all_diagnostics = Vec::with_capacity(args.runs);

    for run in 0..args.runs {
        if args.runs > 1 {
            eprintln!("--- Run {}/{} ---", run + 1, args.runs);
        }

        let result = match graphdigit_pipeline::extract(&image_bytes, &config) {
            Ok(result) => result,
            Err(e) => {
                eprintln!("Extraction error: {e}");
                return ExitCode::FAILURE;
            }
        };

        if args.json {
            match serde_json::to_string_pretty(&result) {
                Ok(json) => println!("{json}"),
                Err(e) => {
                    eprintln!("Error serializing result: {e}");
                    return ExitCode::FAILURE;
                }
            }
        } else {
            println!("{}", result.stats.report());
            for curve in &result.curves {
                let m = curve.metadata();
                println!(
                    "{:<12} {:>6} points  {:>8} px  window {:>3}  slope {:.4}",
                    curve.color(),
                    curve.point_count(),
                    m.source_pixel_count,
                    m.window_length,
                    m.average_slope,
                );
            }
        }
        for warning in &result.warnings {
            eprintln!("warning: {warning}");
        }

        // Write files on the first run only.
        if run == 0 {
            write_outputs(args, &config, &result);
        }

        all_diagnostics.push(result.stats);

        if args.runs > 1 {
            eprintln!();
        }
    }

    // Print summary when multiple runs.
    if args.runs > 1 {
        print_multi_run_summary(&all_diagnostics);
    }

    ExitCode::SUCCESS
}

fn run_detect(args: &DetectArgs) -> ExitCode {
    let palette: Option<Vec<ColorBand>> = match args.palette {
        None => None,
        Some(ref path) => match std::fs::read_to_string(path)
            .map_err(|e| e.to_string())
            .and_then(|text| serde_json::from_str(&text).map_err(|e| e.to_string()))
        {
            Ok(bands) => Some(bands),
            Err(e) => {
                eprintln!("Error loading palette {}: {e}", path.display());
                return ExitCode::FAILURE;
            }
        },
    };

    let image_bytes = match read_image(&args.image_path) {
        Ok(bytes) => bytes,
        Err(msg) => {
            eprintln!("{msg}");
            return ExitCode::FAILURE;
        }
    };

    let detections = match graphdigit_pipeline::detect_colors(&image_bytes, palette.as_deref()) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Detection error: {e}");
            return ExitCode::FAILURE;
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&detections) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error serializing detections: {e}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        println!(
            "{:<12} {:>10} {:>10} {:>11}",
            "Color", "Pixels", "Fraction", "Confidence"
        );
        println!("{}", "-".repeat(46));
        for d in &detections {
            println!(
                "{:<12} {:>10} {:>9.3}% {:>11.3}",
                d.color,
                d.pixel_count,
                d.fraction * 100.0,
                d.confidence,
            );
        }
        if detections.is_empty() {
            println!("(no palette colors found)");
        }
    }

    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    match cli.command {
        Command::Extract(ref args) => run_extract(args),
        Command::Detect(ref args) => run_detect(args),
    }
}

/// Total time per stage name across the scene and every color.
fn stage_totals(diagnostics: &ExtractionDiagnostics) -> Vec<(&'static str, Duration)> {
    let mut totals: Vec<(&'static str, Duration)> = Vec::new();
    let stages = diagnostics
        .scene
        .iter()
        .chain(diagnostics.colors.iter().flat_map(|c| &c.stages));
    for stage in stages {
        let name = stage.metrics.stage_name();
        match totals.iter_mut().find(|(n, _)| *n == name) {
            Some((_, total)) => *total += stage.duration,
            None => totals.push((name, stage.duration)),
        }
    }
    totals
}

/// Print aggregated statistics across multiple runs.
#[allow(clippy::cast_precision_loss)]
fn print_multi_run_summary(all_diagnostics: &[ExtractionDiagnostics]) {
    debug_assert!(!all_diagnostics.is_empty(), "no diagnostics to summarize");

    println!();
    println!(
        "Summary ({} runs)\n{}",
        all_diagnostics.len(),
        "=".repeat(60),
    );

    if all_diagnostics.is_empty() {
        println!("Warning: no diagnostics to summarize");
        return;
    }

    let durations: Vec<f64> = all_diagnostics
        .iter()
        .map(|d| d.total_duration.as_secs_f64() * 1000.0)
        .collect();

    let min = durations.iter().copied().reduce(f64::min).unwrap_or(0.0);
    let max = durations.iter().copied().reduce(f64::max).unwrap_or(0.0);
    let mean = durations.iter().sum::<f64>() / durations.len() as f64;

    println!("Total duration: min={min:.3}ms  mean={mean:.3}ms  max={max:.3}ms");

    // Per-stage means, in first-seen order.
    println!();
    println!("{:<24} {:>12}", "Stage", "Mean (ms)");
    println!("{}", "-".repeat(40));

    let per_run: Vec<Vec<(&'static str, Duration)>> =
        all_diagnostics.iter().map(stage_totals).collect();
    let mut names: Vec<&'static str> = Vec::new();
    for (name, _) in per_run.iter().flatten() {
        if !names.contains(name) {
            names.push(*name);
        }
    }

    for name in names {
        let stage_durations: Vec<f64> = per_run
            .iter()
            .filter_map(|run| run.iter().find(|(n, _)| *n == name))
            .map(|(_, dur)| dur.as_secs_f64() * 1000.0)
            .collect();

        let stage_mean = stage_durations.iter().sum::<f64>() / stage_durations.len() as f64;
        println!("{name:<24} {stage_mean:>10.3}ms");
    }
}
