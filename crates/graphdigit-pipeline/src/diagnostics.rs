//! Extraction diagnostics: timing, counts, and other metrics for each
//! stage.
//!
//! Every call to [`extract`](crate::extract) collects diagnostics
//! alongside the curves: the request-level scene stages (decode, HSV
//! conversion, rectification, plot-area and annotation detection, edge
//! map, clustering) and, per color, each stage of its chain.
//!
//! Duration measurements use [`std::time::Duration`] (platform-agnostic).
//! Timestamps are captured internally via the `web-time` crate, which
//! uses `performance.now()` on WASM and `std::time::Instant` on native.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Run `f` and measure its wall-clock duration.
pub(crate) fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = web_time::Instant::now();
    let out = f();
    (out, start.elapsed())
}

/// Diagnostics collected from one extraction request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionDiagnostics {
    /// Request-level stages shared by every color, in run order.
    pub scene: Vec<StageDiagnostics>,
    /// Per-color stage chains, in output order.
    pub colors: Vec<ColorDiagnostics>,
    /// Total wall-clock duration of the request (seconds).
    #[serde(with = "duration_serde")]
    pub total_duration: Duration,
    /// Pixel samples rejected by outlier filtering, over all colors.
    pub points_discarded: usize,
    /// Summary counts across all stages.
    pub summary: ExtractionSummary,
}

/// Stage chain of one color.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorDiagnostics {
    /// Canonical color name.
    pub color: String,
    /// Stages in run order.
    pub stages: Vec<StageDiagnostics>,
    /// Wall-clock duration of the whole chain (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
}

/// Diagnostics for a single stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock duration of this stage (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific metrics (counts, sizes, etc.).
    pub metrics: StageMetrics,
}

impl StageDiagnostics {
    pub(crate) const fn new(duration: Duration, metrics: StageMetrics) -> Self {
        Self { duration, metrics }
    }
}

/// Stage-specific metrics that vary by stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StageMetrics {
    /// Image decoding.
    Decode {
        /// Size of the input image bytes.
        input_bytes: usize,
        width: u32,
        height: u32,
    },
    /// RGB to HSV conversion of the (rectified) image.
    HsvConversion { pixel_count: u64 },
    /// Perspective correction from calibration anchors.
    Rectify {
        /// Whether a warp was needed (anchors not already aligned).
        warped: bool,
        plot_width: u32,
        plot_height: u32,
    },
    /// Plot-area detection.
    PlotArea {
        found: bool,
        plot_width: u32,
        plot_height: u32,
    },
    /// Legend frame detection.
    AnnotationDetection {
        regions: usize,
        suppressed_pixels: u64,
    },
    /// Edge support map.
    EdgeMap { threshold: u16, support_pixels: u64 },
    /// Auto-color clustering.
    Clustering {
        foreground_pixels: u64,
        sampled: usize,
        iterations: usize,
        clusters: usize,
    },
    /// HSV masking of one color.
    Mask { matched_pixels: u64 },
    /// Annotation suppression of one color's mask.
    AnnotationMask { removed_pixels: u64 },
    /// Edge gating of one color's mask.
    EdgeGate { removed_pixels: u64 },
    /// Morphological closing.
    Morphology { pixels_before: u64, pixels_after: u64 },
    /// Connected-component area filtering.
    Components {
        min_size: u32,
        total: usize,
        kept: usize,
        kept_pixels: u64,
    },
    /// Column binning.
    Binning {
        strategy: String,
        bins: usize,
        samples: usize,
    },
    /// MAD outlier rejection.
    OutlierRejection { bins: usize, discarded: usize },
    /// Savitzky-Golay smoothing.
    Smoothing {
        requested_window: usize,
        /// 0 when smoothing was skipped.
        applied_window: usize,
    },
    /// RDP simplification.
    Simplification {
        tolerance: f64,
        points_before: usize,
        points_after: usize,
        /// `1.0 - (after / before)`.
        reduction_ratio: f64,
    },
    /// Pixel to data coordinate mapping.
    ScaleMapping { points: usize },
    /// Preview overlay rendering and encoding.
    Preview { encoded_bytes: usize },
}

impl StageMetrics {
    /// Display name of the stage.
    #[must_use]
    pub const fn stage_name(&self) -> &'static str {
        match self {
            Self::Decode { .. } => "Decode",
            Self::HsvConversion { .. } => "HSV Conversion",
            Self::Rectify { .. } => "Rectify",
            Self::PlotArea { .. } => "Plot Area",
            Self::AnnotationDetection { .. } => "Annotation Detection",
            Self::EdgeMap { .. } => "Edge Map",
            Self::Clustering { .. } => "Clustering",
            Self::Mask { .. } => "Mask",
            Self::AnnotationMask { .. } => "Annotation Mask",
            Self::EdgeGate { .. } => "Edge Gate",
            Self::Morphology { .. } => "Morphology",
            Self::Components { .. } => "Components",
            Self::Binning { .. } => "Binning",
            Self::OutlierRejection { .. } => "Outlier Rejection",
            Self::Smoothing { .. } => "Smoothing",
            Self::Simplification { .. } => "Simplification",
            Self::ScaleMapping { .. } => "Scale Mapping",
            Self::Preview { .. } => "Preview",
        }
    }
}

/// High-level summary counts for the request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSummary {
    /// Source image width in pixels.
    pub image_width: u32,
    /// Source image height in pixels.
    pub image_height: u32,
    /// Colors processed.
    pub color_count: usize,
    /// Curves emitted.
    pub curve_count: usize,
    /// Points across all emitted curves.
    pub point_count: usize,
}

impl ExtractionDiagnostics {
    /// Format diagnostics as a human-readable report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();

        lines.push(format!("Extraction Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!(
            "Image: {}x{} ({} pixels)",
            self.summary.image_width,
            self.summary.image_height,
            u64::from(self.summary.image_width) * u64::from(self.summary.image_height),
        ));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.total_duration),
        ));
        lines.push(String::new());

        lines.push(format!(
            "{:<24} {:>10} {:>10}  {}",
            "Stage", "Duration", "% Total", "Details"
        ));
        lines.push("-".repeat(80));

        let total_ms = duration_ms(self.total_duration);
        for diag in &self.scene {
            lines.push(stage_line(diag, "", total_ms));
        }
        for color in &self.colors {
            lines.push(format!(
                "[{}] {:.3}ms",
                color.color,
                duration_ms(color.duration)
            ));
            for diag in &color.stages {
                lines.push(stage_line(diag, "  ", total_ms));
            }
        }

        lines.push(String::new());
        lines.push(format!(
            "Colors: {}  |  Curves: {}  |  Points: {}  |  Discarded samples: {}",
            self.summary.color_count,
            self.summary.curve_count,
            self.summary.point_count,
            self.points_discarded,
        ));

        lines.join("\n")
    }
}

fn stage_line(diag: &StageDiagnostics, indent: &str, total_ms: f64) -> String {
    let ms = duration_ms(diag.duration);
    let pct = if total_ms > 0.0 {
        ms / total_ms * 100.0
    } else {
        0.0
    };
    let name = format!("{indent}{}", diag.metrics.stage_name());
    let details = format_metrics(&diag.metrics);
    format!("{name:<24} {ms:>8.3}ms {pct:>9.1}%  {details}")
}

/// Convert a `Duration` to milliseconds as `f64`.
pub(crate) fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Format stage metrics into a compact detail string.
fn format_metrics(metrics: &StageMetrics) -> String {
    match metrics {
        StageMetrics::Decode {
            input_bytes,
            width,
            height,
        } => format!("{input_bytes} bytes -> {width}x{height}"),
        StageMetrics::HsvConversion { pixel_count } => format!("{pixel_count} px"),
        StageMetrics::Rectify {
            warped,
            plot_width,
            plot_height,
        } => {
            let how = if *warped { "warped" } else { "aligned" };
            format!("{how}, plot {plot_width}x{plot_height}")
        }
        StageMetrics::PlotArea {
            found,
            plot_width,
            plot_height,
        } => {
            if *found {
                format!("plot {plot_width}x{plot_height}")
            } else {
                "not found".to_string()
            }
        }
        StageMetrics::AnnotationDetection {
            regions,
            suppressed_pixels,
        } => format!("{regions} frames, {suppressed_pixels} px suppressed"),
        StageMetrics::EdgeMap {
            threshold,
            support_pixels,
        } => format!("threshold={threshold} support={support_pixels} px"),
        StageMetrics::Clustering {
            foreground_pixels,
            sampled,
            iterations,
            clusters,
        } => format!(
            "{foreground_pixels} fg px, {sampled} sampled, {iterations} it -> {clusters} clusters"
        ),
        StageMetrics::Mask { matched_pixels } => format!("{matched_pixels} px"),
        StageMetrics::AnnotationMask { removed_pixels }
        | StageMetrics::EdgeGate { removed_pixels } => format!("-{removed_pixels} px"),
        StageMetrics::Morphology {
            pixels_before,
            pixels_after,
        } => format!("{pixels_before}->{pixels_after} px"),
        StageMetrics::Components {
            min_size,
            total,
            kept,
            kept_pixels,
        } => format!("min={min_size} {kept}/{total} kept ({kept_pixels} px)"),
        StageMetrics::Binning {
            strategy,
            bins,
            samples,
        } => format!("{strategy} {bins} bins, {samples} samples"),
        StageMetrics::OutlierRejection { bins, discarded } => {
            format!("{bins} bins, {discarded} discarded")
        }
        StageMetrics::Smoothing {
            requested_window,
            applied_window,
        } => {
            if *applied_window == 0 {
                format!("window={requested_window} skipped")
            } else {
                format!("window={requested_window} applied={applied_window}")
            }
        }
        StageMetrics::Simplification {
            tolerance,
            points_before,
            points_after,
            reduction_ratio,
        } => format!(
            "tol={tolerance:.2} {points_before}->{points_after} pts ({:.1}% reduction)",
            reduction_ratio * 100.0,
        ),
        StageMetrics::ScaleMapping { points } => format!("{points} pts"),
        StageMetrics::Preview { encoded_bytes } => format!("{encoded_bytes} bytes"),
    }
}
