//! Per-color stage chain: advance one stage at a time, inspecting each
//! intermediate result before continuing.
//!
//! ```rust
//! # use graphdigit_pipeline::pipeline::{ChainSettings, ColorChain};
//! # use graphdigit_pipeline::scene::Scene;
//! # use graphdigit_pipeline::{ColorGroup, ExtractionConfig, ExtractionError};
//! # fn run(
//! #     scene: &Scene,
//! #     group: &ColorGroup,
//! #     config: &ExtractionConfig,
//! # ) -> Result<(), ExtractionError> {
//! let outcome = ColorChain::new(scene, group, ChainSettings::from_config(config))
//!     .mask()
//!     .suppress_annotations()
//!     .denoise()
//!     .filter_components()
//!     .bin()
//!     .reject_outliers()
//!     .smooth()
//!     .simplify()
//!     .map_to_data()?
//!     .finish();
//! # Ok(())
//! # }
//! ```
//!
//! Each stage method consumes `self` and returns the next state. Stages
//! whose enhanced option is off pass their input through untouched and
//! record no diagnostics, so with every option off the chain is exactly
//! the legacy one: mask, closing, component filter, fixed bins, MAD
//! filter, Savitzky-Golay, scale mapping.
//!
//! The chain only borrows the [`Scene`], so chains for different colors
//! run in parallel over one scene.

use std::time::Duration;

use crate::axis::{AxisConfig, AxisMapper};
use crate::binning::{Bin, bin_mask};
use crate::color::{ColorGroup, hsv_mask};
use crate::components::{ComponentStats, close_gaps, count_set, filter_components};
use crate::config::{EnhancedOptions, ExtractionConfig};
use crate::diagnostics::{ColorDiagnostics, StageDiagnostics, StageMetrics, duration_ms, timed};
use crate::outlier::filter_bin;
use crate::scene::Scene;
use crate::smoothing::{POLY_ORDER, WindowChoice, choose_window, savgol, window_for};
use crate::types::{
    AxisName, Curve, CurveMetadata, DataPoint, ExtractionError, ExtractionWarning, GrayImage,
    Point, Polyline, average_slope,
};

/// Request settings every color chain reads.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChainSettings {
    /// Minimum connected-component area kept.
    pub min_size: u32,
    /// Bin width in columns.
    pub bin_size: u32,
    /// Optional stages in effect.
    pub stages: EnhancedOptions,
    pub x_axis: AxisConfig,
    pub y_axis: AxisConfig,
}

impl ChainSettings {
    /// Settings taken from a request configuration.
    #[must_use]
    pub fn from_config(config: &ExtractionConfig) -> Self {
        Self {
            min_size: config.min_size,
            bin_size: config.bin_size,
            stages: config.mode.stages(),
            x_axis: config.x_axis,
            y_axis: config.y_axis,
        }
    }
}

/// State threaded through every stage.
struct Context<'a> {
    scene: &'a Scene,
    group: &'a ColorGroup,
    settings: ChainSettings,
    stages: Vec<StageDiagnostics>,
    warnings: Vec<ExtractionWarning>,
    elapsed: Duration,
}

impl Context<'_> {
    fn record(&mut self, duration: Duration, metrics: StageMetrics) {
        tracing::debug!(
            color = %self.group.name,
            stage = metrics.stage_name(),
            ms = duration_ms(duration),
            "stage complete"
        );
        self.elapsed += duration;
        self.stages.push(StageDiagnostics::new(duration, metrics));
    }

    fn warn(&mut self, warning: ExtractionWarning) {
        tracing::warn!(%warning, "extraction warning");
        self.warnings.push(warning);
    }
}

// ───────────────────────── Stage 0: ColorChain ───────────────────────

/// Chain state before any pixel of this color has been touched.
///
/// Call [`mask`](Self::mask) to advance to the next stage.
#[must_use = "pipeline stages are consumed by advancing; call .mask() to continue"]
pub struct ColorChain<'a> {
    ctx: Context<'a>,
}

impl<'a> ColorChain<'a> {
    /// Start a chain for `group` over `scene`.
    pub const fn new(scene: &'a Scene, group: &'a ColorGroup, settings: ChainSettings) -> Self {
        Self {
            ctx: Context {
                scene,
                group,
                settings,
                stages: Vec::new(),
                warnings: Vec::new(),
                elapsed: Duration::ZERO,
            },
        }
    }

    /// Canonical color name of this chain.
    #[must_use]
    pub fn color(&self) -> &str {
        &self.ctx.group.name
    }

    /// Threshold the scene's HSV image by the color's ranges, inside
    /// the plot rectangle.
    pub fn mask(mut self) -> Masked<'a> {
        let scene = self.ctx.scene;
        let (mask, duration) = timed(|| hsv_mask(scene.hsv(), self.ctx.group, scene.plot()));
        let matched_pixels = count_set(&mask);
        self.ctx
            .record(duration, StageMetrics::Mask { matched_pixels });
        Masked {
            ctx: self.ctx,
            mask,
        }
    }
}

// ───────────────────────── Stage 1: Masked ───────────────────────────

/// Chain state after HSV masking.
///
/// Call [`suppress_annotations`](Self::suppress_annotations) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .suppress_annotations() to continue"]
pub struct Masked<'a> {
    ctx: Context<'a>,
    mask: GrayImage,
}

impl<'a> Masked<'a> {
    /// The raw color mask.
    #[must_use]
    pub const fn mask(&self) -> &GrayImage {
        &self.mask
    }

    /// Clear pixels inside detected legend boxes. A pass-through when
    /// annotation masking is off.
    pub fn suppress_annotations(mut self) -> Unannotated<'a> {
        let mask = match self.ctx.scene.annotations() {
            Some(map) => {
                let ((mask, removed_pixels), duration) = timed(|| map.apply(&self.mask));
                self.ctx
                    .record(duration, StageMetrics::AnnotationMask { removed_pixels });
                mask
            }
            None => self.mask,
        };
        Unannotated {
            ctx: self.ctx,
            mask,
        }
    }
}

// ───────────────────────── Stage 2: Unannotated ──────────────────────

/// Chain state after annotation suppression.
///
/// Call [`denoise`](Self::denoise) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .denoise() to continue"]
pub struct Unannotated<'a> {
    ctx: Context<'a>,
    mask: GrayImage,
}

impl<'a> Unannotated<'a> {
    /// The mask with legend pixels removed.
    #[must_use]
    pub const fn mask(&self) -> &GrayImage {
        &self.mask
    }

    /// Gate the mask by edge support (when enabled), then close
    /// one-pixel gaps.
    pub fn denoise(mut self) -> Denoised<'a> {
        let gated = match self.ctx.scene.edges() {
            Some(support) => {
                let ((gated, removed_pixels), duration) =
                    timed(|| crate::edge::gate(&self.mask, support));
                self.ctx
                    .record(duration, StageMetrics::EdgeGate { removed_pixels });
                gated
            }
            None => self.mask,
        };

        let pixels_before = count_set(&gated);
        let (closed, duration) = timed(|| close_gaps(&gated));
        let pixels_after = count_set(&closed);
        self.ctx.record(
            duration,
            StageMetrics::Morphology {
                pixels_before,
                pixels_after,
            },
        );
        Denoised {
            ctx: self.ctx,
            mask: closed,
        }
    }
}

// ───────────────────────── Stage 3: Denoised ─────────────────────────

/// Chain state after edge gating and morphological closing.
///
/// Call [`filter_components`](Self::filter_components) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .filter_components() to continue"]
pub struct Denoised<'a> {
    ctx: Context<'a>,
    mask: GrayImage,
}

impl<'a> Denoised<'a> {
    /// The closed mask.
    #[must_use]
    pub const fn mask(&self) -> &GrayImage {
        &self.mask
    }

    /// Drop connected components smaller than `min_size`.
    pub fn filter_components(mut self) -> Filtered<'a> {
        let min_size = self.ctx.settings.min_size;
        let ((mask, stats), duration) = timed(|| filter_components(&self.mask, min_size));
        self.ctx.record(
            duration,
            StageMetrics::Components {
                min_size,
                total: stats.total,
                kept: stats.kept,
                kept_pixels: stats.kept_pixels,
            },
        );
        Filtered {
            ctx: self.ctx,
            mask,
            stats,
        }
    }
}

// ───────────────────────── Stage 4: Filtered ─────────────────────────

/// Chain state after connected-component filtering.
///
/// Call [`bin`](Self::bin) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .bin() to continue"]
pub struct Filtered<'a> {
    ctx: Context<'a>,
    mask: GrayImage,
    stats: ComponentStats,
}

impl<'a> Filtered<'a> {
    /// Mask of the surviving components.
    #[must_use]
    pub const fn mask(&self) -> &GrayImage {
        &self.mask
    }

    /// Component counts.
    #[must_use]
    pub const fn stats(&self) -> &ComponentStats {
        &self.stats
    }

    /// Group the surviving pixels into column bins.
    pub fn bin(mut self) -> Binned<'a> {
        let plot = self.ctx.scene.plot();
        let kind = self.ctx.settings.stages.binning();
        let bin_size = self.ctx.settings.bin_size;
        let (bins, duration) = timed(|| bin_mask(&self.mask, plot, bin_size, kind));
        self.ctx.record(
            duration,
            StageMetrics::Binning {
                strategy: kind.to_string(),
                bins: bins.len(),
                samples: bins.iter().map(|b| b.ys.len()).sum(),
            },
        );
        Binned {
            ctx: self.ctx,
            source_pixels: self.stats.kept_pixels,
            bins,
        }
    }
}

// ───────────────────────── Stage 5: Binned ───────────────────────────

/// Chain state after binning.
///
/// Call [`reject_outliers`](Self::reject_outliers) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .reject_outliers() to continue"]
pub struct Binned<'a> {
    ctx: Context<'a>,
    source_pixels: u64,
    bins: Vec<Bin>,
}

impl<'a> Binned<'a> {
    /// Non-empty bins, left to right.
    #[must_use]
    pub fn bins(&self) -> &[Bin] {
        &self.bins
    }

    /// Reduce each bin to the median of its MAD survivors.
    pub fn reject_outliers(mut self) -> Representatives<'a> {
        let (summaries, duration) = timed(|| {
            self.bins
                .iter()
                .filter_map(|bin| filter_bin(&bin.ys).map(|s| (bin.x, s)))
                .collect::<Vec<_>>()
        });
        let discarded = summaries.iter().map(|(_, s)| s.discarded).sum();
        self.ctx.record(
            duration,
            StageMetrics::OutlierRejection {
                bins: summaries.len(),
                discarded,
            },
        );
        Representatives {
            ctx: self.ctx,
            source_pixels: self.source_pixels,
            discarded,
            points: summaries
                .into_iter()
                .map(|(x, s)| Point::new(x, s.representative))
                .collect(),
        }
    }
}

// ───────────────────────── Stage 6: Representatives ──────────────────

/// Chain state after outlier rejection: one pixel-space point per bin.
///
/// Call [`smooth`](Self::smooth) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .smooth() to continue"]
pub struct Representatives<'a> {
    ctx: Context<'a>,
    source_pixels: u64,
    discarded: usize,
    points: Vec<Point>,
}

impl<'a> Representatives<'a> {
    /// Per-bin representative points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.points
    }

    /// Smooth the representative y values with Savitzky-Golay.
    ///
    /// The window comes from the color (red 21, blue 17, others 13).
    /// When there are fewer bins than the window it is shrunk to the
    /// largest odd length that fits; below three bins smoothing is
    /// skipped. Both degradations are reported as warnings.
    pub fn smooth(mut self) -> Smoothed<'a> {
        let bins = self.points.len();
        let requested = window_for(&self.ctx.group.name);
        let choice = choose_window(requested, bins);
        let color = self.ctx.group.name.clone();
        match choice {
            WindowChoice::Full(_) => {}
            WindowChoice::Shrunk { requested, applied } => {
                self.ctx.warn(ExtractionWarning::WindowShrunk {
                    color,
                    requested,
                    applied,
                });
            }
            // A single bin is dropped later as too few points.
            WindowChoice::Skipped if bins >= 2 => {
                self.ctx
                    .warn(ExtractionWarning::SmoothingSkipped { color, bins });
            }
            WindowChoice::Skipped => {}
        }

        let window = choice.applied();
        let (smoothed, duration) = timed(|| {
            let ys: Vec<f64> = self.points.iter().map(|p| p.y).collect();
            savgol(&ys, window, POLY_ORDER)
        });
        self.ctx.record(
            duration,
            StageMetrics::Smoothing {
                requested_window: requested,
                applied_window: window,
            },
        );

        let points = self
            .points
            .iter()
            .zip(smoothed)
            .map(|(p, y)| Point::new(p.x, y))
            .collect();
        Smoothed {
            ctx: self.ctx,
            source_pixels: self.source_pixels,
            discarded: self.discarded,
            bin_count: bins,
            window,
            curve: Polyline::new(points),
        }
    }
}

// ───────────────────────── Stage 7: Smoothed ─────────────────────────

/// Chain state after smoothing.
///
/// Call [`simplify`](Self::simplify) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .simplify() to continue"]
pub struct Smoothed<'a> {
    ctx: Context<'a>,
    source_pixels: u64,
    discarded: usize,
    bin_count: usize,
    window: usize,
    curve: Polyline,
}

impl<'a> Smoothed<'a> {
    /// The smoothed pixel-space curve.
    #[must_use]
    pub const fn curve(&self) -> &Polyline {
        &self.curve
    }

    /// Run RDP on the smoothed curve. A pass-through when curve
    /// simplification is off.
    pub fn simplify(mut self) -> Simplified<'a> {
        let stages = self.ctx.settings.stages;
        let curve = if stages.simplify_curve {
            let tolerance = stages.simplify_tolerance;
            let (simplified, duration) =
                timed(|| crate::simplify::simplify(&self.curve, tolerance));
            let points_before = self.curve.len();
            let points_after = simplified.len();
            #[allow(clippy::cast_precision_loss)]
            let reduction_ratio = if points_before == 0 {
                0.0
            } else {
                1.0 - (points_after as f64 / points_before as f64)
            };
            self.ctx.record(
                duration,
                StageMetrics::Simplification {
                    tolerance,
                    points_before,
                    points_after,
                    reduction_ratio,
                },
            );
            simplified
        } else {
            self.curve
        };
        Simplified {
            ctx: self.ctx,
            source_pixels: self.source_pixels,
            discarded: self.discarded,
            bin_count: self.bin_count,
            window: self.window,
            curve,
        }
    }
}

// ───────────────────────── Stage 8: Simplified ───────────────────────

/// Chain state holding the final pixel-space curve.
///
/// Call [`map_to_data`](Self::map_to_data) to advance.
#[must_use = "pipeline stages are consumed by advancing; call .map_to_data() to continue"]
pub struct Simplified<'a> {
    ctx: Context<'a>,
    source_pixels: u64,
    discarded: usize,
    bin_count: usize,
    window: usize,
    curve: Polyline,
}

impl<'a> Simplified<'a> {
    /// The final pixel-space curve.
    #[must_use]
    pub const fn curve(&self) -> &Polyline {
        &self.curve
    }

    /// Map the pixel curve into data units over the plot rectangle.
    ///
    /// x maps `left..right`; y maps `bottom..top`, with pixel y clamped
    /// to the rectangle so smoothing overshoot never leaves the axis
    /// range.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::InvalidAxis`] if an axis cannot be
    /// mapped over the plot rectangle.
    pub fn map_to_data(mut self) -> Result<Mapped<'a>, ExtractionError> {
        let plot = self.ctx.scene.plot();
        let settings = self.ctx.settings;
        let x_map = AxisMapper::new(
            AxisName::X,
            &settings.x_axis,
            f64::from(plot.left),
            f64::from(plot.right),
        )?;
        let y_map = AxisMapper::new(
            AxisName::Y,
            &settings.y_axis,
            f64::from(plot.bottom),
            f64::from(plot.top),
        )?;
        let (top, bottom) = (f64::from(plot.top), f64::from(plot.bottom));

        let (points, duration) = timed(|| {
            self.curve
                .points()
                .iter()
                .map(|p| DataPoint {
                    x: x_map.map(p.x),
                    y: y_map.map(p.y.clamp(top, bottom)),
                })
                .collect::<Vec<_>>()
        });
        self.ctx
            .record(duration, StageMetrics::ScaleMapping { points: points.len() });
        Ok(Mapped {
            ctx: self.ctx,
            source_pixels: self.source_pixels,
            discarded: self.discarded,
            bin_count: self.bin_count,
            window: self.window,
            pixel_curve: self.curve,
            points,
        })
    }
}

// ───────────────────────── Stage 9: Mapped ───────────────────────────

/// Chain state after scale mapping.
///
/// Call [`finish`](Self::finish) to assemble the [`ColorOutcome`].
#[must_use = "call .finish() to extract the ColorOutcome"]
pub struct Mapped<'a> {
    ctx: Context<'a>,
    source_pixels: u64,
    discarded: usize,
    bin_count: usize,
    window: usize,
    pixel_curve: Polyline,
    points: Vec<DataPoint>,
}

impl Mapped<'_> {
    /// Points in data units.
    #[must_use]
    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    /// Assemble the curve, or explain why there is none.
    ///
    /// A color with no pixels left after component filtering yields a
    /// `NoPixels` warning; one with fewer than two points a
    /// `TooFewPoints` warning.
    pub fn finish(mut self) -> ColorOutcome {
        let color = self.ctx.group.name.clone();
        let curve = if self.source_pixels == 0 {
            self.ctx.warn(ExtractionWarning::NoPixels {
                color: color.clone(),
            });
            None
        } else if self.points.len() < 2 {
            self.ctx.warn(ExtractionWarning::TooFewPoints {
                color: color.clone(),
                points: self.points.len(),
            });
            None
        } else {
            let metadata = CurveMetadata {
                average_slope: average_slope(&self.points),
                processing_time_ms: duration_ms(self.ctx.elapsed),
                source_pixel_count: self.source_pixels,
                bin_count: self.bin_count,
                discarded_points: self.discarded,
                window_length: self.window,
                display: self.ctx.group.display,
            };
            Some(Curve::new(
                color.clone(),
                self.ctx.group.label(),
                self.points,
                metadata,
            ))
        };

        ColorOutcome {
            curve,
            pixel_curve: self.pixel_curve,
            display: self.ctx.group.display,
            source_pixels: self.source_pixels,
            discarded: self.discarded,
            diagnostics: ColorDiagnostics {
                color,
                stages: self.ctx.stages,
                duration: self.ctx.elapsed,
            },
            warnings: self.ctx.warnings,
        }
    }
}

/// Everything one color chain produced.
#[derive(Debug, Clone)]
pub struct ColorOutcome {
    /// The curve, when at least two points survived.
    pub curve: Option<Curve>,
    /// Final pixel-space curve, for the preview overlay.
    pub pixel_curve: Polyline,
    /// RGB the curve is drawn in.
    pub display: [u8; 3],
    /// Mask pixels that survived component filtering.
    pub source_pixels: u64,
    /// Samples dropped by the MAD filter.
    pub discarded: usize,
    pub diagnostics: ColorDiagnostics,
    pub warnings: Vec<ExtractionWarning>,
}

impl ColorOutcome {
    /// Move the outcome to color `name`: the curve, its label, the
    /// diagnostics, and every per-color warning follow.
    pub fn rename(&mut self, name: &str) {
        self.curve = self
            .curve
            .take()
            .map(|c| c.renamed(name, crate::color::label_for(name)));
        self.diagnostics.color = name.to_string();
        for warning in &mut self.warnings {
            if let Some(color) = warning.color_mut() {
                *color = name.to_string();
            }
        }
    }
}

/// Run the whole chain for one color.
///
/// # Errors
///
/// Returns [`ExtractionError::InvalidAxis`] if an axis cannot be mapped
/// over the plot rectangle.
pub fn run_chain(
    scene: &Scene,
    group: &ColorGroup,
    settings: ChainSettings,
) -> Result<ColorOutcome, ExtractionError> {
    Ok(ColorChain::new(scene, group, settings)
        .mask()
        .suppress_annotations()
        .denoise()
        .filter_components()
        .bin()
        .reject_outliers()
        .smooth()
        .simplify()
        .map_to_data()?
        .finish())
}
