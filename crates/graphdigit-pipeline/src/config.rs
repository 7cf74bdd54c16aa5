//! Extraction configuration.
//!
//! [`ExtractionConfig`] is the typed configuration consumed by
//! [`extract`](crate::extract). The pipeline mode is a closed enum
//! dispatched once by the orchestrator; its payload carries the stage
//! flags, so a flag cannot be set for a mode that ignores it.

use serde::{Deserialize, Serialize};

use crate::axis::AxisConfig;
use crate::binning::BinningKind;
use crate::color::{ColorBand, ColorGroup, HUE_MAX, default_palette, resolve_selection};
use crate::types::{AxisName, ExtractionError, Point};

/// Default minimum connected-component area in pixels.
pub const DEFAULT_MIN_SIZE: u32 = 1000;

/// Default bin width in pixel columns.
pub const DEFAULT_BIN_SIZE: u32 = 5;

/// Default RDP tolerance in pixels.
pub const DEFAULT_SIMPLIFY_TOLERANCE: f64 = 1.0;

/// Toggleable stages of the enhanced chain. All default to off, which
/// makes the chain identical to the legacy one.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
#[allow(clippy::struct_excessive_bools)]
pub struct EnhancedOptions {
    /// Detect the plot frame and map scales over it.
    pub use_plot_area: bool,
    /// Suppress legend boxes before component filtering.
    pub use_annotation_mask: bool,
    /// Gate the color mask by an edge map.
    pub use_edge_denoise: bool,
    /// Size bins by local pixel density.
    pub use_adaptive_binning: bool,
    /// Run RDP on the smoothed curve.
    pub simplify_curve: bool,
    /// RDP tolerance in pixels.
    pub simplify_tolerance: f64,
}

impl Default for EnhancedOptions {
    fn default() -> Self {
        Self {
            use_plot_area: false,
            use_annotation_mask: false,
            use_edge_denoise: false,
            use_adaptive_binning: false,
            simplify_curve: false,
            simplify_tolerance: DEFAULT_SIMPLIFY_TOLERANCE,
        }
    }
}

impl EnhancedOptions {
    /// Every optional stage enabled.
    #[must_use]
    pub fn all() -> Self {
        Self {
            use_plot_area: true,
            use_annotation_mask: true,
            use_edge_denoise: true,
            use_adaptive_binning: true,
            simplify_curve: true,
            ..Self::default()
        }
    }

    /// Whether any optional stage is on.
    #[must_use]
    pub const fn any_enabled(&self) -> bool {
        self.use_plot_area
            || self.use_annotation_mask
            || self.use_edge_denoise
            || self.use_adaptive_binning
            || self.simplify_curve
    }

    /// Binning strategy implied by the flags.
    #[must_use]
    pub const fn binning(&self) -> BinningKind {
        if self.use_adaptive_binning {
            BinningKind::Adaptive
        } else {
            BinningKind::Fixed
        }
    }

    fn validate(&self) -> Result<(), ExtractionError> {
        if !self.simplify_tolerance.is_finite() || self.simplify_tolerance < 0.0 {
            return Err(ExtractionError::InvalidConfig(format!(
                "simplify tolerance must be finite and non-negative, got {}",
                self.simplify_tolerance
            )));
        }
        Ok(())
    }
}

/// Caps for auto-color clustering.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AutoColorOptions {
    /// Upper bound on discovered series.
    pub max_clusters: usize,
    /// Upper bound on pixels fed to k-means.
    pub sample_size: usize,
    /// Foreground pixels, as a fraction of the plot area, below which
    /// nothing is clustered.
    pub min_foreground_fraction: f64,
    /// Stages applied to each discovered color.
    pub stages: EnhancedOptions,
}

impl Default for AutoColorOptions {
    fn default() -> Self {
        Self {
            max_clusters: 5,
            sample_size: 20_000,
            min_foreground_fraction: 0.0005,
            stages: EnhancedOptions::default(),
        }
    }
}

/// Pipeline mode.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMode {
    /// Fixed legacy chain.
    #[default]
    Legacy,
    /// Legacy chain plus the enabled optional stages.
    Enhanced(EnhancedOptions),
    /// Colors discovered by clustering when none are selected.
    AutoColor(AutoColorOptions),
}

impl ExtractionMode {
    /// Wire name of the mode.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Enhanced(_) => "enhanced",
            Self::AutoColor(_) => "auto_color",
        }
    }

    /// Optional stages in effect. Legacy has none.
    #[must_use]
    pub fn stages(&self) -> EnhancedOptions {
        match self {
            Self::Legacy => EnhancedOptions::default(),
            Self::Enhanced(options) => *options,
            Self::AutoColor(auto) => auto.stages,
        }
    }
}

/// Configuration for one extraction request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ExtractionConfig {
    /// Which chain to run.
    pub mode: ExtractionMode,
    /// Minimum connected-component area kept, in pixels.
    pub min_size: u32,
    /// Bin width in pixel columns (fixed binning; adaptive upper bound).
    pub bin_size: u32,
    /// Colors to extract, in output order. Names are canonicalised.
    pub selected_colors: Vec<String>,
    /// Bands the selection is resolved against.
    pub palette: Vec<ColorBand>,
    /// Horizontal axis.
    pub x_axis: AxisConfig,
    /// Vertical axis.
    pub y_axis: AxisConfig,
    /// Plot corners in source pixels: top-left, top-right,
    /// bottom-right, bottom-left. Enables perspective correction.
    pub calibration: Option<[Point; 4]>,
    /// Render a PNG overlay of the extracted curves.
    pub render_preview: bool,
}

impl ExtractionConfig {
    /// The legacy defaults: legacy mode, `min_size` 1000, `bin_size` 5,
    /// default palette, unit axes, no calibration, no preview.
    #[must_use]
    pub fn legacy_default() -> Self {
        Self {
            mode: ExtractionMode::Legacy,
            min_size: DEFAULT_MIN_SIZE,
            bin_size: DEFAULT_BIN_SIZE,
            selected_colors: Vec::new(),
            palette: default_palette(),
            x_axis: AxisConfig::default(),
            y_axis: AxisConfig::default(),
            calibration: None,
            render_preview: false,
        }
    }

    /// Check every configuration rule before any pixel is touched.
    ///
    /// # Errors
    ///
    /// Returns the first configuration error found: non-positive
    /// `min_size` or `bin_size`, an unmappable axis, bad stage options
    /// or clustering caps, degenerate calibration anchors, a malformed
    /// palette band, an unknown selected color, or an empty selection
    /// outside auto-color mode.
    pub fn validate(&self) -> Result<(), ExtractionError> {
        if self.min_size == 0 {
            return Err(ExtractionError::InvalidMinSize);
        }
        if self.bin_size == 0 {
            return Err(ExtractionError::InvalidBinSize);
        }
        self.x_axis.validate(AxisName::X)?;
        self.y_axis.validate(AxisName::Y)?;
        self.mode.stages().validate()?;
        if let ExtractionMode::AutoColor(auto) = &self.mode {
            if auto.max_clusters == 0 || auto.sample_size == 0 {
                return Err(ExtractionError::InvalidConfig(
                    "auto-color cluster and sample caps must be positive".to_string(),
                ));
            }
            if !(0.0..1.0).contains(&auto.min_foreground_fraction) {
                return Err(ExtractionError::InvalidConfig(format!(
                    "min foreground fraction must be in [0, 1), got {}",
                    auto.min_foreground_fraction
                )));
            }
        }
        if let Some(anchors) = &self.calibration {
            crate::warp::projection(anchors)?;
        }
        for band in &self.palette {
            if band.range.upper[0] > HUE_MAX || band.range.lower[0] > HUE_MAX {
                return Err(ExtractionError::InvalidConfig(format!(
                    "band {}: hue must be within 0..={HUE_MAX}",
                    band.name
                )));
            }
        }
        self.color_groups().map(|_| ())
    }

    /// Resolve the selected colors against the palette.
    ///
    /// Auto-color mode with no selection resolves to an empty list; the
    /// orchestrator discovers its groups by clustering.
    ///
    /// # Errors
    ///
    /// Returns [`ExtractionError::NoColorsSelected`] when the selection
    /// is empty outside auto-color mode, or
    /// [`ExtractionError::UnknownColor`] for a name not in the palette.
    pub fn color_groups(&self) -> Result<Vec<ColorGroup>, ExtractionError> {
        if self.selected_colors.is_empty() && !matches!(self.mode, ExtractionMode::AutoColor(_)) {
            return Err(ExtractionError::NoColorsSelected);
        }
        resolve_selection(&self.selected_colors, &self.palette)
    }
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self::legacy_default()
    }
}
