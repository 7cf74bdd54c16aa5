//! Shared types for the graphdigit extraction pipeline.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::diagnostics::ExtractionDiagnostics;

/// Re-export `GrayImage` so downstream crates can reference binary
/// masks and intermediate rasters without depending on `image` directly.
pub use image::GrayImage;

/// Re-export `RgbImage` so downstream crates can reference the decoded
/// source image without depending on `image` directly.
pub use image::RgbImage;

/// A 2D point in image (pixel) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Horizontal position (pixels from left edge).
    pub x: f64,
    /// Vertical position (pixels from top edge).
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Squared Euclidean distance to another point.
    #[must_use]
    pub fn distance_squared(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.mul_add(dx, dy * dy)
    }

    /// Euclidean distance to another point.
    #[must_use]
    pub fn distance(self, other: Self) -> f64 {
        self.distance_squared(other).sqrt()
    }
}

/// A sequence of connected points in pixel space.
///
/// Curves are traced left to right, so polylines produced by the
/// pipeline always have strictly increasing `x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polyline(Vec<Point>);

impl Polyline {
    /// Create a new polyline from a vector of points.
    #[must_use]
    pub const fn new(points: Vec<Point>) -> Self {
        Self(points)
    }

    /// Returns `true` if the polyline has no points.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of points in the polyline.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns a slice of all points.
    #[must_use]
    pub fn points(&self) -> &[Point] {
        &self.0
    }

    /// Consumes the polyline and returns the underlying vector of points.
    #[must_use]
    pub fn into_points(self) -> Vec<Point> {
        self.0
    }
}

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Total pixel count.
    #[must_use]
    pub const fn area(self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Axis-aligned plotting rectangle in pixel coordinates.
///
/// `right` and `bottom` are exclusive, so the rectangle covers columns
/// `left..right` and rows `top..bottom`. Scale mapping interpolates x
/// over `left..right` and y over `bottom..top` (image rows grow
/// downwards, data values grow upwards).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlotRect {
    /// First column inside the plot.
    pub left: u32,
    /// First row inside the plot.
    pub top: u32,
    /// One past the last column inside the plot.
    pub right: u32,
    /// One past the last row inside the plot.
    pub bottom: u32,
}

impl PlotRect {
    /// Rectangle covering the whole image.
    #[must_use]
    pub const fn full(dimensions: Dimensions) -> Self {
        Self {
            left: 0,
            top: 0,
            right: dimensions.width,
            bottom: dimensions.height,
        }
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Whether the rectangle contains no pixels.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Whether pixel `(x, y)` lies inside the rectangle.
    #[must_use]
    pub const fn contains(self, x: u32, y: u32) -> bool {
        x >= self.left && x < self.right && y >= self.top && y < self.bottom
    }
}

/// A point in the graph's data units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub x: f64,
    pub y: f64,
}

/// Quality and provenance information attached to each [`Curve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurveMetadata {
    /// Mean of the segment slopes `dy/dx` in data units.
    pub average_slope: f64,
    /// Wall-clock time spent on this color's stage chain.
    pub processing_time_ms: f64,
    /// Mask pixels that survived component filtering.
    pub source_pixel_count: u64,
    /// Number of bins that survived outlier rejection.
    pub bin_count: usize,
    /// Pixel samples dropped by the MAD filter.
    pub discarded_points: usize,
    /// Savitzky-Golay window actually applied (0 when smoothing was skipped).
    pub window_length: usize,
    /// RGB the curve is drawn with in previews and exports.
    pub display: [u8; 3],
}

/// One extracted data series.
///
/// Constructed once per color per request and immutable afterwards.
/// `point_count` always equals `points.len()`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Curve {
    color: String,
    label: String,
    points: Vec<DataPoint>,
    point_count: usize,
    metadata: CurveMetadata,
}

impl Curve {
    /// Assemble a curve. The point count is derived from `points`.
    #[must_use]
    pub fn new(
        color: impl Into<String>,
        label: impl Into<String>,
        points: Vec<DataPoint>,
        metadata: CurveMetadata,
    ) -> Self {
        let point_count = points.len();
        Self {
            color: color.into(),
            label: label.into(),
            points,
            point_count,
            metadata,
        }
    }

    /// Canonical color name (e.g. `"red"`).
    #[must_use]
    pub fn color(&self) -> &str {
        &self.color
    }

    /// The same curve under a new color name and label.
    #[must_use]
    pub fn renamed(self, color: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            color: color.into(),
            label: label.into(),
            ..self
        }
    }

    /// Human-readable label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Points in data units, strictly increasing in `x`.
    #[must_use]
    pub fn points(&self) -> &[DataPoint] {
        &self.points
    }

    /// Number of points.
    #[must_use]
    pub const fn point_count(&self) -> usize {
        self.point_count
    }

    /// Quality metadata.
    #[must_use]
    pub const fn metadata(&self) -> &CurveMetadata {
        &self.metadata
    }
}

/// Mean slope between consecutive points.
///
/// Returns `0.0` for fewer than two points.
#[must_use]
pub fn average_slope(points: &[DataPoint]) -> f64 {
    let slopes: Vec<f64> = points
        .windows(2)
        .filter_map(|w| {
            let dx = w[1].x - w[0].x;
            (dx != 0.0).then(|| (w[1].y - w[0].y) / dx)
        })
        .collect();
    if slopes.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = slopes.len() as f64;
    slopes.iter().sum::<f64>() / n
}

/// Which axis a message refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisName {
    X,
    Y,
}

impl fmt::Display for AxisName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X => f.write_str("x"),
            Self::Y => f.write_str("y"),
        }
    }
}

/// Non-fatal notices included in the response.
///
/// Every intentional degradation (log-axis guard, window shrink) is
/// reported here; processing continues for all other colors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExtractionWarning {
    /// The smoothing window was larger than the bin count.
    WindowShrunk {
        color: String,
        requested: usize,
        applied: usize,
    },
    /// Too few bins for any smoothing window; values left unsmoothed.
    SmoothingSkipped { color: String, bins: usize },
    /// A requested color had no pixels left after filtering.
    NoPixels { color: String },
    /// A color produced fewer than two points and was omitted.
    TooFewPoints { color: String, points: usize },
    /// A log axis had a non-positive minimum; epsilon was used instead.
    LogAxisGuarded { axis: AxisName, min: f64 },
    /// Auto-color clustering found fewer clusters than requested.
    FewerClusters { requested: usize, found: usize },
    /// Auto-color found too few foreground pixels to cluster.
    NoForeground,
    /// Plot-area detection was enabled but no plot border was found.
    PlotAreaNotFound,
}

impl ExtractionWarning {
    /// The color a per-color warning refers to.
    pub const fn color_mut(&mut self) -> Option<&mut String> {
        match self {
            Self::WindowShrunk { color, .. }
            | Self::SmoothingSkipped { color, .. }
            | Self::NoPixels { color }
            | Self::TooFewPoints { color, .. } => Some(color),
            Self::LogAxisGuarded { .. }
            | Self::FewerClusters { .. }
            | Self::NoForeground
            | Self::PlotAreaNotFound => None,
        }
    }
}

impl fmt::Display for ExtractionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WindowShrunk {
                color,
                requested,
                applied,
            } => write!(
                f,
                "{color}: smoothing window shrunk from {requested} to {applied} for low bin count"
            ),
            Self::SmoothingSkipped { color, bins } => {
                write!(f, "{color}: smoothing skipped, only {bins} bins")
            }
            Self::NoPixels { color } => write!(f, "{color}: no pixels survived filtering"),
            Self::TooFewPoints { color, points } => {
                write!(f, "{color}: omitted, only {points} point(s)")
            }
            Self::LogAxisGuarded { axis, min } => write!(
                f,
                "{axis} axis: log scale minimum {min} replaced by {:e}",
                crate::axis::LOG_EPSILON
            ),
            Self::FewerClusters { requested, found } => {
                write!(f, "auto-color found {found} of {requested} requested clusters")
            }
            Self::NoForeground => f.write_str("auto-color found no foreground pixels"),
            Self::PlotAreaNotFound => {
                f.write_str("plot area not detected, using calibration or full image")
            }
        }
    }
}

/// Result of one extraction request.
///
/// Serializes to the response contract: `curves`, optional
/// `previewImage` (base64 PNG), `processingTimeMs`, `warnings`, and
/// the per-stage `stats`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    /// Extracted curves in deterministic order.
    pub curves: Vec<Curve>,
    /// PNG-encoded overlay of the curves on the (rectified) source.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "base64_bytes"
    )]
    pub preview_image: Option<Vec<u8>>,
    /// Total wall-clock time of the request.
    pub processing_time_ms: f64,
    /// Non-fatal notices.
    pub warnings: Vec<ExtractionWarning>,
    /// Per-stage timing and counts.
    pub stats: ExtractionDiagnostics,
}

/// Serde support for optional binary blobs as base64 strings.
mod base64_bytes {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    #[allow(clippy::ref_option)]
    pub fn serialize<S: Serializer>(
        bytes: &Option<Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => serializer.serialize_some(&STANDARD.encode(b)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<u8>>, D::Error> {
        let encoded = Option::<String>::deserialize(deserializer)?;
        encoded
            .map(|s| STANDARD.decode(s).map_err(serde::de::Error::custom))
            .transpose()
    }
}

/// Errors that reject a request.
///
/// Configuration errors are raised before any pixel is processed;
/// input errors as soon as the image bytes are inspected.
///
/// Uses custom `Serialize`/`Deserialize` because `image::ImageError`
/// does not implement serde traits.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    /// The input image bytes were empty.
    #[error("input image data is empty")]
    EmptyInput,

    /// Failed to decode the input image.
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),

    /// An axis range cannot be mapped.
    #[error("invalid {axis} axis: {reason}")]
    InvalidAxis { axis: AxisName, reason: String },

    /// `min_size` must be positive.
    #[error("min_size must be positive")]
    InvalidMinSize,

    /// `bin_size` must be positive.
    #[error("bin_size must be positive")]
    InvalidBinSize,

    /// Feature flags were set for a mode that does not support them.
    #[error("incompatible mode/flag combination: {0}")]
    IncompatibleFlags(String),

    /// A selected color is not in the palette.
    #[error("unknown color: {0}")]
    UnknownColor(String),

    /// No colors were selected outside auto-color mode.
    #[error("no colors selected; a color list is required unless mode is auto_color")]
    NoColorsSelected,

    /// Other configuration problems.
    #[error("invalid extraction configuration: {0}")]
    InvalidConfig(String),

    /// The preview overlay could not be encoded.
    #[error("failed to encode preview image: {0}")]
    PreviewEncode(String),
}

impl ExtractionError {
    /// Whether the caller must fix the configuration and resubmit.
    #[must_use]
    pub const fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidAxis { .. }
                | Self::InvalidMinSize
                | Self::InvalidBinSize
                | Self::IncompatibleFlags(_)
                | Self::UnknownColor(_)
                | Self::NoColorsSelected
                | Self::InvalidConfig(_)
        )
    }

    /// Whether the image bytes themselves were rejected.
    #[must_use]
    pub const fn is_input_error(&self) -> bool {
        matches!(self, Self::EmptyInput | Self::ImageDecode(_))
    }
}

/// Serde-compatible proxy for `ExtractionError`.
///
/// The `ImageDecode` variant stores its `Display` string. A
/// deserialized decode error comes back as `InvalidConfig` carrying
/// that message, since the typed `image::ImageError` cannot be rebuilt.
#[derive(Serialize, Deserialize)]
enum ExtractionErrorProxy {
    EmptyInput,
    ImageDecode(String),
    InvalidAxis { axis: AxisName, reason: String },
    InvalidMinSize,
    InvalidBinSize,
    IncompatibleFlags(String),
    UnknownColor(String),
    NoColorsSelected,
    InvalidConfig(String),
    PreviewEncode(String),
}

impl Serialize for ExtractionError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let proxy = match self {
            Self::EmptyInput => ExtractionErrorProxy::EmptyInput,
            Self::ImageDecode(e) => ExtractionErrorProxy::ImageDecode(e.to_string()),
            Self::InvalidAxis { axis, reason } => ExtractionErrorProxy::InvalidAxis {
                axis: *axis,
                reason: reason.clone(),
            },
            Self::InvalidMinSize => ExtractionErrorProxy::InvalidMinSize,
            Self::InvalidBinSize => ExtractionErrorProxy::InvalidBinSize,
            Self::IncompatibleFlags(s) => ExtractionErrorProxy::IncompatibleFlags(s.clone()),
            Self::UnknownColor(s) => ExtractionErrorProxy::UnknownColor(s.clone()),
            Self::NoColorsSelected => ExtractionErrorProxy::NoColorsSelected,
            Self::InvalidConfig(s) => ExtractionErrorProxy::InvalidConfig(s.clone()),
            Self::PreviewEncode(s) => ExtractionErrorProxy::PreviewEncode(s.clone()),
        };
        proxy.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for ExtractionError {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let proxy = ExtractionErrorProxy::deserialize(deserializer)?;
        Ok(match proxy {
            ExtractionErrorProxy::EmptyInput => Self::EmptyInput,
            ExtractionErrorProxy::ImageDecode(msg) => {
                Self::InvalidConfig(format!("image decode error: {msg}"))
            }
            ExtractionErrorProxy::InvalidAxis { axis, reason } => {
                Self::InvalidAxis { axis, reason }
            }
            ExtractionErrorProxy::InvalidMinSize => Self::InvalidMinSize,
            ExtractionErrorProxy::InvalidBinSize => Self::InvalidBinSize,
            ExtractionErrorProxy::IncompatibleFlags(s) => Self::IncompatibleFlags(s),
            ExtractionErrorProxy::UnknownColor(s) => Self::UnknownColor(s),
            ExtractionErrorProxy::NoColorsSelected => Self::NoColorsSelected,
            ExtractionErrorProxy::InvalidConfig(s) => Self::InvalidConfig(s),
            ExtractionErrorProxy::PreviewEncode(s) => Self::PreviewEncode(s),
        })
    }
}
