//! HSV color bands, the default palette, and pre-flight color detection.
//!
//! HSV values follow the OpenCV 8-bit convention: hue `0..=180`
//! (degrees halved), saturation and value `0..=255`. Bands that share a
//! canonical base name (`red` and `red2`) are merged into one
//! [`ColorGroup`] before any pixel work, so a hue range that wraps
//! around 0 is expressed as two bands and still yields one curve.

use image::Rgb;
use palette::{FromColor, Hsv, Srgb};
use serde::{Deserialize, Serialize};

use crate::types::{ExtractionError, GrayImage, PlotRect, RgbImage};

/// Per-pixel HSV triples stored in a three-channel `u8` buffer.
pub type HsvImage = image::ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Largest hue value on the OpenCV scale.
pub const HUE_MAX: u8 = 180;

/// Characteristic fraction for the detection confidence curve.
const CONFIDENCE_SCALE: f64 = 0.002;

/// Inclusive HSV box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    /// Lower bound `[h, s, v]`.
    pub lower: [u8; 3],
    /// Upper bound `[h, s, v]`.
    pub upper: [u8; 3],
}

impl HsvRange {
    #[must_use]
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    /// Whether `hsv` lies inside the box on every channel.
    #[must_use]
    pub const fn contains(&self, hsv: [u8; 3]) -> bool {
        hsv[0] >= self.lower[0]
            && hsv[0] <= self.upper[0]
            && hsv[1] >= self.lower[1]
            && hsv[1] <= self.upper[1]
            && hsv[2] >= self.lower[2]
            && hsv[2] <= self.upper[2]
    }

    /// Widen every channel by `tolerance`, saturating at the channel limits.
    #[must_use]
    pub fn widened(&self, tolerance: u8) -> Self {
        let mut lower = self.lower;
        let mut upper = self.upper;
        for c in 0..3 {
            lower[c] = lower[c].saturating_sub(tolerance);
            upper[c] = upper[c].saturating_add(tolerance);
        }
        upper[0] = upper[0].min(HUE_MAX);
        Self { lower, upper }
    }

    /// Box center as HSV.
    #[must_use]
    pub const fn center(&self) -> [u8; 3] {
        [
            self.lower[0].midpoint(self.upper[0]),
            self.lower[1].midpoint(self.upper[1]),
            self.lower[2].midpoint(self.upper[2]),
        ]
    }
}

/// A named HSV band as configured by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorBand {
    /// Band name; trailing digits are stripped to get the canonical
    /// color (`red2` -> `red`).
    pub name: String,
    /// HSV box.
    #[serde(flatten)]
    pub range: HsvRange,
    /// Extra margin added to every channel of the box.
    #[serde(default)]
    pub tolerance: u8,
    /// Display color for previews and exports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display: Option<[u8; 3]>,
}

impl ColorBand {
    #[must_use]
    pub fn new(name: impl Into<String>, lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self {
            name: name.into(),
            range: HsvRange::new(lower, upper),
            tolerance: 0,
            display: None,
        }
    }

    /// Set the tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: u8) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// The range after applying the tolerance.
    #[must_use]
    pub fn effective_range(&self) -> HsvRange {
        self.range.widened(self.tolerance)
    }

    /// Canonical color name.
    #[must_use]
    pub fn canonical(&self) -> String {
        canonical_name(&self.name)
    }
}

/// All bands of one canonical color, merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorGroup {
    /// Canonical name; also the curve's `color`.
    pub name: String,
    /// Effective ranges (tolerance applied), in band order.
    pub ranges: Vec<HsvRange>,
    /// RGB used to draw this color.
    pub display: [u8; 3],
}

impl ColorGroup {
    /// Whether `hsv` matches any of the group's ranges.
    #[must_use]
    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        self.ranges.iter().any(|r| r.contains(hsv))
    }

    /// Human-readable label: the name with its first letter capitalised.
    #[must_use]
    pub fn label(&self) -> String {
        label_for(&self.name)
    }
}

/// `name` with its first letter capitalised.
#[must_use]
pub fn label_for(name: &str) -> String {
    let mut chars = name.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Strip trailing digits and lowercase: `"Red2"` -> `"red"`.
///
/// A name made only of digits is returned lowercased as-is.
#[must_use]
pub fn canonical_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let stripped = lowered.trim_end_matches(|c: char| c.is_ascii_digit());
    if stripped.is_empty() {
        lowered
    } else {
        stripped.to_string()
    }
}

/// Default display RGB for the built-in palette colors.
#[must_use]
pub fn default_display(canonical: &str) -> Option<[u8; 3]> {
    Some(match canonical {
        "red" => [220, 30, 30],
        "orange" => [255, 140, 0],
        "yellow" => [230, 200, 0],
        "green" => [30, 160, 60],
        "cyan" => [0, 180, 200],
        "blue" => [30, 60, 220],
        "purple" => [140, 50, 180],
        "black" => [20, 20, 20],
        _ => return None,
    })
}

/// The built-in palette.
#[must_use]
pub fn default_palette() -> Vec<ColorBand> {
    vec![
        ColorBand::new("red", [0, 100, 100], [10, 255, 255]),
        ColorBand::new("red2", [160, 100, 100], [180, 255, 255]),
        ColorBand::new("orange", [10, 100, 100], [20, 255, 255]),
        ColorBand::new("yellow", [20, 100, 100], [35, 255, 255]),
        ColorBand::new("green", [40, 50, 50], [80, 255, 255]),
        ColorBand::new("cyan", [80, 100, 100], [100, 255, 255]),
        ColorBand::new("blue", [100, 100, 50], [130, 255, 255]),
        ColorBand::new("purple", [130, 50, 50], [160, 255, 255]),
        ColorBand::new("black", [0, 0, 0], [180, 255, 50]),
    ]
}

/// Merge bands by canonical name, keeping first-appearance order.
#[must_use]
pub fn merge_bands(bands: &[ColorBand]) -> Vec<ColorGroup> {
    let mut groups: Vec<ColorGroup> = Vec::new();
    for band in bands {
        let name = band.canonical();
        let range = band.effective_range();
        if let Some(group) = groups.iter_mut().find(|g| g.name == name) {
            group.ranges.push(range);
            continue;
        }
        let display = band
            .display
            .or_else(|| default_display(&name))
            .unwrap_or_else(|| hsv_to_rgb(range.center()));
        groups.push(ColorGroup {
            name,
            ranges: vec![range],
            display,
        });
    }
    groups
}

/// Resolve the caller's color selection against the palette.
///
/// Names are canonicalised and de-duplicated, keeping first
/// occurrence order.
///
/// # Errors
///
/// Returns [`ExtractionError::UnknownColor`] for a name with no
/// matching palette group.
pub fn resolve_selection(
    selected: &[String],
    palette: &[ColorBand],
) -> Result<Vec<ColorGroup>, ExtractionError> {
    let groups = merge_bands(palette);
    let mut resolved: Vec<ColorGroup> = Vec::new();
    for name in selected {
        let canonical = canonical_name(name);
        if resolved.iter().any(|g| g.name == canonical) {
            continue;
        }
        let group = groups
            .iter()
            .find(|g| g.name == canonical)
            .ok_or_else(|| ExtractionError::UnknownColor(name.clone()))?;
        resolved.push(group.clone());
    }
    Ok(resolved)
}

/// Convert one sRGB pixel to OpenCV-scale HSV.
#[must_use]
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let srgb: Srgb<f32> = Srgb::new(rgb[0], rgb[1], rgb[2]).into_format();
    let hsv = Hsv::from_color(srgb);
    let hue = hsv.hue.into_positive_degrees() / 2.0;
    [
        to_channel(hue, HUE_MAX),
        to_channel(hsv.saturation * 255.0, 255),
        to_channel(hsv.value * 255.0, 255),
    ]
}

/// Convert OpenCV-scale HSV back to sRGB.
#[must_use]
pub fn hsv_to_rgb(hsv: [u8; 3]) -> [u8; 3] {
    let color = Hsv::new(
        f32::from(hsv[0]) * 2.0,
        f32::from(hsv[1]) / 255.0,
        f32::from(hsv[2]) / 255.0,
    );
    let rgb: Srgb<u8> = Srgb::<f32>::from_color(color).into_format();
    [rgb.red, rgb.green, rgb.blue]
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_channel(value: f32, max: u8) -> u8 {
    value.round().clamp(0.0, f32::from(max)) as u8
}

/// Convert a whole image to HSV.
#[must_use]
pub fn to_hsv_image(rgb: &RgbImage) -> HsvImage {
    HsvImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        Rgb(rgb_to_hsv(rgb.get_pixel(x, y).0))
    })
}

/// Binary mask (255 inside, 0 outside) of pixels inside `region` that
/// match `group`.
#[must_use]
pub fn hsv_mask(hsv: &HsvImage, group: &ColorGroup, region: PlotRect) -> GrayImage {
    GrayImage::from_fn(hsv.width(), hsv.height(), |x, y| {
        let on = region.contains(x, y) && group.contains(hsv.get_pixel(x, y).0);
        image::Luma([if on { 255 } else { 0 }])
    })
}

/// One entry of the pre-flight report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColorDetection {
    /// Canonical color name.
    pub color: String,
    /// Pixels inside any of the color's ranges.
    pub pixel_count: u64,
    /// `pixel_count` over the image area.
    pub fraction: f64,
    /// `1 - exp(-fraction / 0.002)`; monotone in `pixel_count`.
    pub confidence: f64,
}

/// Detection confidence for a pixel fraction.
#[must_use]
pub fn confidence(fraction: f64) -> f64 {
    1.0 - (-fraction / CONFIDENCE_SCALE).exp()
}

/// Count matching pixels for every group, in group order.
#[must_use]
pub fn count_groups(hsv: &HsvImage, groups: &[ColorGroup]) -> Vec<ColorDetection> {
    let area = u64::from(hsv.width()) * u64::from(hsv.height());
    groups
        .iter()
        .map(|group| {
            let pixel_count = hsv.pixels().filter(|p| group.contains(p.0)).count() as u64;
            #[allow(clippy::cast_precision_loss)]
            let fraction = if area == 0 {
                0.0
            } else {
                pixel_count as f64 / area as f64
            };
            ColorDetection {
                color: group.name.clone(),
                pixel_count,
                fraction,
                confidence: confidence(fraction),
            }
        })
        .collect()
}

/// Report which colors are present in `image`.
///
/// With `bands`, every merged band is reported (zero counts included).
/// Without, the default palette is used and only colors with at least
/// one pixel are reported, in palette order. An empty image yields no
/// detections.
#[must_use]
pub fn detect_colors(image: &RgbImage, bands: Option<&[ColorBand]>) -> Vec<ColorDetection> {
    if image.width() == 0 || image.height() == 0 {
        return Vec::new();
    }
    let hsv = to_hsv_image(image);
    match bands {
        Some(bands) => count_groups(&hsv, &merge_bands(bands)),
        None => count_groups(&hsv, &merge_bands(&default_palette()))
            .into_iter()
            .filter(|d| d.pixel_count > 0)
            .collect(),
    }
}
