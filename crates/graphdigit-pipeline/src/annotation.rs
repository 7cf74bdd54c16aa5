//! Legend and annotation box masking.
//!
//! Legends are drawn as a dark rectangular frame around color swatches
//! and text; the swatches match the series colors and would otherwise
//! be extracted as curve fragments.
//!
//! Rows and columns of the plot's frame mask (see
//! [`frame_mask`](crate::plot_area::frame_mask)) that are longer than
//! [`MAX_FRAME_FRACTION`] of the plot are cleared first. A legend drawn
//! into a corner of a boxed plot shares two of its sides with the plot
//! frame; without the frame lines its remaining sides still outline the
//! legend box. A legend frame is then a connected component that
//!
//! - has a bounding box of at least [`MIN_FRAME_WIDTH`] ×
//!   [`MIN_FRAME_HEIGHT`] and at most [`MAX_FRAME_FRACTION`] of the
//!   plot in each direction,
//! - keeps at least [`PERIMETER_FRACTION`] of its pixels within
//!   [`PERIMETER_BAND`] of the bounding-box edge, and
//! - fills at most [`MAX_FILL`] of its bounding box (a hollow frame,
//!   not a solid glyph).
//!
//! The frame's box, inflated by [`PERIMETER_BAND`], is suppressed,
//! except for relax bands along the left (y) and bottom (x) axes of the
//! plot: curves often run along an axis, and an annotation touching the
//! axis must never remove them.

use image::Luma;
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::plot_area::{column_counts, row_counts};
use crate::types::{GrayImage, PlotRect};

/// Minimum frame width in pixels.
pub const MIN_FRAME_WIDTH: u32 = 12;
/// Minimum frame height in pixels.
pub const MIN_FRAME_HEIGHT: u32 = 8;
/// Maximum frame extent relative to the plot.
pub const MAX_FRAME_FRACTION: f64 = 0.6;
/// Distance from the bounding-box edge counted as "on the perimeter".
pub const PERIMETER_BAND: u32 = 2;
/// Share of pixels that must lie on the perimeter.
pub const PERIMETER_FRACTION: f64 = 0.9;
/// Largest share of the bounding box a frame may fill.
pub const MAX_FILL: f64 = 0.5;
/// Smallest relax band, in pixels.
pub const MIN_RELAX_PX: u32 = 4;
/// Relax band as a fraction of the plot span.
pub const RELAX_FRACTION: f64 = 0.03;

/// Detected annotation boxes and the resulting suppression mask.
#[derive(Debug, Clone)]
pub struct AnnotationMap {
    regions: Vec<PlotRect>,
    suppressed: GrayImage,
    suppressed_pixels: u64,
}

impl AnnotationMap {
    /// Suppressed rectangles (before relaxation), in detection order.
    #[must_use]
    pub fn regions(&self) -> &[PlotRect] {
        &self.regions
    }

    /// Whether pixel `(x, y)` is suppressed.
    #[must_use]
    pub fn is_suppressed(&self, x: u32, y: u32) -> bool {
        self.suppressed.get_pixel(x, y).0[0] > 0
    }

    /// Total suppressed pixels.
    #[must_use]
    pub const fn suppressed_pixels(&self) -> u64 {
        self.suppressed_pixels
    }

    /// Clear suppressed pixels from `mask`. Returns the masked copy and
    /// the number of pixels removed.
    #[must_use = "returns the masked copy"]
    pub fn apply(&self, mask: &GrayImage) -> (GrayImage, u64) {
        let mut removed = 0;
        let out = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
            let on = mask.get_pixel(x, y).0[0] > 0;
            if on && self.is_suppressed(x, y) {
                removed += 1;
                Luma([0])
            } else {
                Luma([if on { 255 } else { 0 }])
            }
        });
        (out, removed)
    }
}

/// Per-component bounding box and pixel tally.
#[derive(Debug, Clone, Copy)]
struct Blob {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixels: u64,
    perimeter: u64,
}

impl Blob {
    const fn new(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            pixels: 0,
            perimeter: 0,
        }
    }

    const fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    const fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }

    const fn near_edge(&self, x: u32, y: u32) -> bool {
        x - self.min_x < PERIMETER_BAND
            || self.max_x - x < PERIMETER_BAND
            || y - self.min_y < PERIMETER_BAND
            || self.max_y - y < PERIMETER_BAND
    }

    #[allow(clippy::cast_precision_loss)]
    fn is_frame(&self, plot: PlotRect) -> bool {
        let (w, h) = (self.width(), self.height());
        if w < MIN_FRAME_WIDTH || h < MIN_FRAME_HEIGHT {
            return false;
        }
        if f64::from(w) > MAX_FRAME_FRACTION * f64::from(plot.width())
            || f64::from(h) > MAX_FRAME_FRACTION * f64::from(plot.height())
        {
            return false;
        }
        let area = u64::from(w) * u64::from(h);
        self.perimeter as f64 >= PERIMETER_FRACTION * self.pixels as f64
            && self.pixels as f64 <= MAX_FILL * area as f64
    }
}

/// Relax band width for a plot span.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn relax_band(span: u32) -> u32 {
    ((RELAX_FRACTION * f64::from(span)).round() as u32).max(MIN_RELAX_PX)
}

/// The part of `frame` inside `plot`, minus rows and columns too long
/// to belong to a legend.
fn legend_candidates(frame: &GrayImage, plot: PlotRect) -> GrayImage {
    let inside = GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let on = plot.contains(x, y) && frame.get_pixel(x, y).0[0] > 0;
        Luma([if on { 255 } else { 0 }])
    });
    let too_long = |count: u32, span: u32| f64::from(count) > MAX_FRAME_FRACTION * f64::from(span);
    let line_rows: Vec<bool> = row_counts(&inside)
        .into_iter()
        .map(|c| too_long(c, plot.width()))
        .collect();
    let line_cols: Vec<bool> = column_counts(&inside)
        .into_iter()
        .map(|c| too_long(c, plot.height()))
        .collect();
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let line = line_rows[y as usize] || line_cols[x as usize];
        Luma([if line { 0 } else { inside.get_pixel(x, y).0[0] }])
    })
}

/// Find legend frames inside `plot` and build the suppression mask.
///
/// `frame` is the achromatic dark-pixel mask of the scene.
#[must_use]
pub fn detect_annotations(frame: &GrayImage, plot: PlotRect) -> AnnotationMap {
    let dark = legend_candidates(frame, plot);
    let labels = connected_components(&dark, Connectivity::Eight, Luma([0u8]));
    let count = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;

    let mut blobs: Vec<Option<Blob>> = vec![None; count + 1];
    for (x, y, p) in labels.enumerate_pixels() {
        let label = p.0[0] as usize;
        if label == 0 {
            continue;
        }
        let blob = blobs[label].get_or_insert_with(|| Blob::new(x, y));
        blob.min_x = blob.min_x.min(x);
        blob.min_y = blob.min_y.min(y);
        blob.max_x = blob.max_x.max(x);
        blob.max_y = blob.max_y.max(y);
        blob.pixels += 1;
    }
    for (x, y, p) in labels.enumerate_pixels() {
        if let Some(blob) = blobs[p.0[0] as usize].as_mut() {
            if blob.near_edge(x, y) {
                blob.perimeter += 1;
            }
        }
    }

    let regions: Vec<PlotRect> = blobs
        .iter()
        .flatten()
        .filter(|b| b.is_frame(plot))
        .map(|b| PlotRect {
            left: b.min_x.saturating_sub(PERIMETER_BAND).max(plot.left),
            top: b.min_y.saturating_sub(PERIMETER_BAND).max(plot.top),
            right: (b.max_x + 1 + PERIMETER_BAND).min(plot.right),
            bottom: (b.max_y + 1 + PERIMETER_BAND).min(plot.bottom),
        })
        .collect();

    let relax_x = plot.left + relax_band(plot.width());
    let relax_y = plot.bottom.saturating_sub(relax_band(plot.height()));
    let mut suppressed_pixels = 0;
    let suppressed = GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let relaxed = x < relax_x || y >= relax_y;
        let hit = !relaxed && regions.iter().any(|r| r.contains(x, y));
        if hit {
            suppressed_pixels += 1;
        }
        Luma([if hit { 255 } else { 0 }])
    });

    tracing::debug!(
        frames = regions.len(),
        suppressed_pixels,
        "annotation detection"
    );

    AnnotationMap {
        regions,
        suppressed,
        suppressed_pixels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plot(width: u32, height: u32) -> PlotRect {
        PlotRect {
            left: 0,
            top: 0,
            right: width,
            bottom: height,
        }
    }

    /// Frame mask with pixels set where `dark(x, y)` holds.
    fn draw(width: u32, height: u32, dark: impl Fn(u32, u32) -> bool) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| Luma([if dark(x, y) { 255 } else { 0 }]))
    }

    /// One-pixel rectangle outline with inclusive corners.
    fn outline(x: u32, y: u32, (x0, y0): (u32, u32), (x1, y1): (u32, u32)) -> bool {
        ((x0..=x1).contains(&x) && (y == y0 || y == y1))
            || ((y0..=y1).contains(&y) && (x == x0 || x == x1))
    }

    /// 400x300 mask with a 1px legend frame at x 280..=380, y 20..=80
    /// and some "text" inside it.
    fn legend_canvas() -> GrayImage {
        draw(400, 300, |x, y| {
            let text = (330..360).contains(&x) && (45..52).contains(&y) && x % 3 == 0;
            outline(x, y, (280, 20), (380, 80)) || text
        })
    }

    #[test]
    fn legend_frame_is_detected() {
        let map = detect_annotations(&legend_canvas(), plot(400, 300));
        assert_eq!(map.regions().len(), 1);
        let r = map.regions()[0];
        assert_eq!((r.left, r.top, r.right, r.bottom), (278, 18, 383, 83));
        assert!(map.is_suppressed(300, 40));
        assert!(!map.is_suppressed(100, 150));
    }

    #[test]
    fn solid_blocks_and_lines_are_not_frames() {
        let frame = draw(400, 300, |x, y| {
            let block = (50..80).contains(&x) && (50..70).contains(&y);
            let line = (100..300).contains(&x) && y == 150;
            block || line
        });
        let map = detect_annotations(&frame, plot(400, 300));
        assert!(map.regions().is_empty());
        assert_eq!(map.suppressed_pixels(), 0);
    }

    #[test]
    fn frames_larger_than_plot_fraction_are_ignored() {
        // The plot frame itself covers the whole plot.
        let frame = draw(200, 100, |x, y| outline(x, y, (0, 0), (199, 99)));
        assert!(detect_annotations(&frame, plot(200, 100)).regions().is_empty());
    }

    #[test]
    fn legend_sharing_plot_frame_corner_is_detected() {
        // Boxed plot with the legend drawn into its top-right corner: the
        // legend's top and right sides lie on the plot frame.
        let frame = draw(500, 300, |x, y| {
            outline(x, y, (20, 10), (480, 280)) || outline(x, y, (360, 10), (480, 90))
        });
        let map = detect_annotations(&frame, plot(500, 300));
        assert_eq!(map.regions().len(), 1);
        let r = map.regions()[0];
        assert_eq!((r.left, r.top, r.right, r.bottom), (358, 9, 482, 93));
        assert!(map.is_suppressed(385, 43));
        assert!(!map.is_suppressed(385, 130));
    }

    #[test]
    fn long_lines_are_cleared_before_labelling() {
        let frame = draw(100, 50, |x, y| y == 10 || (x == 40 && y < 20));
        let candidates = legend_candidates(&frame, plot(100, 50));
        assert_eq!(candidates.get_pixel(70, 10).0[0], 0);
        assert_eq!(candidates.get_pixel(40, 5).0[0], 255);
    }

    #[test]
    fn relax_bands_protect_axes() {
        // Legend frame touching the bottom-left corner of the plot.
        let frame = draw(400, 300, |x, y| outline(x, y, (0, 250), (60, 299)));
        let map = detect_annotations(&frame, plot(400, 300));
        assert_eq!(map.regions().len(), 1);
        // Relax bands: 12 px (3% of 400) from the left, 9 px (3% of 300) from the bottom.
        assert!(!map.is_suppressed(5, 270));
        assert!(!map.is_suppressed(30, 295));
        assert!(map.is_suppressed(30, 270));
    }

    #[test]
    fn apply_clears_suppressed_pixels() {
        let map = detect_annotations(&legend_canvas(), plot(400, 300));
        let mask = GrayImage::from_fn(400, 300, |_, y| Luma([if y == 40 { 255 } else { 0 }]));
        let (out, removed) = map.apply(&mask);
        assert_eq!(out.get_pixel(300, 40).0[0], 0);
        assert_eq!(out.get_pixel(100, 40).0[0], 255);
        assert_eq!(removed, 105);
    }

    #[test]
    fn relax_band_has_floor() {
        assert_eq!(relax_band(50), MIN_RELAX_PX);
        assert_eq!(relax_band(1000), 30);
    }
}
