//! Plot-area detection from dark frame lines.
//!
//! A plot's axes (and, for boxed plots, its frame) are long dark lines.
//! Frame candidates are achromatic dark pixels (see [`frame_mask`]), so
//! a flat colored curve is never taken for a border. Rows and columns
//! whose candidate count covers at least [`LINE_COVERAGE`] of the image
//! span are line candidates; the outermost candidate run in each half
//! of the image is taken as that side's border. The plot rectangle
//! starts just inside each border run so the line itself never reaches
//! the color masks.
//!
//! Only the left (y) and bottom (x) axes are required. A missing top or
//! right border is replaced by the extent of the left or bottom axis
//! line.

use image::Luma;

use crate::color::HsvImage;
use crate::types::{GrayImage, PlotRect};

/// HSV value below which a pixel counts as dark.
pub const DARK_VALUE: u8 = 128;

/// HSV saturation below which a pixel counts as achromatic.
pub const ACHROMATIC_SATURATION: u8 = 64;

/// Fraction of the span a border line must cover.
pub const LINE_COVERAGE: f64 = 0.5;

/// Smallest plot side accepted, in pixels.
const MIN_SIDE: u32 = 8;

/// A contiguous run of line rows or columns, `start..end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Run {
    start: u32,
    end: u32,
}

/// Binary mask (255 set) of achromatic dark pixels: frame lines, axes,
/// legend outlines and text.
#[must_use]
pub fn frame_mask(hsv: &HsvImage) -> GrayImage {
    GrayImage::from_fn(hsv.width(), hsv.height(), |x, y| {
        let [_, s, v] = hsv.get_pixel(x, y).0;
        Luma([if s < ACHROMATIC_SATURATION && v < DARK_VALUE { 255 } else { 0 }])
    })
}

fn is_set(mask: &GrayImage, x: u32, y: u32) -> bool {
    mask.get_pixel(x, y).0[0] > 0
}

/// Group indices whose flag is set into runs.
fn runs(flags: &[bool]) -> Vec<Run> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, &flag) in flags.iter().enumerate() {
        #[allow(clippy::cast_possible_truncation)]
        let i = i as u32;
        match (flag, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push(Run { start: s, end: i });
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        #[allow(clippy::cast_possible_truncation)]
        let end = flags.len() as u32;
        out.push(Run { start: s, end });
    }
    out
}

/// Whether `count` frame pixels cover enough of `span`.
fn covers(count: u32, span: u32) -> bool {
    f64::from(count) >= LINE_COVERAGE * f64::from(span)
}

/// Set pixels per row of `mask`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn row_counts(mask: &GrayImage) -> Vec<u32> {
    (0..mask.height())
        .map(|y| (0..mask.width()).filter(|&x| is_set(mask, x, y)).count() as u32)
        .collect()
}

/// Set pixels per column of `mask`.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn column_counts(mask: &GrayImage) -> Vec<u32> {
    (0..mask.width())
        .map(|x| (0..mask.height()).filter(|&y| is_set(mask, x, y)).count() as u32)
        .collect()
}

/// Detect the plot rectangle from a [`frame_mask`], or `None` when no
/// left and bottom axis lines are found.
#[must_use]
pub fn detect_plot_area(frame: &GrayImage) -> Option<PlotRect> {
    let (width, height) = frame.dimensions();
    if width < MIN_SIDE || height < MIN_SIDE {
        return None;
    }

    let row_lines: Vec<bool> = row_counts(frame).into_iter().map(|c| covers(c, width)).collect();
    let col_lines: Vec<bool> = column_counts(frame)
        .into_iter()
        .map(|c| covers(c, height))
        .collect();
    let row_runs = runs(&row_lines);
    let col_runs = runs(&col_lines);

    let left_axis = col_runs.iter().find(|r| r.start < width / 2).copied()?;
    let bottom_axis = row_runs.iter().rev().find(|r| r.end > height / 2).copied()?;
    let right_border = col_runs.iter().rev().find(|r| r.start >= width / 2).copied();
    let top_border = row_runs.iter().find(|r| r.end <= height / 2).copied();

    let left = left_axis.end;
    let bottom = bottom_axis.start;
    let top = top_border.map_or_else(|| axis_extent_top(frame, left_axis, bottom), |r| r.end);
    let right = right_border.map_or_else(
        || axis_extent_right(frame, bottom_axis, left, width),
        |r| r.start,
    );

    let rect = PlotRect {
        left,
        top,
        right,
        bottom,
    };
    (rect.width() >= MIN_SIDE && rect.height() >= MIN_SIDE).then_some(rect)
}

/// First row where the left axis line is set.
fn axis_extent_top(frame: &GrayImage, axis: Run, bottom: u32) -> u32 {
    let x = axis.start;
    (0..bottom).find(|&y| is_set(frame, x, y)).unwrap_or(0)
}

/// One past the last column where the bottom axis line is set.
fn axis_extent_right(frame: &GrayImage, axis: Run, left: u32, width: u32) -> u32 {
    let y = axis.start;
    (left..width)
        .rev()
        .find(|&x| is_set(frame, x, y))
        .map_or(width, |x| x + 1)
}
