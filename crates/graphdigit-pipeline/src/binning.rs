//! Column binning of a filtered mask.
//!
//! Masked pixels are grouped by column into bins spanning the plot's x
//! range. Each bin carries its pixel-space x (the geometric center of
//! the columns it covers) and the y of every masked pixel inside it.
//! Bins are produced left to right and never overlap, so bin x values
//! are strictly increasing without any sorting.
//!
//! Pixel coordinates are continuous: column `c` spans `[c, c + 1)`, so
//! a pixel's center is at `c + 0.5`.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::types::{GrayImage, PlotRect};

/// Upper bound on an adaptive bin, in multiples of `bin_size`.
pub const ADAPTIVE_MAX_WIDTH_FACTOR: u32 = 4;

/// How columns are grouped into bins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BinningKind {
    /// Every bin spans `bin_size` columns.
    #[default]
    Fixed,
    /// Bin width follows local pixel density.
    Adaptive,
}

impl fmt::Display for BinningKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed => write!(f, "Fixed"),
            Self::Adaptive => write!(f, "Adaptive"),
        }
    }
}

/// One bin: its x position and the masked y samples it collected.
#[derive(Debug, Clone, PartialEq)]
pub struct Bin {
    /// Pixel-space x of the bin center.
    pub x: f64,
    /// Pixel-space y of every masked pixel in the bin.
    pub ys: Vec<f64>,
}

/// Collect masked y samples per column inside `rect`.
///
/// The returned vector has one entry per column from `rect.left`.
#[must_use]
pub fn column_samples(mask: &GrayImage, rect: PlotRect) -> Vec<Vec<f64>> {
    (rect.left..rect.right)
        .map(|x| {
            (rect.top..rect.bottom)
                .filter(|&y| mask.get_pixel(x, y).0[0] > 0)
                .map(|y| f64::from(y) + 0.5)
                .collect()
        })
        .collect()
}

/// Bin a mask with the given strategy. Empty bins are omitted.
#[must_use]
pub fn bin_mask(mask: &GrayImage, rect: PlotRect, bin_size: u32, kind: BinningKind) -> Vec<Bin> {
    let columns = column_samples(mask, rect);
    match kind {
        BinningKind::Fixed => fixed_bins(&columns, rect.left, bin_size),
        BinningKind::Adaptive => adaptive_bins(&columns, rect.left, bin_size),
    }
}

/// Fixed-width bins of `bin_size` columns starting at column `left`.
#[must_use]
pub fn fixed_bins(columns: &[Vec<f64>], left: u32, bin_size: u32) -> Vec<Bin> {
    let size = bin_size.max(1) as usize;
    columns
        .chunks(size)
        .enumerate()
        .filter_map(|(i, chunk)| {
            let start = i * size;
            make_bin(columns, left, start, start + chunk.len())
        })
        .collect()
}

/// Density-driven bins.
///
/// A bin closes once it holds at least twice the median occupancy of
/// non-empty columns, at an empty column, or when it reaches
/// [`ADAPTIVE_MAX_WIDTH_FACTOR`] × `bin_size` columns. Dense runs of a
/// curve therefore get narrow bins and sparse runs wide ones.
#[must_use]
pub fn adaptive_bins(columns: &[Vec<f64>], left: u32, bin_size: u32) -> Vec<Bin> {
    let mut occupancy: Vec<usize> = columns
        .iter()
        .map(Vec::len)
        .filter(|&n| n > 0)
        .collect();
    if occupancy.is_empty() {
        return Vec::new();
    }
    occupancy.sort_unstable();
    let target = (occupancy[occupancy.len() / 2] * 2).max(1);
    let max_width = (bin_size.max(1) * ADAPTIVE_MAX_WIDTH_FACTOR) as usize;

    let mut bins = Vec::new();
    let mut start: Option<usize> = None;
    let mut held = 0;
    for (i, column) in columns.iter().enumerate() {
        if column.is_empty() {
            if let Some(s) = start.take() {
                bins.extend(make_bin(columns, left, s, i));
            }
            held = 0;
            continue;
        }
        let s = *start.get_or_insert(i);
        held += column.len();
        if held >= target || i + 1 - s >= max_width {
            bins.extend(make_bin(columns, left, s, i + 1));
            start = None;
            held = 0;
        }
    }
    if let Some(s) = start {
        bins.extend(make_bin(columns, left, s, columns.len()));
    }
    bins
}

/// Gather columns `start..end` into one bin, or `None` when empty.
fn make_bin(columns: &[Vec<f64>], left: u32, start: usize, end: usize) -> Option<Bin> {
    let ys: Vec<f64> = columns[start..end].iter().flatten().copied().collect();
    if ys.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let x = f64::from(left) + (start + end) as f64 / 2.0;
    Some(Bin { x, ys })
}
