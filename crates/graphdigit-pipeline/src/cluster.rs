//! Auto-color discovery: k-means over foreground pixel colors.
//!
//! Foreground pixels (saturated and bright enough to be a colored
//! series, so not page background, gridlines, axes, or black text) are
//! sampled at an even stride, converted to CIE Lab, and clustered with
//! k-means under CIEDE2000. Initialisation is deterministic (median
//! lightness first, then repeatedly the farthest sample), so identical
//! images always yield identical clusters.
//!
//! Each surviving cluster becomes a synthetic [`ColorGroup`] whose HSV
//! box spans the 2nd to 98th percentile of its members on every channel.
//! Hue is circular: a cluster straddling hue 0 gets two boxes.

use palette::color_difference::Ciede2000;
use palette::white_point::D65;
use palette::{FromColor, Lab, Srgb};
use rayon::prelude::*;

use crate::color::{ColorGroup, HUE_MAX, HsvImage, HsvRange};
use crate::config::AutoColorOptions;
use crate::types::{PlotRect, RgbImage};

/// Minimum saturation (OpenCV scale) of a foreground pixel.
pub const MIN_SATURATION: u8 = 60;
/// Minimum value (OpenCV scale) of a foreground pixel.
pub const MIN_VALUE: u8 = 60;
/// Iteration cap for k-means.
pub const MAX_ITERATIONS: usize = 20;
/// Clusters closer than this CIEDE2000 distance are merged.
pub const MERGE_DELTA_E: f32 = 20.0;
/// Clusters holding less than this share of the sample are dropped.
pub const MIN_CLUSTER_SHARE: f64 = 0.02;
/// Extra margin added to each discovered HSV box.
pub const BAND_TOLERANCE: u8 = 5;
/// Percentiles bounding each discovered HSV box.
const LOW_PERCENTILE: f64 = 0.02;
const HIGH_PERCENTILE: f64 = 0.98;

/// Name of the discovered color at zero-based `index`: `auto-1`,
/// `auto-2`, ...
#[must_use]
pub fn auto_name(index: usize) -> String {
    format!("auto-{}", index + 1)
}

/// Clustering outcome.
#[derive(Debug, Clone)]
pub struct Discovery {
    /// Discovered colors, largest cluster first, named with [`auto_name`].
    pub groups: Vec<ColorGroup>,
    /// Foreground pixels inside the plot.
    pub foreground_pixels: u64,
    /// Pixels fed to k-means.
    pub sampled: usize,
    /// k-means iterations run.
    pub iterations: usize,
}

impl Discovery {
    const fn empty(foreground_pixels: u64) -> Self {
        Self {
            groups: Vec::new(),
            foreground_pixels,
            sampled: 0,
            iterations: 0,
        }
    }
}

/// One foreground sample.
#[derive(Debug, Clone, Copy)]
struct Sample {
    lab: Lab<D65, f32>,
    hsv: [u8; 3],
}

/// Whether an HSV pixel is foreground.
#[must_use]
pub const fn is_foreground(hsv: [u8; 3]) -> bool {
    hsv[1] >= MIN_SATURATION && hsv[2] >= MIN_VALUE
}

fn to_lab(rgb: [u8; 3]) -> Lab<D65, f32> {
    Lab::from_color(Srgb::new(rgb[0], rgb[1], rgb[2]).into_format::<f32>())
}

/// Discover series colors inside `plot`.
///
/// Returns no groups when foreground pixels make up less than
/// `options.min_foreground_fraction` of the plot.
#[must_use]
pub fn discover(
    rgb: &RgbImage,
    hsv: &HsvImage,
    plot: PlotRect,
    options: &AutoColorOptions,
) -> Discovery {
    let foreground: Vec<(u32, u32)> = (plot.top..plot.bottom)
        .flat_map(|y| (plot.left..plot.right).map(move |x| (x, y)))
        .filter(|&(x, y)| is_foreground(hsv.get_pixel(x, y).0))
        .collect();
    let foreground_pixels = foreground.len() as u64;

    let plot_area = u64::from(plot.width()) * u64::from(plot.height());
    #[allow(clippy::cast_precision_loss)]
    let (needed, available) = (
        (options.min_foreground_fraction * plot_area as f64).max(1.0),
        foreground_pixels as f64,
    );
    if available < needed {
        return Discovery::empty(foreground_pixels);
    }

    let stride = foreground.len().div_ceil(options.sample_size).max(1);
    let samples: Vec<Sample> = foreground
        .iter()
        .step_by(stride)
        .map(|&(x, y)| Sample {
            lab: to_lab(rgb.get_pixel(x, y).0),
            hsv: hsv.get_pixel(x, y).0,
        })
        .collect();

    let labs: Vec<Lab<D65, f32>> = samples.iter().map(|s| s.lab).collect();
    let (centers, labels, iterations) = kmeans(&labs, options.max_clusters);

    let mut clusters: Vec<(Lab<D65, f32>, Vec<usize>)> = centers
        .into_iter()
        .map(|center| (center, Vec::new()))
        .collect();
    for (i, &label) in labels.iter().enumerate() {
        clusters[label].1.push(i);
    }
    let clusters = merge_close(clusters);

    #[allow(clippy::cast_precision_loss)]
    let min_members = MIN_CLUSTER_SHARE * samples.len() as f64;
    let groups = clusters
        .into_iter()
        .filter(|(_, members)| {
            #[allow(clippy::cast_precision_loss)]
            let n = members.len() as f64;
            n >= min_members && !members.is_empty()
        })
        .enumerate()
        .map(|(i, (center, members))| {
            let hsv: Vec<[u8; 3]> = members.iter().map(|&m| samples[m].hsv).collect();
            let display: Srgb<u8> = Srgb::<f32>::from_color(center).into_format();
            ColorGroup {
                name: auto_name(i),
                ranges: hsv_boxes(&hsv),
                display: [display.red, display.green, display.blue],
            }
        })
        .collect();

    Discovery {
        groups,
        foreground_pixels,
        sampled: samples.len(),
        iterations,
    }
}

/// Merge clusters closer than [`MERGE_DELTA_E`], largest first.
///
/// Returns clusters sorted by descending member count; ties keep
/// their k-means order.
fn merge_close(
    mut clusters: Vec<(Lab<D65, f32>, Vec<usize>)>,
) -> Vec<(Lab<D65, f32>, Vec<usize>)> {
    clusters.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    let mut merged: Vec<(Lab<D65, f32>, Vec<usize>)> = Vec::new();
    for (center, members) in clusters {
        if members.is_empty() {
            continue;
        }
        match merged
            .iter_mut()
            .find(|(c, _)| c.difference(center) < MERGE_DELTA_E)
        {
            Some((_, existing)) => existing.extend(members),
            None => merged.push((center, members)),
        }
    }
    for (_, members) in &mut merged {
        members.sort_unstable();
    }
    merged.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    merged
}

/// Deterministic k-means. Returns centers, per-sample labels, and the
/// iteration count.
fn kmeans(pixels: &[Lab<D65, f32>], k: usize) -> (Vec<Lab<D65, f32>>, Vec<usize>, usize) {
    if pixels.is_empty() || k == 0 {
        return (Vec::new(), Vec::new(), 0);
    }
    let mut centers = init_centers(pixels, k.min(pixels.len()));
    let mut labels = vec![usize::MAX; pixels.len()];
    let mut iterations = 0;

    for _ in 0..MAX_ITERATIONS {
        iterations += 1;
        let new_labels: Vec<usize> = pixels
            .par_iter()
            .map(|pixel| nearest(*pixel, &centers))
            .collect();
        let changed = new_labels != labels;
        labels = new_labels;
        if !changed {
            break;
        }

        let mut sums = vec![(0.0f64, 0.0f64, 0.0f64, 0u64); centers.len()];
        for (pixel, &label) in pixels.iter().zip(&labels) {
            let s = &mut sums[label];
            s.0 += f64::from(pixel.l);
            s.1 += f64::from(pixel.a);
            s.2 += f64::from(pixel.b);
            s.3 += 1;
        }
        for (center, (l, a, b, n)) in centers.iter_mut().zip(sums) {
            if n > 0 {
                #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
                let mean = |sum: f64| (sum / n as f64) as f32;
                *center = Lab::new(mean(l), mean(a), mean(b));
            }
        }
    }
    (centers, labels, iterations)
}

fn nearest(pixel: Lab<D65, f32>, centers: &[Lab<D65, f32>]) -> usize {
    let mut best = 0;
    let mut best_dist = f32::MAX;
    for (i, center) in centers.iter().enumerate() {
        let d = pixel.difference(*center);
        if d < best_dist {
            best_dist = d;
            best = i;
        }
    }
    best
}

/// Median-lightness seed, then farthest-point selection. Stops early
/// when every sample coincides with a chosen center.
fn init_centers(pixels: &[Lab<D65, f32>], k: usize) -> Vec<Lab<D65, f32>> {
    let mut by_lightness: Vec<usize> = (0..pixels.len()).collect();
    by_lightness.sort_by(|&a, &b| pixels[a].l.total_cmp(&pixels[b].l).then(a.cmp(&b)));
    let first = pixels[by_lightness[pixels.len() / 2]];
    let mut centers = vec![first];

    let mut min_distances: Vec<f32> = pixels.par_iter().map(|p| p.difference(first)).collect();
    while centers.len() < k {
        let Some((index, &distance)) = min_distances
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(&a.0)))
        else {
            break;
        };
        if distance <= 0.0 {
            break;
        }
        let center = pixels[index];
        min_distances
            .par_iter_mut()
            .zip(pixels.par_iter())
            .for_each(|(min_d, pixel)| {
                let d = pixel.difference(center);
                if d < *min_d {
                    *min_d = d;
                }
            });
        centers.push(center);
    }
    centers
}

/// Value at quantile `q` of sorted data (nearest rank).
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn quantile<T: Copy>(sorted: &[T], q: f64) -> T {
    let index = (q * (sorted.len() - 1) as f64).round() as usize;
    sorted[index.min(sorted.len() - 1)]
}

/// HSV boxes covering the central percentiles of `members`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn hsv_boxes(members: &[[u8; 3]]) -> Vec<HsvRange> {
    let mut sat: Vec<u8> = members.iter().map(|p| p[1]).collect();
    let mut val: Vec<u8> = members.iter().map(|p| p[2]).collect();
    sat.sort_unstable();
    val.sort_unstable();
    let s = (
        quantile(&sat, LOW_PERCENTILE).saturating_sub(BAND_TOLERANCE),
        quantile(&sat, HIGH_PERCENTILE).saturating_add(BAND_TOLERANCE),
    );
    let v = (
        quantile(&val, LOW_PERCENTILE).saturating_sub(BAND_TOLERANCE),
        quantile(&val, HIGH_PERCENTILE).saturating_add(BAND_TOLERANCE),
    );

    // Rotate hues so the widest empty arc of the circle sits at the seam.
    let period = u16::from(HUE_MAX);
    let hues: Vec<u16> = members.iter().map(|p| u16::from(p[0]) % period).collect();
    let offset = circular_offset(&hues, period);
    let mut rotated: Vec<u16> = hues.iter().map(|h| (h + period - offset) % period).collect();
    rotated.sort_unstable();
    let tolerance = u16::from(BAND_TOLERANCE);
    let low = i32::from(quantile(&rotated, LOW_PERCENTILE) + offset) - i32::from(tolerance);
    let high = i32::from(quantile(&rotated, HIGH_PERCENTILE) + offset) + i32::from(tolerance);

    let hue_max = i32::from(HUE_MAX);
    let range = |h0: i32, h1: i32| HsvRange::new([h0 as u8, s.0, v.0], [h1 as u8, s.1, v.1]);
    if high - low >= hue_max {
        vec![range(0, hue_max)]
    } else if low < 0 {
        vec![range(0, high), range(low + hue_max, hue_max)]
    } else if high > hue_max {
        vec![range(low, hue_max), range(0, high - hue_max)]
    } else {
        vec![range(low, high)]
    }
}

/// Rotation that places the largest gap between occupied hues at the
/// seam of the circle.
fn circular_offset(hues: &[u16], period: u16) -> u16 {
    let mut occupied = vec![false; usize::from(period)];
    for &h in hues {
        occupied[usize::from(h)] = true;
    }
    let mut best_start = 0;
    let mut best_len = 0;
    let p = usize::from(period);
    for start in 0..p {
        if occupied[start] || !occupied[(start + p - 1) % p] {
            continue;
        }
        let len = (0..p).take_while(|i| !occupied[(start + i) % p]).count();
        if len > best_len {
            best_len = len;
            best_start = start;
        }
    }
    #[allow(clippy::cast_possible_truncation)]
    let offset = ((best_start + best_len) % p) as u16;
    offset
}
