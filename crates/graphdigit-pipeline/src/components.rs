//! Mask cleanup: morphological closing and connected-component
//! area filtering.
//!
//! Closing (dilate then erode, 3×3 square) bridges one-pixel breaks in
//! a curve stroke before components are labelled, so a dashed or
//! anti-aliased line is not split into fragments that individually fall
//! under `min_size`. Components use 8-connectivity.

use image::Luma;
use imageproc::distance_transform::Norm;
use imageproc::morphology::close;
use imageproc::region_labelling::{Connectivity, connected_components};

use crate::types::GrayImage;

/// Closing radius under the L-infinity norm (3×3 square).
pub const CLOSING_RADIUS: u8 = 1;

/// Counts from one component-filtering pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentStats {
    /// Components found.
    pub total: usize,
    /// Components at least `min_size` pixels.
    pub kept: usize,
    /// Pixels in the kept components.
    pub kept_pixels: u64,
    /// Area of each kept component, in label order.
    pub kept_areas: Vec<u64>,
}

/// Number of set pixels in a binary mask.
#[must_use]
pub fn count_set(mask: &GrayImage) -> u64 {
    mask.pixels().map(|p| u64::from(p.0[0] > 0)).sum()
}

/// 3×3 morphological closing.
#[must_use = "returns the closed mask"]
pub fn close_gaps(mask: &GrayImage) -> GrayImage {
    close(mask, Norm::LInf, CLOSING_RADIUS)
}

/// Keep only 8-connected components of at least `min_size` pixels.
#[must_use = "returns the filtered mask and its statistics"]
pub fn filter_components(mask: &GrayImage, min_size: u32) -> (GrayImage, ComponentStats) {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let total = labels.pixels().map(|p| p.0[0]).max().unwrap_or(0) as usize;

    let mut areas = vec![0u64; total + 1];
    for p in labels.pixels() {
        areas[p.0[0] as usize] += 1;
    }
    let keep: Vec<bool> = areas
        .iter()
        .enumerate()
        .map(|(label, &area)| label != 0 && area >= u64::from(min_size))
        .collect();

    let filtered = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        Luma([if keep[labels.get_pixel(x, y).0[0] as usize] { 255 } else { 0 }])
    });
    let kept_areas: Vec<u64> = areas
        .iter()
        .zip(&keep)
        .filter(|&(_, k)| *k)
        .map(|(&a, _)| a)
        .collect();
    let stats = ComponentStats {
        total,
        kept: kept_areas.len(),
        kept_pixels: kept_areas.iter().sum(),
        kept_areas,
    };
    (filtered, stats)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_mask(width: u32, height: u32, rects: &[(u32, u32, u32, u32)]) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            let inside = rects
                .iter()
                .any(|&(x0, y0, x1, y1)| x >= x0 && x < x1 && y >= y0 && y < y1);
            Luma([if inside { 255 } else { 0 }])
        })
    }

    #[test]
    fn small_components_are_dropped() {
        // 100x3 = 300 px line, 5x5 = 25 px speck.
        let mask = rect_mask(120, 40, &[(0, 10, 100, 13), (110, 30, 115, 35)]);
        let (filtered, stats) = filter_components(&mask, 100);
        assert_eq!(stats.total, 2);
        assert_eq!(stats.kept, 1);
        assert_eq!(stats.kept_pixels, 300);
        assert_eq!(count_set(&filtered), 300);
        assert_eq!(filtered.get_pixel(112, 32).0[0], 0);
    }

    #[test]
    fn every_kept_component_meets_min_size() {
        let mask = rect_mask(
            200,
            50,
            &[(0, 0, 10, 10), (20, 0, 30, 5), (40, 0, 90, 4), (100, 20, 200, 22)],
        );
        for min_size in [1, 50, 100, 199, 200, 201] {
            let (_, stats) = filter_components(&mask, min_size);
            assert!(stats.kept_areas.iter().all(|&a| a >= u64::from(min_size)));
        }
        let (_, stats) = filter_components(&mask, 200);
        assert_eq!(stats.kept_areas, vec![200, 200]);
    }

    #[test]
    fn diagonal_pixels_are_one_component() {
        let mask = GrayImage::from_fn(10, 10, |x, y| Luma([if x == y { 255 } else { 0 }]));
        let (_, stats) = filter_components(&mask, 10);
        assert_eq!(stats.total, 1);
        assert_eq!(stats.kept, 1);
    }

    #[test]
    fn closing_bridges_single_pixel_gap() {
        // Two 50x3 segments separated by a one-column gap.
        let mask = rect_mask(120, 20, &[(10, 8, 60, 11), (61, 8, 111, 11)]);
        let (_, before) = filter_components(&mask, 1);
        let (_, after) = filter_components(&close_gaps(&mask), 1);
        assert_eq!(before.total, 2);
        assert_eq!(after.total, 1);
    }

    #[test]
    fn empty_mask_has_no_components() {
        let (filtered, stats) = filter_components(&GrayImage::new(8, 8), 1);
        assert_eq!(stats, ComponentStats::default());
        assert_eq!(count_set(&filtered), 0);
    }
}
