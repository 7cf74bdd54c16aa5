//! Edge-guided denoising.
//!
//! Plot curves are thin strokes, so every curve pixel lies within a
//! couple of pixels of a strong intensity edge. Large flat regions of
//! the same hue (filled legend swatches, shaded bands, JPEG blocks)
//! have no edge support in their interior. The support map is the
//! thresholded Sobel gradient magnitude, dilated by
//! [`SUPPORT_RADIUS`]; the color mask is ANDed with it.

use image::Luma;
use imageproc::distance_transform::Norm;
use imageproc::gradients::sobel_gradients;
use imageproc::morphology::dilate;

use crate::types::GrayImage;

/// Sobel magnitude at or above which a pixel is an edge.
pub const EDGE_THRESHOLD: u16 = 60;
const _: () = assert!(EDGE_THRESHOLD > 0);

/// Dilation radius (L-infinity) of the support map.
pub const SUPPORT_RADIUS: u8 = 2;

/// Binary support map: 255 within [`SUPPORT_RADIUS`] of an edge.
#[must_use = "returns the edge support map"]
pub fn edge_support(gray: &GrayImage) -> GrayImage {
    let gradients = sobel_gradients(gray);
    let edges = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        Luma([if gradients.get_pixel(x, y).0[0] >= EDGE_THRESHOLD { 255 } else { 0 }])
    });
    dilate(&edges, Norm::LInf, SUPPORT_RADIUS)
}

/// Keep mask pixels that have edge support. Returns the gated mask and
/// the number of pixels removed.
#[must_use = "returns the gated mask"]
pub fn gate(mask: &GrayImage, support: &GrayImage) -> (GrayImage, u64) {
    let mut removed = 0;
    let gated = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        let on = mask.get_pixel(x, y).0[0] > 0;
        let supported = support.get_pixel(x, y).0[0] > 0;
        if on && !supported {
            removed += 1;
        }
        Luma([if on && supported { 255 } else { 0 }])
    });
    (gated, removed)
}
