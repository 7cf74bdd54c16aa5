//! Perspective correction from calibration anchors.
//!
//! The four anchors mark the plot corners in the source image
//! (top-left, top-right, bottom-right, bottom-left). The image is warped
//! so those corners land on the corners of the anchors' axis-aligned
//! bounding box, which becomes the plot rectangle used for scale
//! mapping. Image dimensions are unchanged.

use imageproc::geometric_transformations::{Interpolation, Projection, warp};

use crate::types::{Dimensions, ExtractionError, PlotRect, Point, RgbImage};

/// Fill color for pixels warped in from outside the source.
const BACKGROUND: image::Rgb<u8> = image::Rgb([255, 255, 255]);

/// Smallest accepted anchor box side, in pixels.
const MIN_SIDE: f64 = 2.0;

/// Axis-aligned bounds of the anchors: `(min_x, min_y, max_x, max_y)`.
#[must_use]
pub fn anchor_bounds(anchors: &[Point; 4]) -> (f64, f64, f64, f64) {
    anchors.iter().fold(
        (f64::INFINITY, f64::INFINITY, f64::NEG_INFINITY, f64::NEG_INFINITY),
        |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
    )
}

/// Destination corners: the anchor box in TL, TR, BR, BL order.
fn target_corners(anchors: &[Point; 4]) -> [Point; 4] {
    let (x0, y0, x1, y1) = anchor_bounds(anchors);
    [
        Point::new(x0, y0),
        Point::new(x1, y0),
        Point::new(x1, y1),
        Point::new(x0, y1),
    ]
}

#[allow(clippy::cast_possible_truncation)]
fn to_f32(points: &[Point; 4]) -> [(f32, f32); 4] {
    points.map(|p| (p.x as f32, p.y as f32))
}

/// Projection taking the anchors onto their bounding box.
///
/// # Errors
///
/// Returns [`ExtractionError::InvalidConfig`] for non-finite anchors,
/// a box narrower than two pixels, or collinear anchors.
pub fn projection(anchors: &[Point; 4]) -> Result<Projection, ExtractionError> {
    if anchors.iter().any(|p| !(p.x.is_finite() && p.y.is_finite())) {
        return Err(ExtractionError::InvalidConfig(
            "calibration anchors must be finite".to_string(),
        ));
    }
    let (x0, y0, x1, y1) = anchor_bounds(anchors);
    if x1 - x0 < MIN_SIDE || y1 - y0 < MIN_SIDE {
        return Err(ExtractionError::InvalidConfig(format!(
            "calibration anchors span {:.1}x{:.1} px, too small for a plot",
            x1 - x0,
            y1 - y0
        )));
    }
    Projection::from_control_points(to_f32(anchors), to_f32(&target_corners(anchors))).ok_or_else(
        || ExtractionError::InvalidConfig("calibration anchors are degenerate".to_string()),
    )
}

/// Plot rectangle covered by the anchor box, clipped to the image.
///
/// Anchors sit on the corner pixels, so both edges are inclusive of
/// the anchor columns and rows.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn anchor_rect(anchors: &[Point; 4], dimensions: Dimensions) -> PlotRect {
    let (x0, y0, x1, y1) = anchor_bounds(anchors);
    let clip = |v: f64, limit: u32| v.floor().clamp(0.0, f64::from(limit)) as u32;
    PlotRect {
        left: clip(x0, dimensions.width),
        top: clip(y0, dimensions.height),
        right: clip(x1 + 1.0, dimensions.width),
        bottom: clip(y1 + 1.0, dimensions.height),
    }
}

/// Whether the anchors already form their own bounding box.
#[must_use]
pub fn is_axis_aligned(anchors: &[Point; 4]) -> bool {
    anchors == &target_corners(anchors)
}

/// Rectify `image` and return it with the plot rectangle.
///
/// Anchors that already form an axis-aligned rectangle skip the warp.
///
/// # Errors
///
/// Returns [`ExtractionError::InvalidConfig`] if the anchors are
/// degenerate or the anchor box lies entirely outside the image.
pub fn rectify(
    image: &RgbImage,
    anchors: &[Point; 4],
) -> Result<(RgbImage, PlotRect), ExtractionError> {
    let dimensions = Dimensions {
        width: image.width(),
        height: image.height(),
    };
    let rect = anchor_rect(anchors, dimensions);
    if rect.is_empty() {
        return Err(ExtractionError::InvalidConfig(
            "calibration anchors lie outside the image".to_string(),
        ));
    }
    if is_axis_aligned(anchors) {
        return Ok((image.clone(), rect));
    }
    let projection = projection(anchors)?;
    let warped = warp(image, &projection, Interpolation::Nearest, BACKGROUND);
    Ok((warped, rect))
}
