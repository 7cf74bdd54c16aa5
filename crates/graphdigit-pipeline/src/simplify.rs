//! Curve simplification using the Ramer-Douglas-Peucker algorithm.
//!
//! Runs on the smoothed pixel-space curve, before scale mapping, so the
//! tolerance is in pixels regardless of axis type. Distances are
//! measured to the chord *segment* rather than its infinite line, which
//! makes the bound hold for every removed point: no original point lies
//! farther than `tolerance` from the simplified polyline.

use crate::types::{Point, Polyline};

/// Simplify a polyline with the Ramer-Douglas-Peucker algorithm.
///
/// Endpoints are always kept. A tolerance of 0.0 keeps every point that
/// is not exactly on its chord. Polylines with fewer than 3 points are
/// returned unchanged.
#[must_use = "returns the simplified polyline"]
pub fn simplify(polyline: &Polyline, tolerance: f64) -> Polyline {
    let points = polyline.points();
    if points.len() < 3 {
        return polyline.clone();
    }

    let mut kept = vec![false; points.len()];
    kept[0] = true;
    kept[points.len() - 1] = true;

    rdp_recurse(points, 0, points.len() - 1, tolerance, &mut kept);

    let simplified: Vec<Point> = points
        .iter()
        .zip(&kept)
        .filter(|&(_, k)| *k)
        .map(|(&p, _)| p)
        .collect();

    Polyline::new(simplified)
}

/// Recursive step: keep the farthest interior point when it exceeds
/// `tolerance`, then split there.
fn rdp_recurse(points: &[Point], start: usize, end: usize, tolerance: f64, kept: &mut [bool]) {
    if end <= start + 1 {
        return;
    }

    let mut max_dist = 0.0;
    let mut max_idx = start;

    for i in (start + 1)..end {
        let d = segment_distance(points[i], points[start], points[end]);
        if d > max_dist {
            max_dist = d;
            max_idx = i;
        }
    }

    if max_dist > tolerance {
        kept[max_idx] = true;
        rdp_recurse(points, start, max_idx, tolerance, kept);
        rdp_recurse(points, max_idx, end, tolerance, kept);
    }
}

/// Distance from `p` to the segment `a`-`b`.
fn segment_distance(p: Point, a: Point, b: Point) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let length_sq = dx.mul_add(dx, dy * dy);

    if length_sq == 0.0 {
        return p.distance(a);
    }

    let t = (p.x - a.x).mul_add(dx, (p.y - a.y) * dy) / length_sq;
    let t = t.clamp(0.0, 1.0);
    p.distance(Point::new(t.mul_add(dx, a.x), t.mul_add(dy, a.y)))
}

/// Largest distance from any point of `original` to `simplified`.
///
/// Returns 0.0 when either polyline has no segments.
#[must_use]
pub fn max_deviation(original: &Polyline, simplified: &Polyline) -> f64 {
    let segments = simplified.points();
    if segments.len() < 2 {
        return 0.0;
    }
    original
        .points()
        .iter()
        .map(|&p| {
            segments
                .windows(2)
                .map(|w| segment_distance(p, w[0], w[1]))
                .fold(f64::INFINITY, f64::min)
        })
        .fold(0.0, f64::max)
}
