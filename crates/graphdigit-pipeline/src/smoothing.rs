//! Savitzky-Golay smoothing of per-bin representative values.
//!
//! Each output value is the least-squares polynomial of order
//! [`POLY_ORDER`] fitted to the `window` samples around it, evaluated
//! at that sample. Near the ends, where a centered window does not fit,
//! the polynomial fitted to the first (or last) full window is
//! evaluated at the sample's offset instead, so edge values are never
//! padded or mirrored.
//!
//! Samples are treated as evenly spaced in bin order.

use nalgebra::DMatrix;

/// Polynomial order of the fit.
pub const POLY_ORDER: usize = 3;

/// Window for colors without an entry in [`window_for`].
pub const DEFAULT_WINDOW: usize = 13;

/// Smallest window that smooths anything.
pub const MIN_WINDOW: usize = 3;

/// Requested window length for a canonical color.
#[must_use]
pub fn window_for(color: &str) -> usize {
    match color {
        "red" => 21,
        "blue" => 17,
        _ => DEFAULT_WINDOW,
    }
}

/// Window actually applied for a given sample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowChoice {
    /// The requested window fits.
    Full(usize),
    /// The window was reduced to the largest odd length not above the
    /// sample count.
    Shrunk { requested: usize, applied: usize },
    /// Fewer than [`MIN_WINDOW`] samples.
    Skipped,
}

impl WindowChoice {
    /// Window length applied, or 0 when skipped.
    #[must_use]
    pub const fn applied(self) -> usize {
        match self {
            Self::Full(w) | Self::Shrunk { applied: w, .. } => w,
            Self::Skipped => 0,
        }
    }
}

/// Pick the window for `samples` values.
#[must_use]
pub const fn choose_window(requested: usize, samples: usize) -> WindowChoice {
    if samples < MIN_WINDOW {
        return WindowChoice::Skipped;
    }
    let requested_odd = if requested % 2 == 0 {
        requested + 1
    } else {
        requested
    };
    if requested_odd <= samples {
        return WindowChoice::Full(requested_odd);
    }
    let applied = if samples % 2 == 0 { samples - 1 } else { samples };
    WindowChoice::Shrunk { requested, applied }
}

/// Smooth `values` with an odd `window` and polynomial `order`.
///
/// `order` is clamped to `window - 1`. Input shorter than the window,
/// or a window below [`MIN_WINDOW`], is returned unchanged.
#[must_use]
pub fn savgol(values: &[f64], window: usize, order: usize) -> Vec<f64> {
    let n = values.len();
    if window < MIN_WINDOW || window % 2 == 0 || n < window {
        return values.to_vec();
    }
    let half = window / 2;
    let order = order.min(window - 1);

    let Some(weights) = fit_weights(half, order) else {
        return values.to_vec();
    };

    (0..n)
        .map(|i| {
            let center = i.clamp(half, n - 1 - half);
            weights
                .row(i + half - center)
                .iter()
                .zip(&values[center - half..=center + half])
                .fold(0.0, |acc, (w, v)| w.mul_add(*v, acc))
        })
        .collect()
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_wrap)]
const fn offset(index: usize, half: usize) -> f64 {
    (index as isize - half as isize) as f64
}

/// Hat matrix of the order-`order` least-squares fit over offsets
/// `-half..=half`: row `p` holds the weights that evaluate the fit at
/// offset `p - half`.
///
/// With the Vandermonde matrix `A[j][k] = j^k` the coefficients are
/// `(AᵀA)⁻¹ Aᵀ y`, so the fitted values are `A (AᵀA)⁻¹ Aᵀ y`. `None`
/// when `AᵀA` is singular.
fn fit_weights(half: usize, order: usize) -> Option<DMatrix<f64>> {
    let window = 2 * half + 1;
    let vandermonde = DMatrix::from_fn(window, order + 1, |j, k| powi(offset(j, half), k));
    let transposed = vandermonde.transpose();
    let coefficients = (&transposed * &vandermonde).lu().solve(&transposed)?;
    Some(vandermonde * coefficients)
}

fn powi(base: f64, exp: usize) -> f64 {
    (0..exp).fold(1.0, |acc, _| acc * base)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn window_lookup() {
        assert_eq!(window_for("red"), 21);
        assert_eq!(window_for("blue"), 17);
        assert_eq!(window_for("green"), DEFAULT_WINDOW);
        assert_eq!(window_for("auto-1"), DEFAULT_WINDOW);
    }

    #[test]
    fn window_choice() {
        assert_eq!(choose_window(21, 80), WindowChoice::Full(21));
        assert_eq!(
            choose_window(21, 10),
            WindowChoice::Shrunk {
                requested: 21,
                applied: 9
            }
        );
        assert_eq!(
            choose_window(13, 11),
            WindowChoice::Shrunk {
                requested: 13,
                applied: 11
            }
        );
        assert_eq!(choose_window(13, 2), WindowChoice::Skipped);
        assert_eq!(choose_window(13, 2).applied(), 0);
    }

    #[test]
    fn cubic_is_reproduced_exactly() {
        let values: Vec<f64> = (0..40)
            .map(|i| {
                let x = f64::from(i);
                0.01 * x * x * x - 0.3 * x * x + 2.0 * x + 5.0
            })
            .collect();
        let smoothed = savgol(&values, 13, POLY_ORDER);
        for (a, b) in values.iter().zip(&smoothed) {
            assert!((a - b).abs() < 1e-6, "{a} vs {b}");
        }
    }

    #[test]
    fn constant_stays_constant() {
        let values = vec![7.5; 25];
        let smoothed = savgol(&values, 21, POLY_ORDER);
        assert!(smoothed.iter().all(|v| (v - 7.5).abs() < 1e-9));
    }

    #[test]
    fn weight_rows_sum_to_one() {
        let weights = fit_weights(6, POLY_ORDER).unwrap();
        assert_eq!(weights.shape(), (13, 13));
        for r in 0..13 {
            assert!((weights.row(r).sum() - 1.0).abs() < 1e-9);
        }
        // Classic 5-point quadratic center weights: (-3, 12, 17, 12, -3) / 35.
        let quadratic = fit_weights(2, 2).unwrap();
        let expected = [-3.0, 12.0, 17.0, 12.0, -3.0];
        for (w, e) in quadratic.row(2).iter().zip(expected) {
            assert!((w - e / 35.0).abs() < 1e-12, "{w}");
        }
    }

    #[test]
    fn noise_is_reduced() {
        let values: Vec<f64> = (0..60)
            .map(|i| 50.0 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect();
        let smoothed = savgol(&values, 13, POLY_ORDER);
        let spread = |v: &[f64]| {
            v.iter().copied().fold(f64::MIN, f64::max) - v.iter().copied().fold(f64::MAX, f64::min)
        };
        assert!(spread(&smoothed[6..54]) < spread(&values) / 2.0);
    }

    #[test]
    fn short_input_is_unchanged() {
        let values = vec![1.0, 2.0];
        assert_eq!(savgol(&values, 13, POLY_ORDER), values);
    }

    #[test]
    fn deterministic() {
        let values: Vec<f64> = (0..50).map(|i| (f64::from(i) * 0.37).sin()).collect();
        let a = savgol(&values, 17, POLY_ORDER);
        let b = savgol(&values, 17, POLY_ORDER);
        assert!(a.iter().zip(&b).all(|(x, y)| x.to_bits() == y.to_bits()));
    }
}
