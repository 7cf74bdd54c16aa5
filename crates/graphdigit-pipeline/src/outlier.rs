//! Median absolute deviation (MAD) outlier rejection per bin.
//!
//! Within one bin, a sample survives when
//! `|y - median| <= max(MAD_MULTIPLIER × MAD_SCALE × MAD, MIN_THRESHOLD_PX)`.
//! `MAD_SCALE` makes the MAD a consistent estimator of the standard
//! deviation for normally distributed noise. The pixel floor keeps a
//! bin whose samples are nearly all identical (MAD = 0) from rejecting
//! the neighbouring row of a thick line.

/// Multiple of the scaled MAD beyond which a sample is an outlier.
pub const MAD_MULTIPLIER: f64 = 3.0;

/// Consistency constant for normal noise.
pub const MAD_SCALE: f64 = 1.4826;

/// Smallest rejection threshold, in pixels.
pub const MIN_THRESHOLD_PX: f64 = 1.0;

/// Outcome of filtering one bin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BinSummary {
    /// Median of the surviving samples.
    pub representative: f64,
    /// Samples kept.
    pub kept: usize,
    /// Samples rejected.
    pub discarded: usize,
}

/// Median of `values`, sorting them in place.
///
/// Even-length input averages the two middle values. Returns `None`
/// for an empty slice.
pub fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable_by(f64::total_cmp);
    let mid = values.len() / 2;
    Some(if values.len() % 2 == 0 {
        f64::midpoint(values[mid - 1], values[mid])
    } else {
        values[mid]
    })
}

/// Filter one bin and return its representative y.
///
/// Returns `None` for an empty bin.
#[must_use]
pub fn filter_bin(ys: &[f64]) -> Option<BinSummary> {
    let mut sorted = ys.to_vec();
    let center = median(&mut sorted)?;
    let mut deviations: Vec<f64> = sorted.iter().map(|y| (y - center).abs()).collect();
    let mad = median(&mut deviations)?;
    let threshold = (MAD_MULTIPLIER * MAD_SCALE * mad).max(MIN_THRESHOLD_PX);

    let mut survivors: Vec<f64> = sorted
        .into_iter()
        .filter(|y| (y - center).abs() <= threshold)
        .collect();
    let kept = survivors.len();
    let representative = median(&mut survivors)?;
    Some(BinSummary {
        representative,
        kept,
        discarded: ys.len() - kept,
    })
}
