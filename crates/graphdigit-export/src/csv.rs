//! CSV export.
//!
//! Two layouts:
//!
//! - [`to_csv`]: one curve per table, header `x,y`.
//! - [`to_long_csv`]: every curve in one "long" table, header
//!   `color,label,x,y`, curves in the order given and points in curve
//!   order.
//!
//! Numbers use Rust's shortest round-trip formatting, so reading a file
//! back yields bit-identical values. Fields are quoted only when they
//! contain a delimiter, quote, or line break.

use ::csv::Writer;
use graphdigit_pipeline::{Curve, DataPoint};

use crate::{ExportError, Result};

/// Serialize a single curve as `x,y` rows.
///
/// # Errors
///
/// Returns [`ExportError::NonFinite`] if any coordinate is NaN or
/// infinite, or [`ExportError::Csv`] if the writer fails.
///
/// # Examples
///
/// ```
/// use graphdigit_pipeline::{Curve, CurveMetadata, DataPoint};
///
/// let metadata = CurveMetadata {
///     average_slope: 1.0,
///     processing_time_ms: 0.0,
///     source_pixel_count: 0,
///     bin_count: 2,
///     discarded_points: 0,
///     window_length: 0,
///     display: [0, 0, 0],
/// };
/// let curve = Curve::new(
///     "black",
///     "Black",
///     vec![DataPoint { x: 0.0, y: 0.5 }, DataPoint { x: 1.0, y: 1.5 }],
///     metadata,
/// );
/// let csv = graphdigit_export::to_csv(&curve).unwrap();
/// assert_eq!(csv, "x,y\n0,0.5\n1,1.5\n");
/// ```
pub fn to_csv(curve: &Curve) -> Result<String> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(["x", "y"])?;
    for (index, p) in curve.points().iter().enumerate() {
        check_finite(curve, index, *p)?;
        writer.write_record([p.x.to_string(), p.y.to_string()])?;
    }
    finish(writer)
}

/// Serialize several curves into one long-form table.
///
/// # Errors
///
/// Returns [`ExportError::NonFinite`] for the first point that is NaN
/// or infinite, or [`ExportError::Csv`] if the writer fails.
pub fn to_long_csv(curves: &[Curve]) -> Result<String> {
    let mut writer = Writer::from_writer(Vec::new());
    writer.write_record(["color", "label", "x", "y"])?;
    for curve in curves {
        for (index, p) in curve.points().iter().enumerate() {
            check_finite(curve, index, *p)?;
            let (x, y) = (p.x.to_string(), p.y.to_string());
            writer.write_record([curve.color(), curve.label(), x.as_str(), y.as_str()])?;
        }
    }
    finish(writer)
}

/// Flush `writer` and take its buffer as text.
fn finish(writer: Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| ::csv::Error::from(e.into_error()))?;
    Ok(String::from_utf8(bytes)?)
}

fn check_finite(curve: &Curve, index: usize, p: DataPoint) -> Result<()> {
    if p.x.is_finite() && p.y.is_finite() {
        Ok(())
    } else {
        Err(ExportError::NonFinite {
            color: curve.color().to_string(),
            index,
            x: p.x,
            y: p.y,
        })
    }
}
