//! SVG export serializer.
//!
//! Plots extracted curves in data space using the [`svg`] crate for
//! document construction, XML escaping, and path data formatting.
//!
//! Layout: a framed plot area inset by a fixed margin, the data range
//! written at the frame corners, one `<path>` per curve stroked in the
//! curve's display color, and a legend down the right-hand side of the
//! frame. Log-scaled axes are plotted in `log10` space.
//!
//! Optional [`SvgMetadata`] embeds `<title>`, `<desc>`, and the request
//! JSON for reproducibility.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Description, Element, Path, Rectangle, Title};
use svg::node::{Node, Text};

use graphdigit_pipeline::{Curve, DataPoint, ScaleType};

use crate::{ExportError, Result};

/// Space between the document edge and the plot frame, in px.
const MARGIN: f64 = 40.0;
/// Font size for range labels and the legend.
const FONT_SIZE: f64 = 11.0;

/// Metadata to embed in the SVG document.
///
/// All fields are optional. Text values are XML-escaped by the `svg`
/// crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`. Typically the source image
    /// file stem.
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`.
    pub description: Option<&'a str>,

    /// Serialized extraction request, emitted inside `<metadata>` in a
    /// namespaced `<graphdigit:request>` element.
    pub config_json: Option<&'a str>,
}

/// Plot geometry and axis scales.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvgOptions {
    /// Document width in px.
    pub width: u32,
    /// Document height in px.
    pub height: u32,
    pub x_scale: ScaleType,
    pub y_scale: ScaleType,
    /// Stroke width of the curves in px.
    pub stroke_width: f64,
}

impl Default for SvgOptions {
    fn default() -> Self {
        Self {
            width: 640,
            height: 400,
            x_scale: ScaleType::Linear,
            y_scale: ScaleType::Linear,
            stroke_width: 1.5,
        }
    }
}

/// Closed value range along one axis, in plot space.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Range {
    min: f64,
    max: f64,
}

impl Range {
    /// Smallest range covering `values`; a single value is padded by 0.5
    /// on either side, and no values give `0..1`.
    fn covering(values: impl Iterator<Item = f64>) -> Self {
        let (min, max) = values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
        if min > max {
            Self { min: 0.0, max: 1.0 }
        } else if (max - min).abs() < f64::EPSILON {
            Self {
                min: min - 0.5,
                max: max + 0.5,
            }
        } else {
            Self { min, max }
        }
    }

    fn fraction(self, v: f64) -> f64 {
        (v - self.min) / (self.max - self.min)
    }
}

fn to_plot_space(v: f64, scale: ScaleType) -> f64 {
    match scale {
        ScaleType::Linear => v,
        ScaleType::Log => v.log10(),
    }
}

fn from_plot_space(v: f64, scale: ScaleType) -> f64 {
    match scale {
        ScaleType::Linear => v,
        ScaleType::Log => 10f64.powf(v),
    }
}

/// Curves transformed into plot space, with every coordinate finite.
fn project(curves: &[Curve], options: &SvgOptions) -> Result<Vec<Vec<(f64, f64)>>> {
    curves
        .iter()
        .map(|curve| {
            curve
                .points()
                .iter()
                .enumerate()
                .map(|(index, &DataPoint { x, y })| {
                    let px = to_plot_space(x, options.x_scale);
                    let py = to_plot_space(y, options.y_scale);
                    if px.is_finite() && py.is_finite() {
                        Ok((px, py))
                    } else {
                        Err(ExportError::NonFinite {
                            color: curve.color().to_string(),
                            index,
                            x,
                            y,
                        })
                    }
                })
                .collect()
        })
        .collect()
}

fn hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}

/// `<text>` element with the given anchor.
fn label(x: f64, y: f64, anchor: &str, content: &str) -> Element {
    let mut text = Element::new("text");
    text.assign("x", x);
    text.assign("y", y);
    text.assign("font-size", FONT_SIZE);
    text.assign("font-family", "sans-serif");
    text.assign("text-anchor", anchor);
    text.append(Text::new(content));
    text
}

/// Compact number formatting for range labels.
fn format_value(v: f64) -> String {
    if v != 0.0 && (v.abs() >= 1e5 || v.abs() < 1e-3) {
        format!("{v:.3e}")
    } else {
        let s = format!("{v:.4}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

/// Serialize curves into an SVG plot.
///
/// Each curve with at least two points becomes a `<path>` carrying a
/// `data-color` attribute with the canonical color name. Curves with
/// fewer points still appear in the legend.
///
/// # Errors
///
/// Returns [`ExportError::NonFinite`] when a coordinate is NaN or
/// infinite, including non-positive values on a log axis.
pub fn to_svg(
    curves: &[Curve],
    options: &SvgOptions,
    metadata: &SvgMetadata<'_>,
) -> Result<String> {
    let projected = project(curves, options)?;
    let x_range = Range::covering(projected.iter().flatten().map(|&(x, _)| x));
    let y_range = Range::covering(projected.iter().flatten().map(|&(_, y)| y));

    let width = f64::from(options.width);
    let height = f64::from(options.height);
    let (left, top) = (MARGIN, MARGIN);
    let right = (width - MARGIN).max(left + 1.0);
    let bottom = (height - MARGIN).max(top + 1.0);
    let to_doc = |(x, y): (f64, f64)| {
        (
            x_range.fraction(x).mul_add(right - left, left),
            y_range.fraction(y).mul_add(-(bottom - top), bottom),
        )
    };

    let mut doc = Document::new()
        .set("width", options.width)
        .set("height", options.height)
        .set("viewBox", (0, 0, options.width, options.height));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }
    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }
    if let Some(config_json) = metadata.config_json {
        let mut request_el = Element::new("graphdigit:request");
        request_el.assign("xmlns:graphdigit", "https://graphdigit.dev/ns/1");
        request_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(request_el);
        doc = doc.add(metadata_el);
    }

    doc = doc.add(
        Rectangle::new()
            .set("x", left)
            .set("y", top)
            .set("width", right - left)
            .set("height", bottom - top)
            .set("fill", "none")
            .set("stroke", "#808080")
            .set("stroke-width", 1),
    );

    // Data range at the frame corners, in data units.
    let x_min = format_value(from_plot_space(x_range.min, options.x_scale));
    let x_max = format_value(from_plot_space(x_range.max, options.x_scale));
    let y_min = format_value(from_plot_space(y_range.min, options.y_scale));
    let y_max = format_value(from_plot_space(y_range.max, options.y_scale));
    doc = doc
        .add(label(left, bottom + FONT_SIZE + 4.0, "start", &x_min))
        .add(label(right, bottom + FONT_SIZE + 4.0, "end", &x_max))
        .add(label(left - 4.0, bottom, "end", &y_min))
        .add(label(left - 4.0, top + FONT_SIZE, "end", &y_max));

    for (curve, points) in curves.iter().zip(&projected) {
        let Some((&first, rest)) = points.split_first() else {
            continue;
        };
        if rest.is_empty() {
            continue;
        }
        let mut data = Data::new().move_to(to_doc(first));
        for &p in rest {
            data = data.line_to(to_doc(p));
        }
        doc = doc.add(
            Path::new()
                .set("d", data)
                .set("fill", "none")
                .set("stroke", hex(curve.metadata().display))
                .set("stroke-width", options.stroke_width)
                .set("stroke-linejoin", "round")
                .set("data-color", curve.color()),
        );
    }

    // Legend, top to bottom in curve order.
    let mut legend_y = top + FONT_SIZE + 4.0;
    for curve in curves {
        let mut entry = label(right - 6.0, legend_y, "end", curve.label());
        entry.assign("fill", hex(curve.metadata().display));
        doc = doc.add(entry);
        legend_y += FONT_SIZE + 4.0;
    }

    // The svg crate omits the XML declaration, so we prepend it.
    Ok(format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n"))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use graphdigit_pipeline::CurveMetadata;

    use super::*;

    fn curve(color: &str, display: [u8; 3], points: &[(f64, f64)]) -> Curve {
        let points: Vec<DataPoint> = points.iter().map(|&(x, y)| DataPoint { x, y }).collect();
        let label = format!("{color} curve");
        Curve::new(
            color,
            label,
            points,
            CurveMetadata {
                average_slope: 0.0,
                processing_time_ms: 0.0,
                source_pixel_count: 0,
                bin_count: 0,
                discarded_points: 0,
                window_length: 0,
                display,
            },
        )
    }

    fn no_meta() -> SvgMetadata<'static> {
        SvgMetadata::default()
    }

    #[test]
    fn empty_plot_is_valid_svg() {
        let svg = to_svg(&[], &SvgOptions::default(), &no_meta()).unwrap();
        assert!(svg.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains(r#"viewBox="0 0 640 400""#));
        assert!(svg.contains("<rect"));
        assert!(!svg.contains("<path"));
        assert!(svg.trim_end().ends_with("</svg>"));
    }

    #[test]
    fn one_path_per_drawable_curve() {
        let curves = [
            curve("red", [220, 30, 30], &[(0.0, 0.0), (1.0, 1.0), (2.0, 4.0)]),
            curve("blue", [30, 60, 220], &[(0.0, 2.0), (2.0, 2.0)]),
            curve("green", [30, 160, 60], &[(1.0, 1.0)]),
        ];
        let svg = to_svg(&curves, &SvgOptions::default(), &no_meta()).unwrap();
        assert_eq!(svg.matches("<path").count(), 2);
        assert!(svg.contains(r#"data-color="red""#));
        assert!(svg.contains(r##"stroke="#dc1e1e""##));
        assert!(svg.contains(r##"stroke="#1e3cdc""##));
        // The single-point curve is still listed in the legend.
        assert!(svg.contains("green curve"));
    }

    #[test]
    fn data_extremes_touch_the_frame() {
        let options = SvgOptions {
            width: 200,
            height: 140,
            ..SvgOptions::default()
        };
        let svg = to_svg(
            &[curve("red", [0, 0, 0], &[(0.0, 0.0), (10.0, 5.0)])],
            &options,
            &no_meta(),
        )
        .unwrap();
        // (0, 0) is the bottom-left frame corner, (10, 5) the top-right.
        assert!(svg.contains("M40,100 L160,40"), "{svg}");
    }

    #[test]
    fn log_axis_plots_decades_evenly() {
        let options = SvgOptions {
            width: 200,
            height: 140,
            y_scale: ScaleType::Log,
            ..SvgOptions::default()
        };
        let svg = to_svg(
            &[curve("red", [0, 0, 0], &[(0.0, 1.0), (5.0, 10.0), (10.0, 100.0)])],
            &options,
            &no_meta(),
        )
        .unwrap();
        assert!(svg.contains("M40,100 L100,70 L160,40"), "{svg}");
        assert!(svg.contains(">100<"));
    }

    #[test]
    fn non_positive_value_on_log_axis_is_rejected() {
        let options = SvgOptions {
            y_scale: ScaleType::Log,
            ..SvgOptions::default()
        };
        let err = to_svg(
            &[curve("red", [0, 0, 0], &[(0.0, 1.0), (1.0, 0.0)])],
            &options,
            &no_meta(),
        )
        .unwrap_err();
        assert!(matches!(err, ExportError::NonFinite { index: 1, .. }));
    }

    #[test]
    fn metadata_is_embedded_and_escaped() {
        let meta = SvgMetadata {
            title: Some("fig<3>"),
            description: Some("Id vs Vds"),
            config_json: Some(r#"{"mode":"legacy"}"#),
        };
        let svg = to_svg(&[], &SvgOptions::default(), &meta).unwrap();
        assert!(svg.contains("<title>fig&lt;3&gt;</title>"));
        assert!(svg.contains("<desc>"));
        assert!(svg.contains("Id vs Vds"));
        assert!(svg.contains("<graphdigit:request"));
        assert!(svg.contains("mode"));
    }

    #[test]
    fn flat_range_is_padded() {
        let r = Range::covering([3.0, 3.0].into_iter());
        assert!((r.min - 2.5).abs() < f64::EPSILON);
        assert!((r.max - 3.5).abs() < f64::EPSILON);
        let empty = Range::covering(std::iter::empty());
        assert!((empty.fraction(0.5) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn range_labels_are_compact() {
        assert_eq!(format_value(10.0), "10");
        assert_eq!(format_value(0.25), "0.25");
        assert_eq!(format_value(0.0), "0");
        assert_eq!(format_value(1e-6), "1.000e-6");
    }
}
