//! Preview overlay: the extracted curves drawn over the source image.
//!
//! The (rectified) image is copied into a `tiny-skia` pixmap, the plot
//! rectangle is outlined, and each pixel-space curve is stroked in its
//! display color. The result is PNG-encoded.

use image::RgbaImage;
use tiny_skia::{LineCap, LineJoin, Paint, PathBuilder, Pixmap, Rect, Stroke, Transform};

use crate::types::{ExtractionError, PlotRect, Polyline, RgbImage};

/// Stroke width of the curves, in pixels.
const CURVE_WIDTH: f32 = 2.0;

/// Plot outline color and width.
const OUTLINE_RGBA: [u8; 4] = [40, 120, 255, 200];
const OUTLINE_WIDTH: f32 = 1.0;

/// One curve to draw.
#[derive(Debug, Clone, Copy)]
pub struct PreviewCurve<'a> {
    pub path: &'a Polyline,
    pub rgb: [u8; 3],
}

/// Render the overlay and return it as PNG bytes.
///
/// # Errors
///
/// Returns [`ExtractionError::PreviewEncode`] if the image is empty or
/// PNG encoding fails.
pub fn render_preview(
    image: &RgbImage,
    plot: PlotRect,
    curves: &[PreviewCurve<'_>],
) -> Result<Vec<u8>, ExtractionError> {
    let (width, height) = image.dimensions();
    let mut pixmap = Pixmap::new(width, height).ok_or_else(|| {
        ExtractionError::PreviewEncode(format!("cannot allocate {width}x{height} preview"))
    })?;
    for (dst, src) in pixmap.data_mut().chunks_exact_mut(4).zip(image.pixels()) {
        let [r, g, b] = src.0;
        dst.copy_from_slice(&[r, g, b, 255]);
    }

    outline_plot(&mut pixmap, plot);
    for curve in curves {
        stroke_curve(&mut pixmap, curve);
    }

    // Every pixel started opaque, so premultiplied equals straight alpha.
    let rgba = RgbaImage::from_raw(width, height, pixmap.take()).ok_or_else(|| {
        ExtractionError::PreviewEncode("preview buffer size mismatch".to_string())
    })?;
    encode_png(&rgba)
}

fn outline_plot(pixmap: &mut Pixmap, plot: PlotRect) {
    #[allow(clippy::cast_precision_loss)]
    let rect = Rect::from_ltrb(
        plot.left as f32 + 0.5,
        plot.top as f32 + 0.5,
        plot.right as f32 - 0.5,
        plot.bottom as f32 - 0.5,
    );
    let Some(rect) = rect else {
        return;
    };
    let path = PathBuilder::from_rect(rect);
    let [r, g, b, a] = OUTLINE_RGBA;
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, a);
    paint.anti_alias = false;
    let stroke = Stroke {
        width: OUTLINE_WIDTH,
        ..Stroke::default()
    };
    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
}

#[allow(clippy::cast_possible_truncation)]
fn stroke_curve(pixmap: &mut Pixmap, curve: &PreviewCurve<'_>) {
    let points = curve.path.points();
    let mut pb = PathBuilder::new();
    if let Some(first) = points.first() {
        pb.move_to(first.x as f32, first.y as f32);
        for p in &points[1..] {
            pb.line_to(p.x as f32, p.y as f32);
        }
    }
    let Some(path) = pb.finish() else {
        return;
    };

    let stroke = Stroke {
        width: CURVE_WIDTH,
        line_cap: LineCap::Round,
        line_join: LineJoin::Round,
        ..Stroke::default()
    };
    let [r, g, b] = curve.rgb;
    let mut paint = Paint::default();
    paint.set_color_rgba8(r, g, b, 255);
    paint.anti_alias = true;
    pixmap.stroke_path(&path, &paint, &stroke, Transform::identity(), None);
}

/// Encode an RGBA image as PNG.
fn encode_png(rgba: &RgbaImage) -> Result<Vec<u8>, ExtractionError> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        rgba.as_raw(),
        rgba.width(),
        rgba.height(),
        image::ExtendedColorType::Rgba8,
    )
    .map_err(|e| ExtractionError::PreviewEncode(e.to_string()))?;
    Ok(buf)
}
