//! Synthetic graph images for the integration tests.

#![allow(dead_code, clippy::unwrap_used)]

use graphdigit_pipeline::{AxisConfig, ExtractionConfig};
use image::{Rgb, RgbImage};

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub const RED: Rgb<u8> = Rgb([220, 20, 20]);
pub const BLUE: Rgb<u8> = Rgb([20, 20, 220]);
pub const GREEN: Rgb<u8> = Rgb([20, 180, 20]);

/// Blank white canvas.
pub fn canvas(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, WHITE)
}

/// Draw `y = f(x)` (pixel space, evaluated at column centers) with a
/// stroke `thickness` rows tall in every column.
pub fn draw_curve(
    img: &mut RgbImage,
    color: Rgb<u8>,
    thickness: u32,
    f: impl Fn(f64) -> f64,
) {
    let half = f64::from(thickness) / 2.0;
    for x in 0..img.width() {
        let center = f(f64::from(x) + 0.5);
        for y in 0..img.height() {
            let d = f64::from(y) + 0.5 - center;
            if d >= -half && d < half {
                img.put_pixel(x, y, color);
            }
        }
    }
}

/// Fill the rectangle `x0..x1` by `y0..y1`.
pub fn fill_rect(
    img: &mut RgbImage,
    color: Rgb<u8>,
    (x0, y0): (u32, u32),
    (x1, y1): (u32, u32),
) {
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, color);
        }
    }
}

/// One-pixel rectangle outline with inclusive corners.
pub fn outline_rect(
    img: &mut RgbImage,
    color: Rgb<u8>,
    (x0, y0): (u32, u32),
    (x1, y1): (u32, u32),
) {
    for x in x0..=x1 {
        img.put_pixel(x, y0, color);
        img.put_pixel(x, y1, color);
    }
    for y in y0..=y1 {
        img.put_pixel(x0, y, color);
        img.put_pixel(x1, y, color);
    }
}

/// PNG-encode an RGB image.
pub fn png(img: &RgbImage) -> Vec<u8> {
    let mut buf = Vec::new();
    let encoder = image::codecs::png::PngEncoder::new(&mut buf);
    image::ImageEncoder::write_image(
        encoder,
        img.as_raw(),
        img.width(),
        img.height(),
        image::ExtendedColorType::Rgb8,
    )
    .unwrap();
    buf
}

/// Legacy configuration with pixel-unit axes for a `width` x `height`
/// image: data x equals pixel x, data y counts pixels up from the
/// bottom edge.
pub fn pixel_config(width: u32, height: u32, colors: &[&str]) -> ExtractionConfig {
    ExtractionConfig {
        selected_colors: colors.iter().map(ToString::to_string).collect(),
        x_axis: AxisConfig::linear(0.0, f64::from(width)),
        y_axis: AxisConfig::linear(0.0, f64::from(height)),
        ..ExtractionConfig::legacy_default()
    }
}
