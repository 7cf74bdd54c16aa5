//! Image decoding.
//!
//! Accepts raw image bytes (PNG, JPEG, BMP, WebP) and produces the RGB
//! raster every later stage reads. Transparent pixels are composited
//! over white, since datasheet graphs are drawn on a white page.

use image::{DynamicImage, GrayImage, Rgb, RgbImage};

use crate::types::ExtractionError;

/// Decode raw image bytes to RGB.
///
/// # Errors
///
/// Returns [`ExtractionError::EmptyInput`] if `bytes` is empty.
/// Returns [`ExtractionError::ImageDecode`] if the image format is
/// unrecognized or the data is corrupt.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, ExtractionError> {
    if bytes.is_empty() {
        return Err(ExtractionError::EmptyInput);
    }

    let img = image::load_from_memory(bytes)?;
    Ok(flatten(&img))
}

/// Drop alpha, blending each pixel over white.
fn flatten(img: &DynamicImage) -> RgbImage {
    if !img.color().has_alpha() {
        return img.to_rgb8();
    }
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| {
            let c = u16::from(c) * u16::from(a) + 255 * (255 - u16::from(a));
            #[allow(clippy::cast_possible_truncation)]
            let out = ((c + 127) / 255) as u8;
            out
        };
        Rgb([blend(r), blend(g), blend(b)])
    })
}

/// Luminance of an RGB image.
#[must_use = "returns the grayscale image"]
pub fn to_gray(rgb: &RgbImage) -> GrayImage {
    image::imageops::grayscale(rgb)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn encode_rgba(img: &image::RgbaImage) -> Vec<u8> {
        let mut buf = Vec::new();
        let encoder = image::codecs::png::PngEncoder::new(&mut buf);
        image::ImageEncoder::write_image(
            encoder,
            img.as_raw(),
            img.width(),
            img.height(),
            image::ExtendedColorType::Rgba8,
        )
        .unwrap();
        buf
    }

    #[test]
    fn empty_input_returns_error() {
        let result = decode_rgb(&[]);
        assert!(matches!(result, Err(ExtractionError::EmptyInput)));
    }

    #[test]
    fn corrupt_bytes_returns_image_decode_error() {
        let result = decode_rgb(&[0xFF, 0xFE, 0x00, 0x01]);
        let err = result.unwrap_err();
        assert!(matches!(err, ExtractionError::ImageDecode(_)));
        assert!(err.is_input_error());
    }

    #[test]
    fn opaque_png_decodes_unchanged() {
        let img = image::RgbaImage::from_fn(3, 2, |x, _| image::Rgba([255, 0, x as u8 * 50, 255]));
        let rgb = decode_rgb(&encode_rgba(&img)).unwrap();
        assert_eq!(rgb.dimensions(), (3, 2));
        assert_eq!(rgb.get_pixel(2, 1).0, [255, 0, 100]);
    }

    #[test]
    fn transparent_pixels_become_white() {
        let img = image::RgbaImage::from_fn(2, 1, |x, _| {
            if x == 0 {
                image::Rgba([0, 0, 0, 0])
            } else {
                image::Rgba([0, 0, 255, 255])
            }
        });
        let rgb = decode_rgb(&encode_rgba(&img)).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [255, 255, 255]);
        assert_eq!(rgb.get_pixel(1, 0).0, [0, 0, 255]);
    }

    #[test]
    fn gray_uses_luminance() {
        let rgb = RgbImage::from_fn(2, 1, |x, _| {
            if x == 0 { Rgb([255, 255, 255]) } else { Rgb([0, 0, 0]) }
        });
        let gray = to_gray(&rgb);
        assert_eq!(gray.get_pixel(0, 0).0[0], 255);
        assert_eq!(gray.get_pixel(1, 0).0[0], 0);
    }
}
