//! graphdigit-pipeline: curve extraction from datasheet graph images
//! (sans-IO).
//!
//! Turns a raster image of a graph into numeric curves, one per series
//! color:
//! HSV mask -> (annotation mask) -> (edge gate) -> closing ->
//! component filter -> binning -> MAD filter -> Savitzky-Golay ->
//! (RDP) -> scale mapping.
//!
//! This crate has **no I/O dependencies** -- it operates on in-memory
//! byte slices and returns structured data. File handling and the
//! command-line driver live in `graphdigit-bench`.

pub mod annotation;
pub mod axis;
pub mod binning;
pub mod cluster;
pub mod color;
pub mod components;
pub mod config;
pub mod decode;
pub mod diagnostics;
pub mod edge;
pub mod outlier;
pub mod pipeline;
pub mod plot_area;
pub mod preview;
pub mod request;
pub mod scene;
pub mod simplify;
pub mod smoothing;
pub mod types;
pub mod warp;

use rayon::prelude::*;

pub use axis::{AxisConfig, LOG_EPSILON, ScaleType, map_pixel_to_data};
pub use color::{ColorBand, ColorDetection, ColorGroup, HsvRange, default_palette};
pub use config::{AutoColorOptions, EnhancedOptions, ExtractionConfig, ExtractionMode};
pub use diagnostics::{
    ColorDiagnostics, ExtractionDiagnostics, ExtractionSummary, StageDiagnostics, StageMetrics,
};
pub use request::ExtractionRequest;
pub use types::{
    AxisName, Curve, CurveMetadata, DataPoint, Dimensions, ExtractionError, ExtractionResult,
    ExtractionWarning, PlotRect, Point, Polyline,
};

use diagnostics::{duration_ms, timed};
use pipeline::{ChainSettings, ColorOutcome, run_chain};
use preview::PreviewCurve;
use scene::{Scene, SceneBuild};
use types::RgbImage;

/// Extract curves from raw image bytes.
///
/// Takes raw image bytes (PNG, JPEG, BMP, WebP) and a configuration and
/// returns one [`Curve`] per color that produced at least two points,
/// along with warnings, per-stage diagnostics, and an optional preview
/// overlay.
///
/// # Steps
///
/// 1. Validate the configuration (before any pixel is touched)
/// 2. Decode the image
/// 3. Build the shared scene: rectification, color conversion, and the
///    enabled plot-area, annotation, and edge stages
/// 4. Resolve colors, or discover them by clustering in auto-color mode
/// 5. Run every color's chain in parallel
/// 6. Merge in input color order (descending pixel count for
///    discovered colors)
/// 7. Optionally render the preview
///
/// # Errors
///
/// Returns a configuration error (see
/// [`ExtractionError::is_configuration_error`]) if `config` is invalid,
/// [`ExtractionError::EmptyInput`] if `image_bytes` is empty,
/// [`ExtractionError::ImageDecode`] if the image cannot be decoded, and
/// [`ExtractionError::PreviewEncode`] if the preview cannot be encoded.
pub fn extract(
    image_bytes: &[u8],
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractionError> {
    let started = web_time::Instant::now();
    config.validate()?;

    let (rgb, duration) = timed(|| decode::decode_rgb(image_bytes));
    let rgb = rgb?;
    let decode_stage = StageDiagnostics {
        duration,
        metrics: StageMetrics::Decode {
            input_bytes: image_bytes.len(),
            width: rgb.width(),
            height: rgb.height(),
        },
    };
    tracing::debug!(
        bytes = image_bytes.len(),
        width = rgb.width(),
        height = rgb.height(),
        "decoded"
    );
    run(rgb, config, started, vec![decode_stage])
}

/// Extract curves from an already decoded image.
///
/// # Errors
///
/// Same as [`extract`], minus the decoding errors.
pub fn extract_image(
    image: RgbImage,
    config: &ExtractionConfig,
) -> Result<ExtractionResult, ExtractionError> {
    let started = web_time::Instant::now();
    config.validate()?;
    run(image, config, started, Vec::new())
}

/// Pre-flight color detection on raw image bytes.
///
/// Without `bands` the default palette is used and only colors present
/// in the image are reported.
///
/// # Errors
///
/// Returns [`ExtractionError::EmptyInput`] or
/// [`ExtractionError::ImageDecode`] if the bytes cannot be decoded.
pub fn detect_colors(
    image_bytes: &[u8],
    bands: Option<&[ColorBand]>,
) -> Result<Vec<ColorDetection>, ExtractionError> {
    let rgb = decode::decode_rgb(image_bytes)?;
    Ok(color::detect_colors(&rgb, bands))
}

fn run(
    rgb: RgbImage,
    config: &ExtractionConfig,
    started: web_time::Instant,
    mut scene_stages: Vec<StageDiagnostics>,
) -> Result<ExtractionResult, ExtractionError> {
    let mut warnings = Vec::new();
    for (name, axis) in [(AxisName::X, &config.x_axis), (AxisName::Y, &config.y_axis)] {
        if axis.is_guarded() {
            let warning = ExtractionWarning::LogAxisGuarded {
                axis: name,
                min: axis.min,
            };
            tracing::warn!(%warning, "extraction warning");
            warnings.push(warning);
        }
    }

    let (width, height) = rgb.dimensions();
    let settings = ChainSettings::from_config(config);
    let SceneBuild {
        scene,
        diagnostics,
        warnings: scene_warnings,
    } = Scene::build(rgb, config.calibration.as_ref(), &settings.stages)?;
    scene_stages.extend(diagnostics);
    warnings.extend(scene_warnings);

    let mut groups = config.color_groups()?;
    let discovered = match &config.mode {
        ExtractionMode::AutoColor(options) if groups.is_empty() => {
            groups = discover_groups(&scene, options, &mut scene_stages, &mut warnings);
            true
        }
        _ => false,
    };

    let mut outcomes = groups
        .par_iter()
        .map(|group| run_chain(&scene, group, settings))
        .collect::<Result<Vec<ColorOutcome>, _>>()?;
    if discovered {
        outcomes.sort_by(|a, b| b.source_pixels.cmp(&a.source_pixels));
        for (i, outcome) in outcomes.iter_mut().enumerate() {
            outcome.rename(&cluster::auto_name(i));
        }
    }

    let preview_image = if config.render_preview {
        let curves: Vec<PreviewCurve<'_>> = outcomes
            .iter()
            .filter(|o| o.curve.is_some())
            .map(|o| PreviewCurve {
                path: &o.pixel_curve,
                rgb: o.display,
            })
            .collect();
        let (png, duration) =
            timed(|| preview::render_preview(scene.rgb(), scene.plot(), &curves));
        let png = png?;
        scene_stages.push(StageDiagnostics {
            duration,
            metrics: StageMetrics::Preview {
                encoded_bytes: png.len(),
            },
        });
        Some(png)
    } else {
        None
    };

    let color_count = outcomes.len();
    let mut curves = Vec::new();
    let mut colors = Vec::new();
    let mut points_discarded = 0;
    for outcome in outcomes {
        points_discarded += outcome.discarded;
        warnings.extend(outcome.warnings);
        colors.push(outcome.diagnostics);
        curves.extend(outcome.curve);
    }

    let total_duration = started.elapsed();
    let point_count = curves.iter().map(Curve::point_count).sum();
    tracing::info!(
        mode = config.mode.name(),
        colors = color_count,
        curves = curves.len(),
        points = point_count,
        warnings = warnings.len(),
        ms = duration_ms(total_duration),
        "extraction complete"
    );

    let stats = ExtractionDiagnostics {
        scene: scene_stages,
        colors,
        total_duration,
        points_discarded,
        summary: ExtractionSummary {
            image_width: width,
            image_height: height,
            color_count,
            curve_count: curves.len(),
            point_count,
        },
    };
    Ok(ExtractionResult {
        curves,
        preview_image,
        processing_time_ms: duration_ms(total_duration),
        warnings,
        stats,
    })
}

/// Cluster the scene's foreground into color groups.
fn discover_groups(
    scene: &Scene,
    options: &AutoColorOptions,
    stages: &mut Vec<StageDiagnostics>,
    warnings: &mut Vec<ExtractionWarning>,
) -> Vec<ColorGroup> {
    let (discovery, duration) =
        timed(|| cluster::discover(scene.rgb(), scene.hsv(), scene.plot(), options));
    stages.push(StageDiagnostics {
        duration,
        metrics: StageMetrics::Clustering {
            foreground_pixels: discovery.foreground_pixels,
            sampled: discovery.sampled,
            iterations: discovery.iterations,
            clusters: discovery.groups.len(),
        },
    });

    let found = discovery.groups.len();
    let warning = if found == 0 {
        Some(ExtractionWarning::NoForeground)
    } else if found < options.max_clusters {
        Some(ExtractionWarning::FewerClusters {
            requested: options.max_clusters,
            found,
        })
    } else {
        None
    };
    if let Some(warning) = warning {
        tracing::warn!(%warning, "extraction warning");
        warnings.push(warning);
    }
    discovery.groups
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use image::Rgb;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    const RED: Rgb<u8> = Rgb([220, 20, 20]);

    fn encode(img: &RgbImage) -> Vec<u8> {
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

    /// 300x200 white image with a red diagonal stroke, 5 px thick.
    fn diagonal_png() -> Vec<u8> {
        let img = RgbImage::from_fn(300, 200, |x, y| {
            let center = 180.0 - f64::from(x) * 0.5;
            if (f64::from(y) - center).abs() < 2.5 { RED } else { WHITE }
        });
        encode(&img)
    }

    fn red_config() -> ExtractionConfig {
        ExtractionConfig {
            selected_colors: vec!["red".to_string()],
            x_axis: AxisConfig::linear(0.0, 300.0),
            y_axis: AxisConfig::linear(0.0, 200.0),
            ..ExtractionConfig::legacy_default()
        }
    }

    #[test]
    fn extract_empty_input() {
        let result = extract(&[], &red_config());
        assert!(matches!(result, Err(ExtractionError::EmptyInput)));
    }

    #[test]
    fn extract_corrupt_input() {
        let result = extract(&[0xFF, 0x00], &red_config());
        assert!(matches!(result, Err(ExtractionError::ImageDecode(_))));
    }

    #[test]
    fn configuration_is_checked_before_decoding() {
        let config = ExtractionConfig {
            min_size: 0,
            ..red_config()
        };
        assert!(matches!(
            extract(&[], &config),
            Err(ExtractionError::InvalidMinSize)
        ));
    }

    #[test]
    fn extract_diagonal_line() {
        let result = extract(&diagonal_png(), &red_config()).unwrap();
        assert_eq!(result.curves.len(), 1);
        let curve = &result.curves[0];
        assert_eq!(curve.color(), "red");
        assert_eq!(curve.point_count(), 60);
        // Pixel slope -0.5 in image rows is +0.5 in data units.
        assert!((curve.metadata().average_slope - 0.5).abs() < 0.05);
        assert!(result.preview_image.is_none());
        assert_eq!(result.stats.summary.curve_count, 1);
        assert_eq!(result.stats.colors.len(), 1);
    }

    #[test]
    fn preview_is_rendered_on_request() {
        let config = ExtractionConfig {
            render_preview: true,
            ..red_config()
        };
        let result = extract(&diagonal_png(), &config).unwrap();
        let png = result.preview_image.unwrap();
        let decoded = image::load_from_memory(&png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (300, 200));
        assert!(
            result
                .stats
                .scene
                .iter()
                .any(|s| matches!(s.metrics, StageMetrics::Preview { .. }))
        );
    }

    #[test]
    fn result_serializes_to_response_contract() {
        let config = ExtractionConfig {
            render_preview: true,
            ..red_config()
        };
        let result = extract(&diagonal_png(), &config).unwrap();
        let json = serde_json::to_value(&result).unwrap();
        assert!(json["curves"][0]["pointCount"].as_u64().unwrap() > 0);
        assert!(json["previewImage"].as_str().unwrap().len() > 10);
        assert!(json["processingTimeMs"].as_f64().unwrap() >= 0.0);
        assert!(json["warnings"].as_array().unwrap().is_empty());
    }

    #[test]
    fn auto_names_follow_output_order() {
        // Green specks outnumber the red stroke in the clustering sample
        // but are all smaller than `min_size`, so red comes out first.
        let green = Rgb([20, 180, 20]);
        let img = RgbImage::from_fn(300, 200, |x, y| {
            if (148..152).contains(&y) {
                RED
            } else if y < 100 && x % 8 < 2 && y % 8 < 2 {
                green
            } else {
                WHITE
            }
        });
        let config = ExtractionConfig {
            mode: ExtractionMode::AutoColor(AutoColorOptions::default()),
            selected_colors: Vec::new(),
            ..red_config()
        };
        let result = extract(&encode(&img), &config).unwrap();

        assert_eq!(result.curves.len(), 1);
        assert_eq!(result.curves[0].color(), "auto-1");
        assert_eq!(result.curves[0].label(), "Auto-1");
        let names: Vec<&str> = result.stats.colors.iter().map(|c| c.color.as_str()).collect();
        assert_eq!(names, ["auto-1", "auto-2"]);
        assert!(result.warnings.contains(&ExtractionWarning::NoPixels {
            color: "auto-2".to_string()
        }));
    }

    #[test]
    fn detect_colors_reports_present_colors() {
        let detections = detect_colors(&diagonal_png(), None).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].color, "red");
        assert!(detections[0].pixel_count > 0);
        assert!(detections[0].confidence > 0.0);
    }

    #[test]
    fn detect_colors_rejects_empty_input() {
        assert!(matches!(
            detect_colors(&[], None),
            Err(ExtractionError::EmptyInput)
        ));
    }
}
