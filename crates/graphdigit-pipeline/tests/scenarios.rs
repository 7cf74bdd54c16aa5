//! End-to-end extraction scenarios on synthetic graph images.

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{
    BLACK, BLUE, GREEN, RED, canvas, draw_curve, fill_rect, outline_rect, pixel_config, png,
};
use graphdigit_pipeline::{
    AutoColorOptions, AxisConfig, AxisName, Curve, EnhancedOptions, ExtractionConfig,
    ExtractionMode, ExtractionResult, ExtractionWarning, StageMetrics, extract,
};

const WIDTH: u32 = 500;
const HEIGHT: u32 = 300;

/// Flat, then rising, then flat again (pixel rows).
fn polyline_y(x: f64) -> f64 {
    if x < 200.0 {
        200.0
    } else if x < 400.0 {
        200.0 - (x - 200.0) * 0.5
    } else {
        100.0
    }
}

fn red_polyline_png() -> Vec<u8> {
    let mut img = canvas(WIDTH, HEIGHT);
    draw_curve(&mut img, RED, 4, polyline_y);
    png(&img)
}

#[test]
fn scenario_a_legacy_red_polyline() {
    let config = pixel_config(WIDTH, HEIGHT, &["red"]);
    assert_eq!(config.min_size, 1000);
    let result = extract(&red_polyline_png(), &config).expect("extraction should succeed");

    assert_eq!(result.curves.len(), 1);
    let curve = &result.curves[0];
    assert_eq!(curve.color(), "red");
    let expected = (WIDTH / config.bin_size) as usize;
    assert!(
        (expected - 5..=expected).contains(&curve.point_count()),
        "expected about {expected} points, got {}",
        curve.point_count()
    );
    assert!(curve.points().windows(2).all(|w| w[1].x > w[0].x));

    for p in curve.points() {
        let want = f64::from(HEIGHT) - polyline_y(p.x);
        assert!(
            (p.y - want).abs() < 8.0,
            "at x = {}: y = {}, want about {want}",
            p.x,
            p.y
        );
    }
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
}

#[test]
fn scenario_b_log_axis_with_zero_minimum() {
    let config = ExtractionConfig {
        y_axis: AxisConfig::log(0.0, 10.0),
        ..pixel_config(WIDTH, HEIGHT, &["red"])
    };
    let result = extract(&red_polyline_png(), &config).expect("log axis should be guarded");

    let curve = &result.curves[0];
    assert!(curve.point_count() >= 2);
    for p in curve.points() {
        assert!(p.y > 0.0 && p.y <= 10.0, "y = {} outside (0, 10]", p.y);
    }
    assert!(result.warnings.contains(&ExtractionWarning::LogAxisGuarded {
        axis: AxisName::Y,
        min: 0.0
    }));
}

fn three_color_png() -> Vec<u8> {
    let mut img = canvas(WIDTH, HEIGHT);
    draw_curve(&mut img, RED, 4, |x| 80.0 + 20.0 * (x / 60.0).sin());
    draw_curve(&mut img, BLUE, 4, |x| 150.0 + 20.0 * (x / 60.0).cos());
    draw_curve(&mut img, GREEN, 4, |x| 230.0 - x * 0.05);
    png(&img)
}

#[test]
fn scenario_c_selected_colors_only() {
    let png = three_color_png();
    let result = extract(&png, &pixel_config(WIDTH, HEIGHT, &["red", "blue"])).unwrap();
    let colors: Vec<&str> = result.curves.iter().map(|c| c.color()).collect();
    assert_eq!(colors, ["red", "blue"]);

    // Output follows the requested order.
    let result = extract(&png, &pixel_config(WIDTH, HEIGHT, &["Blue", "red2"])).unwrap();
    let colors: Vec<&str> = result.curves.iter().map(|c| c.color()).collect();
    assert_eq!(colors, ["blue", "red"]);
}

#[test]
fn scenario_d_auto_color_orders_by_pixel_count() {
    let mut img = canvas(WIDTH, HEIGHT);
    draw_curve(&mut img, GREEN, 3, |x| 240.0 - x * 0.1);
    draw_curve(&mut img, RED, 7, |x| 70.0 + 15.0 * (x / 80.0).sin());
    draw_curve(&mut img, BLUE, 5, |x| 150.0 + x * 0.05);

    let config = ExtractionConfig {
        mode: ExtractionMode::AutoColor(AutoColorOptions {
            max_clusters: 5,
            ..AutoColorOptions::default()
        }),
        ..pixel_config(WIDTH, HEIGHT, &[])
    };
    let result = extract(&png(&img), &config).unwrap();

    assert!(result.curves.len() <= 5);
    assert_eq!(result.curves.len(), 3);
    let counts: Vec<u64> = result
        .curves
        .iter()
        .map(|c| c.metadata().source_pixel_count)
        .collect();
    assert!(counts.windows(2).all(|w| w[0] > w[1]), "counts {counts:?}");
    assert_eq!(result.curves[0].color(), "auto-1");

    // The thickest stroke is the red sine near the top of the image.
    let first = &result.curves[0];
    let mid = &first.points()[first.point_count() / 2];
    let want = f64::from(HEIGHT) - (70.0 + 15.0 * (mid.x / 80.0).sin());
    assert!((mid.y - want).abs() < 3.0, "y = {}, want {want}", mid.y);

    assert!(result.warnings.contains(&ExtractionWarning::FewerClusters {
        requested: 5,
        found: 3
    }));
}

#[test]
fn auto_color_on_blank_image_yields_nothing() {
    let config = ExtractionConfig {
        mode: ExtractionMode::AutoColor(AutoColorOptions::default()),
        ..pixel_config(WIDTH, HEIGHT, &[])
    };
    let result = extract(&png(&canvas(WIDTH, HEIGHT)), &config).unwrap();
    assert!(result.curves.is_empty());
    assert_eq!(result.warnings, vec![ExtractionWarning::NoForeground]);
}

/// Data-space y of the scenario E curve.
fn legend_curve_y(x: f64) -> f64 {
    f64::from(HEIGHT) - (280.0 - 0.26 * x)
}

fn legend_png() -> Vec<u8> {
    let mut img = canvas(WIDTH, HEIGHT);
    draw_curve(&mut img, RED, 5, |x| 280.0 - 0.26 * x);
    outline_rect(&mut img, BLACK, (340, 20), (480, 90));
    fill_rect(&mut img, RED, (350, 40), (381, 45));
    fill_rect(&mut img, BLUE, (350, 60), (381, 65));
    png(&img)
}

fn legend_config(use_annotation_mask: bool) -> ExtractionConfig {
    ExtractionConfig {
        mode: ExtractionMode::Enhanced(EnhancedOptions {
            use_annotation_mask,
            ..EnhancedOptions::default()
        }),
        min_size: 50,
        ..pixel_config(WIDTH, HEIGHT, &["red"])
    }
}

fn max_deviation(config: &ExtractionConfig) -> f64 {
    let result = extract(&legend_png(), config).unwrap();
    assert_eq!(result.curves.len(), 1);
    result.curves[0]
        .points()
        .iter()
        .map(|p| (p.y - legend_curve_y(p.x)).abs())
        .fold(0.0, f64::max)
}

#[test]
fn scenario_e_annotation_mask_excludes_legend() {
    let config = legend_config(true);
    let result = extract(&legend_png(), &config).unwrap();
    let curve = &result.curves[0];

    // The curve starts at the left axis and spans the full width.
    assert_eq!(curve.point_count(), 100);
    assert!(curve.points()[0].x < 5.0);

    let deviation = max_deviation(&config);
    assert!(deviation < 1.5, "deviation {deviation}");

    let stats = &result.stats;
    assert!(stats.colors[0].stages.iter().any(|s| matches!(
        s.metrics,
        StageMetrics::AnnotationMask { removed_pixels } if removed_pixels > 0
    )));
}

#[test]
fn scenario_e_control_without_mask_is_polluted() {
    let deviation = max_deviation(&legend_config(false));
    assert!(deviation > 20.0, "deviation {deviation}");
}

/// Largest distance between a curve's points and `y = f(x)`.
fn deviation_from(curve: &Curve, f: impl Fn(f64) -> f64) -> f64 {
    curve
        .points()
        .iter()
        .map(|p| (p.y - f(p.x)).abs())
        .fold(0.0, f64::max)
}

fn scene_stage(result: &ExtractionResult, name: &str) -> StageMetrics {
    result
        .stats
        .scene
        .iter()
        .find(|s| s.metrics.stage_name() == name)
        .map(|s| s.metrics.clone())
        .unwrap()
}

fn enhanced(options: EnhancedOptions, config: ExtractionConfig) -> ExtractionConfig {
    ExtractionConfig {
        mode: ExtractionMode::Enhanced(options),
        min_size: 50,
        ..config
    }
}

/// Boxed plot at (20, 10)-(480, 280) with the legend drawn into its
/// top-right corner, holding a red and a blue swatch.
fn draw_corner_legend(img: &mut image::RgbImage) {
    outline_rect(img, BLACK, (20, 10), (480, 280));
    outline_rect(img, BLACK, (360, 10), (480, 90));
    fill_rect(img, RED, (370, 40), (400, 46));
    fill_rect(img, BLUE, (370, 60), (400, 66));
}

#[test]
fn scenario_e_legend_in_plot_frame_corner_is_excluded() {
    let mut img = canvas(WIDTH, HEIGHT);
    draw_curve(&mut img, RED, 5, |x| 270.0 - 0.3 * x);
    draw_corner_legend(&mut img);

    let options = EnhancedOptions {
        use_annotation_mask: true,
        ..EnhancedOptions::default()
    };
    let config = enhanced(options, pixel_config(WIDTH, HEIGHT, &["red"]));
    let result = extract(&png(&img), &config).unwrap();

    assert!(matches!(
        scene_stage(&result, "Annotation Detection"),
        StageMetrics::AnnotationDetection { regions: 1, .. }
    ));
    assert_eq!(result.curves.len(), 1);
    let deviation = deviation_from(&result.curves[0], |x| f64::from(HEIGHT) - (270.0 - 0.3 * x));
    assert!(deviation < 1.5, "deviation {deviation}");
}

#[test]
fn plot_area_ignores_flat_colored_curve() {
    // Open L axes and a blue curve that rises, then stays flat across
    // most of the upper half.
    let mut img = canvas(WIDTH, HEIGHT);
    draw_curve(&mut img, BLUE, 4, |x| (230.0 - 1.5 * x).max(60.0));
    for y in 10..=250 {
        img.put_pixel(30, y, BLACK);
    }
    for x in 30..=470 {
        img.put_pixel(x, 250, BLACK);
    }

    let options = EnhancedOptions {
        use_plot_area: true,
        ..EnhancedOptions::default()
    };
    let config = enhanced(options, pixel_config(WIDTH, HEIGHT, &["blue"]));
    let result = extract(&png(&img), &config).unwrap();

    assert!(matches!(
        scene_stage(&result, "Plot Area"),
        StageMetrics::PlotArea {
            found: true,
            plot_width: 440,
            plot_height: 240
        }
    ));
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert_eq!(result.curves.len(), 1);

    let points = result.curves[0].points();
    let plateau: Vec<f64> = points[points.len() / 2..].iter().map(|p| p.y).collect();
    let spread = plateau.iter().copied().fold(f64::MIN, f64::max)
        - plateau.iter().copied().fold(f64::MAX, f64::min);
    assert!(spread < 0.5, "plateau spread {spread}");
    assert!(points[0].y < points[points.len() - 1].y);
}

/// Data-space y of the blue curve in the framed plot.
fn framed_blue_y(x: f64) -> f64 {
    280.0 - (190.0 - 0.18 * x)
}

#[test]
fn plot_area_and_annotation_mask_keep_curves_near_frame_and_legend() {
    // A red curve runs along the bottom frame line; a blue one passes
    // just below the legend.
    let mut img = canvas(WIDTH, HEIGHT);
    draw_curve(&mut img, RED, 4, |_| 275.0);
    draw_curve(&mut img, BLUE, 4, |x| 190.0 - 0.18 * x);
    draw_corner_legend(&mut img);

    // Plot detection lands just inside the frame at (21, 11)-(480, 280);
    // these axes make data coordinates pixel columns and pixel rows up
    // from the bottom frame line.
    let config = enhanced(
        EnhancedOptions {
            use_plot_area: true,
            use_annotation_mask: true,
            ..EnhancedOptions::default()
        },
        ExtractionConfig {
            x_axis: AxisConfig::linear(21.0, 480.0),
            y_axis: AxisConfig::linear(0.0, 269.0),
            ..pixel_config(WIDTH, HEIGHT, &["red", "blue"])
        },
    );
    let result = extract(&png(&img), &config).unwrap();

    assert!(matches!(
        scene_stage(&result, "Plot Area"),
        StageMetrics::PlotArea {
            found: true,
            plot_width: 459,
            plot_height: 269
        }
    ));
    assert!(matches!(
        scene_stage(&result, "Annotation Detection"),
        StageMetrics::AnnotationDetection { regions: 1, .. }
    ));
    assert!(result.warnings.is_empty(), "{:?}", result.warnings);
    assert_eq!(result.curves.len(), 2);

    let red = &result.curves[0];
    assert_eq!(red.color(), "red");
    assert!(red.point_count() >= 80, "{} points", red.point_count());
    let deviation = deviation_from(red, |_| 5.0);
    assert!(deviation < 1.0, "red deviation {deviation}");

    let blue = &result.curves[1];
    assert_eq!(blue.color(), "blue");
    assert!(blue.points().last().unwrap().x > 470.0);
    let deviation = deviation_from(blue, framed_blue_y);
    assert!(deviation < 1.5, "blue deviation {deviation}");
}
